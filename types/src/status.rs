use std::fmt;

/// Lifecycle state of a voice session.
///
/// `Disconnected` is both the initial and the only terminal state, and a new
/// session may be started from it again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Listening,
    Speaking,
}

impl Status {
    /// Whether the transport is open and outbound audio is meaningful.
    pub fn is_open(self) -> bool {
        matches!(self, Status::Connected | Status::Listening | Status::Speaking)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Disconnected => "disconnected",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Listening => "listening",
            Status::Speaking => "speaking",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_states() {
        assert!(!Status::Disconnected.is_open());
        assert!(!Status::Connecting.is_open());
        assert!(Status::Connected.is_open());
        assert!(Status::Listening.is_open());
        assert!(Status::Speaking.is_open());
        assert_eq!(Status::default(), Status::Disconnected);
        assert_eq!(serde_json::to_string(&Status::Speaking).unwrap(), r#""speaking""#);
    }
}
