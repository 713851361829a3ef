use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("User"),
            Role::Assistant => f.write_str("Assistant"),
        }
    }
}

/// Identifier of a transcript entry, unique within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl EntryId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// One exchanged message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEntry {
    id: EntryId,
    role: Role,
    text: String,
}

impl TranscriptEntry {
    pub fn new(id: EntryId, role: Role, text: &str) -> Self {
        Self {
            id,
            role,
            text: text.to_string(),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Raw text as received, control markers included.
    pub fn text(&self) -> &str {
        &self.text
    }
}
