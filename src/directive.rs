//! Control directives embedded in assistant text.
//!
//! Two markers are recognized. `[[CALL_EMERGENCY_CONTACT]]` only takes effect
//! as the very first characters of a message. `[[LINKS]]` may appear anywhere
//! and introduces a `label:description` list, separated by `;`, that runs to
//! the end of the message.

/// Prefix asking the client to contact the user's emergency contact.
pub const CALL_MARKER: &str = "[[CALL_EMERGENCY_CONTACT]]";
/// Introduces the trailing resource list.
pub const LINKS_MARKER: &str = "[[LINKS]]";
/// Label used when a resource item has none.
pub const DEFAULT_LINK_LABEL: &str = "Resource";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLink {
    label: String,
    description: String,
}

impl ResourceLink {
    pub fn new(label: &str, description: &str) -> Self {
        Self {
            label: label.to_string(),
            description: description.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// What an assistant message asks the client to show and do.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Directive {
    display_text: String,
    resources: Vec<ResourceLink>,
    trigger_contact: bool,
}

impl Directive {
    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn resources(&self) -> &[ResourceLink] {
        &self.resources
    }

    pub fn trigger_contact(&self) -> bool {
        self.trigger_contact
    }
}

/// Parses raw assistant text. Pure: the same text always yields the same directive.
pub fn parse(raw: &str) -> Directive {
    let (trigger_contact, candidate) = match raw.strip_prefix(CALL_MARKER) {
        Some(rest) => (true, rest.trim()),
        None => (false, raw),
    };

    let (display_text, resources) = match candidate.find(LINKS_MARKER) {
        Some(at) => (
            candidate[..at].trim(),
            parse_links(&candidate[at + LINKS_MARKER.len()..]),
        ),
        None => (candidate, Vec::new()),
    };

    Directive {
        display_text: display_text.to_string(),
        resources,
        trigger_contact,
    }
}

fn parse_links(list: &str) -> Vec<ResourceLink> {
    list.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (label, description) = item.split_once(':').unwrap_or((item, ""));
            let label = label.trim();
            ResourceLink::new(
                if label.is_empty() { DEFAULT_LINK_LABEL } else { label },
                description.trim(),
            )
        })
        .collect()
}
