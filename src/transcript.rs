use crate::directive;
use crate::types::{EntryId, Role, TranscriptEntry};

/// Append-only, insertion-ordered log of the messages exchanged in one session.
///
/// Entries are only ever handed out by shared reference, so nothing can
/// reorder, edit or remove a past entry.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry under a fresh identifier and returns it.
    pub fn append(&mut self, role: Role, text: &str) -> &TranscriptEntry {
        self.next_id += 1;
        let entry = TranscriptEntry::new(EntryId::new(self.next_id), role, text);
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn get(&self, id: EntryId) -> Option<&TranscriptEntry> {
        // ids are assigned in increasing order
        self.entries
            .binary_search_by_key(&id, |entry| entry.id())
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plain-text digest of the last `max_entries` entries, one line each.
    ///
    /// Assistant lines show the display text with control markers removed.
    pub fn summary(&self, max_entries: usize) -> String {
        let start = self.entries.len().saturating_sub(max_entries);
        self.entries[start..]
            .iter()
            .map(|entry| match entry.role() {
                Role::User => format!("{}: {}", entry.role(), entry.text().trim()),
                Role::Assistant => format!(
                    "{}: {}",
                    entry.role(),
                    directive::parse(entry.text()).display_text()
                ),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
