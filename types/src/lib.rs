pub mod audio;
pub mod events;
pub mod log;
pub mod status;
pub mod transcript;

pub use audio::AudioFrame;
pub use events::{ClientEvent, ServerEvent};
pub use log::{EventKind, EventRecord};
pub use status::Status;
pub use transcript::{EntryId, Role, TranscriptEntry};
