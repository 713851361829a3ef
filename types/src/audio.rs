mod consts;
mod frame;

pub use consts::*;
pub use frame::AudioFrame;

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;
