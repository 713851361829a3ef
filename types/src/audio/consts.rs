use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::str::FromStr;

/// Sample rate of the linear PCM exchanged with the remote service, in both directions.
pub const PCM_SAMPLE_RATE: u32 = 16_000;

/// Number of samples in one captured block.
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Fixed-point full-scale magnitude of a 16-bit sample.
pub const PCM16_FULL_SCALE: f32 = 32768.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFormat {
    Pcm16000,
    Pcm22050,
    Pcm24000,
    Custom(String),
}

impl AudioFormat {
    /// Sample rate implied by the format name, if it is a known linear PCM format.
    pub fn sample_rate(&self) -> Option<u32> {
        match self {
            AudioFormat::Pcm16000 => Some(16_000),
            AudioFormat::Pcm22050 => Some(22_050),
            AudioFormat::Pcm24000 => Some(24_000),
            AudioFormat::Custom(_) => None,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        AudioFormat::Pcm16000
    }
}

impl Serialize for AudioFormat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            AudioFormat::Pcm16000 => serializer.serialize_str("pcm_16000"),
            AudioFormat::Pcm22050 => serializer.serialize_str("pcm_22050"),
            AudioFormat::Pcm24000 => serializer.serialize_str("pcm_24000"),
            AudioFormat::Custom(s) => serializer.serialize_str(s),
        }
    }
}

impl FromStr for AudioFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pcm_16000" => AudioFormat::Pcm16000,
            "pcm_22050" => AudioFormat::Pcm22050,
            "pcm_24000" => AudioFormat::Pcm24000,
            _ => AudioFormat::Custom(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for AudioFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(AudioFormat::from_str(&s).unwrap_or_else(|never| match never {}))
    }
}
