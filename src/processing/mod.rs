// Output audio settings shared by the config layer and the transcoders

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,    // 128 kbps
    #[default]
    Medium, // 192 kbps
    High,   // 256 kbps
    Best,   // 320 kbps
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    M4a,
    Opus,
    Flac,
}

impl AudioQuality {
    pub fn get_bitrate(&self) -> u32 {
        match self {
            AudioQuality::Low => 128,
            AudioQuality::Medium => 192,
            AudioQuality::High => 256,
            AudioQuality::Best => 320,
        }
    }
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Opus => "opus",
            AudioFormat::Flac => "flac",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Flac)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProcessingOptions {
    pub format: AudioFormat,
    pub quality: AudioQuality,
}

impl ProcessingOptions {
    /// Value for yt-dlp's `--audio-quality`. Lossless targets ignore bitrate.
    pub fn audio_quality_arg(&self) -> String {
        if self.format.is_lossless() {
            "0".to_string()
        } else {
            format!("{}K", self.quality.get_bitrate())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_arg_follows_bitrate() {
        let options = ProcessingOptions::default();
        assert_eq!(options.audio_quality_arg(), "192K");

        let lossless = ProcessingOptions {
            format: AudioFormat::Flac,
            quality: AudioQuality::Best,
        };
        assert_eq!(lossless.audio_quality_arg(), "0");
    }

    #[test]
    fn formats_deserialize_lowercase() {
        let format: AudioFormat = serde_json::from_str("\"m4a\"").unwrap();
        assert_eq!(format, AudioFormat::M4a);
        assert_eq!(format.extension(), "m4a");
    }
}
