//! Piper voice catalog and name parsing.
//!
//! Voice names follow the piper convention `<lang>_<REGION>-<speaker>-<quality>`,
//! e.g. `fr_FR-siwis-medium`. Any well-formed name can be installed; the
//! catalog only lists voices worth suggesting.

use crate::defaults;
use crate::error::{Result, VoxflowError};

/// Metadata for a suggested piper voice.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceInfo {
    /// Voice name (e.g., "fr_FR-siwis-medium")
    pub name: &'static str,
    /// Approximate size of the `.onnx` file in megabytes
    pub size_mb: u32,
    /// Short human description
    pub description: &'static str,
}

pub const VOICES: &[VoiceInfo] = &[
    VoiceInfo {
        name: "fr_FR-siwis-medium",
        size_mb: 63,
        description: "French, female",
    },
    VoiceInfo {
        name: "fr_FR-siwis-low",
        size_mb: 28,
        description: "French, female, faster",
    },
    VoiceInfo {
        name: "fr_FR-upmc-medium",
        size_mb: 77,
        description: "French, two speakers",
    },
    VoiceInfo {
        name: "en_US-lessac-medium",
        size_mb: 63,
        description: "US English, female",
    },
    VoiceInfo {
        name: "en_US-amy-medium",
        size_mb: 63,
        description: "US English, female",
    },
    VoiceInfo {
        name: "en_GB-alan-medium",
        size_mb: 63,
        description: "British English, male",
    },
    VoiceInfo {
        name: "de_DE-thorsten-medium",
        size_mb: 63,
        description: "German, male",
    },
    VoiceInfo {
        name: "es_ES-davefx-medium",
        size_mb: 63,
        description: "Spanish, male",
    },
];

const QUALITIES: [&str; 4] = ["x_low", "low", "medium", "high"];

/// List all suggested voices.
pub fn list_voices() -> &'static [VoiceInfo] {
    VOICES
}

/// Look up a suggested voice by name.
pub fn get_voice(name: &str) -> Option<&'static VoiceInfo> {
    VOICES.iter().find(|v| v.name == name)
}

/// A parsed piper voice name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceName<'a> {
    /// Locale, e.g. "fr_FR"
    pub locale: &'a str,
    pub speaker: &'a str,
    pub quality: &'a str,
}

impl<'a> VoiceName<'a> {
    /// Parses `<lang>_<REGION>-<speaker>-<quality>`.
    ///
    /// # Errors
    /// Returns `VoxflowError::InvalidVoiceName` when the name is malformed.
    pub fn parse(name: &'a str) -> Result<Self> {
        let malformed = || VoxflowError::InvalidVoiceName {
            name: name.to_string(),
        };

        let (locale, rest) = name.split_once('-').ok_or_else(malformed)?;
        let (speaker, quality) = rest.rsplit_once('-').ok_or_else(malformed)?;

        let locale_ok = locale.split_once('_').is_some_and(|(lang, region)| {
            !lang.is_empty()
                && lang.chars().all(|c| c.is_ascii_lowercase())
                && !region.is_empty()
                && region.chars().all(|c| c.is_ascii_uppercase())
        });
        let speaker_ok = !speaker.is_empty()
            && speaker
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !locale_ok || !speaker_ok || !QUALITIES.contains(&quality) {
            return Err(malformed());
        }

        Ok(Self {
            locale,
            speaker,
            quality,
        })
    }

    /// Language family, the part of the locale before the underscore.
    pub fn language(&self) -> &'a str {
        self.locale.split('_').next().unwrap_or(self.locale)
    }

    /// Directory of this voice inside the voices repository.
    fn remote_dir(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            defaults::VOICES_BASE_URL,
            self.language(),
            self.locale,
            self.speaker,
            self.quality
        )
    }

    /// Full voice name, as used for file names.
    pub fn file_stem(&self) -> String {
        format!("{}-{}-{}", self.locale, self.speaker, self.quality)
    }

    /// Download URL of the `.onnx` model.
    pub fn model_url(&self) -> String {
        format!("{}/{}.onnx", self.remote_dir(), self.file_stem())
    }

    /// Download URL of the `.onnx.json` voice config.
    pub fn config_url(&self) -> String {
        format!("{}/{}.onnx.json", self.remote_dir(), self.file_stem())
    }
}
