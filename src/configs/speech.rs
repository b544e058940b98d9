use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the speech worker and the conversation/greeter apps.
/// When the whole section is absent, those apps are not registered.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SpeechConfig {
    /// Base URL of the local speech worker (wake scoring, STT, TTS, replies).
    #[serde(default = "default_worker_url")]
    pub worker_url: String,
    /// Voice used for announcements that have no personality attached.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Samples per wake-word scoring window, at the downsampled rate.
    #[serde(default = "default_wake_window")]
    pub wake_window: usize,
    /// An utterance ends after this long without an inbound frame.
    #[serde(default = "default_utterance_cutoff_ms")]
    pub utterance_cutoff_ms: u64,
    /// The conversation app exits after this long without a wake word.
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
    /// How long the greeter waits for its announcement before giving up.
    #[serde(default = "default_greeter_timeout_secs")]
    pub greeter_timeout_secs: u64,
    #[serde(default)]
    pub personalities: Vec<PersonalityConfig>,
}

/// One wake-word personality. The detector reports a keyword index, which
/// selects the personality at the same position in this list.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PersonalityConfig {
    pub name: String,
    pub keyword: String,
    pub voice: String,
    /// Short spoken acknowledgement after the wake word is heard.
    #[serde(default = "default_ack")]
    pub ack: String,
}

impl SpeechConfig {
    pub fn utterance_cutoff(&self) -> Duration {
        Duration::from_millis(self.utterance_cutoff_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn greeter_timeout(&self) -> Duration {
        Duration::from_secs(self.greeter_timeout_secs)
    }

    pub fn keywords(&self) -> Vec<String> {
        self.personalities
            .iter()
            .map(|p| p.keyword.clone())
            .collect()
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            worker_url: default_worker_url(),
            voice: default_voice(),
            wake_window: default_wake_window(),
            utterance_cutoff_ms: default_utterance_cutoff_ms(),
            idle_secs: default_idle_secs(),
            greeter_timeout_secs: default_greeter_timeout_secs(),
            personalities: Vec::new(),
        }
    }
}

fn default_worker_url() -> String {
    "http://127.0.0.1:5715".to_string()
}

fn default_voice() -> String {
    "en-1".to_string()
}

fn default_wake_window() -> usize {
    512
}

fn default_utterance_cutoff_ms() -> u64 {
    500
}

fn default_idle_secs() -> u64 {
    60
}

fn default_greeter_timeout_secs() -> u64 {
    60
}

fn default_ack() -> String {
    "Yes?".to_string()
}
