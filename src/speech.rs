//! Audio capture events and the speech-to-text contract

use crate::core::error::Result;
use async_trait::async_trait;

/// Capture sample rate expected by transcribers
pub const SAMPLE_RATE: usize = 16_000;
/// Longest utterance kept in memory; capture auto-stops around here
pub const MAX_UTTERANCE_SECS: usize = 30;

/// Events emitted by the audio capture loop
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// 16-bit mono PCM
    Chunk(Vec<i16>),
    SpeechStarted,
    /// Sustained silence after speech; the utterance is complete
    SilenceDetected,
    /// Capture ended (max duration or shutdown)
    CaptureStopped,
}

/// Speech-to-text backend. `Ok(None)` means nothing intelligible was heard.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, samples: &[i16]) -> Result<Option<String>>;
}

/// PCM accumulated for the utterance in progress
#[derive(Debug, Clone)]
pub struct UtteranceBuffer {
    samples: Vec<i16>,
    max_samples: usize,
    heard_speech: bool,
}

impl Default for UtteranceBuffer {
    fn default() -> Self {
        Self::new(SAMPLE_RATE * MAX_UTTERANCE_SECS)
    }
}

impl UtteranceBuffer {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::new(),
            max_samples,
            heard_speech: false,
        }
    }

    /// Append a chunk, dropping whatever exceeds the cap
    pub fn push(&mut self, chunk: &[i16]) {
        let room = self.max_samples.saturating_sub(self.samples.len());
        self.samples.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub fn mark_speech(&mut self) {
        self.heard_speech = true;
    }

    pub fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.max_samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Hand over the utterance and start fresh
    pub fn take(&mut self) -> Vec<i16> {
        self.heard_speech = false;
        std::mem::take(&mut self.samples)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.heard_speech = false;
    }
}
