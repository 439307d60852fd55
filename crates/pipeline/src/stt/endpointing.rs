//! Energy-based utterance endpointing

use call_agent_core::rms_energy;

/// Endpointer configuration
#[derive(Debug, Clone)]
pub struct EndpointerConfig {
    /// Sample rate of the audio pushed in
    pub sample_rate: u32,
    /// Normalized RMS energy treated as speech
    pub energy_threshold: f32,
    /// Trailing silence that closes an utterance
    pub silence_ms: u64,
    /// Utterances with less voiced audio than this are discarded
    pub min_speech_ms: u64,
}

impl Default for EndpointerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            energy_threshold: 0.01,
            silence_ms: 700,
            min_speech_ms: 200,
        }
    }
}

/// Accumulates voiced audio and emits complete utterances
#[derive(Debug)]
pub struct Endpointer {
    config: EndpointerConfig,
    buffer: Vec<i16>,
    speech_samples: usize,
    trailing_silence: usize,
    in_speech: bool,
}

impl Endpointer {
    pub fn new(config: EndpointerConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            speech_samples: 0,
            trailing_silence: 0,
            in_speech: false,
        }
    }

    fn samples_for(&self, ms: u64) -> usize {
        (self.config.sample_rate as u64 * ms / 1000) as usize
    }

    /// Feed a chunk; returns an utterance once trailing silence closes it
    pub fn push(&mut self, chunk: &[i16]) -> Option<Vec<i16>> {
        if chunk.is_empty() {
            return None;
        }

        if rms_energy(chunk) >= self.config.energy_threshold {
            self.in_speech = true;
            self.trailing_silence = 0;
            self.speech_samples += chunk.len();
            self.buffer.extend_from_slice(chunk);
            return None;
        }

        // Leading silence is not buffered
        if !self.in_speech {
            return None;
        }

        self.buffer.extend_from_slice(chunk);
        self.trailing_silence += chunk.len();
        if self.trailing_silence >= self.samples_for(self.config.silence_ms) {
            return self.take();
        }
        None
    }

    /// Emit whatever speech is buffered (end of stream)
    pub fn flush(&mut self) -> Option<Vec<i16>> {
        self.take()
    }

    /// Currently inside an utterance
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    fn take(&mut self) -> Option<Vec<i16>> {
        let enough = self.speech_samples >= self.samples_for(self.config.min_speech_ms);
        let utterance = std::mem::take(&mut self.buffer);
        self.speech_samples = 0;
        self.trailing_silence = 0;
        self.in_speech = false;
        (enough && !utterance.is_empty()).then_some(utterance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 320; // 20ms at 16kHz

    fn voiced() -> Vec<i16> {
        (0..FRAME).map(|i| if i % 2 == 0 { 8000 } else { -8000 }).collect()
    }

    fn silent() -> Vec<i16> {
        vec![0; FRAME]
    }

    #[test]
    fn test_utterance_closed_by_silence() {
        let mut ep = Endpointer::new(EndpointerConfig::default());
        assert!(ep.push(&silent()).is_none());
        for _ in 0..25 {
            assert!(ep.push(&voiced()).is_none());
        }
        assert!(ep.in_speech());

        let mut emitted = None;
        for _ in 0..40 {
            if let Some(u) = ep.push(&silent()) {
                emitted = Some(u);
                break;
            }
        }
        let utterance = emitted.expect("utterance should close after 700ms silence");
        // 25 voiced frames plus 35 silent frames (700ms)
        assert_eq!(utterance.len(), 60 * FRAME);
        assert!(!ep.in_speech());
    }

    #[test]
    fn test_short_blip_discarded() {
        let mut ep = Endpointer::new(EndpointerConfig::default());
        ep.push(&voiced());
        for _ in 0..35 {
            assert!(ep.push(&silent()).is_none());
        }
        assert!(!ep.in_speech());
    }

    #[test]
    fn test_flush_returns_pending_speech() {
        let mut ep = Endpointer::new(EndpointerConfig::default());
        for _ in 0..15 {
            ep.push(&voiced());
        }
        assert_eq!(ep.flush().map(|u| u.len()), Some(15 * FRAME));
        assert!(ep.flush().is_none());
    }
}
