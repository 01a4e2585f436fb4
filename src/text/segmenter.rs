//! Text segmenter: decides where a streamed response is cut into utterances.
//!
//! Fragments from the language model arrive a few characters at a time. The
//! segmenter accumulates them and cuts a segment when:
//! 1. a sentence boundary is present and enough words have accumulated; the
//!    cut lands after the last complete sentence and each sentence becomes
//!    its own segment,
//! 2. a clause boundary is present and more words have accumulated,
//! 3. the buffer grew past an adaptive word threshold (lower before the first
//!    audio plays, higher once speech is running).
//!
//! Cuts are rate-limited by a minimum interval so a burst of short sentences
//! does not flood the synthesis workers.

use crate::clock::{Clock, SystemClock};
use crate::defaults;
use crate::text::split::{sentence_boundaries, split_sentences};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for the segmenter.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Words required before a sentence boundary cuts
    pub min_words_primary: usize,
    /// Words required before a clause boundary cuts
    pub min_words_secondary: usize,
    /// Forced-cut word count while idle
    pub initial_threshold: usize,
    /// Forced-cut word count while speaking
    pub sustained_threshold: usize,
    /// Minimum time between cuts
    pub min_interval: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_words_primary: defaults::MIN_WORDS_PRIMARY,
            min_words_secondary: defaults::MIN_WORDS_SECONDARY,
            initial_threshold: defaults::INITIAL_SEGMENT_THRESHOLD,
            sustained_threshold: defaults::SUSTAINED_SEGMENT_THRESHOLD,
            min_interval: Duration::from_millis(defaults::MIN_SEGMENT_INTERVAL_MS),
        }
    }
}

/// A finalized span of text ready for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position in emission order since the last reset
    pub sequence: u64,
    pub text: String,
}

/// Why a cut happened. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CutReason {
    Sentence,
    Clause,
    Threshold,
}

const SECONDARY_BOUNDARIES: [char; 2] = [':', ';'];

/// Accumulates streamed text and emits segments at natural break points.
pub struct Segmenter {
    config: SegmenterConfig,
    buffer: String,
    /// Sentences cut together with the one `append` returned
    ready: VecDeque<Segment>,
    last_cut: Option<Instant>,
    next_sequence: u64,
    clock: Arc<dyn Clock>,
}

impl Segmenter {
    /// Creates a segmenter using the system clock.
    pub fn new(config: SegmenterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a segmenter with a custom clock (for deterministic testing).
    pub fn with_clock(config: SegmenterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            buffer: String::new(),
            ready: VecDeque::new(),
            last_cut: None,
            next_sequence: 0,
            clock,
        }
    }

    /// Appends a fragment and returns a segment if a cut condition fires.
    ///
    /// `speaking` selects the forced-cut threshold: the initial (low) one while
    /// nothing is playing, the sustained (high) one afterwards. A sentence cut
    /// takes every complete sentence at once; the first is returned and the
    /// rest wait in [`take_ready`](Self::take_ready).
    pub fn append(&mut self, fragment: &str, speaking: bool) -> Option<Segment> {
        self.buffer.push_str(fragment);
        let leading = self.buffer.len() - self.buffer.trim_start().len();
        if leading > 0 {
            self.buffer.drain(..leading);
        }
        if self.buffer.is_empty() {
            return self.ready.pop_front();
        }

        let now = self.clock.now();
        if let Some(last) = self.last_cut
            && now.duration_since(last) < self.config.min_interval
        {
            return self.ready.pop_front();
        }

        let Some((cut, reason)) = self.find_cut(speaking) else {
            return self.ready.pop_front();
        };
        let text = self.take_prefix(cut);
        self.last_cut = Some(now);

        let before = self.ready.len();
        if let Some(text) = text {
            match reason {
                CutReason::Sentence => {
                    for sentence in split_sentences(&text) {
                        self.enqueue(sentence);
                    }
                }
                CutReason::Clause | CutReason::Threshold => self.enqueue(text),
            }
        }
        tracing::trace!(
            reason = ?reason,
            segments = self.ready.len() - before,
            pending_words = self.word_count(),
            "segment cut"
        );
        self.ready.pop_front()
    }

    /// Next segment left over from the last cut, if any.
    pub fn take_ready(&mut self) -> Option<Segment> {
        self.ready.pop_front()
    }

    /// Emits whatever is left as a final segment. Idempotent.
    ///
    /// Segments still waiting from an earlier cut come out first; keep calling
    /// [`take_ready`](Self::take_ready) until it returns `None`.
    pub fn finalize(&mut self) -> Option<Segment> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
        } else {
            let len = self.buffer.len();
            if let Some(text) = self.take_prefix(len) {
                self.enqueue(text);
            }
            self.last_cut = Some(self.clock.now());
        }
        self.ready.pop_front()
    }

    /// Drops pending text and restarts sequence numbering.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.ready.clear();
        self.last_cut = None;
        self.next_sequence = 0;
    }

    /// Pending (not yet emitted) text.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Words currently accumulated.
    pub fn word_count(&self) -> usize {
        self.buffer.split_whitespace().count()
    }

    /// Returns the byte offset to cut at, if any rule fires.
    fn find_cut(&self, speaking: bool) -> Option<(usize, CutReason)> {
        let words = self.word_count();

        if words >= self.config.min_words_primary
            && let Some(&end) = sentence_boundaries(&self.buffer).last()
        {
            return Some((end, CutReason::Sentence));
        }

        if words >= self.config.min_words_secondary
            && let Some(end) = first_boundary(&self.buffer, &SECONDARY_BOUNDARIES)
        {
            return Some((end, CutReason::Clause));
        }

        let threshold = if speaking {
            self.config.sustained_threshold
        } else {
            self.config.initial_threshold
        };
        if words >= threshold {
            return Some((forced_cut(&self.buffer), CutReason::Threshold));
        }

        None
    }

    /// Removes `buffer[..end]` and returns it trimmed.
    ///
    /// Returns `None` when the removed text carries nothing speakable.
    fn take_prefix(&mut self, end: usize) -> Option<String> {
        let taken: String = self.buffer.drain(..end).collect();
        let leading = self.buffer.len() - self.buffer.trim_start().len();
        self.buffer.drain(..leading);

        let text = taken.trim();
        speakable(text).then(|| text.to_string())
    }

    fn enqueue(&mut self, text: String) {
        if !speakable(&text) {
            return;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.ready.push_back(Segment { sequence, text });
    }
}

fn speakable(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

/// End offset (exclusive) of the first occurrence of any of `marks`.
fn first_boundary(text: &str, marks: &[char]) -> Option<usize> {
    text.char_indices()
        .find(|(_, c)| marks.contains(c))
        .map(|(idx, c)| idx + c.len_utf8())
}

/// Cut offset for a threshold cut: everything if the buffer ends on
/// whitespace, otherwise up to the last whitespace so a word that is still
/// streaming in stays in the buffer.
fn forced_cut(text: &str) -> usize {
    if text.ends_with(char::is_whitespace) {
        return text.len();
    }
    match text.rfind(char::is_whitespace) {
        Some(idx) => idx,
        None => text.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn segmenter() -> (Segmenter, MockClock) {
        let clock = MockClock::new();
        let seg = Segmenter::with_clock(SegmenterConfig::default(), Arc::new(clock.clone()));
        (seg, clock)
    }

    #[test]
    fn test_two_sentences_in_one_fragment() {
        let (mut seg, _clock) = segmenter();

        let first = seg.append("Hello world. How are you?", false);
        assert_eq!(
            first,
            Some(Segment {
                sequence: 0,
                text: "Hello world.".to_string()
            })
        );
        assert_eq!(
            seg.take_ready(),
            Some(Segment {
                sequence: 1,
                text: "How are you?".to_string()
            })
        );
        assert_eq!(seg.take_ready(), None);
        assert_eq!(seg.pending(), "");
        assert_eq!(seg.finalize(), None);
    }

    #[test]
    fn test_every_complete_sentence_leaves_the_buffer() {
        let (mut seg, _clock) = segmenter();

        let text = "The first sentence is here. The second sentence is complete. \
                    The third one too. And an unfinished";
        let mut cut = Vec::new();
        let mut next = seg.append(text, false);
        while let Some(segment) = next {
            cut.push(segment.text);
            next = seg.take_ready();
        }

        assert_eq!(
            cut,
            vec![
                "The first sentence is here.",
                "The second sentence is complete.",
                "The third one too.",
            ]
        );
        assert_eq!(seg.pending(), "And an unfinished");
    }

    #[test]
    fn test_finalize_returns_leftover_ready_segments_first() {
        let (mut seg, _clock) = segmenter();
        let first = seg.append("One two three. Four five six. tail", false).unwrap();
        assert_eq!(first.text, "One two three.");

        assert_eq!(seg.finalize().unwrap().text, "Four five six.");
        assert_eq!(seg.take_ready().unwrap().text, "tail");
        assert_eq!(seg.take_ready(), None);
        assert_eq!(seg.finalize(), None);
    }

    #[test]
    fn test_no_boundary_waits_for_finalize() {
        let (mut seg, clock) = segmenter();
        let fragments = ["the ", "quick ", "brown ", "fox ", "jumps ", "over ", "the lazy dog"];

        for fragment in fragments {
            assert_eq!(seg.append(fragment, false), None);
            clock.advance(Duration::from_millis(500));
        }

        let segment = seg.finalize().expect("finalize should emit pending text");
        assert_eq!(segment.text, "the quick brown fox jumps over the lazy dog");
        assert_eq!(seg.finalize(), None);
    }

    #[test]
    fn test_short_sentence_is_held() {
        let (mut seg, _clock) = segmenter();
        // Only 2 words: below min_words_primary
        assert_eq!(seg.append("Hi there.", false), None);
        assert_eq!(seg.pending(), "Hi there.");
    }

    #[test]
    fn test_sentence_cut_once_enough_words() {
        let (mut seg, _clock) = segmenter();
        assert_eq!(seg.append("Hi there.", false), None);
        let segment = seg.append(" I am a voice", false).unwrap();
        assert_eq!(segment.text, "Hi there.");
        assert_eq!(seg.pending(), "I am a voice");
    }

    #[test]
    fn test_newline_is_primary_boundary() {
        let (mut seg, _clock) = segmenter();
        let segment = seg.append("one two three four five\nsix", false).unwrap();
        assert_eq!(segment.text, "one two three four five");
        assert_eq!(seg.pending(), "six");
    }

    #[test]
    fn test_decimal_point_does_not_cut() {
        let (mut seg, _clock) = segmenter();
        assert_eq!(seg.append("the value of pi is 3.14 roughly", false), None);
    }

    #[test]
    fn test_repeated_punctuation_stays_together() {
        let (mut seg, _clock) = segmenter();
        let segment = seg.append("Are you really sure about that?! Yes", false).unwrap();
        assert_eq!(segment.text, "Are you really sure about that?!");
    }

    #[test]
    fn test_secondary_boundary_needs_more_words() {
        let (mut seg, clock) = segmenter();
        assert_eq!(seg.append("Here is the list: apples", false), None);

        clock.advance(Duration::from_millis(200));
        let segment = seg
            .append(" pears plums cherries grapes melons", false)
            .unwrap();
        assert_eq!(segment.text, "Here is the list:");
    }

    #[test]
    fn test_initial_threshold_forces_cut() {
        let (mut seg, _clock) = segmenter();
        let words: Vec<String> = (0..15).map(|i| format!("w{i}")).collect();
        let text = words.join(" ") + " ";

        let segment = seg.append(&text, false).unwrap();
        assert_eq!(segment.text.split_whitespace().count(), 15);
        assert_eq!(seg.pending(), "");
    }

    #[test]
    fn test_forced_cut_keeps_partial_word() {
        let (mut seg, _clock) = segmenter();
        let words: Vec<String> = (0..15).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");

        let segment = seg.append(&text, false).unwrap();
        assert_eq!(segment.text.split_whitespace().count(), 14);
        assert_eq!(seg.pending(), "w14");
    }

    #[test]
    fn test_sustained_threshold_while_speaking() {
        let (mut seg, _clock) = segmenter();
        let words: Vec<String> = (0..20).map(|i| format!("w{i}")).collect();
        let text = words.join(" ") + " ";

        assert_eq!(seg.append(&text, true), None);
        assert_eq!(seg.word_count(), 20);
    }

    #[test]
    fn test_min_interval_suppresses_back_to_back_cuts() {
        let (mut seg, clock) = segmenter();

        let first = seg.append("This is the first sentence. ", false).unwrap();
        assert_eq!(first.text, "This is the first sentence.");

        // Boundary condition met again, but inside the interval
        assert_eq!(seg.append("And this is the second one. ", false), None);
        assert_eq!(seg.pending(), "And this is the second one. ");

        clock.advance(Duration::from_millis(100));
        let second = seg.append("", false).unwrap();
        assert_eq!(second.text, "And this is the second one.");
        assert_eq!(second.sequence, 1);
    }

    #[test]
    fn test_whitespace_only_never_emits() {
        let (mut seg, _clock) = segmenter();
        assert_eq!(seg.append("   ", false), None);
        assert_eq!(seg.append("\n\n", false), None);
        assert_eq!(seg.append("\t", false), None);
        assert_eq!(seg.finalize(), None);
    }

    #[test]
    fn test_punctuation_only_cut_is_discarded() {
        let (mut seg, _clock) = segmenter();
        assert_eq!(seg.append("...", false), None);
        assert_eq!(seg.finalize(), None);
    }

    #[test]
    fn test_segments_are_trimmed() {
        let (mut seg, _clock) = segmenter();
        seg.append("   leading and trailing   ", false);
        let segment = seg.finalize().unwrap();
        assert_eq!(segment.text, "leading and trailing");
    }

    #[test]
    fn test_reset_clears_state() {
        let (mut seg, _clock) = segmenter();
        seg.append("Hello world. Second sentence here. pending words", false);
        seg.reset();

        assert_eq!(seg.pending(), "");
        assert_eq!(seg.take_ready(), None);
        assert_eq!(seg.finalize(), None);

        seg.append("fresh start", false);
        assert_eq!(seg.finalize().unwrap().sequence, 0);
    }

    #[test]
    fn test_multibyte_text() {
        let (mut seg, _clock) = segmenter();
        let segment = seg.append("Ça va très bien, merci. Et toi", false).unwrap();
        assert_eq!(segment.text, "Ça va très bien, merci.");
        assert_eq!(seg.pending(), "Et toi");
    }

    #[test]
    fn test_forced_cut_offsets() {
        assert_eq!(forced_cut("a b "), 4);
        assert_eq!(forced_cut("a b"), 1);
        assert_eq!(forced_cut("word"), 4);
    }
}
