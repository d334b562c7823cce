//! Line segmentation: assembled script → ordered speaker lines.
//!
//! Each non-blank line becomes one `SpeakerLine`. A leading `Alice:` or
//! `Bob:` selects the speaker and is stripped. Lines without a recognised
//! prefix (transitions, sign-off, stray narration) fall back to
//! `Speaker::SpeakerA` so they are still voiced; this is a policy, not an
//! error path.

use std::fmt;
use std::str::Lines;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    SpeakerA,
    SpeakerB,
}

impl Speaker {
    pub const ALL: [Speaker; 2] = [Speaker::SpeakerA, Speaker::SpeakerB];

    /// Voice used for lines that carry no prefix.
    pub const DEFAULT: Speaker = Speaker::SpeakerA;

    /// Case-sensitive line prefix naming this speaker in a script.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::SpeakerA => "Alice:",
            Self::SpeakerB => "Bob:",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches(':'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerLine {
    pub speaker: Speaker,
    pub text: String,
    /// Position in the episode; assigned once here and never recomputed.
    pub sequence_index: usize,
}

/// Split one physical line into speaker and utterance. `None` for blank lines.
pub fn parse_line(line: &str) -> Option<(Speaker, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    for speaker in Speaker::ALL {
        if let Some(rest) = line.strip_prefix(speaker.prefix()) {
            return Some((speaker, rest.trim()));
        }
    }
    Some((Speaker::DEFAULT, line))
}

/// Lazy, single-pass iterator over the speaker lines of a script.
///
/// Not restartable: to start over, build a new segmenter from the script.
pub struct Segmenter<'a> {
    lines: Lines<'a>,
    next_index: usize,
}

impl<'a> Segmenter<'a> {
    pub fn new(script: &'a str) -> Self {
        Self {
            lines: script.lines(),
            next_index: 0,
        }
    }
}

impl Iterator for Segmenter<'_> {
    type Item = SpeakerLine;

    fn next(&mut self) -> Option<SpeakerLine> {
        for raw in self.lines.by_ref() {
            if let Some((speaker, text)) = parse_line(raw) {
                let sequence_index = self.next_index;
                self.next_index += 1;
                return Some(SpeakerLine {
                    speaker,
                    text: text.to_string(),
                    sequence_index,
                });
            }
        }
        None
    }
}

impl std::iter::FusedIterator for Segmenter<'_> {}

pub fn segment(script: &str) -> Segmenter<'_> {
    Segmenter::new(script)
}
