//! Word, phrase and sentence boundaries around a flat-text char offset.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static CONJUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:and|but|or|which|that)\b").unwrap());

/// Half-open char range `[from, to)` in flat text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub from: usize,
    pub to: usize,
}

impl TextRange {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }

    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.from < other.to && other.from < self.to
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.from <= offset && offset < self.to
    }

    /// The covered substring of `text`.
    pub fn slice(&self, text: &str) -> String {
        text.chars().skip(self.from).take(self.len()).collect()
    }
}

/// Marking scope selected by repeated clicks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Word,
    Phrase,
    Sentence,
}

impl Granularity {
    /// 1 → word, 2 → phrase, 3 or more → sentence.
    pub fn for_click_count(count: u32) -> Self {
        match count {
            0 | 1 => Self::Word,
            2 => Self::Phrase,
            _ => Self::Sentence,
        }
    }

    pub fn is_max(&self) -> bool {
        *self == Self::Sentence
    }

    pub fn range_at(&self, text: &str, offset: usize) -> TextRange {
        match self {
            Self::Word => word_boundary(text, offset),
            Self::Phrase => phrase_boundary(text, offset),
            Self::Sentence => sentence_boundary(text, offset),
        }
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "word" => Ok(Self::Word),
            "phrase" => Ok(Self::Phrase),
            "sentence" => Ok(Self::Sentence),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '?' | '!')
}

fn is_phrase_punct(c: char) -> bool {
    matches!(c, ',' | ';' | ':')
}

/// Maximal run of non-whitespace around `offset`, attached punctuation
/// included. Landing on whitespace selects the word before it.
pub fn word_boundary(text: &str, offset: usize) -> TextRange {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return TextRange::new(offset, offset);
    }
    let idx = offset.min(chars.len() - 1);

    let mut start = idx;
    while start > 0 && !chars[start - 1].is_whitespace() {
        start -= 1;
    }
    let mut end = idx;
    while end < chars.len() && !chars[end].is_whitespace() {
        end += 1;
    }

    if start == end && idx > 0 && chars[idx].is_whitespace() {
        end = idx;
        start = idx - 1;
        while start > 0 && !chars[start - 1].is_whitespace() {
            start -= 1;
        }
    }
    TextRange::new(start, end)
}

fn sentence_in(chars: &[char], offset: usize) -> TextRange {
    if chars.is_empty() {
        return TextRange::new(offset, offset);
    }
    let len = chars.len();
    let idx = offset.min(len - 1);

    let mut start = idx;
    while start > 0 {
        if is_terminator(chars[start - 1]) && start < len && chars[start].is_whitespace() {
            break;
        }
        start -= 1;
    }
    while start < len && chars[start].is_whitespace() {
        start += 1;
    }

    let mut end = idx;
    while end < len {
        if is_terminator(chars[end]) && (end + 1 == len || chars[end + 1].is_whitespace()) {
            end += 1;
            break;
        }
        end += 1;
    }
    TextRange::new(start, end.min(len))
}

/// Sentence around `offset`: starts after the previous terminator that is
/// followed by whitespace (leading whitespace skipped) and runs through the
/// next `.`, `?` or `!` followed by whitespace, or to the end of text.
pub fn sentence_boundary(text: &str, offset: usize) -> TextRange {
    let chars: Vec<char> = text.chars().collect();
    sentence_in(&chars, offset)
}

/// Phrase around `offset` inside its sentence.
///
/// Phrases split at `,` `;` `:` (the delimiter belongs to neither side) and
/// before the conjunctions `and but or which that` when they start a word.
/// The containing segment is returned trimmed; an empty segment, or an
/// offset outside every segment, yields the whole sentence.
pub fn phrase_boundary(text: &str, offset: usize) -> TextRange {
    let chars: Vec<char> = text.chars().collect();
    let sentence = sentence_in(&chars, offset);
    if sentence.is_empty() || offset < sentence.from {
        return sentence;
    }
    let within = &chars[sentence.from..sentence.to];
    let at = offset - sentence.from;

    let joined: String = within.iter().collect();
    let byte_at: Vec<usize> = joined.char_indices().map(|(b, _)| b).collect();

    let mut segments: Vec<(usize, usize)> = Vec::new();
    let mut seg_start = 0;
    for i in 0..within.len() {
        if is_phrase_punct(within[i]) {
            segments.push((seg_start, i));
            seg_start = i + 1;
            continue;
        }
        let word_start = i == 0 || within[i - 1].is_whitespace();
        if word_start && CONJUNCTION.is_match(&joined[byte_at[i]..]) {
            if i > seg_start {
                segments.push((seg_start, i));
            }
            seg_start = i;
        }
    }
    segments.push((seg_start, within.len()));

    let Some(&(seg_from, seg_to)) = segments.iter().find(|(s, e)| at >= *s && at < *e) else {
        return sentence;
    };

    let mut from = seg_from;
    while from < seg_to && within[from].is_whitespace() {
        from += 1;
    }
    let mut to = seg_to;
    while to > from && within[to - 1].is_whitespace() {
        to -= 1;
    }
    if from >= to {
        return sentence;
    }
    TextRange::new(sentence.from + from, sentence.from + to)
}
