//! Pattern range engine: every match of a list of patterns over a text,
//! folded into a sorted list of disjoint ranges.
//!
//! Offsets count `char`s, not bytes, so the results can be used directly by the
//! pager and the live input mapper.

use fancy_regex::Regex;

use crate::error::PatternError;

/// Half-open `[start, end)` interval of char offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A pattern compiled once, keeping its source for error reporting
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern in multi-line mode, so `^` and `$` match at line breaks.
    pub fn compile(source: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(&format!("(?m){source}")).map_err(|e| PatternError::Syntax {
            pattern: source.to_string(),
            source: Box::new(e),
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub(crate) fn match_error(&self, e: fancy_regex::Error) -> PatternError {
        PatternError::Match {
            pattern: self.source.clone(),
            source: Box::new(e),
        }
    }
}

pub fn compile_all<S: AsRef<str>>(sources: &[S]) -> Result<Vec<Pattern>, PatternError> {
    sources.iter().map(|s| Pattern::compile(s.as_ref())).collect()
}

/// Maps byte offsets of a text to char offsets and back.
#[derive(Debug, Clone)]
pub struct CharIndex {
    // byte offset of every char, plus the text length as a sentinel
    bytes: Vec<usize>,
}

impl CharIndex {
    pub fn new(text: &str) -> Self {
        let mut bytes: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        bytes.push(text.len());
        Self { bytes }
    }

    pub fn char_len(&self) -> usize {
        self.bytes.len() - 1
    }

    /// Char offset of a byte offset that lies on a char boundary
    pub fn to_char(&self, byte: usize) -> usize {
        match self.bytes.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i,
        }
    }

    pub fn to_byte(&self, char_offset: usize) -> usize {
        self.bytes[char_offset.min(self.char_len())]
    }
}

/// All matches of one pattern, in match order.
///
/// Empty matches are reported as empty ranges; the regex iterator steps past
/// them so the scan always terminates.
pub fn find_ranges(text: &str, index: &CharIndex, pattern: &Pattern) -> Result<Vec<Range>, PatternError> {
    pattern
        .regex()
        .find_iter(text)
        .map(|m| {
            m.map(|m| Range::new(index.to_char(m.start()), index.to_char(m.end())))
                .map_err(|e| pattern.match_error(e))
        })
        .collect()
}

/// Fold ranges sorted by start into disjoint ranges. Touching ranges
/// (`next.start == current.end`) are merged too.
pub fn merge_ranges(sorted: &[Range]) -> Vec<Range> {
    let mut merged: Vec<Range> = Vec::with_capacity(sorted.len());
    for &next in sorted {
        match merged.last_mut() {
            Some(current) if next.start <= current.end => {
                current.end = current.end.max(next.end);
            }
            _ => merged.push(next),
        }
    }
    merged
}

/// Matches of every pattern, sorted by start and then end, not merged.
pub fn find_all(text: &str, patterns: &[Pattern]) -> Result<Vec<Range>, PatternError> {
    let index = CharIndex::new(text);
    let mut ranges = Vec::new();
    for pattern in patterns {
        ranges.extend(find_ranges(text, &index, pattern)?);
    }
    ranges.sort();
    Ok(ranges)
}

/// Matches of every pattern merged into a minimal covering set of disjoint ranges.
pub fn find_patterns(text: &str, patterns: &[Pattern]) -> Result<Vec<Range>, PatternError> {
    Ok(merge_ranges(&find_all(text, patterns)?))
}
