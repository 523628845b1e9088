//! Splits a reference text into pages at break pattern matches and finds the
//! page holding a saved reading position.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::PatternError;
use crate::ranges::{compile_all, find_patterns, CharIndex, Pattern};

pub const DEFAULT_PAGE_THRESHOLD: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub search: String,
    pub replace: String,
}

/// Pattern configuration attached to a reference text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSet {
    /// Spans the user does not have to type
    pub ignore_patterns: Vec<String>,
    /// Acceptable page ends
    pub break_patterns: Vec<String>,
    /// Substitutions applied, in order, before paging
    pub replacement_patterns: Vec<Replacement>,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self {
            ignore_patterns: vec![
                "^ {2,}".to_string(),
                "(?<= ) ".to_string(),
                "((?<!\\n)\\n(?!\\n))|((?<=\\n)\\n)".to_string(),
            ],
            break_patterns: vec!["[?!.]".to_string()],
            replacement_patterns: vec![Replacement {
                search: "(?<!\\n)\\n(?!\\n)".to_string(),
                replace: " \\n".to_string(),
            }],
        }
    }
}

/// A `PatternSet` with every pattern compiled
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    pub ignore: Vec<Pattern>,
    pub breaks: Vec<Pattern>,
    pub replacements: Vec<(Pattern, String)>,
}

impl CompiledPatterns {
    /// Compile every pattern, failing on the first invalid one.
    pub fn compile(set: &PatternSet) -> Result<Self, PatternError> {
        let replacements = set
            .replacement_patterns
            .iter()
            .map(|r| Ok((Pattern::compile(&r.search)?, unescape_replacement(&r.replace))))
            .collect::<Result<_, PatternError>>()?;
        Ok(Self {
            ignore: compile_all(&set.ignore_patterns)?,
            breaks: compile_all(&set.break_patterns)?,
            replacements,
        })
    }

    /// Run every replacement in declared order, each on the output of the previous one.
    pub fn apply_replacements(&self, text: &str) -> Result<String, PatternError> {
        let mut text = text.to_string();
        for (pattern, replacement) in &self.replacements {
            text = replace_all(pattern, &text, replacement)?;
        }
        Ok(text)
    }
}

/// Replacement strings are edited as plain text, so `\n` and `\t` are written
/// as escapes.
fn unescape_replacement(s: &str) -> String {
    s.replace("\\n", "\n").replace("\\t", "\t")
}

fn replace_all(pattern: &Pattern, text: &str, replacement: &str) -> Result<String, PatternError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in pattern.regex().captures_iter(text) {
        let caps = caps.map_err(|e| pattern.match_error(e))?;
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&text[last..m.start()]);
        expand(&caps, replacement, &mut out);
        last = m.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Expand `$n` group references; `$$` is a literal dollar sign.
fn expand(caps: &fancy_regex::Captures<'_>, template: &str, out: &mut String) {
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'$') {
            chars.next();
            out.push('$');
            continue;
        }
        let mut digits = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            digits.push(d);
            chars.next();
        }
        match digits.parse::<usize>() {
            Ok(group) => {
                if let Some(m) = caps.get(group) {
                    out.push_str(m.as_str());
                }
            }
            Err(_) => out.push('$'),
        }
    }
}

/// A text split into pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub pages: Vec<String>,
    /// Page holding the saved offset
    pub active_page: usize,
}

impl Pagination {
    /// Char offset where `page` starts, suitable for saving as a reading position
    pub fn offset_of(&self, page: usize) -> usize {
        self.pages.iter().take(page).map(|p| p.chars().count()).sum()
    }

    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.chars().count()).sum()
    }

    /// Share of the text before `page`, in percent rounded to two decimals
    pub fn progress(&self, page: usize) -> f64 {
        let total = self.total_chars();
        if total == 0 {
            return 0.0;
        }
        let pct = self.offset_of(page) as f64 / total as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Apply the replacements, then split the text at break pattern matches.
///
/// `threshold` and `saved_offset` count chars. A page ends at the end of the
/// first break match starting at least `threshold` chars after the page start,
/// so the delimiter stays on the page it terminates. The remainder after the
/// last usable break becomes the final page. The active page is the first one
/// whose end lies past `saved_offset`, or the last page when the offset is past
/// the end of the text.
pub fn paginate(
    text: &str,
    patterns: &CompiledPatterns,
    threshold: usize,
    saved_offset: usize,
) -> Result<Pagination, PatternError> {
    let text = patterns.apply_replacements(text)?;
    let index = CharIndex::new(&text);
    let len = index.char_len();

    if len <= threshold {
        return Ok(Pagination {
            pages: vec![text],
            active_page: 0,
        });
    }

    let breaks = find_patterns(&text, &patterns.breaks)?;

    let mut pages = Vec::new();
    let mut active_page = None;
    let mut start = 0;
    let mut next_break = 0;
    loop {
        let min_start = start + threshold;
        // breaks are sorted and disjoint, and the minimum only grows
        while next_break < breaks.len()
            && (breaks[next_break].start < min_start || breaks[next_break].end <= start)
        {
            next_break += 1;
        }
        let Some(range) = breaks.get(next_break) else {
            break;
        };
        pages.push(text[index.to_byte(start)..index.to_byte(range.end)].to_string());
        start = range.end;
        if active_page.is_none() && saved_offset < start {
            active_page = Some(pages.len() - 1);
        }
        if start >= len {
            break;
        }
    }
    if start < len {
        pages.push(text[index.to_byte(start)..].to_string());
        if active_page.is_none() && saved_offset < len {
            active_page = Some(pages.len() - 1);
        }
    }

    let active_page = active_page.unwrap_or(pages.len() - 1);
    debug!(
        "split {len} chars into {} pages, saved offset {saved_offset} on page {active_page}",
        pages.len()
    );
    Ok(Pagination { pages, active_page })
}
