//! Typo taxonomy for mismatched keystrokes.
//!
//! Every mismatch is classified by looking at the keystrokes that follow it.
//! Keystrokes consumed as part of a pattern (a duplicate press, the second half
//! of a transposition) are not examined again.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::keyboard::KeyboardLayout;
use crate::ledger::KeystrokeEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum_macros::Display)]
pub enum TypoType {
    #[strum(to_string = "wrong case")]
    WrongCase,
    #[strum(to_string = "duplication")]
    Duplication,
    #[strum(to_string = "wrong order")]
    WrongOrder,
    #[strum(to_string = "missed key")]
    MissedKey,
    #[strum(to_string = "neighbour key")]
    WrongNeighborKey,
    #[strum(to_string = "wrong key")]
    WrongKey,
}

/// One classified mismatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypoRecord {
    pub expected: char,
    pub typo_type: TypoType,
    pub offending: char,
}

impl TypoRecord {
    pub fn expected_lower(&self) -> char {
        lower(self.expected)
    }
}

/// Per expected character tallies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypoSummary {
    pub counts_by_type: BTreeMap<TypoType, u32>,
    pub counts_by_offending_char: BTreeMap<char, u32>,
}

impl TypoSummary {
    pub fn total(&self) -> u32 {
        self.counts_by_type.values().sum()
    }

    fn add(&mut self, record: &TypoRecord) {
        *self.counts_by_type.entry(record.typo_type).or_insert(0) += 1;
        *self.counts_by_offending_char.entry(record.offending).or_insert(0) += 1;
    }
}

/// A typed (non-backspace) keystroke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Press {
    expected: char,
    entered: char,
}

fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Classify the mismatch at `presses[i]`.
///
/// Returns the typo type and how many of the following presses belong to it.
fn classify_at(presses: &[Press], i: usize, layout: &KeyboardLayout) -> (TypoType, usize) {
    let p = presses[i];
    let next = presses.get(i + 1);
    let after_next = presses.get(i + 2);

    if p.entered != p.expected && lower(p.entered) == lower(p.expected) {
        return (TypoType::WrongCase, 0);
    }
    if let Some(n) = next {
        if n.entered == p.entered {
            return (TypoType::Duplication, 1);
        }
        if n.entered == p.expected && n.expected == p.entered {
            return (TypoType::WrongOrder, 1);
        }
    }
    if let (Some(n), Some(nn)) = (next, after_next) {
        if n.entered == p.expected && nn.entered == n.expected {
            return (TypoType::MissedKey, 2);
        }
    }
    if layout.are_neighbors(p.expected, p.entered) {
        return (TypoType::WrongNeighborKey, 0);
    }
    (TypoType::WrongKey, 0)
}

/// Classify every mismatch of a backspace-uncompensated keystroke list.
pub fn classify(events: &[KeystrokeEvent]) -> Vec<TypoRecord> {
    classify_with_layout(events, KeyboardLayout::us())
}

pub fn classify_with_layout(events: &[KeystrokeEvent], layout: &KeyboardLayout) -> Vec<TypoRecord> {
    let presses: Vec<Press> = events
        .iter()
        .filter_map(|e| {
            e.entered.char().map(|entered| Press {
                expected: e.expected,
                entered,
            })
        })
        .collect();

    let mut records = Vec::new();
    let mut i = 0;
    while i < presses.len() {
        let p = presses[i];
        if p.entered == p.expected {
            i += 1;
            continue;
        }
        let (typo_type, consumed) = classify_at(&presses, i, layout);
        records.push(TypoRecord {
            expected: p.expected,
            typo_type,
            offending: p.entered,
        });
        i += 1 + consumed;
    }
    records
}

/// Tally records per lowercase expected character
pub fn summarize(records: &[TypoRecord]) -> BTreeMap<char, TypoSummary> {
    let mut summaries: BTreeMap<char, TypoSummary> = BTreeMap::new();
    for record in records {
        summaries.entry(record.expected_lower()).or_default().add(record);
    }
    summaries
}

/// Typo summaries for a keystroke list
pub fn typo_summary(events: &[KeystrokeEvent]) -> BTreeMap<char, TypoSummary> {
    summarize(&classify(events))
}
