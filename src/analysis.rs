//! Read-side views over the keystroke ledger: per-key miss rates, sequence
//! listings, replays and delay statistics.

use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::keyboard::KeyboardLayout;
use crate::ledger::{Key, KeystrokeEvent, Ledger, Sequence};
use crate::segmenter::text_for_sequence;
use crate::util::{mean, std_dev};

/// How often a character was mistyped
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KeyInfo {
    pub total: u32,
    pub misstypes: u32,
    pub ratio: f64,
}

impl KeyInfo {
    fn merge(self, other: KeyInfo) -> KeyInfo {
        let total = self.total + other.total;
        let misstypes = self.misstypes + other.misstypes;
        KeyInfo {
            total,
            misstypes,
            ratio: if total == 0 { 0.0 } else { misstypes as f64 / total as f64 },
        }
    }
}

/// Miss rates per lowercase expected character, backspaces excluded
pub fn failmap(events: &[KeystrokeEvent]) -> BTreeMap<char, KeyInfo> {
    events
        .iter()
        .filter(|e| !e.is_backspace())
        .into_group_map_by(|e| e.expected.to_lowercase().next().unwrap_or(e.expected))
        .into_iter()
        .map(|(c, presses)| {
            let info = presses.iter().fold(KeyInfo::default(), |acc, e| {
                acc.merge(KeyInfo {
                    total: 1,
                    misstypes: u32::from(!e.is_correct()),
                    ratio: 0.0,
                })
            });
            (c, info)
        })
        .collect()
}

/// Failmap entries merged per physical key, as `(row, col) -> info`
pub fn key_heat(failmap: &BTreeMap<char, KeyInfo>, layout: &KeyboardLayout) -> BTreeMap<(usize, usize), KeyInfo> {
    let mut heat: BTreeMap<(usize, usize), KeyInfo> = BTreeMap::new();
    for (&c, &info) in failmap {
        if let Some(key) = layout.key(c) {
            let entry = heat.entry((key.row, key.col)).or_default();
            *entry = entry.merge(info);
        }
    }
    heat
}

/// One row of the sequence listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceSummary {
    pub sequence: Sequence,
    pub text: String,
    pub keystrokes: usize,
}

/// Sequences that recorded at least one keystroke, newest first, with the
/// text each one produced.
pub fn sequence_summaries<L: Ledger>(ledger: &L) -> Result<Vec<SequenceSummary>, StorageError> {
    let mut by_sequence = ledger
        .read_all(None)?
        .into_iter()
        .into_group_map_by(|e| e.sequence_id);

    Ok(ledger
        .sequences()?
        .into_iter()
        .filter_map(|sequence| {
            let events = by_sequence.remove(&sequence.id)?;
            Some(SequenceSummary {
                text: text_for_sequence(&events),
                keystrokes: events.len(),
                sequence,
            })
        })
        .collect())
}

/// State of a replay after one keystroke
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFrame {
    /// Time since the start of the sequence
    pub at_ms: u64,
    /// Text as the user saw it, entered characters included
    pub text: String,
    /// Keystrokes applied so far
    pub progress: usize,
}

/// Frames replaying a sequence keystroke by keystroke
pub fn replay(events: &[KeystrokeEvent]) -> Vec<ReplayFrame> {
    let mut text = String::new();
    let mut at_ms = 0;
    events
        .iter()
        .enumerate()
        .map(|(i, e)| {
            at_ms += e.delay_ms;
            match e.entered {
                Key::Backspace => {
                    text.pop();
                }
                Key::Char(c) => text.push(c),
            }
            ReplayFrame {
                at_ms,
                text: text.clone(),
                progress: i + 1,
            }
        })
        .collect()
}

/// Spread of the delays before correct keystrokes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DelayProfile {
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub samples: usize,
}

pub fn delay_profile(events: &[KeystrokeEvent]) -> Option<DelayProfile> {
    let delays: Vec<f64> = events
        .iter()
        .filter(|e| e.is_correct() && e.delay_ms > 0)
        .map(|e| e.delay_ms as f64)
        .collect();
    Some(DelayProfile {
        mean_ms: mean(&delays)?,
        std_dev_ms: std_dev(&delays)?,
        samples: delays.len(),
    })
}
