use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::StorageError;

pub type SequenceId = i64;

/// Stored form of the backspace key
pub const BACKSPACE: &str = "BKSP";

/// What the user pressed: a character or backspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Char(char),
    Backspace,
}

impl Key {
    pub fn is_backspace(&self) -> bool {
        matches!(self, Key::Backspace)
    }

    pub fn char(&self) -> Option<char> {
        match self {
            Key::Char(c) => Some(*c),
            Key::Backspace => None,
        }
    }

    /// Parse the stored form. Anything that is not the backspace marker or a
    /// single character is rejected.
    pub fn from_stored(s: &str) -> Option<Self> {
        if s == BACKSPACE {
            return Some(Key::Backspace);
        }
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(Key::Char(c)),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::Backspace => f.write_str(BACKSPACE),
        }
    }
}

/// One recorded key action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokeEvent {
    pub sequence_id: SequenceId,
    /// 1-based, strictly increasing within a sequence
    pub sequence_number: u32,
    pub expected: char,
    pub entered: Key,
    pub delay_ms: u64,
}

impl KeystrokeEvent {
    pub fn is_backspace(&self) -> bool {
        self.entered.is_backspace()
    }

    pub fn is_correct(&self) -> bool {
        self.entered == Key::Char(self.expected)
    }

    /// A typed character that differs from the expected one
    pub fn is_mismatch(&self) -> bool {
        !self.is_backspace() && !self.is_correct()
    }
}

/// One continuous typing attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub start_time: DateTime<Local>,
    pub source_text_id: Option<i64>,
    pub source_text_name: Option<String>,
}

impl Sequence {
    pub fn new(id: SequenceId, source: Option<&SourceText>) -> Self {
        let start_time = Local
            .timestamp_millis_opt(id)
            .single()
            .unwrap_or_else(Local::now);
        Self {
            id,
            start_time,
            source_text_id: source.map(|s| s.id),
            source_text_name: source.map(|s| s.name.clone()),
        }
    }
}

/// The reference text a sequence was typed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub id: i64,
    pub name: String,
}

/// Append-only store of sequences and their keystrokes.
///
/// Implementations reject an append whose sequence number is not greater than
/// the last one stored for that sequence. Events are never deleted one by one,
/// only together with their sequence.
pub trait Ledger {
    fn create_sequence(&mut self, sequence: &Sequence) -> Result<(), StorageError>;
    fn delete_sequence(&mut self, id: SequenceId) -> Result<(), StorageError>;
    /// All sequences, newest first
    fn sequences(&self) -> Result<Vec<Sequence>, StorageError>;
    fn sequence(&self, id: SequenceId) -> Result<Option<Sequence>, StorageError>;
    fn append(&mut self, event: &KeystrokeEvent) -> Result<(), StorageError>;
    /// Events ordered by sequence, then sequence number. `None` reads every sequence.
    fn read_all(&self, sequence: Option<SequenceId>) -> Result<Vec<KeystrokeEvent>, StorageError>;
}

/// In-memory ledger
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    sequences: BTreeMap<SequenceId, Sequence>,
    events: BTreeMap<SequenceId, Vec<KeystrokeEvent>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn create_sequence(&mut self, sequence: &Sequence) -> Result<(), StorageError> {
        self.sequences.insert(sequence.id, sequence.clone());
        Ok(())
    }

    fn delete_sequence(&mut self, id: SequenceId) -> Result<(), StorageError> {
        self.sequences.remove(&id);
        self.events.remove(&id);
        Ok(())
    }

    fn sequences(&self) -> Result<Vec<Sequence>, StorageError> {
        Ok(self.sequences.values().rev().cloned().collect())
    }

    fn sequence(&self, id: SequenceId) -> Result<Option<Sequence>, StorageError> {
        Ok(self.sequences.get(&id).cloned())
    }

    fn append(&mut self, event: &KeystrokeEvent) -> Result<(), StorageError> {
        if !self.sequences.contains_key(&event.sequence_id) {
            return Err(StorageError::UnknownSequence(event.sequence_id));
        }
        let events = self.events.entry(event.sequence_id).or_default();
        let last = events.last().map_or(0, |e| e.sequence_number);
        if event.sequence_number <= last {
            return Err(StorageError::OutOfOrder {
                sequence: event.sequence_id,
                number: event.sequence_number,
                last,
            });
        }
        events.push(event.clone());
        Ok(())
    }

    fn read_all(&self, sequence: Option<SequenceId>) -> Result<Vec<KeystrokeEvent>, StorageError> {
        Ok(match sequence {
            Some(id) => self.events.get(&id).cloned().unwrap_or_default(),
            None => self.events.values().flatten().cloned().collect(),
        })
    }
}
