use chrono::Local;
use log::{debug, info};

use crate::error::StorageError;
use crate::input::KeyPress;
use crate::ledger::{KeystrokeEvent, Ledger, Sequence, SequenceId, SourceText};

/// The sequence currently being recorded and its numbering state.
///
/// Passed explicitly to every recording call so that separate typing sessions
/// never share counters.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    sequence: Sequence,
    last_number: u32,
    has_presses: bool,
}

impl RecordingSession {
    /// Open a new sequence stamped with the current time
    pub fn start<L: Ledger>(ledger: &mut L, source: Option<&SourceText>) -> Result<Self, StorageError> {
        Self::start_with_id(ledger, source, Local::now().timestamp_millis())
    }

    pub fn start_with_id<L: Ledger>(
        ledger: &mut L,
        source: Option<&SourceText>,
        id: SequenceId,
    ) -> Result<Self, StorageError> {
        let sequence = Sequence::new(id, source);
        ledger.create_sequence(&sequence)?;
        debug!("started sequence {id}");
        Ok(Self {
            sequence,
            last_number: 0,
            has_presses: false,
        })
    }

    /// Abandon the current sequence and open a new one. The abandoned sequence
    /// is deleted when nothing but backspaces was recorded in it.
    pub fn restart<L: Ledger>(&mut self, ledger: &mut L, source: Option<&SourceText>) -> Result<(), StorageError> {
        let now = Local::now().timestamp_millis();
        // ids are creation timestamps and must stay unique
        let id = now.max(self.sequence.id + 1);
        let next = Self::start_with_id(ledger, source, id)?;
        let previous = std::mem::replace(self, next);
        previous.discard_if_empty(ledger)
    }

    /// Append one keystroke with the next sequence number
    pub fn record<L: Ledger>(&mut self, ledger: &mut L, press: &KeyPress) -> Result<KeystrokeEvent, StorageError> {
        let event = KeystrokeEvent {
            sequence_id: self.sequence.id,
            sequence_number: self.last_number + 1,
            expected: press.expected,
            entered: press.entered,
            delay_ms: press.delay_ms,
        };
        ledger.append(&event)?;
        self.last_number = event.sequence_number;
        if !event.is_backspace() {
            self.has_presses = true;
        }
        Ok(event)
    }

    /// Close the session, dropping the sequence if it is empty
    pub fn finish<L: Ledger>(self, ledger: &mut L) -> Result<(), StorageError> {
        self.discard_if_empty(ledger)
    }

    fn discard_if_empty<L: Ledger>(&self, ledger: &mut L) -> Result<(), StorageError> {
        if !self.has_presses {
            info!("removing empty sequence {}", self.sequence.id);
            ledger.delete_sequence(self.sequence.id)?;
        }
        Ok(())
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn id(&self) -> SequenceId {
        self.sequence.id
    }

    pub fn is_empty(&self) -> bool {
        !self.has_presses
    }
}
