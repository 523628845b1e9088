//! Rebuilds what a typing sequence produced from its raw keystrokes.
//!
//! Backspaces are applied as a stack: each one removes the latest character
//! that has not already been erased. Backspaces with nothing left to erase are
//! ignored.

use serde::Serialize;

use crate::ledger::KeystrokeEvent;
use crate::util::words_per_minute;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum PartKind {
    Correct,
    Erased,
    Wrong,
}

/// A run of keystrokes with the same outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequencePart {
    /// Characters as entered
    pub text: String,
    /// Characters of the reference text at the same positions
    pub expected: String,
    pub kind: PartKind,
    /// Only set on correct runs
    pub words_per_minute: Option<u32>,
    #[serde(skip)]
    delay_ms: u64,
}

impl SequencePart {
    fn new(kind: PartKind) -> Self {
        Self {
            text: String::new(),
            expected: String::new(),
            kind,
            words_per_minute: None,
            delay_ms: 0,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Split off the last `count` characters into a new part of `kind`
    fn split_tail(&mut self, count: usize, kind: PartKind) -> SequencePart {
        let keep = self.char_len() - count;
        let mut tail = SequencePart::new(kind);
        tail.text = split_chars(&mut self.text, keep);
        tail.expected = split_chars(&mut self.expected, keep);
        tail
    }
}

fn split_chars(s: &mut String, keep: usize) -> String {
    let at = s.char_indices().nth(keep).map_or(s.len(), |(b, _)| b);
    s.split_off(at)
}

/// The text a sequence leaves behind once backspaces are applied: one
/// expected character per surviving keystroke.
pub fn text_for_sequence(events: &[KeystrokeEvent]) -> String {
    let mut text: Vec<char> = Vec::with_capacity(events.len());
    for event in events {
        if event.is_backspace() {
            text.pop();
        } else {
            text.push(event.expected);
        }
    }
    text.into_iter().collect()
}

/// Split a sequence's raw keystrokes into correct, wrong and erased runs.
///
/// Correct runs carry their typing speed, computed from the delays of the
/// keystrokes in the run when the run ends.
pub fn segment(events: &[KeystrokeEvent]) -> Vec<SequencePart> {
    Segmenter::default().run(events)
}

#[derive(Debug, Default)]
struct Segmenter {
    parts: Vec<SequencePart>,
    // index of the run still accepting keystrokes
    open: Option<usize>,
}

impl Segmenter {
    fn run(mut self, events: &[KeystrokeEvent]) -> Vec<SequencePart> {
        let mut pending_erase = 0;
        for event in events {
            if event.is_backspace() {
                self.close();
                pending_erase += 1;
                continue;
            }
            if pending_erase > 0 {
                self.erase(pending_erase);
                pending_erase = 0;
            }
            self.push(event);
        }
        self.close();
        if pending_erase > 0 {
            self.erase(pending_erase);
        }
        self.parts
    }

    fn push(&mut self, event: &KeystrokeEvent) {
        let kind = if event.is_correct() {
            PartKind::Correct
        } else {
            PartKind::Wrong
        };
        let idx = match self.open {
            Some(idx) if self.parts[idx].kind == kind => idx,
            _ => {
                self.close();
                self.parts.push(SequencePart::new(kind));
                self.parts.len() - 1
            }
        };
        let part = &mut self.parts[idx];
        if let Some(c) = event.entered.char() {
            part.text.push(c);
        }
        part.expected.push(event.expected);
        part.delay_ms += event.delay_ms;
        self.open = Some(idx);
    }

    fn close(&mut self) {
        if let Some(idx) = self.open.take() {
            let part = &mut self.parts[idx];
            if part.kind == PartKind::Correct {
                part.words_per_minute = Some(words_per_minute(part.delay_ms, part.char_len()));
            }
        }
    }

    /// Mark the last `count` surviving characters as erased, walking back
    /// over the parts and splitting the one where the count runs out.
    fn erase(&mut self, count: usize) {
        let mut remaining = count;
        let mut idx = self.parts.len();
        while remaining > 0 && idx > 0 {
            idx -= 1;
            if self.parts[idx].kind == PartKind::Erased {
                continue;
            }
            let len = self.parts[idx].char_len();
            if remaining >= len {
                self.parts[idx].kind = PartKind::Erased;
                self.parts[idx].words_per_minute = None;
                remaining -= len;
            } else {
                let tail = self.parts[idx].split_tail(remaining, PartKind::Erased);
                self.parts.insert(idx + 1, tail);
                remaining = 0;
            }
        }
    }
}
