use crate::error::PatternError;
use crate::ledger::Key;
use crate::ranges::{find_patterns, Pattern};
use crate::util::words_per_minute;

/// One keystroke ready to be appended to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub expected: char,
    pub entered: Key,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharState {
    Normal,
    Active,
    Done,
    Errored,
}

/// A unit of the page: one printable char, or a whole ignored span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharUnit {
    pub text: String,
    pub printable: bool,
    pub state: CharState,
}

impl CharUnit {
    fn expected(&self) -> char {
        self.text.chars().next().unwrap_or(' ')
    }
}

/// Split a page into typeable units. Each merged ignore range becomes a single
/// non-printable unit that the cursor skips over.
pub fn map_text(text: &str, ignore: &[Pattern]) -> Result<Vec<CharUnit>, PatternError> {
    let ranges = find_patterns(text, ignore)?;
    let chars: Vec<char> = text.chars().collect();
    let mut units = Vec::with_capacity(chars.len());
    let mut ranges = ranges.into_iter().filter(|r| !r.is_empty()).peekable();
    let mut i = 0;
    while i < chars.len() {
        if let Some(range) = ranges.next_if(|r| r.start == i) {
            units.push(CharUnit {
                text: chars[range.start..range.end].iter().collect(),
                printable: false,
                state: CharState::Normal,
            });
            i = range.end;
            continue;
        }
        units.push(CharUnit {
            text: chars[i].to_string(),
            printable: true,
            state: CharState::Normal,
        });
        i += 1;
    }
    if let Some(first) = units.iter_mut().find(|u| u.printable) {
        first.state = CharState::Active;
    }
    Ok(units)
}

/// Figures shown while typing a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveStats {
    pub wpm: u32,
    pub errors: usize,
    pub elapsed_ms: u64,
}

/// Typing state of one page
#[derive(Debug, Clone)]
pub struct TypingPage {
    units: Vec<CharUnit>,
    // index of the active unit, `units.len()` once the page is complete
    cursor: usize,
    started_at: Option<u64>,
    completed_at: Option<u64>,
    // times of correct presses, popped on backspace
    timestamps: Vec<u64>,
    errors: usize,
}

impl TypingPage {
    pub fn new(text: &str, ignore: &[Pattern]) -> Result<Self, PatternError> {
        let units = map_text(text, ignore)?;
        let cursor = units.iter().position(|u| u.printable).unwrap_or(units.len());
        Ok(Self {
            units,
            cursor,
            started_at: None,
            completed_at: None,
            timestamps: Vec::new(),
            errors: 0,
        })
    }

    pub fn units(&self) -> &[CharUnit] {
        &self.units
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.units.len()
    }

    /// Apply one keystroke at `at_ms`. Returns the keystroke to record, or
    /// `None` when it had no effect.
    pub fn input(&mut self, key: Key, at_ms: u64) -> Option<KeyPress> {
        match key {
            Key::Char(c) => self.type_char(c, at_ms),
            Key::Backspace => self.backspace(at_ms),
        }
    }

    fn delay_since_last(&self, at_ms: u64) -> u64 {
        self.timestamps.last().map_or(0, |&last| at_ms.saturating_sub(last))
    }

    fn type_char(&mut self, c: char, at_ms: u64) -> Option<KeyPress> {
        if self.is_complete() {
            return None;
        }
        let expected = self.units[self.cursor].expected();
        let correct = c == expected;
        let press = KeyPress {
            expected,
            entered: Key::Char(c),
            delay_ms: self.delay_since_last(at_ms),
        };

        self.started_at.get_or_insert(at_ms);
        if correct {
            self.timestamps.push(at_ms);
        } else {
            self.errors += 1;
        }
        self.units[self.cursor].state = if correct {
            CharState::Done
        } else {
            CharState::Errored
        };

        self.cursor = self.next_printable(self.cursor).unwrap_or(self.units.len());
        match self.units.get_mut(self.cursor) {
            Some(unit) => unit.state = CharState::Active,
            None => self.completed_at = Some(at_ms),
        }
        Some(press)
    }

    fn backspace(&mut self, at_ms: u64) -> Option<KeyPress> {
        let prev = self.prev_printable(self.cursor)?;
        let press = KeyPress {
            expected: self.units[prev].expected(),
            entered: Key::Backspace,
            delay_ms: self.delay_since_last(at_ms),
        };
        if let Some(unit) = self.units.get_mut(self.cursor) {
            unit.state = CharState::Normal;
        }
        // only correct presses left a timestamp behind
        if self.units[prev].state == CharState::Done {
            self.timestamps.pop();
        }
        self.units[prev].state = CharState::Active;
        self.cursor = prev;
        self.completed_at = None;
        Some(press)
    }

    fn next_printable(&self, from: usize) -> Option<usize> {
        (from + 1..self.units.len()).find(|&i| self.units[i].printable)
    }

    fn prev_printable(&self, from: usize) -> Option<usize> {
        (0..from).rev().find(|&i| self.units[i].printable)
    }

    pub fn stats(&self, now_ms: u64) -> LiveStats {
        let elapsed_ms = match self.started_at {
            Some(start) => self.completed_at.unwrap_or(now_ms).saturating_sub(start),
            None => 0,
        };
        LiveStats {
            wpm: words_per_minute(elapsed_ms, self.timestamps.len()),
            errors: self.errors,
            elapsed_ms,
        }
    }
}
