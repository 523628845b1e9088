use chrono::{DateTime, Local};
use include_dir::{include_dir, Dir};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PatternError, Result, StorageError};
use crate::ledger::{Key, KeystrokeEvent, Ledger, Sequence, SequenceId, SourceText};
use crate::pager::{paginate, CompiledPatterns, Pagination, PatternSet, DEFAULT_PAGE_THRESHOLD};

static BASE_TEXT_DIR: Dir = include_dir!("src/texts");

// bumped once the bundled texts have been inserted
const SEEDED_VERSION: i64 = 1;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sequences (
        id INTEGER PRIMARY KEY,
        start_time TEXT NOT NULL,
        source_text_id INTEGER,
        source_text_name TEXT
    );

    CREATE TABLE IF NOT EXISTS keypresses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sequence_id INTEGER NOT NULL REFERENCES sequences(id),
        sequence_number INTEGER NOT NULL,
        expected TEXT NOT NULL,
        entered TEXT NOT NULL,
        delay_ms INTEGER NOT NULL,
        UNIQUE (sequence_id, sequence_number)
    );

    CREATE INDEX IF NOT EXISTS idx_keypresses_sequence ON keypresses(sequence_id);

    CREATE TABLE IF NOT EXISTS texts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        text TEXT NOT NULL,
        base BOOLEAN NOT NULL DEFAULT 0,
        patterns TEXT NOT NULL,
        page_threshold INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_texts_name ON texts(name);
"#;

/// A reference text and its paging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    /// `None` until the text is first saved
    pub id: Option<i64>,
    pub name: String,
    pub text: String,
    /// Shipped with the application rather than imported by the user
    pub base: bool,
    pub patterns: PatternSet,
    pub page_threshold: usize,
}

impl TextRecord {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            text: text.into(),
            base: false,
            patterns: PatternSet::default(),
            page_threshold: DEFAULT_PAGE_THRESHOLD,
        }
    }

    pub fn source(&self) -> Option<SourceText> {
        self.id.map(|id| SourceText {
            id,
            name: self.name.clone(),
        })
    }

    pub fn compile_patterns(&self) -> Result<CompiledPatterns, PatternError> {
        CompiledPatterns::compile(&self.patterns)
    }

    /// Pages of this text with the one holding `saved_offset` active
    pub fn paginate(&self, saved_offset: usize) -> Result<Pagination, PatternError> {
        paginate(&self.text, &self.compile_patterns()?, self.page_threshold, saved_offset)
    }
}

/// Changes to a stored text. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextEdit {
    pub name: Option<String>,
    pub page_threshold: Option<usize>,
    pub patterns: Option<PatternSet>,
}

/// Texts bundled with the binary. Each file holds the title, a blank line and
/// the text.
pub fn base_texts() -> Vec<TextRecord> {
    BASE_TEXT_DIR
        .files()
        .filter_map(|f| f.contents_utf8())
        .filter_map(|contents| {
            let (name, text) = contents.split_once("\n\n")?;
            let mut record = TextRecord::new(name.trim(), text.trim_end());
            record.base = true;
            Some(record)
        })
        .collect()
}

/// SQLite backed keystroke ledger and text store
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Store { conn })
    }

    pub fn save_text(&mut self, record: &TextRecord) -> Result<i64, StorageError> {
        let patterns = serde_json::to_string(&record.patterns)?;
        match record.id {
            Some(id) => {
                self.conn.execute(
                    r#"
                    INSERT OR REPLACE INTO texts (id, name, text, base, patterns, page_threshold)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![id, record.name, record.text, record.base, patterns, record.page_threshold as i64],
                )?;
                Ok(id)
            }
            None => {
                self.conn.execute(
                    r#"
                    INSERT INTO texts (name, text, base, patterns, page_threshold)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    params![record.name, record.text, record.base, patterns, record.page_threshold as i64],
                )?;
                let id = self.conn.last_insert_rowid();
                info!("saved text {:?} as {id}", record.name);
                Ok(id)
            }
        }
    }

    pub fn texts(&self) -> Result<Vec<TextRecord>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, text, base, patterns, page_threshold FROM texts ORDER BY id")?;
        let rows = stmt.query_map([], text_columns)?;
        let mut texts = Vec::new();
        for row in rows {
            texts.push(text_from_columns(row?)?);
        }
        Ok(texts)
    }

    pub fn text(&self, id: i64) -> Result<Option<TextRecord>, StorageError> {
        let columns = self
            .conn
            .query_row(
                "SELECT id, name, text, base, patterns, page_threshold FROM texts WHERE id = ?1",
                [id],
                text_columns,
            )
            .optional()?;
        columns.map(text_from_columns).transpose()
    }

    /// Apply `edit` to text `id`. Patterns are compiled first, so an invalid
    /// pattern leaves the stored text untouched.
    pub fn edit_text(&mut self, id: i64, edit: TextEdit) -> Result<TextRecord> {
        let mut record = self.text(id)?.ok_or(StorageError::UnknownText(id))?;
        if let Some(name) = edit.name {
            record.name = name;
        }
        if let Some(threshold) = edit.page_threshold {
            record.page_threshold = threshold;
        }
        if let Some(patterns) = edit.patterns {
            CompiledPatterns::compile(&patterns)?;
            record.patterns = patterns;
        }
        self.save_text(&record)?;
        info!("updated text {id}");
        Ok(record)
    }

    /// Insert the bundled texts into a database that has never seen them.
    /// Returns the ids of the inserted texts.
    pub fn seed_base_texts(&mut self) -> Result<Vec<i64>, StorageError> {
        let version: i64 = self.conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version >= SEEDED_VERSION {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for record in base_texts() {
            ids.push(self.save_text(&record)?);
        }
        self.conn
            .execute_batch(&format!("PRAGMA user_version = {SEEDED_VERSION}"))?;
        info!("seeded {} bundled texts", ids.len());
        Ok(ids)
    }

    pub fn remove_text(&mut self, id: i64) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM texts WHERE id = ?1", [id])?;
        Ok(())
    }
}

type TextColumns = (i64, String, String, bool, String, i64);

fn text_columns(row: &Row<'_>) -> rusqlite::Result<TextColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn text_from_columns((id, name, text, base, patterns, page_threshold): TextColumns) -> Result<TextRecord, StorageError> {
    Ok(TextRecord {
        id: Some(id),
        name,
        text,
        base,
        patterns: serde_json::from_str(&patterns)?,
        page_threshold: page_threshold.max(0) as usize,
    })
}

fn sequence_from_row(row: &Row<'_>) -> rusqlite::Result<Sequence> {
    let id: SequenceId = row.get(0)?;
    let start_time: String = row.get(1)?;
    let start_time = DateTime::parse_from_rfc3339(&start_time)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e)))?
        .with_timezone(&Local);
    Ok(Sequence {
        id,
        start_time,
        source_text_id: row.get(2)?,
        source_text_name: row.get(3)?,
    })
}

type EventColumns = (SequenceId, u32, String, String, i64);

fn event_columns(row: &Row<'_>) -> rusqlite::Result<EventColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn event_from_columns((sequence_id, sequence_number, expected, entered, delay_ms): EventColumns) -> Option<KeystrokeEvent> {
    let expected = expected.chars().next()?;
    let entered = Key::from_stored(&entered)?;
    Some(KeystrokeEvent {
        sequence_id,
        sequence_number,
        expected,
        entered,
        delay_ms: delay_ms.max(0) as u64,
    })
}

impl Ledger for Store {
    fn create_sequence(&mut self, sequence: &Sequence) -> Result<(), StorageError> {
        self.conn.execute(
            r#"
            INSERT INTO sequences (id, start_time, source_text_id, source_text_name)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                sequence.id,
                sequence.start_time.to_rfc3339(),
                sequence.source_text_id,
                sequence.source_text_name,
            ],
        )?;
        Ok(())
    }

    fn delete_sequence(&mut self, id: SequenceId) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM keypresses WHERE sequence_id = ?1", [id])?;
        tx.execute("DELETE FROM sequences WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    fn sequences(&self) -> Result<Vec<Sequence>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, source_text_id, source_text_name FROM sequences ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], sequence_from_row)?;
        let mut sequences = Vec::new();
        for row in rows {
            sequences.push(row?);
        }
        Ok(sequences)
    }

    fn sequence(&self, id: SequenceId) -> Result<Option<Sequence>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, start_time, source_text_id, source_text_name FROM sequences WHERE id = ?1",
                [id],
                sequence_from_row,
            )
            .optional()?)
    }

    fn append(&mut self, event: &KeystrokeEvent) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM sequences WHERE id = ?1)",
            [event.sequence_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::UnknownSequence(event.sequence_id));
        }
        let last: u32 = tx.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM keypresses WHERE sequence_id = ?1",
            [event.sequence_id],
            |row| row.get(0),
        )?;
        if event.sequence_number <= last {
            warn!(
                "rejecting keystroke {} for sequence {}, last stored is {last}",
                event.sequence_number, event.sequence_id
            );
            return Err(StorageError::OutOfOrder {
                sequence: event.sequence_id,
                number: event.sequence_number,
                last,
            });
        }
        tx.execute(
            r#"
            INSERT INTO keypresses (sequence_id, sequence_number, expected, entered, delay_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                event.sequence_id,
                event.sequence_number,
                event.expected.to_string(),
                event.entered.to_string(),
                event.delay_ms as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn read_all(&self, sequence: Option<SequenceId>) -> Result<Vec<KeystrokeEvent>, StorageError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT sequence_id, sequence_number, expected, entered, delay_ms
            FROM keypresses
            WHERE ?1 IS NULL OR sequence_id = ?1
            ORDER BY sequence_id, sequence_number
            "#,
        )?;
        let rows = stmt.query_map([sequence], event_columns)?;
        let mut events = Vec::new();
        for row in rows {
            let columns = row?;
            match event_from_columns(columns.clone()) {
                Some(event) => events.push(event),
                None => warn!("skipping unreadable keystroke row {columns:?}"),
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    fn event(sequence_id: SequenceId, n: u32, expected: char, entered: Key) -> KeystrokeEvent {
        KeystrokeEvent {
            sequence_id,
            sequence_number: n,
            expected,
            entered,
            delay_ms: 140,
        }
    }

    #[test]
    fn test_sequence_roundtrip() {
        let mut store = Store::open_in_memory().unwrap();
        let source = SourceText {
            id: 4,
            name: "Alice".to_string(),
        };
        let seq = Sequence::new(1_700_000_000_000, Some(&source));
        store.create_sequence(&seq).unwrap();

        let loaded = store.sequence(seq.id).unwrap().unwrap();
        assert_eq!(loaded.id, seq.id);
        assert_eq!(loaded.start_time.timestamp_millis(), seq.start_time.timestamp_millis());
        assert_eq!(loaded.source_text_id, Some(4));
        assert_eq!(loaded.source_text_name.as_deref(), Some("Alice"));
        assert!(store.sequence(42).unwrap().is_none());
    }

    #[test]
    fn test_append_and_read_events() {
        let mut store = Store::open_in_memory().unwrap();
        store.create_sequence(&Sequence::new(20, None)).unwrap();
        store.create_sequence(&Sequence::new(10, None)).unwrap();
        store.append(&event(20, 1, 'z', Key::Char('z'))).unwrap();
        store.append(&event(10, 1, 'a', Key::Char('s'))).unwrap();
        store.append(&event(10, 2, 'a', Key::Backspace)).unwrap();
        store.append(&event(10, 3, 'ї', Key::Char('ї'))).unwrap();

        let events = store.read_all(Some(10)).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].entered, Key::Char('s'));
        assert_eq!(events[1].entered, Key::Backspace);
        assert_eq!(events[2].expected, 'ї');
        assert_eq!(events[2].delay_ms, 140);

        let all = store.read_all(None).unwrap();
        assert_eq!(
            all.iter().map(|e| e.sequence_id).collect::<Vec<_>>(),
            vec![10, 10, 10, 20]
        );
        let ids: Vec<_> = store.sequences().unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![20, 10]);
    }

    #[test]
    fn test_append_rejects_out_of_order() {
        let mut store = Store::open_in_memory().unwrap();
        store.create_sequence(&Sequence::new(1, None)).unwrap();
        store.append(&event(1, 1, 'a', Key::Char('a'))).unwrap();
        assert_matches!(
            store.append(&event(1, 1, 'b', Key::Char('b'))),
            Err(StorageError::OutOfOrder { number: 1, last: 1, .. })
        );
        assert_matches!(
            store.append(&event(2, 1, 'b', Key::Char('b'))),
            Err(StorageError::UnknownSequence(2))
        );
        assert_eq!(store.read_all(None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_sequence_removes_events() {
        let mut store = Store::open_in_memory().unwrap();
        store.create_sequence(&Sequence::new(1, None)).unwrap();
        store.create_sequence(&Sequence::new(2, None)).unwrap();
        store.append(&event(1, 1, 'a', Key::Char('a'))).unwrap();
        store.append(&event(2, 1, 'b', Key::Char('b'))).unwrap();

        store.delete_sequence(1).unwrap();
        assert!(store.sequence(1).unwrap().is_none());
        assert!(store.read_all(Some(1)).unwrap().is_empty());
        assert_eq!(store.read_all(None).unwrap().len(), 1);
    }

    #[test]
    fn test_texts() {
        let mut store = Store::open_in_memory().unwrap();
        let mut record = TextRecord::new("Alice", "Alice was beginning to get very tired.");
        record.page_threshold = 120;
        let id = store.save_text(&record).unwrap();

        let loaded = store.text(id).unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.patterns, PatternSet::default());
        assert_eq!(loaded.page_threshold, 120);

        let mut renamed = loaded.clone();
        renamed.name = "Wonderland".to_string();
        assert_eq!(store.save_text(&renamed).unwrap(), id);
        assert_eq!(store.texts().unwrap().len(), 1);
        assert_eq!(store.text(id).unwrap().unwrap().name, "Wonderland");

        store.remove_text(id).unwrap();
        assert!(store.text(id).unwrap().is_none());
    }

    #[test]
    fn test_text_record_paginates_with_its_own_settings() {
        let mut record = TextRecord::new("Short", "One. Two. Three.");
        record.page_threshold = 3;
        let pagination = record.paginate(5).unwrap();
        assert_eq!(pagination.pages, vec!["One.", " Two.", " Three."]);
        assert_eq!(pagination.active_page, 1);
    }

    #[test]
    fn test_edit_text() {
        let mut store = Store::open_in_memory().unwrap();
        let id = store.save_text(&TextRecord::new("Alice", "Down. The. Hole.")).unwrap();
        let patterns = PatternSet {
            break_patterns: vec!["\\.".into()],
            ..PatternSet::default()
        };
        let edited = store
            .edit_text(
                id,
                TextEdit {
                    page_threshold: Some(2),
                    patterns: Some(patterns.clone()),
                    ..TextEdit::default()
                },
            )
            .unwrap();
        assert_eq!(edited.name, "Alice");

        let loaded = store.text(id).unwrap().unwrap();
        assert_eq!(loaded.page_threshold, 2);
        assert_eq!(loaded.patterns, patterns);
        assert_eq!(loaded.paginate(0).unwrap().page_count(), 3);
        assert_eq!(store.texts().unwrap().len(), 1);
    }

    #[test]
    fn test_edit_text_rejects_invalid_pattern() {
        let mut store = Store::open_in_memory().unwrap();
        let id = store.save_text(&TextRecord::new("Alice", "text")).unwrap();
        let bad = PatternSet {
            ignore_patterns: vec!["(?<= ".into()],
            ..PatternSet::default()
        };
        let edit = TextEdit {
            page_threshold: Some(5),
            patterns: Some(bad),
            ..TextEdit::default()
        };
        assert_matches!(
            store.edit_text(id, edit),
            Err(Error::Pattern(PatternError::Syntax { ref pattern, .. })) if pattern == "(?<= "
        );
        let loaded = store.text(id).unwrap().unwrap();
        assert_eq!(loaded.page_threshold, DEFAULT_PAGE_THRESHOLD);
        assert_eq!(loaded.patterns, PatternSet::default());

        assert_matches!(
            store.edit_text(99, TextEdit::default()),
            Err(Error::Storage(StorageError::UnknownText(99)))
        );
    }

    #[test]
    fn test_seed_base_texts_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keytrace.db");
        let ids = {
            let mut store = Store::open(&path).unwrap();
            store.seed_base_texts().unwrap()
        };
        assert_eq!(ids.len(), base_texts().len());
        assert!(!ids.is_empty());

        let mut store = Store::open(&path).unwrap();
        let alice = store.text(ids[0]).unwrap().unwrap();
        assert!(alice.base);
        assert_eq!(alice.name, "Alice's Adventures in Wonderland");
        assert!(alice.text.starts_with("Alice was beginning"));

        // removing a bundled text does not bring it back
        store.remove_text(ids[0]).unwrap();
        assert!(store.seed_base_texts().unwrap().is_empty());
        assert_eq!(store.texts().unwrap().len(), ids.len() - 1);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("keytrace.db");
        {
            let mut store = Store::open(&path).unwrap();
            store.create_sequence(&Sequence::new(1, None)).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.sequences().unwrap().len(), 1);
    }
}
