use include_dir::{include_dir, Dir};
use std::collections::HashMap;
use std::sync::OnceLock;

static LAYOUT_DIR: Dir = include_dir!("src/layouts");

/// One physical key and every character it produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub chars: Vec<char>,
    pub row: usize,
    pub col: usize,
}

/// Physical keyboard grid, parsed from a layout description where each line is
/// a row and each whitespace separated token lists the characters of one key.
#[derive(Debug, Clone)]
pub struct KeyboardLayout {
    rows: Vec<Vec<Key>>,
    // char -> (row, col)
    positions: HashMap<char, (usize, usize)>,
}

impl KeyboardLayout {
    pub fn parse(description: &str) -> Self {
        let rows: Vec<Vec<Key>> = description
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(row, line)| {
                line.split_whitespace()
                    .enumerate()
                    .map(|(col, token)| Key {
                        chars: token.chars().collect(),
                        row,
                        col,
                    })
                    .collect()
            })
            .collect();

        let positions = rows
            .iter()
            .flatten()
            .flat_map(|key| key.chars.iter().map(move |&c| (c, (key.row, key.col))))
            .collect();

        Self { rows, positions }
    }

    /// The built-in US QWERTY layout, parsed on first use.
    pub fn us() -> &'static KeyboardLayout {
        static US: OnceLock<KeyboardLayout> = OnceLock::new();
        US.get_or_init(|| {
            let description = LAYOUT_DIR
                .get_file("us.txt")
                .and_then(|f| f.contents_utf8())
                .unwrap_or_default();
            KeyboardLayout::parse(description)
        })
    }

    pub fn rows(&self) -> &[Vec<Key>] {
        &self.rows
    }

    /// Key producing `c`. Letters are looked up case-insensitively.
    pub fn key(&self, c: char) -> Option<&Key> {
        let (row, col) = self.position(c)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    fn position(&self, c: char) -> Option<(usize, usize)> {
        self.positions.get(&c).copied().or_else(|| {
            let lower = c.to_lowercase().next()?;
            self.positions.get(&lower).copied()
        })
    }

    /// True when the keys of `a` and `b` are within one row and one column of
    /// each other. Characters sharing a key count as neighbours.
    pub fn are_neighbors(&self, a: char, b: char) -> bool {
        match (self.position(a), self.position(b)) {
            (Some((ra, ca)), Some((rb, cb))) => ra.abs_diff(rb) <= 1 && ca.abs_diff(cb) <= 1,
            _ => false,
        }
    }
}

/// Neighbour check against the built-in layout
pub fn are_neighbors(a: char, b: char) -> bool {
    KeyboardLayout::us().are_neighbors(a, b)
}
