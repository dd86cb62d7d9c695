//! A1-notation helpers: column letters, quoted tab ranges, and the `Column`
//! newtype used by configuration to name a spreadsheet column by letter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 0 -> A, 25 -> Z, 26 -> AA, 27 -> AB.
pub fn column_letter(index: usize) -> String {
    let mut out = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Inverse of [`column_letter`]. Accepts lower-case letters; rejects anything
/// that is not purely alphabetic.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut col: usize = 0;
    for ch in letters.chars() {
        let ch = ch.to_ascii_uppercase();
        if !ch.is_ascii_uppercase() {
            return None;
        }
        let v = (ch as u8 - b'A' + 1) as usize;
        col = col.checked_mul(26)?.checked_add(v)?;
    }
    Some(col - 1)
}

/// Quote a tab title for use in a range reference, doubling embedded quotes.
pub fn quote_tab(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

/// `'Tab'!A1:R70`
pub fn tab_range(tab: &str, a1: &str) -> String {
    format!("{}!{}", quote_tab(tab), a1)
}

/// A single cell reference such as `C12` (row is 1-based).
pub fn cell_ref(column: usize, row: u32) -> String {
    format!("{}{}", column_letter(column), row)
}

/// Split `'Tab'!A1:B2` into the unquoted tab title and the cell part.
pub fn split_range(range: &str) -> Option<(String, &str)> {
    let (tab, cells) = range.rsplit_once('!')?;
    let tab = match tab.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => tab.to_string(),
    };
    Some((tab, cells))
}

/// `C12` -> `(2, 12)`. Both a column and a row are required.
pub fn parse_cell(a1: &str) -> Option<(usize, u32)> {
    let a1 = a1.trim();
    let split = a1.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = a1.split_at(split);
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((column_index(letters)?, row))
}

/// `A3:R9` -> both corners; a single cell is its own end.
pub fn parse_cells(cells: &str) -> Option<((usize, u32), (usize, u32))> {
    match cells.split_once(':') {
        Some((start, end)) => Some((parse_cell(start)?, parse_cell(end)?)),
        None => {
            let cell = parse_cell(cells)?;
            Some((cell, cell))
        }
    }
}

/// A spreadsheet column, stored as a 0-based index and written as a letter in
/// configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Column(usize);

impl Column {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn letter(self) -> String {
        column_letter(self.0)
    }
}

impl TryFrom<String> for Column {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        column_index(value.trim())
            .map(Column)
            .ok_or_else(|| format!("invalid column letter '{value}'"))
    }
}

impl From<Column> for String {
    fn from(c: Column) -> Self {
        c.letter()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.letter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_follow_base26_without_zero() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(6), "G");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn index_inverts_letter() {
        for i in [0usize, 12, 25, 26, 51, 52, 701, 702, 16383] {
            assert_eq!(column_index(&column_letter(i)), Some(i));
        }
        assert_eq!(column_index("m"), Some(12));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn tab_names_are_quoted() {
        assert_eq!(tab_range("Setup", "A1:R70"), "'Setup'!A1:R70");
        assert_eq!(quote_tab("Bob's"), "'Bob''s'");
        assert_eq!(cell_ref(2, 14), "C14");
    }

    #[test]
    fn ranges_split_and_parse() {
        let (tab, cells) = split_range("'Bob''s'!A3:R9").unwrap();
        assert_eq!(tab, "Bob's");
        assert_eq!(parse_cells(cells), Some(((0, 3), (17, 9))));
        assert_eq!(split_range("Setup!A2").map(|(t, _)| t), Some("Setup".to_string()));
        assert_eq!(parse_cells("A2"), Some(((0, 2), (0, 2))));
        assert_eq!(parse_cell("A0"), None);
        assert_eq!(parse_cell("12"), None);
        assert_eq!(split_range("A1:B2"), None);
    }

    #[test]
    fn column_deserializes_from_letter() {
        let c: Column = serde_yaml::from_str("\"P\"").unwrap();
        assert_eq!(c.index(), 15);
        assert_eq!(serde_yaml::to_string(&c).unwrap().trim(), "P");
        assert!(serde_yaml::from_str::<Column>("\"7\"").is_err());
    }
}
