//! A1 notation for spreadsheet ranges, e.g. `Summary!A1:E` or `'Money In'!B2:C10`.

use crate::error::{tagged, ErrorType, Res};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A parsed A1 range. Rows and columns are 0-indexed internally. A missing end row or end column
/// means the range is unbounded in that direction.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct A1Range {
    sheet: String,
    start_col: usize,
    start_row: usize,
    end_col: Option<usize>,
    end_row: Option<usize>,
}

impl A1Range {
    /// Columns `first_col..=last_col` (0-indexed) of `sheet`, from row 1 down without limit.
    pub fn columns(sheet: impl Into<String>, first_col: usize, last_col: usize) -> Self {
        Self {
            sheet: sheet.into(),
            start_col: first_col,
            start_row: 0,
            end_col: Some(last_col.max(first_col)),
            end_row: None,
        }
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn start(&self) -> (usize, usize) {
        (self.start_row, self.start_col)
    }

    pub fn end_col(&self) -> Option<usize> {
        self.end_col
    }

    pub fn end_row(&self) -> Option<usize> {
        self.end_row
    }

    /// Whether the 0-indexed cell `(row, col)` is inside this range.
    pub(crate) fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.start_row
            && col >= self.start_col
            && self.end_row.map_or(true, |end| row <= end)
            && self.end_col.map_or(true, |end| col <= end)
    }

    /// Number of columns in the range, if bounded.
    pub fn width(&self) -> Option<usize> {
        self.end_col.map(|end| end + 1 - self.start_col)
    }

    /// Whether the two ranges share at least one cell.
    pub fn overlaps(&self, other: &A1Range) -> bool {
        fn intersects(a: (usize, Option<usize>), b: (usize, Option<usize>)) -> bool {
            a.1.map_or(true, |end| b.0 <= end) && b.1.map_or(true, |end| a.0 <= end)
        }
        self.sheet == other.sheet
            && intersects(
                (self.start_row, self.end_row),
                (other.start_row, other.end_row),
            )
            && intersects(
                (self.start_col, self.end_col),
                (other.start_col, other.end_col),
            )
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            write!(f, "{}", self.sheet)?;
        } else {
            write!(f, "'{}'", self.sheet.replace('\'', "''"))?;
        }
        write!(
            f,
            "!{}{}",
            column_letters(self.start_col),
            self.start_row + 1
        )?;
        match (self.end_col, self.end_row) {
            (Some(col), Some(row)) => write!(f, ":{}{}", column_letters(col), row + 1),
            (Some(col), None) => write!(f, ":{}", column_letters(col)),
            (None, Some(row)) => write!(f, ":{}", row + 1),
            (None, None) => Ok(()),
        }
    }
}

impl FromStr for A1Range {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Res<Self> {
        let s = s.trim();
        let invalid = |why: &str| tagged(ErrorType::Config, format!("Invalid range '{s}': {why}"));

        let (sheet, cells) = split_sheet(s).ok_or_else(|| invalid("expected 'Sheet!A1:B'"))?;
        if sheet.is_empty() {
            return Err(invalid("the sheet name is empty"));
        }

        let (first, second) = match cells.split_once(':') {
            Some((a, b)) => (a, Some(b)),
            None => (cells, None),
        };

        let (start_col, start_row) = parse_cell(first).ok_or_else(|| invalid("bad start cell"))?;
        let start_col = start_col.ok_or_else(|| invalid("the start cell needs a column"))?;
        let start_row = start_row.unwrap_or(0);

        let (end_col, end_row) = match second {
            Some(cell) => parse_cell(cell).ok_or_else(|| invalid("bad end cell"))?,
            // A single cell, e.g. `Sheet!B2`.
            None if first.chars().any(|c| c.is_ascii_digit()) => (Some(start_col), Some(start_row)),
            // A whole column, e.g. `Sheet!B`.
            None => (Some(start_col), None),
        };

        if end_col.is_some_and(|c| c < start_col) || end_row.is_some_and(|r| r < start_row) {
            return Err(invalid("the end cell comes before the start cell"));
        }

        Ok(Self {
            sheet: sheet.to_string(),
            start_col,
            start_row,
            end_col,
            end_row,
        })
    }
}

impl Serialize for A1Range {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for A1Range {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        A1Range::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Splits `Sheet!A1:B` into the unquoted sheet name and the cell part.
fn split_sheet(s: &str) -> Option<(String, &str)> {
    if let Some(rest) = s.strip_prefix('\'') {
        // Quoted names escape a single quote by doubling it.
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((ix, c)) = chars.next() {
            if c == '\'' {
                if chars.peek().map(|(_, n)| *n) == Some('\'') {
                    name.push('\'');
                    chars.next();
                    continue;
                }
                let after = &rest[ix + 1..];
                return after.strip_prefix('!').map(|cells| (name, cells));
            }
            name.push(c);
        }
        None
    } else {
        s.split_once('!').map(|(sheet, cells)| (sheet.to_string(), cells))
    }
}

/// Parses `B12`, `B` or `12` into (column, row), both 0-indexed.
fn parse_cell(s: &str) -> Option<(Option<usize>, Option<usize>)> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let split = s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len());
    let (letters, digits) = s.split_at(split);

    let col = if letters.is_empty() {
        None
    } else {
        Some(column_index(letters)?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        let row: usize = digits.parse().ok()?;
        Some(row.checked_sub(1)?)
    };
    Some((col, row))
}

/// `A` -> 0, `Z` -> 25, `AA` -> 26.
fn column_index(letters: &str) -> Option<usize> {
    let mut index = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let value = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index.checked_mul(26)?.checked_add(value)?;
    }
    index.checked_sub(1)
}

/// 0 -> `A`, 25 -> `Z`, 26 -> `AA`.
pub(crate) fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_index("ZZ"), Some(701));
        assert_eq!(column_index("aa"), Some(26));
    }

    #[test]
    fn test_parse_open_ended() {
        let r: A1Range = "Summary!A1:E".parse().unwrap();
        assert_eq!(r.sheet(), "Summary");
        assert_eq!(r.start(), (0, 0));
        assert_eq!(r.end_col(), Some(4));
        assert_eq!(r.end_row(), None);
        assert_eq!(r.width(), Some(5));
        assert_eq!(r.to_string(), "Summary!A1:E");
        assert!(r.contains(10_000, 4));
        assert!(!r.contains(0, 5));
    }

    #[test]
    fn test_parse_columns_only() {
        let r: A1Range = "Transactions!A:E".parse().unwrap();
        assert_eq!(r.start(), (0, 0));
        assert_eq!(r.end_col(), Some(4));
        assert_eq!(r.to_string(), "Transactions!A1:E");
    }

    #[test]
    fn test_parse_bounded_and_quoted() {
        let r: A1Range = "'Money In'!B2:C10".parse().unwrap();
        assert_eq!(r.sheet(), "Money In");
        assert_eq!(r.start(), (1, 1));
        assert_eq!(r.end_row(), Some(9));
        assert_eq!(r.to_string(), "'Money In'!B2:C10");
        assert!(r.contains(9, 2));
        assert!(!r.contains(10, 2));
        assert!(!r.contains(0, 1));
    }

    #[test]
    fn test_parse_single_cell() {
        let r: A1Range = "Metrics!B2".parse().unwrap();
        assert!(r.contains(1, 1));
        assert!(!r.contains(2, 1));
    }

    #[test]
    fn test_parse_quote_escape() {
        let r: A1Range = "'Bob''s'!A1:B".parse().unwrap();
        assert_eq!(r.sheet(), "Bob's");
        assert_eq!(r.to_string(), "'Bob''s'!A1:B");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("Summary".parse::<A1Range>().is_err());
        assert!("!A1:B".parse::<A1Range>().is_err());
        assert!("Summary!1:2".parse::<A1Range>().is_err());
        assert!("Summary!C1:A".parse::<A1Range>().is_err());
        assert!("Summary!A0".parse::<A1Range>().is_err());
        assert!("Summary!A1:".parse::<A1Range>().is_err());
    }

    #[test]
    fn test_overlaps() {
        let txns: A1Range = "Data!A1:E".parse().unwrap();
        let beside: A1Range = "Data!G1:K".parse().unwrap();
        let inside: A1Range = "Data!C5:D6".parse().unwrap();
        let other_tab: A1Range = "Summary!A1:E".parse().unwrap();
        assert!(!txns.overlaps(&beside));
        assert!(txns.overlaps(&inside));
        assert!(inside.overlaps(&txns));
        assert!(!txns.overlaps(&other_tab));
        assert_eq!(A1Range::columns("Data", 6, 10), beside);
    }

    #[test]
    fn test_serde() {
        let r: A1Range = serde_json::from_str(r#""Summary!A1:E""#).unwrap();
        assert_eq!(serde_json::to_string(&r).unwrap(), r#""Summary!A1:E""#);
        assert!(serde_json::from_str::<A1Range>(r#""nope""#).is_err());
    }
}
