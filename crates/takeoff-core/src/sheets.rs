use crate::cell::{CellValue, Grid, Row};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One tab (sheet) of a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i64,
    pub title: String,
    pub index: u32,
}

/// A block of values to write, anchored at the top-left of `range`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub range: String,
    pub values: Grid,
}

impl ValueRange {
    pub fn cell(range: impl Into<String>, value: CellValue) -> Self {
        Self {
            range: range.into(),
            values: vec![vec![value]],
        }
    }

    pub fn row(range: impl Into<String>, cells: Row) -> Self {
        Self {
            range: range.into(),
            values: vec![cells],
        }
    }
}

/// Case-insensitive tab lookup by title.
pub fn find_tab<'a>(tabs: &'a [TabInfo], title: &str) -> Option<&'a TabInfo> {
    tabs.iter().find(|t| t.title.eq_ignore_ascii_case(title))
}

pub fn tab_titles(tabs: &[TabInfo]) -> Vec<String> {
    tabs.iter().map(|t| t.title.clone()).collect()
}

pub fn spreadsheet_url(spreadsheet_id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{spreadsheet_id}/edit")
}

/// The spreadsheet operations the engine needs. Rows are 1-based sheet rows;
/// columns are 0-based indices.
#[async_trait]
pub trait SpreadsheetService: Send + Sync {
    async fn list_tabs(&self, spreadsheet_id: &str) -> Result<Vec<TabInfo>>;

    /// Values as stored (checkboxes as booleans, numbers unformatted).
    async fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Grid>;

    /// Formulas where present, values elsewhere.
    async fn read_formulas(&self, spreadsheet_id: &str, range: &str) -> Result<Grid>;

    /// Copy a tab within the same spreadsheet, returning the new tab.
    async fn duplicate_tab(&self, spreadsheet_id: &str, source_tab_id: i64) -> Result<TabInfo>;

    async fn rename_tab(&self, spreadsheet_id: &str, tab_id: i64, title: &str) -> Result<()>;

    async fn write_ranges(&self, spreadsheet_id: &str, data: &[ValueRange]) -> Result<()>;

    async fn hide_rows(&self, spreadsheet_id: &str, tab_id: i64, rows: &[u32]) -> Result<()>;

    async fn hide_columns(&self, spreadsheet_id: &str, tab_id: i64, columns: &[usize])
        -> Result<()>;

    async fn delete_tab(&self, spreadsheet_id: &str, tab_id: i64) -> Result<()>;
}

/// Collapse sorted 0- or 1-based positions into half-open `[start, end)`
/// runs so one hide request covers each contiguous block.
pub fn contiguous_runs(mut positions: Vec<usize>) -> Vec<(usize, usize)> {
    positions.sort_unstable();
    positions.dedup();
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for p in positions {
        match runs.last_mut() {
            Some((_, end)) if *end == p => *end = p + 1,
            _ => runs.push((p, p + 1)),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_merge_adjacent_positions() {
        assert_eq!(contiguous_runs(vec![5, 3, 4, 9, 10, 1]), vec![(1, 2), (3, 6), (9, 11)]);
        assert!(contiguous_runs(vec![]).is_empty());
        assert_eq!(contiguous_runs(vec![2, 2]), vec![(2, 3)]);
    }

    #[test]
    fn tab_lookup_ignores_case() {
        let tabs = vec![
            TabInfo { id: 0, title: "Setup".into(), index: 0 },
            TabInfo { id: 7, title: "DATE".into(), index: 1 },
        ];
        assert_eq!(find_tab(&tabs, "date").map(|t| t.id), Some(7));
        assert!(find_tab(&tabs, "Library").is_none());
    }
}
