//! The version tracker block at the bottom of the Setup tab.
//!
//! Each tracker row is `active | sheet name | created | items | locations |
//! status` in columns A-F. Rows are never cleared: a deleted version keeps
//! its row with status `Deleted`, which keeps its name out of circulation.

use crate::a1::tab_range;
use crate::cell::{cell_at, CellValue, Row};
use crate::config::TrackerConfig;
use crate::error::{Result, TakeoffError};
use crate::sheets::ValueRange;
use serde::{Deserialize, Serialize};

pub const DELETED_STATUS: &str = "Deleted";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerEntry {
    pub row: u32,
    pub active: bool,
    pub sheet_name: String,
    /// `YYYY-MM-DD`
    pub created: String,
    pub items_count: u32,
    pub locations_count: u32,
    pub status: String,
}

impl TrackerEntry {
    pub fn is_deleted(&self) -> bool {
        self.status.eq_ignore_ascii_case(DELETED_STATUS)
    }

    fn to_row(&self) -> Row {
        vec![
            CellValue::Bool(self.active),
            CellValue::text(&self.sheet_name),
            CellValue::text(&self.created),
            CellValue::Number(self.items_count as f64),
            CellValue::Number(self.locations_count as f64),
            CellValue::text(&self.status),
        ]
    }
}

/// Fields of a tracker row about to be appended.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub sheet_name: String,
    pub created: String,
    pub items_count: u32,
    pub locations_count: u32,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct Tracker {
    tab: String,
    first_row: u32,
    capacity: u32,
    entries: Vec<TrackerEntry>,
}

impl Tracker {
    /// The A1 range holding the tracker, e.g. `'Setup'!A74:F80`.
    pub fn range(tab: &str, cfg: &TrackerConfig) -> String {
        tab_range(tab, &format!("A{}:F{}", cfg.first_row, cfg.last_row()))
    }

    /// Parse the grid read from [`Tracker::range`]. Rows with no sheet name
    /// are free slots.
    pub fn parse(tab: &str, cfg: &TrackerConfig, grid: &[Row]) -> Self {
        let entries = grid
            .iter()
            .take(cfg.capacity as usize)
            .enumerate()
            .filter_map(|(i, cells)| {
                let sheet_name = cell_at(cells, 1).as_text();
                if sheet_name.is_empty() {
                    return None;
                }
                Some(TrackerEntry {
                    row: cfg.first_row + i as u32,
                    active: cell_at(cells, 0).is_truthy(),
                    sheet_name,
                    created: cell_at(cells, 2).as_text(),
                    items_count: cell_at(cells, 3).as_u32(),
                    locations_count: cell_at(cells, 4).as_u32(),
                    status: cell_at(cells, 5).as_text(),
                })
            })
            .collect();
        Self {
            tab: tab.to_string(),
            first_row: cfg.first_row,
            capacity: cfg.capacity,
            entries,
        }
    }

    pub fn entries(&self) -> &[TrackerEntry] {
        &self.entries
    }

    /// Every name the tracker has ever recorded, deleted versions included.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.sheet_name.clone()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&TrackerEntry> {
        self.entries
            .iter()
            .find(|e| e.sheet_name.eq_ignore_ascii_case(name))
    }

    pub fn active(&self) -> Option<&TrackerEntry> {
        self.entries.iter().find(|e| e.active)
    }

    pub fn next_free_row(&self) -> Option<u32> {
        (self.first_row..self.first_row + self.capacity)
            .find(|row| self.entries.iter().all(|e| e.row != *row))
    }

    pub fn ensure_capacity(&self) -> Result<u32> {
        self.next_free_row().ok_or(TakeoffError::TrackerFull {
            capacity: self.capacity,
        })
    }

    fn active_cell(&self, row: u32, on: bool) -> ValueRange {
        ValueRange::cell(tab_range(&self.tab, &format!("A{row}")), CellValue::Bool(on))
    }

    fn deactivate_others(&self, keep: Option<u32>) -> Vec<ValueRange> {
        self.entries
            .iter()
            .filter(|e| e.active && Some(e.row) != keep)
            .map(|e| self.active_cell(e.row, false))
            .collect()
    }

    fn require(&self, name: &str) -> Result<&TrackerEntry> {
        self.find(name)
            .ok_or_else(|| TakeoffError::VersionNotFound(name.to_string()))
    }

    /// Writes that append `entry` as the active version and clear the active
    /// flag elsewhere.
    pub fn plan_append(&self, entry: NewEntry) -> Result<(TrackerEntry, Vec<ValueRange>)> {
        let row = self.ensure_capacity()?;
        let entry = TrackerEntry {
            row,
            active: true,
            sheet_name: entry.sheet_name,
            created: entry.created,
            items_count: entry.items_count,
            locations_count: entry.locations_count,
            status: entry.status,
        };
        let mut writes = self.deactivate_others(None);
        writes.push(ValueRange::row(
            tab_range(&self.tab, &format!("A{row}:F{row}")),
            entry.to_row(),
        ));
        Ok((entry, writes))
    }

    pub fn plan_set_active(&self, name: &str) -> Result<Vec<ValueRange>> {
        let target = self.require(name)?;
        if target.is_deleted() {
            return Err(TakeoffError::Invalid(format!(
                "version '{}' has been deleted",
                target.sheet_name
            )));
        }
        let mut writes = self.deactivate_others(Some(target.row));
        if !target.active {
            writes.push(self.active_cell(target.row, true));
        }
        Ok(writes)
    }

    pub fn plan_status(&self, name: &str, status: &str) -> Result<Vec<ValueRange>> {
        if status.trim().is_empty() {
            return Err(TakeoffError::Invalid("status must not be empty".to_string()));
        }
        let target = self.require(name)?;
        Ok(vec![ValueRange::cell(
            tab_range(&self.tab, &format!("F{}", target.row)),
            CellValue::text(status.trim()),
        )])
    }

    /// Mark a version deleted and inactive; its row and name stay.
    pub fn plan_retire(&self, name: &str) -> Result<Vec<ValueRange>> {
        let target = self.require(name)?;
        Ok(vec![
            self.active_cell(target.row, false),
            ValueRange::cell(
                tab_range(&self.tab, &format!("F{}", target.row)),
                CellValue::text(DELETED_STATUS),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_row(active: bool, name: &str, status: &str) -> Row {
        vec![
            CellValue::Bool(active),
            CellValue::text(name),
            CellValue::text("2026-01-10"),
            CellValue::Number(12.0),
            CellValue::Number(3.0),
            CellValue::text(status),
        ]
    }

    fn sample() -> Tracker {
        let grid = vec![
            tracker_row(false, "01-10-2026", "Deleted"),
            tracker_row(true, "01-12-2026", "In Progress"),
            vec![],
        ];
        Tracker::parse("Setup", &TrackerConfig::default(), &grid)
    }

    #[test]
    fn parses_entries_and_rows() {
        let t = sample();
        assert_eq!(t.entries().len(), 2);
        assert_eq!(t.entries()[1].row, 75);
        assert_eq!(t.entries()[1].items_count, 12);
        assert_eq!(t.active().map(|e| e.sheet_name.as_str()), Some("01-12-2026"));
        assert_eq!(t.names(), vec!["01-10-2026", "01-12-2026"]);
        assert!(t.find("01-10-2026").unwrap().is_deleted());
        assert_eq!(
            Tracker::range("Setup", &TrackerConfig::default()),
            "'Setup'!A74:F80"
        );
    }

    #[test]
    fn append_uses_first_free_row_and_moves_active_flag() {
        let (entry, writes) = sample()
            .plan_append(NewEntry {
                sheet_name: "01-15-2026".into(),
                created: "2026-01-15".into(),
                items_count: 4,
                locations_count: 2,
                status: "In Progress".into(),
            })
            .unwrap();
        assert_eq!(entry.row, 76);
        assert!(entry.active);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].range, "'Setup'!A75");
        assert_eq!(writes[0].values, vec![vec![CellValue::Bool(false)]]);
        assert_eq!(writes[1].range, "'Setup'!A76:F76");
        assert_eq!(writes[1].values[0][1], CellValue::text("01-15-2026"));
    }

    #[test]
    fn full_tracker_refuses_append() {
        let cfg = TrackerConfig {
            first_row: 74,
            capacity: 2,
        };
        let grid = vec![tracker_row(false, "a", ""), tracker_row(true, "b", "")];
        let t = Tracker::parse("Setup", &cfg, &grid);
        assert!(matches!(
            t.ensure_capacity(),
            Err(TakeoffError::TrackerFull { capacity: 2 })
        ));
    }

    #[test]
    fn gaps_are_reused() {
        let grid = vec![vec![], tracker_row(true, "01-12-2026", "")];
        let t = Tracker::parse("Setup", &TrackerConfig::default(), &grid);
        assert_eq!(t.next_free_row(), Some(74));
    }

    #[test]
    fn set_active_leaves_exactly_one() {
        let grid = vec![
            tracker_row(true, "a", ""),
            tracker_row(false, "b", ""),
            tracker_row(true, "c", ""),
        ];
        let t = Tracker::parse("Setup", &TrackerConfig::default(), &grid);
        let writes = t.plan_set_active("B").unwrap();
        let ranges: Vec<_> = writes.iter().map(|w| w.range.as_str()).collect();
        assert_eq!(ranges, vec!["'Setup'!A74", "'Setup'!A76", "'Setup'!A75"]);
        assert_eq!(writes[2].values[0][0], CellValue::Bool(true));
    }

    #[test]
    fn deleted_versions_cannot_be_activated() {
        assert!(matches!(
            sample().plan_set_active("01-10-2026"),
            Err(TakeoffError::Invalid(_))
        ));
        assert!(matches!(
            sample().plan_set_active("nope"),
            Err(TakeoffError::VersionNotFound(_))
        ));
    }

    #[test]
    fn retire_keeps_the_row() {
        let writes = sample().plan_retire("01-12-2026").unwrap();
        assert_eq!(writes[0].range, "'Setup'!A75");
        assert_eq!(writes[1].range, "'Setup'!F75");
        assert_eq!(writes[1].values[0][0], CellValue::text("Deleted"));
    }

    #[test]
    fn status_update_targets_column_f() {
        let writes = sample().plan_status("01-12-2026", " Final ").unwrap();
        assert_eq!(writes[0].range, "'Setup'!F75");
        assert_eq!(writes[0].values[0][0], CellValue::text("Final"));
        assert!(sample().plan_status("01-12-2026", "").is_err());
    }
}
