//! Toggle state: which locations each scope item is enabled for.

use crate::cell::{cell_at, CellValue, Row};
use crate::config::SetupColumns;
use crate::layout::{LocationColumn, Section};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeItemRow {
    /// 1-based sheet row.
    pub row: u32,
    pub item_id: String,
    pub section: String,
    pub scope: String,
    pub unit_cost: CellValue,
    pub r_value: CellValue,
    pub thickness: CellValue,
    pub material_type: CellValue,
    pub uom: String,
    pub bid_type: CellValue,
    pub tool_name: String,
    /// Aligned to the owning section's location columns.
    pub toggles: Vec<bool>,
    pub has_any_toggle: bool,
}

impl ScopeItemRow {
    pub fn on_count(&self) -> usize {
        self.toggles.iter().filter(|t| **t).count()
    }

    /// Location columns of `section` this item is toggled on for.
    pub fn active_locations<'a>(
        &'a self,
        section: &'a Section,
    ) -> impl Iterator<Item = &'a LocationColumn> + 'a {
        section
            .locations
            .iter()
            .zip(self.toggles.iter())
            .filter(|(_, on)| **on)
            .map(|(loc, _)| loc)
    }
}

/// One toggle per location column; cells past the end of a short row are off.
pub fn read_toggles(row: &[CellValue], locations: &[LocationColumn]) -> Vec<bool> {
    locations
        .iter()
        .map(|loc| cell_at(row, loc.index).is_truthy())
        .collect()
}

fn matches_prefix(item_id: &str, prefix: Option<&str>) -> bool {
    match prefix {
        Some(p) if !p.is_empty() => item_id.to_uppercase().starts_with(&p.to_uppercase()),
        _ => true,
    }
}

/// Read the item rows of one section.
///
/// `body` holds consecutive sheet rows starting at `first_row`. Rows without
/// an item id, or whose id lacks `prefix`, are bundle/total/spacer rows and
/// are skipped. Rows past `section.last_row` are ignored.
pub fn read_section_items(
    section: &Section,
    body: &[Row],
    first_row: u32,
    columns: &SetupColumns,
    prefix: Option<&str>,
) -> Vec<ScopeItemRow> {
    body.iter()
        .enumerate()
        .map(|(i, cells)| (first_row + i as u32, cells))
        .filter(|(row, _)| section.contains_row(*row))
        .filter_map(|(row, cells)| {
            let item_id = cell_at(cells, columns.item_id.index()).as_text();
            if item_id.is_empty() || !matches_prefix(&item_id, prefix) {
                return None;
            }
            let toggles = read_toggles(cells, &section.locations);
            let has_any_toggle = toggles.iter().any(|t| *t);
            let get = |c: crate::a1::Column| cell_at(cells, c.index()).clone();
            Some(ScopeItemRow {
                row,
                item_id,
                section: section.id.clone(),
                scope: cell_at(cells, columns.scope.index()).as_text(),
                unit_cost: get(columns.unit_cost),
                r_value: get(columns.r_value),
                thickness: get(columns.thickness),
                material_type: get(columns.material_type),
                uom: cell_at(cells, columns.uom.index()).as_text(),
                bid_type: get(columns.bid_type),
                tool_name: cell_at(cells, columns.tool_name.index()).as_text(),
                toggles,
                has_any_toggle,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a1::column_letter;

    fn section(locs: &[(usize, &str)]) -> Section {
        Section::new("ROOFING", 3, 10).with_locations(
            locs.iter()
                .map(|(i, n)| LocationColumn {
                    index: *i,
                    letter: column_letter(*i),
                    name: n.to_string(),
                })
                .collect(),
        )
    }

    fn item(id: &str, toggles: &[CellValue]) -> Row {
        let mut row = vec![
            CellValue::text(id),
            CellValue::Number(4.5),
            CellValue::text("Vapor Barrier"),
            CellValue::Empty,
            CellValue::Empty,
            CellValue::text("PVC"),
        ];
        row.extend_from_slice(toggles);
        row
    }

    #[test]
    fn reads_items_and_toggles() {
        let sec = section(&[(6, "FL1"), (7, "FL2"), (8, "ROOF")]);
        let body = vec![
            item("MR-001VB", &[CellValue::Bool(true), CellValue::text("FALSE"), CellValue::text("x")]),
            item("MR-002", &[CellValue::Empty, CellValue::Number(0.0)]),
            vec![CellValue::text("BUNDLE TOTAL")],
            vec![],
        ];
        let rows = read_section_items(&sec, &body, 4, &SetupColumns::default(), Some("MR-"));
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!((first.row, first.item_id.as_str()), (4, "MR-001VB"));
        assert_eq!(first.scope, "Vapor Barrier");
        assert_eq!(first.unit_cost, CellValue::Number(4.5));
        assert_eq!(first.toggles, vec![true, false, true]);
        assert!(first.has_any_toggle);
        assert_eq!(
            first.active_locations(&sec).map(|l| l.name.as_str()).collect::<Vec<_>>(),
            vec!["FL1", "ROOF"]
        );

        let second = &rows[1];
        assert_eq!(second.row, 5);
        assert_eq!(second.toggles, vec![false, false, false]);
        assert!(!second.has_any_toggle);
    }

    #[test]
    fn short_rows_pad_off() {
        let locs = vec![LocationColumn {
            index: 12,
            letter: "M".into(),
            name: "Rear".into(),
        }];
        assert_eq!(read_toggles(&[CellValue::Bool(true)], &locs), vec![false]);
    }

    #[test]
    fn no_prefix_accepts_any_item() {
        let sec = section(&[(6, "FL1")]);
        let body = vec![item("A-7", &[CellValue::Bool(true)])];
        assert_eq!(read_section_items(&sec, &body, 4, &SetupColumns::default(), None).len(), 1);
        assert!(read_section_items(&sec, &body, 4, &SetupColumns::default(), Some("MR-")).is_empty());
    }

    #[test]
    fn rows_outside_section_are_ignored() {
        let sec = section(&[(6, "FL1")]);
        let body: Vec<Row> = (0..12).map(|i| item(&format!("MR-{i:03}"), &[])).collect();
        let rows = read_section_items(&sec, &body, 1, &SetupColumns::default(), Some("MR-"));
        assert_eq!(rows.first().map(|r| r.row), Some(4));
        assert_eq!(rows.last().map(|r| r.row), Some(10));
    }
}
