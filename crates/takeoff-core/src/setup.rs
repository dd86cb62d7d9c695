//! Reading the Setup tab: section layout, item rows and column usage.

use crate::a1::{column_letter, tab_range};
use crate::cell::{cell_at, CellValue, Row};
use crate::config::{ColumnSpan, SetupTabConfig};
use crate::error::Result;
use crate::layout::{
    discover_location_columns, fixed_sections, HeaderRules, LocationColumn, Section, SheetLayout,
};
use crate::sheets::SpreadsheetService;
use crate::toggles::{read_section_items, ScopeItemRow};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupConfig {
    pub layout: SheetLayout,
    pub rows: Vec<ScopeItemRow>,
    /// Candidate location column -> whether any item toggles it.
    pub column_usage: BTreeMap<usize, bool>,
}

impl SetupConfig {
    /// Combine per-section reads. Candidate columns are the span when one is
    /// configured, otherwise every discovered location column.
    pub fn assemble(parts: Vec<(Section, Vec<ScopeItemRow>)>, span: Option<ColumnSpan>) -> Self {
        let mut sections = Vec::with_capacity(parts.len());
        let mut rows = Vec::new();
        for (section, items) in parts {
            sections.push(section);
            rows.extend(items);
        }
        let layout = SheetLayout { sections };

        let candidates: BTreeSet<usize> = match span {
            Some(span) => span.indices().collect(),
            None => layout
                .sections
                .iter()
                .flat_map(|s| s.locations.iter().map(|l| l.index))
                .collect(),
        };
        let mut column_usage: BTreeMap<usize, bool> =
            candidates.into_iter().map(|c| (c, false)).collect();
        for row in &rows {
            let Some(section) = layout.section(&row.section) else {
                continue;
            };
            for loc in row.active_locations(section) {
                column_usage.insert(loc.index, true);
            }
        }

        Self {
            layout,
            rows,
            column_usage,
        }
    }

    pub fn active_rows(&self) -> impl Iterator<Item = &ScopeItemRow> {
        self.rows.iter().filter(|r| r.has_any_toggle)
    }

    /// Items with at least one toggle on.
    pub fn items_count(&self) -> usize {
        self.active_rows().count()
    }

    /// Location columns toggled by at least one item.
    pub fn locations_count(&self) -> usize {
        self.column_usage.values().filter(|used| **used).count()
    }

    pub fn active_columns(&self) -> Vec<usize> {
        self.column_usage
            .iter()
            .filter(|(_, used)| **used)
            .map(|(c, _)| *c)
            .collect()
    }

    pub fn hidden_rows(&self) -> Vec<u32> {
        self.rows
            .iter()
            .filter(|r| !r.has_any_toggle)
            .map(|r| r.row)
            .collect()
    }

    pub fn hidden_columns(&self) -> Vec<usize> {
        self.column_usage
            .iter()
            .filter(|(_, used)| !**used)
            .map(|(c, _)| *c)
            .collect()
    }

    pub fn tool_count(&self) -> usize {
        self.active_rows().map(ScopeItemRow::on_count).sum()
    }

    pub fn summary(&self, spreadsheet_id: &str) -> SetupSummary {
        // A used column always belongs to some section's locations; the first
        // section naming it wins.
        let active_locations = self
            .active_columns()
            .into_iter()
            .filter_map(|index| {
                let name = self
                    .layout
                    .sections
                    .iter()
                    .find_map(|s| s.location_at(index))?
                    .name
                    .clone();
                Some(ActiveLocation {
                    column: index,
                    letter: column_letter(index),
                    name,
                })
            })
            .collect();

        let items = self
            .active_rows()
            .map(|r| SetupItem {
                item_id: r.item_id.clone(),
                scope: r.scope.clone(),
                section: r.section.clone(),
                row: r.row,
                locations: self
                    .layout
                    .section(&r.section)
                    .map(|s| r.active_locations(s).map(|l| l.name.clone()).collect())
                    .unwrap_or_default(),
            })
            .collect();

        SetupSummary {
            spreadsheet_id: spreadsheet_id.to_string(),
            items_count: self.items_count(),
            locations_count: self.locations_count(),
            tool_count: self.tool_count(),
            active_locations,
            items,
            sections: self.layout.sections.clone(),
            hidden_rows: self.hidden_rows(),
            hidden_columns: self.hidden_columns(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveLocation {
    pub column: usize,
    pub letter: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupItem {
    pub item_id: String,
    pub scope: String,
    pub section: String,
    pub row: u32,
    pub locations: Vec<String>,
}

/// What the Setup tab currently selects, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupSummary {
    pub spreadsheet_id: String,
    pub items_count: usize,
    pub locations_count: usize,
    pub tool_count: usize,
    pub active_locations: Vec<ActiveLocation>,
    pub items: Vec<SetupItem>,
    pub sections: Vec<Section>,
    pub hidden_rows: Vec<u32>,
    pub hidden_columns: Vec<usize>,
}

/// Build one section from a grid whose first row is the section header.
pub fn parse_section(
    section: Section,
    grid: &[Row],
    cfg: &SetupTabConfig,
    rules: &HeaderRules,
) -> (Section, Vec<ScopeItemRow>) {
    let header = grid.first().map(Vec::as_slice).unwrap_or(&[]);
    let body = grid.get(1..).unwrap_or(&[]);

    let mut locations = discover_location_columns(header, rules);
    let unnamed = unnamed_toggled_columns(&section, header, body, cfg);
    if !unnamed.is_empty() {
        let letters: Vec<&str> = unnamed.iter().map(|l| l.letter.as_str()).collect();
        warn!(
            section = %section.id,
            header_row = section.header_row,
            columns = %letters.join(","),
            "toggles set under blank location headers"
        );
        locations.extend(unnamed);
        locations.sort_by_key(|l| l.index);
    }

    let section = section.with_locations(locations);
    let items = read_section_items(
        &section,
        body,
        section.first_row,
        &cfg.columns,
        cfg.item_prefix.as_deref(),
    );
    (section, items)
}

/// Span columns whose header is blank but which an item of the section still
/// toggles on. They are named by their position in the span: `Location 2`
/// for the second column.
fn unnamed_toggled_columns(
    section: &Section,
    header: &[CellValue],
    body: &[Row],
    cfg: &SetupTabConfig,
) -> Vec<LocationColumn> {
    let Some(span) = cfg.location_span else {
        return Vec::new();
    };
    let item_col = cfg.columns.item_id.index();
    let item_rows: Vec<&Row> = body
        .iter()
        .enumerate()
        .filter(|(i, _)| section.contains_row(section.first_row + *i as u32))
        .map(|(_, row)| row)
        .filter(|row| !cell_at(row, item_col).is_blank())
        .collect();

    span.indices()
        .filter(|index| cell_at(header, *index).is_blank())
        .filter(|index| item_rows.iter().any(|row| cell_at(row, *index).is_truthy()))
        .map(|index| LocationColumn {
            index,
            letter: column_letter(index),
            name: format!("Location {}", index - span.first.index() + 1),
        })
        .collect()
}

/// Read every configured section of the Setup tab. Sections are fetched
/// concurrently and all complete before this returns.
pub async fn read_setup_config(
    sheets: &dyn SpreadsheetService,
    spreadsheet_id: &str,
    cfg: &SetupTabConfig,
) -> Result<SetupConfig> {
    let rules = HeaderRules::for_setup(cfg);
    let last_col = cfg.last_column.letter();
    let reads = fixed_sections(&cfg.sections, cfg.last_row)
        .into_iter()
        .map(|section| {
            let range = tab_range(
                &cfg.tab,
                &format!("A{}:{}{}", section.header_row, last_col, section.last_row),
            );
            let rules = &rules;
            async move {
                let grid = sheets.read_range(spreadsheet_id, &range).await?;
                debug!(
                    spreadsheet_id,
                    section = %section.id,
                    rows = grid.len(),
                    "read setup section"
                );
                Ok::<_, crate::error::TakeoffError>(parse_section(section, &grid, cfg, rules))
            }
        });
    let parts = try_join_all(reads).await?;
    Ok(SetupConfig::assemble(parts, cfg.location_span))
}
