//! Sheet layout discovery: sections and their location columns, read from
//! live header text.

use crate::a1::{cell_ref, column_letter};
use crate::cell::{row_at, CellValue, Grid};
use crate::config::{ColumnSpan, SectionSpec, SetupTabConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// LocationColumn
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationColumn {
    /// 0-based column index.
    pub index: usize,
    pub letter: String,
    pub name: String,
}

/// Which header cells can never be locations.
#[derive(Debug, Clone, Default)]
pub struct HeaderRules {
    reserved: Vec<String>,
    span: Option<ColumnSpan>,
}

impl HeaderRules {
    pub fn new(reserved: &[String], span: Option<ColumnSpan>) -> Self {
        Self {
            reserved: reserved.iter().map(|r| r.trim().to_lowercase()).collect(),
            span,
        }
    }

    pub fn for_setup(cfg: &SetupTabConfig) -> Self {
        Self::new(&cfg.reserved_headers, cfg.location_span)
    }

    /// Same reserved labels, no column restriction.
    pub fn unrestricted(&self) -> Self {
        Self {
            reserved: self.reserved.clone(),
            span: None,
        }
    }

    pub fn is_reserved(&self, text: &str) -> bool {
        let t = text.trim().to_lowercase();
        self.reserved.iter().any(|r| *r == t)
    }

    fn allows(&self, index: usize) -> bool {
        self.span.map_or(true, |s| s.contains(index))
    }
}

/// Turn one header row into named location columns. Empty and reserved cells
/// are skipped; names keep their internal whitespace.
pub fn discover_location_columns(header: &[CellValue], rules: &HeaderRules) -> Vec<LocationColumn> {
    header
        .iter()
        .enumerate()
        .filter(|(index, _)| rules.allows(*index))
        .filter_map(|(index, cell)| {
            let name = cell.as_text();
            if name.is_empty() || rules.is_reserved(&name) {
                return None;
            }
            Some(LocationColumn {
                index,
                letter: column_letter(index),
                name,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Section / SheetLayout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub label: String,
    pub header_row: u32,
    pub first_row: u32,
    pub last_row: u32,
    pub locations: Vec<LocationColumn>,
}

impl Section {
    pub fn new(id: impl Into<String>, header_row: u32, last_row: u32) -> Self {
        let id = id.into();
        Self {
            label: section_label(&id),
            id,
            header_row,
            first_row: header_row + 1,
            last_row,
            locations: Vec::new(),
        }
    }

    pub fn with_locations(mut self, locations: Vec<LocationColumn>) -> Self {
        self.locations = locations;
        self
    }

    pub fn contains_row(&self, row: u32) -> bool {
        row >= self.first_row && row <= self.last_row
    }

    pub fn location_at(&self, index: usize) -> Option<&LocationColumn> {
        self.locations.iter().find(|l| l.index == index)
    }

    /// The header cell a location name was read from, e.g. `G3`.
    pub fn source_cell(&self, location: &LocationColumn) -> String {
        cell_ref(location.index, self.header_row)
    }
}

/// `ROOFING` -> `Roofing`
pub fn section_label(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub sections: Vec<Section>,
}

impl SheetLayout {
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn section_for_row(&self, row: u32) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains_row(row))
    }

    pub fn location_names(&self) -> BTreeMap<String, Vec<LocationColumn>> {
        self.sections
            .iter()
            .map(|s| (s.id.clone(), s.locations.clone()))
            .collect()
    }

    pub fn header_rows(&self) -> Vec<u32> {
        self.sections.iter().map(|s| s.header_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Section boundaries
// ---------------------------------------------------------------------------

/// Sections at configured header rows. Each runs to the row before the next
/// header; the last one ends at `last_row`. Locations are left empty.
pub fn fixed_sections(specs: &[SectionSpec], last_row: u32) -> Vec<Section> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let end = specs
                .get(i + 1)
                .map(|next| next.header_row.saturating_sub(1))
                .unwrap_or(last_row);
            Section::new(spec.name.clone(), spec.header_row, end)
        })
        .collect()
}

fn scope_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)scope|description|item").expect("static regex"))
}

/// A section header row has an item-id marker in column A and a scope-like
/// label somewhere after it.
pub fn is_section_header(row: &[CellValue]) -> bool {
    let Some(first) = row.first() else {
        return false;
    };
    let a = first.as_text().to_lowercase();
    let marker = a.starts_with("item_id") || a.starts_with("item id") || a == "itemid";
    marker
        && row
            .iter()
            .skip(1)
            .any(|c| scope_header_re().is_match(&c.as_text()))
}

/// Scan a whole tab for section header rows and build its layout.
///
/// Sections are named from `labels` in order, then `SECTION_<n>`. Each
/// section stops two rows above the next header (the bundle-total spacer);
/// the last one runs to the end of the grid. When no header is found the
/// layout falls back to a single `ROOFING` section at `fallback_header_row`.
pub fn scan_sections(
    grid: &Grid,
    labels: &[String],
    fallback_header_row: u32,
    rules: &HeaderRules,
) -> SheetLayout {
    let mut headers: Vec<(String, u32)> = grid
        .iter()
        .enumerate()
        .filter(|(_, row)| is_section_header(row))
        .enumerate()
        .map(|(n, (i, _))| {
            let name = labels
                .get(n)
                .cloned()
                .unwrap_or_else(|| format!("SECTION_{n}"));
            (name, i as u32 + 1)
        })
        .collect();

    if headers.is_empty() {
        headers.push(("ROOFING".to_string(), fallback_header_row.max(1)));
    }

    let grid_end = grid.len() as u32;
    let sections = headers
        .iter()
        .enumerate()
        .map(|(i, (name, header_row))| {
            let last_row = match headers.get(i + 1) {
                Some((_, next)) => next.saturating_sub(2).max(*header_row),
                None => grid_end.max(*header_row),
            };
            let header = row_at(grid, header_row.saturating_sub(1) as usize);
            Section::new(name.clone(), *header_row, last_row)
                .with_locations(discover_location_columns(header, rules))
        })
        .collect();

    SheetLayout { sections }
}
