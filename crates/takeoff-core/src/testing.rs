//! In-memory collaborators for tests: a spreadsheet, a project store with a
//! recording ledger, and a hand-driven clock.

use crate::a1::{column_index, parse_cell, parse_cells, split_range};
use crate::cache::Clock;
use crate::cell::{CellValue, Grid, Row};
use crate::error::{Result, TakeoffError};
use crate::ledger::LedgerEvent;
use crate::project::{Project, ProjectStore, VersionLedger};
use crate::sheets::{SpreadsheetService, TabInfo, ValueRange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// MemorySpreadsheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct MemTab {
    id: i64,
    title: String,
    rows: BTreeMap<u32, Row>,
    hidden_rows: BTreeSet<u32>,
    hidden_columns: BTreeSet<usize>,
}

#[derive(Debug, Default)]
struct MemState {
    tabs: Vec<MemTab>,
    next_id: i64,
    failing: HashSet<String>,
    calls: Vec<String>,
}

/// One spreadsheet held in memory. Reads trim trailing empty cells and rows
/// the way the Sheets API does.
#[derive(Debug)]
pub struct MemorySpreadsheet {
    id: String,
    state: Mutex<MemState>,
}

impl MemorySpreadsheet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(MemState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_tab(&self, title: &str) -> i64 {
        let mut st = self.state();
        let id = st.next_id;
        st.next_id += 1;
        st.tabs.push(MemTab {
            id,
            title: title.to_string(),
            ..Default::default()
        });
        id
    }

    pub fn set_row(&self, tab: &str, row: u32, cells: Row) {
        let mut st = self.state();
        if let Some(t) = find_mut(&mut st.tabs, tab) {
            t.rows.insert(row, cells);
        }
    }

    /// Set one cell by A1 reference, e.g. `G4`.
    pub fn set_cell(&self, tab: &str, a1: &str, value: CellValue) {
        let Some((col, row)) = parse_cell(a1) else {
            return;
        };
        let mut st = self.state();
        if let Some(t) = find_mut(&mut st.tabs, tab) {
            put(t, row, col, value);
        }
    }

    pub fn cell(&self, tab: &str, a1: &str) -> CellValue {
        let Some((col, row)) = parse_cell(a1) else {
            return CellValue::Empty;
        };
        let st = self.state();
        st.tabs
            .iter()
            .find(|t| t.title.eq_ignore_ascii_case(tab))
            .and_then(|t| t.rows.get(&row))
            .and_then(|r| r.get(col).cloned())
            .unwrap_or_default()
    }

    pub fn titles(&self) -> Vec<String> {
        self.state().tabs.iter().map(|t| t.title.clone()).collect()
    }

    pub fn hidden_rows(&self, tab: &str) -> Vec<u32> {
        self.state()
            .tabs
            .iter()
            .find(|t| t.title.eq_ignore_ascii_case(tab))
            .map(|t| t.hidden_rows.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn hidden_columns(&self, tab: &str) -> Vec<usize> {
        self.state()
            .tabs
            .iter()
            .find(|t| t.title.eq_ignore_ascii_case(tab))
            .map(|t| t.hidden_columns.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Make every call to `operation` (a trait method name) fail.
    pub fn fail_on(&self, operation: &str) {
        self.state().failing.insert(operation.to_string());
    }

    /// Names of the mutating calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn enter(&self, spreadsheet_id: &str, operation: &str, mutating: bool) -> Result<()> {
        let mut st = self.state();
        if spreadsheet_id != self.id {
            return Err(TakeoffError::Upstream(format!(
                "404: spreadsheet {spreadsheet_id} not found"
            )));
        }
        if st.failing.contains(operation) {
            return Err(TakeoffError::Upstream(format!("503: {operation} unavailable")));
        }
        if mutating {
            st.calls.push(operation.to_string());
        }
        Ok(())
    }

    fn read(&self, range: &str) -> Result<Grid> {
        let (tab, cells) = split_range(range)
            .ok_or_else(|| TakeoffError::Upstream(format!("400: bad range {range}")))?;
        let ((c0, r0), (c1, r1)) = parse_cells(cells)
            .ok_or_else(|| TakeoffError::Upstream(format!("400: bad range {range}")))?;
        let st = self.state();
        let t = st
            .tabs
            .iter()
            .find(|t| t.title.eq_ignore_ascii_case(&tab))
            .ok_or_else(|| TakeoffError::Upstream(format!("400: unable to parse range {range}")))?;

        let mut grid: Grid = (r0..=r1)
            .map(|r| {
                let mut row: Row = t
                    .rows
                    .get(&r)
                    .map(|cells| {
                        cells
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| *i >= c0 && *i <= c1)
                            .map(|(_, v)| v.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                while row.last().is_some_and(|c| *c == CellValue::Empty) {
                    row.pop();
                }
                row
            })
            .collect();
        while grid.last().is_some_and(|r| r.is_empty()) {
            grid.pop();
        }
        Ok(grid)
    }
}

fn find_mut<'a>(tabs: &'a mut [MemTab], title: &str) -> Option<&'a mut MemTab> {
    tabs.iter_mut().find(|t| t.title.eq_ignore_ascii_case(title))
}

fn put(tab: &mut MemTab, row: u32, col: usize, value: CellValue) {
    let cells = tab.rows.entry(row).or_default();
    if cells.len() <= col {
        cells.resize(col + 1, CellValue::Empty);
    }
    cells[col] = value;
}

#[async_trait]
impl SpreadsheetService for MemorySpreadsheet {
    async fn list_tabs(&self, spreadsheet_id: &str) -> Result<Vec<TabInfo>> {
        self.enter(spreadsheet_id, "list_tabs", false)?;
        Ok(self
            .state()
            .tabs
            .iter()
            .enumerate()
            .map(|(i, t)| TabInfo {
                id: t.id,
                title: t.title.clone(),
                index: i as u32,
            })
            .collect())
    }

    async fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Grid> {
        self.enter(spreadsheet_id, "read_range", false)?;
        self.read(range)
    }

    async fn read_formulas(&self, spreadsheet_id: &str, range: &str) -> Result<Grid> {
        self.enter(spreadsheet_id, "read_formulas", false)?;
        self.read(range)
    }

    async fn duplicate_tab(&self, spreadsheet_id: &str, source_tab_id: i64) -> Result<TabInfo> {
        self.enter(spreadsheet_id, "duplicate_tab", true)?;
        let mut st = self.state();
        let pos = st
            .tabs
            .iter()
            .position(|t| t.id == source_tab_id)
            .ok_or_else(|| TakeoffError::Upstream(format!("400: no sheet {source_tab_id}")))?;
        let id = st.next_id;
        st.next_id += 1;
        let mut copy = st.tabs[pos].clone();
        copy.id = id;
        copy.title = format!("Copy of {}", copy.title);
        let info = TabInfo {
            id,
            title: copy.title.clone(),
            index: (pos + 1) as u32,
        };
        st.tabs.insert(pos + 1, copy);
        Ok(info)
    }

    async fn rename_tab(&self, spreadsheet_id: &str, tab_id: i64, title: &str) -> Result<()> {
        self.enter(spreadsheet_id, "rename_tab", true)?;
        let mut st = self.state();
        if st
            .tabs
            .iter()
            .any(|t| t.id != tab_id && t.title.eq_ignore_ascii_case(title))
        {
            return Err(TakeoffError::Upstream(format!(
                "400: a sheet with the name \"{title}\" already exists"
            )));
        }
        let tab = st
            .tabs
            .iter_mut()
            .find(|t| t.id == tab_id)
            .ok_or_else(|| TakeoffError::Upstream(format!("400: no sheet {tab_id}")))?;
        tab.title = title.to_string();
        Ok(())
    }

    async fn write_ranges(&self, spreadsheet_id: &str, data: &[ValueRange]) -> Result<()> {
        self.enter(spreadsheet_id, "write_ranges", true)?;
        let mut st = self.state();
        for vr in data {
            let (tab, cells) = split_range(&vr.range)
                .ok_or_else(|| TakeoffError::Upstream(format!("400: bad range {}", vr.range)))?;
            let start = cells.split(':').next().unwrap_or(cells);
            let (c0, r0) = parse_cell(start)
                .ok_or_else(|| TakeoffError::Upstream(format!("400: bad range {}", vr.range)))?;
            let t = find_mut(&mut st.tabs, &tab)
                .ok_or_else(|| TakeoffError::Upstream(format!("400: no sheet {tab}")))?;
            for (dr, row) in vr.values.iter().enumerate() {
                for (dc, value) in row.iter().enumerate() {
                    // null leaves the cell unchanged
                    if *value != CellValue::Empty {
                        put(t, r0 + dr as u32, c0 + dc, value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn hide_rows(&self, spreadsheet_id: &str, tab_id: i64, rows: &[u32]) -> Result<()> {
        self.enter(spreadsheet_id, "hide_rows", true)?;
        let mut st = self.state();
        let tab = st
            .tabs
            .iter_mut()
            .find(|t| t.id == tab_id)
            .ok_or_else(|| TakeoffError::Upstream(format!("400: no sheet {tab_id}")))?;
        tab.hidden_rows.extend(rows.iter().copied());
        Ok(())
    }

    async fn hide_columns(
        &self,
        spreadsheet_id: &str,
        tab_id: i64,
        columns: &[usize],
    ) -> Result<()> {
        self.enter(spreadsheet_id, "hide_columns", true)?;
        let mut st = self.state();
        let tab = st
            .tabs
            .iter_mut()
            .find(|t| t.id == tab_id)
            .ok_or_else(|| TakeoffError::Upstream(format!("400: no sheet {tab_id}")))?;
        tab.hidden_columns.extend(columns.iter().copied());
        Ok(())
    }

    async fn delete_tab(&self, spreadsheet_id: &str, tab_id: i64) -> Result<()> {
        self.enter(spreadsheet_id, "delete_tab", true)?;
        let mut st = self.state();
        let before = st.tabs.len();
        st.tabs.retain(|t| t.id != tab_id);
        if st.tabs.len() == before {
            return Err(TakeoffError::Upstream(format!("400: no sheet {tab_id}")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixture workbook
// ---------------------------------------------------------------------------

fn text_row(cells: &[&str]) -> Row {
    cells.iter().map(|c| CellValue::text(*c)).collect()
}

fn header(locations: &[&str]) -> Row {
    let mut row = text_row(&["item_id", "Unit Cost", "Scope", "R", "IN", "TYPE"]);
    let mut locs: Vec<CellValue> = locations.iter().map(|l| CellValue::text(*l)).collect();
    locs.resize(7, CellValue::Empty);
    row.extend(locs);
    row.extend(text_row(&["UOM", "Bid Type", "Tool Name"]));
    row
}

struct FixtureItem {
    row: u32,
    id: &'static str,
    cost: f64,
    scope: &'static str,
    kind: &'static str,
    toggles: &'static [bool],
    tool: &'static str,
}

fn setup_item(item: &FixtureItem) -> Row {
    let mut row = vec![
        CellValue::text(item.id),
        CellValue::Number(item.cost),
        CellValue::text(item.scope),
        CellValue::Empty,
        CellValue::Empty,
        CellValue::text(item.kind),
    ];
    let mut toggles: Vec<CellValue> = item.toggles.iter().map(|t| CellValue::Bool(*t)).collect();
    toggles.resize(7, CellValue::Bool(false));
    row.extend(toggles);
    row.push(CellValue::text("SF"));
    row.push(CellValue::text("Base"));
    row.push(CellValue::text(item.tool));
    row
}

const FIXTURE_ITEMS: &[FixtureItem] = &[
    FixtureItem { row: 4, id: "MR-001VB", cost: 4.5, scope: "Vapor Barrier", kind: "PVC", toggles: &[true, false, true], tool: "VB" },
    FixtureItem { row: 5, id: "MR-002INS", cost: 2.25, scope: "Insulation", kind: "ISO", toggles: &[false, false, false], tool: "" },
    FixtureItem { row: 6, id: "MR-003MEM", cost: 7.0, scope: "Membrane", kind: "TPO", toggles: &[true, true, true], tool: "Membrane" },
    FixtureItem { row: 37, id: "MR-020WP", cost: 9.0, scope: "Traffic Coating", kind: "", toggles: &[false], tool: "" },
    FixtureItem { row: 41, id: "MR-030BAL", cost: 12.0, scope: "Balcony Membrane", kind: "", toggles: &[true, false], tool: "" },
    FixtureItem { row: 50, id: "MR-040EXT", cost: 3.0, scope: "Wall Flashing", kind: "", toggles: &[false, false], tool: "" },
];

/// A takeoff spreadsheet with the default layout:
///
/// - `Setup`: ROOFING (G `1ST FLOOR`, H `2ND FLOOR`, I `ROOF`), WATERPROOFING
///   (G `Plaza Deck`), BALCONIES (G `Rear Elevation`, H `2nd Floor`) and
///   EXTERIOR (G `North`, H `South`). Three items are active: `MR-001VB`
///   (G, I), `MR-003MEM` (G, H, I) and `MR-030BAL` (G). The tracker holds
///   one active version `01-10-2026`.
/// - `DATE`: the template, ROOFING at row 3 and BALCONIES at row 40, with
///   formulas in `O4:O10`.
/// - `01-10-2026`: an existing version holding measurements.
/// - `Library`.
pub fn takeoff_workbook(spreadsheet_id: &str) -> MemorySpreadsheet {
    let sheet = MemorySpreadsheet::new(spreadsheet_id);
    sheet.add_tab("Setup");
    sheet.add_tab("DATE");
    sheet.add_tab("01-10-2026");
    sheet.add_tab("Library");

    sheet.set_row("Setup", 1, text_row(&["SETUP"]));
    sheet.set_row("Setup", 3, header(&["1ST FLOOR", "2ND FLOOR", "ROOF"]));
    sheet.set_row("Setup", 7, text_row(&["BUNDLE TOTAL"]));
    sheet.set_row("Setup", 36, header(&["Plaza Deck"]));
    sheet.set_row("Setup", 40, header(&["Rear Elevation", "2nd Floor"]));
    sheet.set_row("Setup", 49, header(&["North", "South"]));
    for item in FIXTURE_ITEMS {
        sheet.set_row("Setup", item.row, setup_item(item));
    }
    sheet.set_row(
        "Setup",
        74,
        vec![
            CellValue::Bool(true),
            CellValue::text("01-10-2026"),
            CellValue::text("2026-01-10"),
            CellValue::Number(3.0),
            CellValue::Number(3.0),
            CellValue::text("In Progress"),
        ],
    );

    for tab in ["DATE", "01-10-2026"] {
        sheet.set_row(tab, 1, text_row(&["TAKEOFF"]));
        sheet.set_row(tab, 2, text_row(&["PROJECT NAME"]));
        sheet.set_row(tab, 3, header(&["1ST FLOOR", "2ND FLOOR", "ROOF"]));
        for item in FIXTURE_ITEMS.iter().filter(|i| i.row < 10) {
            sheet.set_row(tab, item.row, text_row(&[item.id]));
        }
        for row in 4..=10 {
            sheet.set_cell(
                tab,
                &format!("O{row}"),
                CellValue::text(format!("=SUM(G{row}:M{row})*B{row}")),
            );
        }
        sheet.set_row(tab, 8, text_row(&["BUNDLE TOTAL"]));
        sheet.set_row(tab, 40, header(&["Rear Elevation", "2nd Floor"]));
        sheet.set_row(tab, 41, text_row(&["MR-030BAL"]));
    }
    sheet.set_cell("01-10-2026", "G4", CellValue::Number(1250.0));
    sheet
}

/// Column index of a letter, for assertions.
pub fn col(letter: &str) -> usize {
    column_index(letter).unwrap_or(usize::MAX)
}

// ---------------------------------------------------------------------------
// MemoryProjectStore / MemoryLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: Mutex<HashMap<String, Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(projects: impl IntoIterator<Item = Project>) -> Self {
        let store = Self::new();
        for p in projects {
            store.insert(p);
        }
        store
    }

    pub fn insert(&self, project: Project) {
        self.projects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(project.id.clone(), project);
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self
            .projects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    events: Mutex<Vec<LedgerEvent>>,
    failing: Mutex<bool>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl VersionLedger for MemoryLedger {
    async fn apply(&self, event: &LedgerEvent) -> Result<()> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(TakeoffError::Upstream("ledger unavailable".into()));
        }
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
