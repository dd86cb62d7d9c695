//! `TakeoffEngine`: the operations exposed to the server and CLI.
//!
//! Version creation lives in `materialize`, the rest of the version
//! lifecycle in `versions`; both are `impl TakeoffEngine` blocks.

use crate::a1::tab_range;
use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::TakeoffConfig;
use crate::error::{Result, TakeoffError};
use crate::google::GoogleSheetsClient;
use crate::layout::{scan_sections, HeaderRules, Section};
use crate::ledger::{spawn_ledger, LedgerPublisher};
use crate::naming::VersionNamer;
use crate::project::{ProjectStore, SqliteProjectStore};
use crate::setup::{read_setup_config, SetupConfig, SetupSummary};
use crate::sheets::{find_tab, spreadsheet_url, tab_titles, SpreadsheetService};
use crate::toggles::{read_section_items, ScopeItemRow};
use crate::tools::{generate_tools, BtxBundle, StaticToolCatalog, ToolCatalog, ToolPlan};
use crate::tracker::Tracker;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A project that has a takeoff spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProject {
    pub project_id: String,
    pub project_name: String,
    pub spreadsheet_id: String,
}

/// Layout and items of a takeoff tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetConfig {
    pub project_id: String,
    pub spreadsheet_id: String,
    pub spreadsheet_url: String,
    pub tab: String,
    pub sections: Vec<Section>,
    pub items: Vec<ScopeItemRow>,
    pub items_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReport {
    pub project_id: String,
    pub project_name: String,
    pub spreadsheet_id: String,
    pub tool_count: usize,
    #[serde(flatten)]
    pub plan: ToolPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundles: Option<Vec<BtxBundle>>,
}

pub struct TakeoffEngine {
    pub(crate) config: TakeoffConfig,
    pub(crate) sheets: Arc<dyn SpreadsheetService>,
    pub(crate) projects: Arc<dyn ProjectStore>,
    pub(crate) catalog: Arc<dyn ToolCatalog>,
    pub(crate) ledger: LedgerPublisher,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) namer: VersionNamer,
    setup_cache: TtlCache<String, Arc<SetupConfig>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TakeoffEngine {
    pub fn new(
        config: TakeoffConfig,
        sheets: Arc<dyn SpreadsheetService>,
        projects: Arc<dyn ProjectStore>,
    ) -> Self {
        Self {
            namer: VersionNamer::new(config.version.name_format.clone()),
            setup_cache: TtlCache::new(Duration::from_secs(config.cache.setup_ttl_secs)),
            config,
            sheets,
            projects,
            catalog: Arc::new(StaticToolCatalog::default()),
            ledger: LedgerPublisher::disabled(),
            clock: Arc::new(SystemClock),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ToolCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_ledger(mut self, ledger: LedgerPublisher) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TakeoffConfig {
        &self.config
    }

    /// Wire the production collaborators named by `config`: the Google Sheets
    /// client, the SQLite store (which is also the ledger) and the tool
    /// catalog. Must run inside a runtime. The returned handle finishes once
    /// the engine is dropped and every queued ledger event has been applied.
    pub fn open(config: TakeoffConfig) -> Result<(Self, JoinHandle<()>)> {
        let sheets = GoogleSheetsClient::from_config(&config.sheets)?;
        let store = SqliteProjectStore::open(&config.store.path)?;
        let catalog = StaticToolCatalog::load_or_empty(config.tools.catalog.as_deref())?;
        let (ledger, worker) = spawn_ledger(Arc::new(store.clone()));
        info!(
            store = %config.store.path.display(),
            api_base = %config.sheets.api_base,
            catalog_entries = catalog.len(),
            "takeoff engine ready"
        );
        let engine = Self::new(config, Arc::new(sheets), Arc::new(store))
            .with_catalog(Arc::new(catalog))
            .with_ledger(ledger);
        Ok((engine, worker))
    }

    // -----------------------------------------------------------------------
    // Shared plumbing
    // -----------------------------------------------------------------------

    pub async fn resolve_project(&self, project_id: &str) -> Result<ResolvedProject> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(TakeoffError::Invalid("project id is required".into()));
        }
        let project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or_else(|| TakeoffError::ProjectNotFound(project_id.to_string()))?;
        let spreadsheet_id = project
            .spreadsheet_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| TakeoffError::NoSpreadsheet(project_id.to_string()))?;
        Ok(ResolvedProject {
            project_id: project.id,
            project_name: project.name,
            spreadsheet_id,
        })
    }

    /// Serializes mutations against one spreadsheet within this process.
    /// Locks nobody holds or waits on are dropped as new ones are handed out.
    pub(crate) fn lock_for(&self, spreadsheet_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(spreadsheet_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub(crate) async fn read_tracker(&self, spreadsheet_id: &str) -> Result<Tracker> {
        let range = Tracker::range(&self.config.setup.tab, &self.config.tracker);
        let grid = self.sheets.read_range(spreadsheet_id, &range).await?;
        Ok(Tracker::parse(&self.config.setup.tab, &self.config.tracker, &grid))
    }

    /// Read the Setup tab fresh and refresh the cache.
    pub async fn read_setup_config(&self, spreadsheet_id: &str) -> Result<Arc<SetupConfig>> {
        let setup = Arc::new(
            read_setup_config(self.sheets.as_ref(), spreadsheet_id, &self.config.setup).await?,
        );
        self.setup_cache
            .insert(spreadsheet_id.to_string(), setup.clone(), self.clock.now());
        Ok(setup)
    }

    /// Setup configuration, served from cache while fresh.
    pub async fn cached_setup_config(&self, spreadsheet_id: &str) -> Result<Arc<SetupConfig>> {
        let key = spreadsheet_id.to_string();
        if let Some(hit) = self.setup_cache.get(&key, self.clock.now()) {
            debug!(spreadsheet_id, "setup config cache hit");
            return Ok(hit);
        }
        self.read_setup_config(spreadsheet_id).await
    }

    pub(crate) fn invalidate_setup(&self, spreadsheet_id: &str) {
        self.setup_cache.invalidate(&spreadsheet_id.to_string());
    }

    // -----------------------------------------------------------------------
    // Read operations
    // -----------------------------------------------------------------------

    pub async fn setup_summary(&self, project_id: &str) -> Result<SetupSummary> {
        let project = self.resolve_project(project_id).await?;
        let setup = self.read_setup_config(&project.spreadsheet_id).await?;
        let summary = setup.summary(&project.spreadsheet_id);
        info!(
            project_id = %project.project_id,
            spreadsheet_id = %project.spreadsheet_id,
            items = summary.items_count,
            locations = summary.locations_count,
            "read setup configuration"
        );
        Ok(summary)
    }

    /// Scan a takeoff tab (default: the configured takeoff tab) for its
    /// sections, locations and items.
    pub async fn sheet_config(&self, project_id: &str, tab: Option<&str>) -> Result<SheetConfig> {
        let project = self.resolve_project(project_id).await?;
        let sid = &project.spreadsheet_id;
        let tab = tab
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.config.takeoff.tab);

        let tabs = self.sheets.list_tabs(sid).await?;
        let title = find_tab(&tabs, tab)
            .map(|t| t.title.clone())
            .ok_or_else(|| TakeoffError::TabNotFound(tab.to_string()))?;

        let range = tab_range(&title, &self.config.takeoff.scan_range);
        let grid = self.sheets.read_range(sid, &range).await?;
        let rules = HeaderRules::for_setup(&self.config.setup).unrestricted();
        let layout = scan_sections(
            &grid,
            &self.config.takeoff.section_labels,
            self.config.takeoff.fallback_header_row,
            &rules,
        );

        let items: Vec<ScopeItemRow> = layout
            .sections
            .iter()
            .flat_map(|section| {
                read_section_items(
                    section,
                    &grid,
                    1,
                    &self.config.setup.columns,
                    self.config.setup.item_prefix.as_deref(),
                )
            })
            .collect();

        debug!(
            project_id = %project.project_id,
            spreadsheet_id = %sid,
            tab = %title,
            sections = layout.sections.len(),
            items = items.len(),
            "scanned takeoff tab"
        );
        Ok(SheetConfig {
            project_id: project.project_id.clone(),
            spreadsheet_id: sid.clone(),
            spreadsheet_url: spreadsheet_url(sid),
            tab: title,
            items_count: items.len(),
            sections: layout.sections,
            items,
        })
    }

    /// BTX tools for the project's current Setup selection.
    pub async fn generate_tools(&self, project_id: &str, with_bundles: bool) -> Result<ToolReport> {
        let project = self.resolve_project(project_id).await?;
        let setup = self.cached_setup_config(&project.spreadsheet_id).await?;
        let item_ids: Vec<String> = setup.active_rows().map(|r| r.item_id.clone()).collect();
        let styles = self.catalog.styles(&item_ids).await?;
        let plan = generate_tools(&setup.rows, &setup.layout, &styles)?;
        info!(
            project_id = %project.project_id,
            spreadsheet_id = %project.spreadsheet_id,
            tools = plan.tool_count(),
            locations = plan.locations.len(),
            "generated tools"
        );
        Ok(ToolReport {
            bundles: with_bundles.then(|| plan.bundles(&project.project_name)),
            tool_count: plan.tool_count(),
            project_id: project.project_id,
            project_name: project.project_name,
            spreadsheet_id: project.spreadsheet_id,
            plan,
        })
    }

    pub async fn tab_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>> {
        Ok(tab_titles(&self.sheets.list_tabs(spreadsheet_id).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::testing::{takeoff_workbook, ManualClock, MemoryProjectStore};
    use chrono::TimeZone;

    fn project(id: &str, sheet: Option<&str>) -> Project {
        let mut p = Project::new(id, "Smith Residence");
        p.spreadsheet_id = sheet.map(str::to_string);
        p
    }

    fn engine(sheet: Arc<crate::testing::MemorySpreadsheet>) -> (TakeoffEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap(),
        ));
        let store = MemoryProjectStore::with([project("p1", Some("s1")), project("p2", None)]);
        let engine = TakeoffEngine::new(TakeoffConfig::default(), sheet, Arc::new(store))
            .with_clock(clock.clone());
        (engine, clock)
    }

    #[tokio::test]
    async fn resolve_distinguishes_missing_cases() {
        let (engine, _) = engine(Arc::new(takeoff_workbook("s1")));
        assert_eq!(engine.resolve_project("p1").await.unwrap().spreadsheet_id, "s1");
        assert!(matches!(
            engine.resolve_project("p2").await,
            Err(TakeoffError::NoSpreadsheet(_))
        ));
        assert!(matches!(
            engine.resolve_project("nope").await,
            Err(TakeoffError::ProjectNotFound(_))
        ));
        assert!(matches!(
            engine.resolve_project("  ").await,
            Err(TakeoffError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn idle_spreadsheet_locks_are_dropped() {
        let (engine, _) = engine(Arc::new(takeoff_workbook("s1")));
        let held = engine.lock_for("s1");
        let _guard = held.lock().await;
        drop(engine.lock_for("s2"));

        let again = engine.lock_for("s3");
        {
            let locks = engine.locks.lock().unwrap();
            assert!(locks.contains_key("s1"));
            assert!(!locks.contains_key("s2"));
            assert!(locks.contains_key("s3"));
        }
        assert!(Arc::ptr_eq(&held, &engine.lock_for("s1")));
        drop(again);
    }

    #[tokio::test]
    async fn setup_summary_counts_active_selection() {
        let (engine, _) = engine(Arc::new(takeoff_workbook("s1")));
        let summary = engine.setup_summary("p1").await.unwrap();
        assert_eq!(summary.items_count, 3);
        assert_eq!(summary.locations_count, 3);
        assert_eq!(summary.tool_count, 6);
        assert_eq!(summary.hidden_rows, vec![5, 37, 50]);
        assert_eq!(summary.hidden_columns, vec![9, 10, 11, 12]);
    }

    #[tokio::test]
    async fn sheet_config_scans_takeoff_tab() {
        let (engine, _) = engine(Arc::new(takeoff_workbook("s1")));
        let cfg = engine.sheet_config("p1", None).await.unwrap();
        assert_eq!(cfg.tab, "DATE");
        let ids: Vec<_> = cfg.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ROOFING", "BALCONIES"]);
        assert_eq!(cfg.sections[0].last_row, 38);
        assert_eq!(cfg.sections[1].locations[0].name, "Rear Elevation");
        assert_eq!(cfg.items_count, 4);
        assert!(cfg.spreadsheet_url.contains("/d/s1/"));

        assert!(matches!(
            engine.sheet_config("p1", Some("Nope")).await,
            Err(TakeoffError::TabNotFound(_))
        ));
    }

    #[tokio::test]
    async fn tools_use_cache_until_ttl() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        let (engine, clock) = engine(sheet.clone());

        let report = engine.generate_tools("p1", true).await.unwrap();
        assert_eq!(report.tool_count, 6);
        let locations: Vec<_> = report
            .plan
            .locations
            .iter()
            .map(|l| (l.letter.as_str(), l.name.as_str()))
            .collect();
        assert_eq!(
            locations,
            vec![("G", "1ST FLOOR"), ("G", "Rear Elevation"), ("H", "2ND FLOOR"), ("I", "ROOF")]
        );
        let bundles = report.bundles.unwrap();
        assert_eq!(bundles[1].file_name, "Smith_Residence_Rear_Elevation_Tools.btx");

        // Turn another toggle on; the cached read still answers.
        sheet.set_cell("Setup", "H4", crate::cell::CellValue::Bool(true));
        assert_eq!(engine.generate_tools("p1", false).await.unwrap().tool_count, 6);

        clock.advance(chrono::Duration::seconds(61));
        let fresh = engine.generate_tools("p1", false).await.unwrap();
        assert_eq!(fresh.tool_count, 7);
        assert!(fresh.bundles.is_none());
    }
}
