//! Version lifecycle after creation: listing, activation, status, copy and
//! delete. Every mutation updates the tracker first and then mirrors the
//! change to the ledger.

use crate::a1::tab_range;
use crate::cell::CellValue;
use crate::engine::{ResolvedProject, TakeoffEngine};
use crate::error::{Result, TakeoffError};
use crate::ledger::LedgerEvent;
use crate::project::VersionRecord;
use crate::sheets::{find_tab, spreadsheet_url, tab_titles, TabInfo};
use crate::tracker::{NewEntry, TrackerEntry, DELETED_STATUS};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(flatten)]
    pub entry: TrackerEntry,
    pub exists_as_tab: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionList {
    pub project_id: String,
    pub spreadsheet_id: String,
    pub spreadsheet_url: String,
    pub versions: Vec<VersionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    pub tab_count: usize,
    pub no_setup_tab: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopiedVersion {
    pub project_id: String,
    pub spreadsheet_id: String,
    pub source: String,
    pub version_name: String,
    pub tab_id: i64,
    pub tracker_row: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedVersion {
    pub project_id: String,
    pub spreadsheet_id: String,
    pub version_name: String,
    pub tab_id: i64,
    /// False when the tab existed but the tracker never recorded it.
    pub tracker_updated: bool,
}

fn required(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TakeoffError::Invalid("sheet name is required".into()));
    }
    Ok(name)
}

impl TakeoffEngine {
    fn is_reserved_tab(&self, title: &str) -> bool {
        self.config.version.is_protected(title)
            || title.eq_ignore_ascii_case(&self.config.version.template_tab)
    }

    fn version_tabs<'a>(&self, tabs: &'a [TabInfo]) -> Vec<&'a TabInfo> {
        tabs.iter().filter(|t| !self.is_reserved_tab(&t.title)).collect()
    }

    pub async fn list_versions(&self, project_id: &str) -> Result<VersionList> {
        let project = self.resolve_project(project_id).await?;
        let sid = &project.spreadsheet_id;
        let tabs = self.sheets.list_tabs(sid).await?;

        let mut list = VersionList {
            project_id: project.project_id.clone(),
            spreadsheet_id: sid.clone(),
            spreadsheet_url: spreadsheet_url(sid),
            versions: Vec::new(),
            active: None,
            tab_count: tabs.len(),
            no_setup_tab: find_tab(&tabs, &self.config.setup.tab).is_none(),
        };
        if list.no_setup_tab {
            return Ok(list);
        }

        let tracker = self.read_tracker(sid).await?;
        list.active = tracker.active().map(|e| e.sheet_name.clone());
        list.versions = tracker
            .entries()
            .iter()
            .map(|entry| VersionInfo {
                exists_as_tab: find_tab(&tabs, &entry.sheet_name).is_some(),
                entry: entry.clone(),
            })
            .collect();
        Ok(list)
    }

    /// Make `name` the only active tracker entry.
    pub async fn set_active_version(&self, project_id: &str, name: &str) -> Result<TrackerEntry> {
        let name = required(name)?;
        let project = self.resolve_project(project_id).await?;
        let sid = &project.spreadsheet_id;
        let lock = self.lock_for(sid);
        let _guard = lock.lock().await;

        let tracker = self.read_tracker(sid).await?;
        let writes = tracker.plan_set_active(name)?;
        let mut entry = tracker
            .find(name)
            .cloned()
            .ok_or_else(|| TakeoffError::VersionNotFound(name.to_string()))?;
        if !writes.is_empty() {
            self.sheets.write_ranges(sid, &writes).await?;
        }
        entry.active = true;

        info!(
            project_id = %project.project_id,
            spreadsheet_id = %sid,
            version = %entry.sheet_name,
            "active version changed"
        );
        self.ledger.publish(LedgerEvent::ActiveChanged {
            project_id: project.project_id.clone(),
            sheet_name: entry.sheet_name.clone(),
        });
        Ok(entry)
    }

    pub async fn update_version_status(
        &self,
        project_id: &str,
        name: &str,
        status: &str,
    ) -> Result<TrackerEntry> {
        let name = required(name)?;
        let project = self.resolve_project(project_id).await?;
        let sid = &project.spreadsheet_id;
        let lock = self.lock_for(sid);
        let _guard = lock.lock().await;

        let tracker = self.read_tracker(sid).await?;
        let writes = tracker.plan_status(name, status)?;
        let mut entry = tracker
            .find(name)
            .cloned()
            .ok_or_else(|| TakeoffError::VersionNotFound(name.to_string()))?;
        self.sheets.write_ranges(sid, &writes).await?;
        entry.status = status.trim().to_string();

        info!(
            project_id = %project.project_id,
            spreadsheet_id = %sid,
            version = %entry.sheet_name,
            status = %entry.status,
            "version status updated"
        );
        self.ledger.publish(LedgerEvent::StatusChanged {
            project_id: project.project_id.clone(),
            sheet_name: entry.sheet_name.clone(),
            status: entry.status.clone(),
        });
        Ok(entry)
    }

    /// Duplicate an existing version tab under a fresh name. The copy keeps
    /// the source's values but starts with zero counts in the tracker.
    pub async fn copy_version(&self, project_id: &str, source: &str) -> Result<CopiedVersion> {
        let source = required(source)?;
        if self.is_reserved_tab(source) {
            return Err(TakeoffError::Invalid(format!(
                "'{source}' is not a version tab"
            )));
        }
        let project = self.resolve_project(project_id).await?;
        let sid = &project.spreadsheet_id;
        let lock = self.lock_for(sid);
        let _guard = lock.lock().await;

        let tabs = self.sheets.list_tabs(sid).await?;
        let source_tab = find_tab(&tabs, source)
            .ok_or_else(|| TakeoffError::TabNotFound(source.to_string()))?
            .clone();
        let tracker = self.read_tracker(sid).await?;
        tracker.ensure_capacity()?;

        let today = self.clock.today();
        let name = self
            .namer
            .next(sid, today, &tab_titles(&tabs), &tracker.names())?;
        let new_tab = self.sheets.duplicate_tab(sid, source_tab.id).await?;
        self.sheets.rename_tab(sid, new_tab.id, &name).await?;

        let (entry, writes) = tracker.plan_append(NewEntry {
            sheet_name: name.clone(),
            created: today.format("%Y-%m-%d").to_string(),
            items_count: 0,
            locations_count: 0,
            status: self.config.version.tracker_status.clone(),
        })?;
        self.sheets.write_ranges(sid, &writes).await?;

        info!(
            project_id = %project.project_id,
            spreadsheet_id = %sid,
            source = %source_tab.title,
            version = %name,
            "version copied"
        );
        self.ledger.publish(LedgerEvent::VersionCreated(VersionRecord {
            project_id: project.project_id.clone(),
            sheet_name: name.clone(),
            created_at: self.clock.now(),
            items_count: 0,
            locations_count: 0,
            status: self.config.version.ledger_status.clone(),
            is_active: true,
            copied_from: Some(source_tab.title.clone()),
        }));

        Ok(CopiedVersion {
            project_id: project.project_id.clone(),
            spreadsheet_id: sid.clone(),
            source: source_tab.title,
            version_name: name,
            tab_id: new_tab.id,
            tracker_row: entry.row,
        })
    }

    /// Delete a version tab. The tracker entry is marked deleted, never
    /// cleared, so the name is not reused.
    pub async fn delete_version(
        &self,
        project_id: &str,
        name: &str,
        force: bool,
    ) -> Result<DeletedVersion> {
        let name = required(name)?;
        if self.is_reserved_tab(name) {
            return Err(TakeoffError::ProtectedTab(name.to_string()));
        }
        let project = self.resolve_project(project_id).await?;
        let sid = &project.spreadsheet_id;
        let lock = self.lock_for(sid);
        let _guard = lock.lock().await;

        let tabs = self.sheets.list_tabs(sid).await?;
        let tab = find_tab(&tabs, name)
            .ok_or_else(|| TakeoffError::TabNotFound(name.to_string()))?
            .clone();

        if !force && self.has_location_data(&project, &tab.title).await? {
            return Err(TakeoffError::VersionHasData(tab.title));
        }
        if self.version_tabs(&tabs).len() <= 1 {
            return Err(TakeoffError::LastVersionTab);
        }

        self.sheets.delete_tab(sid, tab.id).await?;

        let tracker = self.read_tracker(sid).await?;
        let tracker_updated = match tracker.plan_retire(&tab.title) {
            Ok(writes) => {
                self.sheets.write_ranges(sid, &writes).await?;
                true
            }
            Err(TakeoffError::VersionNotFound(_)) => {
                warn!(
                    project_id = %project.project_id,
                    spreadsheet_id = %sid,
                    version = %tab.title,
                    "deleted tab had no tracker entry"
                );
                false
            }
            Err(e) => return Err(e),
        };

        info!(
            project_id = %project.project_id,
            spreadsheet_id = %sid,
            version = %tab.title,
            status = DELETED_STATUS,
            force,
            "version deleted"
        );
        self.ledger.publish(LedgerEvent::VersionDeleted {
            project_id: project.project_id.clone(),
            sheet_name: tab.title.clone(),
        });
        self.invalidate_setup(sid);

        Ok(DeletedVersion {
            project_id: project.project_id.clone(),
            spreadsheet_id: sid.clone(),
            version_name: tab.title,
            tab_id: tab.id,
            tracker_updated,
        })
    }

    /// Whether the tab holds measurements: any non-zero number in the data
    /// probe range. Toggles and header text do not count.
    async fn has_location_data(&self, project: &ResolvedProject, tab: &str) -> Result<bool> {
        let range = tab_range(tab, &self.config.version.data_probe);
        let grid = self.sheets.read_range(&project.spreadsheet_id, &range).await?;
        Ok(grid
            .iter()
            .flatten()
            .any(|c| matches!(c, CellValue::Number(n) if *n != 0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TakeoffConfig;
    use crate::error::ErrorKind;
    use crate::ledger::spawn_ledger;
    use crate::project::Project;
    use crate::testing::{
        takeoff_workbook, ManualClock, MemoryLedger, MemoryProjectStore, MemorySpreadsheet,
    };
    use chrono::TimeZone;
    use std::sync::Arc;

    fn engine_for(sheet: Arc<MemorySpreadsheet>) -> TakeoffEngine {
        let mut p = Project::new("p1", "Smith Residence");
        p.spreadsheet_id = Some("s1".into());
        let clock = ManualClock::new(chrono::Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap());
        TakeoffEngine::new(
            TakeoffConfig::default(),
            sheet,
            Arc::new(MemoryProjectStore::with([p])),
        )
        .with_clock(Arc::new(clock))
    }

    #[tokio::test]
    async fn lists_tracker_entries_with_tab_presence() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        sheet.set_cell("Setup", "B75", CellValue::text("12-01-2025"));
        sheet.set_cell("Setup", "F75", CellValue::text(DELETED_STATUS));
        let engine = engine_for(sheet);

        let list = engine.list_versions("p1").await.unwrap();
        assert_eq!(list.tab_count, 4);
        assert!(!list.no_setup_tab);
        assert_eq!(list.active.as_deref(), Some("01-10-2026"));
        let names: Vec<_> = list
            .versions
            .iter()
            .map(|v| (v.entry.sheet_name.as_str(), v.exists_as_tab))
            .collect();
        assert_eq!(names, vec![("01-10-2026", true), ("12-01-2025", false)]);
        assert_eq!(
            list.spreadsheet_url,
            "https://docs.google.com/spreadsheets/d/s1/edit"
        );
    }

    #[tokio::test]
    async fn missing_setup_tab_is_reported_not_failed() {
        let sheet = Arc::new(MemorySpreadsheet::new("s1"));
        sheet.add_tab("DATE");
        let engine = engine_for(sheet);
        let list = engine.list_versions("p1").await.unwrap();
        assert!(list.no_setup_tab);
        assert!(list.versions.is_empty());
        assert_eq!(list.tab_count, 1);
    }

    #[tokio::test]
    async fn activation_leaves_exactly_one_active_entry() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        let engine = engine_for(sheet.clone());
        engine.create_version("p1").await.unwrap();

        let entry = engine.set_active_version("p1", "01-10-2026").await.unwrap();
        assert!(entry.active);
        assert_eq!(entry.row, 74);
        let list = engine.list_versions("p1").await.unwrap();
        let active: Vec<_> = list.versions.iter().filter(|v| v.entry.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].entry.sheet_name, "01-10-2026");
    }

    #[tokio::test]
    async fn activating_unknown_or_deleted_version_fails() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        sheet.set_cell("Setup", "B75", CellValue::text("12-01-2025"));
        sheet.set_cell("Setup", "F75", CellValue::text(DELETED_STATUS));
        let engine = engine_for(sheet);

        let err = engine.set_active_version("p1", "nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = engine.set_active_version("p1", "12-01-2025").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = engine.set_active_version("p1", "  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn status_update_writes_tracker_and_ledger() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        let ledger = Arc::new(MemoryLedger::new());
        let (publisher, handle) = spawn_ledger(ledger.clone());
        let engine = engine_for(sheet.clone()).with_ledger(publisher);

        let entry = engine
            .update_version_status("p1", "01-10-2026", " Approved ")
            .await
            .unwrap();
        assert_eq!(entry.status, "Approved");
        assert_eq!(sheet.cell("Setup", "F74"), CellValue::text("Approved"));

        let err = engine
            .update_version_status("p1", "missing", "Approved")
            .await
            .unwrap_err();
        assert!(matches!(err, TakeoffError::VersionNotFound(_)));

        drop(engine);
        handle.await.unwrap();
        assert_eq!(
            ledger.events(),
            vec![LedgerEvent::StatusChanged {
                project_id: "p1".into(),
                sheet_name: "01-10-2026".into(),
                status: "Approved".into(),
            }]
        );
    }

    #[tokio::test]
    async fn copy_duplicates_values_with_zero_counts() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        let engine = engine_for(sheet.clone());

        let copied = engine.copy_version("p1", "01-10-2026").await.unwrap();
        assert_eq!(copied.version_name, "01-15-2026");
        assert_eq!(copied.tracker_row, 75);
        assert_eq!(sheet.cell("01-15-2026", "G4"), CellValue::Number(1250.0));
        assert_eq!(sheet.cell("Setup", "D75"), CellValue::Number(0.0));
        assert_eq!(sheet.cell("Setup", "A75"), CellValue::Bool(true));
        assert_eq!(sheet.cell("Setup", "A74"), CellValue::Bool(false));
    }

    #[tokio::test]
    async fn copy_rejects_reserved_and_missing_tabs() {
        let engine = engine_for(Arc::new(takeoff_workbook("s1")));
        let err = engine.copy_version("p1", "Setup").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = engine.copy_version("p1", "DATE").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = engine.copy_version("p1", "02-02-2026").await.unwrap_err();
        assert!(matches!(err, TakeoffError::TabNotFound(_)));
    }

    #[tokio::test]
    async fn delete_refuses_protected_tabs() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        let engine = engine_for(sheet.clone());
        for tab in ["Setup", "library", "DATE"] {
            let err = engine.delete_version("p1", tab, true).await.unwrap_err();
            assert!(matches!(err, TakeoffError::ProtectedTab(_)), "{tab}");
        }
        assert!(sheet.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_guards_data_and_last_tab() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        let engine = engine_for(sheet.clone());

        let err = engine
            .delete_version("p1", "01-10-2026", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = engine
            .delete_version("p1", "01-10-2026", true)
            .await
            .unwrap_err();
        assert!(matches!(err, TakeoffError::LastVersionTab));
        assert!(sheet.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_retires_tracker_entry() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        let engine = engine_for(sheet.clone());
        let created = engine.create_version("p1").await.unwrap();

        // A fresh version only holds toggles, so no force is needed.
        let deleted = engine
            .delete_version("p1", &created.version_name, false)
            .await
            .unwrap();
        assert!(deleted.tracker_updated);
        assert!(!sheet.titles().contains(&created.version_name));
        assert_eq!(sheet.cell("Setup", "A75"), CellValue::Bool(false));
        assert_eq!(sheet.cell("Setup", "F75"), CellValue::text(DELETED_STATUS));

        let list = engine.list_versions("p1").await.unwrap();
        let retired = list
            .versions
            .iter()
            .find(|v| v.entry.sheet_name == created.version_name)
            .unwrap();
        assert!(retired.entry.is_deleted());
        assert!(!retired.exists_as_tab);
    }

    #[tokio::test]
    async fn deleting_untracked_tab_still_succeeds() {
        let sheet = Arc::new(takeoff_workbook("s1"));
        sheet.add_tab("scratch");
        let engine = engine_for(sheet.clone());
        let deleted = engine.delete_version("p1", "Scratch", false).await.unwrap();
        assert_eq!(deleted.version_name, "scratch");
        assert!(!deleted.tracker_updated);
    }
}
