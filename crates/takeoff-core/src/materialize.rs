//! Creating a new version tab from the template.
//!
//! Steps run strictly in order. Any failure before the formula check, or in
//! hiding or tracker recording, aborts with the failing step attached. The
//! formula check is advisory and the ledger mirror is fire-and-forget.
//! Nothing is rolled back: a failure after duplication leaves the partial tab
//! in place for inspection.

use crate::a1::{cell_ref, column_letter, tab_range};
use crate::cell::CellValue;
use crate::config::VersionConfig;
use crate::engine::{ResolvedProject, TakeoffEngine};
use crate::error::{Result, TakeoffError};
use crate::ledger::LedgerEvent;
use crate::project::VersionRecord;
use crate::setup::SetupConfig;
use crate::sheets::{find_tab, tab_titles, ValueRange};
use crate::tracker::NewEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ResolveProject,
    NameVersion,
    ReadSetup,
    DuplicateTemplate,
    RenameTab,
    TransferSetup,
    VerifyFormulas,
    HideRows,
    HideColumns,
    RecordTracker,
    MirrorLedger,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::ResolveProject => "resolve project",
            Step::NameVersion => "name version",
            Step::ReadSetup => "read setup",
            Step::DuplicateTemplate => "duplicate template",
            Step::RenameTab => "rename tab",
            Step::TransferSetup => "transfer setup",
            Step::VerifyFormulas => "verify formulas",
            Step::HideRows => "hide rows",
            Step::HideColumns => "hide columns",
            Step::RecordTracker => "record tracker",
            Step::MirrorLedger => "mirror ledger",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaVerification {
    pub checked: bool,
    pub has_formulas: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedVersion {
    pub project_id: String,
    pub spreadsheet_id: String,
    pub version_name: String,
    pub tab_id: i64,
    pub items_count: usize,
    pub locations_count: usize,
    pub hidden_rows: Vec<u32>,
    pub hidden_columns: Vec<String>,
    pub rows_hidden: usize,
    pub columns_hidden: usize,
    pub tracker_row: u32,
    pub formula_verification: FormulaVerification,
}

/// Cell writes that carry the Setup selection onto a version tab: the
/// project name, each item's metadata on its own row, and `TRUE` for every
/// toggle that is on.
pub fn transfer_writes(
    tab: &str,
    setup: &SetupConfig,
    cfg: &VersionConfig,
    project_name: &str,
) -> Vec<ValueRange> {
    let mut writes = vec![ValueRange::cell(
        tab_range(tab, &cfg.project_name_cell),
        CellValue::text(project_name),
    )];
    let cols = &cfg.columns;
    for item in &setup.rows {
        let fields = [
            (cols.unit_cost, item.unit_cost.clone()),
            (cols.scope, CellValue::text(&item.scope)),
            (cols.r_value, item.r_value.clone()),
            (cols.thickness, item.thickness.clone()),
            (cols.material_type, item.material_type.clone()),
            (cols.bid_type, item.bid_type.clone()),
        ];
        for (col, value) in fields {
            if value.is_blank() {
                continue;
            }
            writes.push(ValueRange::cell(
                tab_range(tab, &cell_ref(col.index(), item.row)),
                value,
            ));
        }
        if !cfg.transfer_toggles {
            continue;
        }
        if let Some(section) = setup.layout.section(&item.section) {
            for loc in item.active_locations(section) {
                writes.push(ValueRange::cell(
                    tab_range(tab, &cell_ref(loc.index, item.row)),
                    CellValue::Bool(true),
                ));
            }
        }
    }
    writes
}

/// Log a failed step and attach it to the error.
fn failed(project: &ResolvedProject, step: Step) -> impl FnOnce(TakeoffError) -> TakeoffError + '_ {
    move |e| {
        error!(
            project_id = %project.project_id,
            spreadsheet_id = %project.spreadsheet_id,
            step = %step,
            error = %e,
            "version creation failed"
        );
        e.at(step)
    }
}

fn done(project: &ResolvedProject, step: Step) {
    info!(
        project_id = %project.project_id,
        spreadsheet_id = %project.spreadsheet_id,
        step = %step,
        "step complete"
    );
}

impl TakeoffEngine {
    /// Materialize a new version tab for a project.
    pub async fn create_version(&self, project_id: &str) -> Result<CreatedVersion> {
        let project = self.resolve_project(project_id).await.map_err(|e| {
            error!(project_id, step = %Step::ResolveProject, error = %e, "version creation failed");
            e.at(Step::ResolveProject)
        })?;
        done(&project, Step::ResolveProject);
        let sid = project.spreadsheet_id.as_str();
        let cfg = &self.config;

        let lock = self.lock_for(sid);
        let _guard = lock.lock().await;

        // 2. name
        let tabs = self
            .sheets
            .list_tabs(sid)
            .await
            .map_err(failed(&project, Step::NameVersion))?;
        let tracker = self
            .read_tracker(sid)
            .await
            .map_err(failed(&project, Step::NameVersion))?;
        tracker
            .ensure_capacity()
            .map_err(failed(&project, Step::NameVersion))?;
        let today = self.clock.today();
        let name = self
            .namer
            .next(sid, today, &tab_titles(&tabs), &tracker.names())
            .map_err(failed(&project, Step::NameVersion))?;
        info!(
            project_id = %project.project_id,
            spreadsheet_id = %sid,
            step = %Step::NameVersion,
            version = %name,
            "step complete"
        );

        // 3. setup
        let setup = self
            .read_setup_config(sid)
            .await
            .map_err(failed(&project, Step::ReadSetup))?;
        done(&project, Step::ReadSetup);

        // 4. duplicate
        let template = find_tab(&tabs, &cfg.version.template_tab)
            .ok_or_else(|| TakeoffError::TemplateTabMissing {
                tab: cfg.version.template_tab.clone(),
                available: tab_titles(&tabs).join(", "),
            })
            .map_err(failed(&project, Step::DuplicateTemplate))?;
        let new_tab = self
            .sheets
            .duplicate_tab(sid, template.id)
            .await
            .map_err(failed(&project, Step::DuplicateTemplate))?;
        done(&project, Step::DuplicateTemplate);

        // 5. rename
        self.sheets
            .rename_tab(sid, new_tab.id, &name)
            .await
            .map_err(failed(&project, Step::RenameTab))?;
        done(&project, Step::RenameTab);

        // 6. transfer
        let writes = transfer_writes(&name, &setup, &cfg.version, &project.project_name);
        self.sheets
            .write_ranges(sid, &writes)
            .await
            .map_err(failed(&project, Step::TransferSetup))?;
        done(&project, Step::TransferSetup);

        // 7. verify (advisory)
        let formula_verification = self.verify_formulas(&project, &name).await;

        // 8, 9. hide
        let hidden_rows = setup.hidden_rows();
        self.sheets
            .hide_rows(sid, new_tab.id, &hidden_rows)
            .await
            .map_err(failed(&project, Step::HideRows))?;
        done(&project, Step::HideRows);

        let hidden_columns = setup.hidden_columns();
        self.sheets
            .hide_columns(sid, new_tab.id, &hidden_columns)
            .await
            .map_err(failed(&project, Step::HideColumns))?;
        done(&project, Step::HideColumns);

        // 10. tracker
        let items_count = setup.items_count();
        let locations_count = setup.locations_count();
        let (entry, tracker_writes) = tracker
            .plan_append(NewEntry {
                sheet_name: name.clone(),
                created: today.format("%Y-%m-%d").to_string(),
                items_count: items_count as u32,
                locations_count: locations_count as u32,
                status: cfg.version.tracker_status.clone(),
            })
            .map_err(failed(&project, Step::RecordTracker))?;
        self.sheets
            .write_ranges(sid, &tracker_writes)
            .await
            .map_err(failed(&project, Step::RecordTracker))?;
        done(&project, Step::RecordTracker);

        // 11. ledger
        self.ledger.publish(LedgerEvent::VersionCreated(VersionRecord {
            project_id: project.project_id.clone(),
            sheet_name: name.clone(),
            created_at: self.clock.now(),
            items_count: items_count as u32,
            locations_count: locations_count as u32,
            status: cfg.version.ledger_status.clone(),
            is_active: true,
            copied_from: None,
        }));
        done(&project, Step::MirrorLedger);

        self.invalidate_setup(sid);
        info!(
            project_id = %project.project_id,
            spreadsheet_id = %sid,
            version = %name,
            items = items_count,
            locations = locations_count,
            "version created"
        );

        Ok(CreatedVersion {
            project_id: project.project_id.clone(),
            spreadsheet_id: sid.to_string(),
            version_name: name,
            tab_id: new_tab.id,
            items_count,
            locations_count,
            rows_hidden: hidden_rows.len(),
            columns_hidden: hidden_columns.len(),
            hidden_rows,
            hidden_columns: hidden_columns.iter().map(|c| column_letter(*c)).collect(),
            tracker_row: entry.row,
            formula_verification,
        })
    }

    async fn verify_formulas(&self, project: &ResolvedProject, tab: &str) -> FormulaVerification {
        let range = tab_range(tab, &self.config.version.formula_probe);
        match self.sheets.read_formulas(&project.spreadsheet_id, &range).await {
            Ok(grid) => {
                let sample = grid.iter().flatten().find(|c| c.is_formula());
                if sample.is_none() {
                    warn!(
                        project_id = %project.project_id,
                        spreadsheet_id = %project.spreadsheet_id,
                        step = %Step::VerifyFormulas,
                        range = %range,
                        "no formulas found in probe range"
                    );
                } else {
                    done(project, Step::VerifyFormulas);
                }
                FormulaVerification {
                    checked: true,
                    has_formulas: sample.is_some(),
                    sample_formula: sample.map(CellValue::as_text),
                    error: None,
                }
            }
            Err(e) => {
                warn!(
                    project_id = %project.project_id,
                    spreadsheet_id = %project.spreadsheet_id,
                    step = %Step::VerifyFormulas,
                    error = %e,
                    "formula check skipped"
                );
                FormulaVerification {
                    checked: false,
                    has_formulas: false,
                    sample_formula: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
