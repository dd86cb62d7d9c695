use super::with_engine;
use crate::output::{print_json, print_table};
use crate::root::ConfigSource;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum VersionSubcommand {
    /// Create a new version tab from the template and the Setup selection
    Create { project: String },

    /// List tracked versions
    List { project: String },

    /// Make a version the active one
    Activate { project: String, sheet: String },

    /// Set a version's tracker status
    Status {
        project: String,
        sheet: String,
        status: String,
    },

    /// Copy an existing version tab under a new name
    Copy { project: String, source: String },

    /// Delete a version tab; its name stays retired
    Delete {
        project: String,
        sheet: String,
        /// Delete even if the tab holds measurements
        #[arg(long)]
        force: bool,
    },
}

pub fn run(source: &ConfigSource, subcmd: VersionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        VersionSubcommand::Create { project } => create(source, &project, json),
        VersionSubcommand::List { project } => list(source, &project, json),
        VersionSubcommand::Activate { project, sheet } => {
            let entry = with_engine(source, |engine| async move {
                engine.set_active_version(&project, &sheet).await.map_err(anyhow::Error::from)
            })?;
            if json {
                print_json(&entry)?;
            } else {
                println!("Active version: {}", entry.sheet_name);
            }
            Ok(())
        }
        VersionSubcommand::Status {
            project,
            sheet,
            status,
        } => {
            let entry = with_engine(source, |engine| async move {
                engine
                    .update_version_status(&project, &sheet, &status)
                    .await
                    .map_err(anyhow::Error::from)
            })?;
            if json {
                print_json(&entry)?;
            } else {
                println!("{}: {}", entry.sheet_name, entry.status);
            }
            Ok(())
        }
        VersionSubcommand::Copy {
            project,
            source: from,
        } => {
            let copied = with_engine(source, |engine| async move {
                engine.copy_version(&project, &from).await.map_err(anyhow::Error::from)
            })?;
            if json {
                print_json(&copied)?;
            } else {
                println!(
                    "Copied '{}' to '{}' (tracker row {})",
                    copied.source, copied.version_name, copied.tracker_row
                );
            }
            Ok(())
        }
        VersionSubcommand::Delete {
            project,
            sheet,
            force,
        } => {
            let deleted = with_engine(source, |engine| async move {
                engine.delete_version(&project, &sheet, force).await.map_err(anyhow::Error::from)
            })?;
            if json {
                print_json(&deleted)?;
            } else {
                println!("Deleted '{}'", deleted.version_name);
                if !deleted.tracker_updated {
                    println!("  (tab had no tracker entry)");
                }
            }
            Ok(())
        }
    }
}

fn create(source: &ConfigSource, project: &str, json: bool) -> anyhow::Result<()> {
    let created = with_engine(source, |engine| async move {
        engine.create_version(project).await.map_err(anyhow::Error::from)
    })?;

    if json {
        return print_json(&created);
    }

    println!("Created version '{}'", created.version_name);
    println!("  Spreadsheet: {}", created.spreadsheet_id);
    println!(
        "  Items: {}  Locations: {}",
        created.items_count, created.locations_count
    );
    println!(
        "  Hidden: {} row(s), {} column(s) [{}]",
        created.rows_hidden,
        created.columns_hidden,
        created.hidden_columns.join(", ")
    );
    let fv = &created.formula_verification;
    match (&fv.error, fv.has_formulas) {
        (Some(e), _) => println!("  Formulas: not checked ({e})"),
        (None, true) => println!(
            "  Formulas: ok ({})",
            fv.sample_formula.as_deref().unwrap_or("")
        ),
        (None, false) => println!("  Formulas: none found in probe range"),
    }
    Ok(())
}

fn list(source: &ConfigSource, project: &str, json: bool) -> anyhow::Result<()> {
    let list = with_engine(source, |engine| async move {
        engine.list_versions(project).await.map_err(anyhow::Error::from)
    })?;

    if json {
        return print_json(&list);
    }
    if list.no_setup_tab {
        println!("Spreadsheet {} has no Setup tab.", list.spreadsheet_id);
        return Ok(());
    }
    if list.versions.is_empty() {
        println!("No versions.");
        return Ok(());
    }
    let rows = list
        .versions
        .iter()
        .map(|v| {
            vec![
                if v.entry.active { "*".into() } else { String::new() },
                v.entry.sheet_name.clone(),
                v.entry.created.clone(),
                v.entry.items_count.to_string(),
                v.entry.locations_count.to_string(),
                v.entry.status.clone(),
                if v.exists_as_tab { "yes".into() } else { "no".into() },
            ]
        })
        .collect();
    print_table(
        &["", "VERSION", "CREATED", "ITEMS", "LOCATIONS", "STATUS", "TAB"],
        rows,
    );
    println!("\n{} tab(s) in {}", list.tab_count, list.spreadsheet_url);
    Ok(())
}
