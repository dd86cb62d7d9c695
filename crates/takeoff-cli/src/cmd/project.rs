use crate::output::{or_dash, print_json, print_table};
use crate::root::ConfigSource;
use anyhow::{bail, Context};
use clap::Subcommand;
use takeoff_core::project::{Project, ProjectPatch, SqliteProjectStore};
use takeoff_core::TakeoffError;

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Register a project
    Add {
        id: String,
        #[arg(long)]
        name: String,
        /// Takeoff spreadsheet id
        #[arg(long)]
        spreadsheet: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },

    /// Update a project's name, spreadsheet or status
    Set {
        id: String,
        #[arg(long)]
        name: Option<String>,
        /// Takeoff spreadsheet id ("" clears it)
        #[arg(long)]
        spreadsheet: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },

    /// Show a project and its recorded versions
    Show { id: String },

    /// List all projects
    List,
}

pub fn run(source: &ConfigSource, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    let config = source.load()?;
    let store = SqliteProjectStore::open(&config.store.path)
        .with_context(|| format!("failed to open {}", config.store.path.display()))?;

    match subcmd {
        ProjectSubcommand::Add {
            id,
            name,
            spreadsheet,
            status,
        } => add(&store, id, name, spreadsheet, status, json),
        ProjectSubcommand::Set {
            id,
            name,
            spreadsheet,
            status,
        } => set(
            &store,
            &id,
            ProjectPatch {
                name,
                spreadsheet_id: spreadsheet,
                status,
            },
            json,
        ),
        ProjectSubcommand::Show { id } => show(&store, &id, json),
        ProjectSubcommand::List => list(&store, json),
    }
}

fn add(
    store: &SqliteProjectStore,
    id: String,
    name: String,
    spreadsheet: Option<String>,
    status: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    if id.trim().is_empty() {
        bail!("project id must not be empty");
    }
    if store.find_project(&id)?.is_some() {
        bail!("project '{id}' already exists");
    }
    let mut project = Project::new(id, name);
    project.spreadsheet_id = spreadsheet.filter(|s| !s.trim().is_empty());
    if let Some(status) = status {
        project.status = status;
    }
    store
        .insert_project(&project)
        .with_context(|| format!("failed to add project '{}'", project.id))?;

    if json {
        print_json(&project)?;
    } else {
        println!("Added project '{}' ({})", project.id, project.name);
    }
    Ok(())
}

fn set(
    store: &SqliteProjectStore,
    id: &str,
    patch: ProjectPatch,
    json: bool,
) -> anyhow::Result<()> {
    if patch.is_empty() {
        bail!("nothing to update: pass --name, --spreadsheet or --status");
    }
    let project = store
        .apply_patch(id, &patch)
        .with_context(|| format!("failed to update project '{id}'"))?;

    if json {
        print_json(&project)?;
    } else {
        println!(
            "Updated project '{}': name={}, spreadsheet={}, status={}",
            project.id,
            project.name,
            or_dash(project.spreadsheet_id.as_deref()),
            project.status
        );
    }
    Ok(())
}

fn show(store: &SqliteProjectStore, id: &str, json: bool) -> anyhow::Result<()> {
    let project = store
        .find_project(id)?
        .ok_or_else(|| TakeoffError::ProjectNotFound(id.to_string()))?;
    let versions = store.versions_for(id)?;

    if json {
        print_json(&serde_json::json!({
            "project": project,
            "versions": versions,
        }))?;
        return Ok(());
    }

    println!("Project:     {}", project.id);
    println!("Name:        {}", project.name);
    println!("Spreadsheet: {}", or_dash(project.spreadsheet_id.as_deref()));
    println!("Status:      {}", project.status);
    if versions.is_empty() {
        println!("\nNo recorded versions.");
        return Ok(());
    }
    println!();
    let rows = versions
        .iter()
        .map(|v| {
            vec![
                v.sheet_name.clone(),
                v.created_at.format("%Y-%m-%d %H:%M").to_string(),
                v.items_count.to_string(),
                v.locations_count.to_string(),
                v.status.clone(),
                if v.is_active { "*".into() } else { String::new() },
                or_dash(v.copied_from.as_deref()),
            ]
        })
        .collect();
    print_table(
        &["VERSION", "CREATED", "ITEMS", "LOCATIONS", "STATUS", "ACTIVE", "COPIED FROM"],
        rows,
    );
    Ok(())
}

fn list(store: &SqliteProjectStore, json: bool) -> anyhow::Result<()> {
    let projects = store.list_projects()?;
    if json {
        print_json(&projects)?;
        return Ok(());
    }
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    let rows = projects
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.name.clone(),
                or_dash(p.spreadsheet_id.as_deref()),
                p.status.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "SPREADSHEET", "STATUS"], rows);
    Ok(())
}
