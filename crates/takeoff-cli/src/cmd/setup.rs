use super::with_engine;
use crate::output::{print_json, print_table};
use crate::root::ConfigSource;

pub fn run(source: &ConfigSource, project: &str, json: bool) -> anyhow::Result<()> {
    let summary = with_engine(source, |engine| async move {
        engine.setup_summary(project).await.map_err(anyhow::Error::from)
    })?;

    if json {
        return print_json(&summary);
    }

    println!(
        "{} item(s) across {} location(s), {} tool(s)",
        summary.items_count, summary.locations_count, summary.tool_count
    );
    if !summary.active_locations.is_empty() {
        let names: Vec<String> = summary
            .active_locations
            .iter()
            .map(|l| format!("{} {}", l.letter, l.name))
            .collect();
        println!("Locations: {}", names.join(", "));
    }
    if summary.items.is_empty() {
        return Ok(());
    }
    println!();
    let rows = summary
        .items
        .iter()
        .map(|i| {
            vec![
                i.row.to_string(),
                i.item_id.clone(),
                i.section.clone(),
                i.scope.clone(),
                i.locations.join(", "),
            ]
        })
        .collect();
    print_table(&["ROW", "ITEM", "SECTION", "SCOPE", "LOCATIONS"], rows);
    Ok(())
}
