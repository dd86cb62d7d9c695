use super::with_engine;
use crate::output::{print_json, print_table};
use crate::root::ConfigSource;

pub fn run(source: &ConfigSource, project: &str, bundles: bool, json: bool) -> anyhow::Result<()> {
    let report = with_engine(source, |engine| async move {
        engine.generate_tools(project, bundles).await.map_err(anyhow::Error::from)
    })?;

    if json {
        return print_json(&report);
    }

    if let Some(bundles) = &report.bundles {
        let rows = bundles
            .iter()
            .map(|b| {
                vec![
                    b.letter.clone(),
                    b.location.clone(),
                    b.tools.len().to_string(),
                    b.file_name.clone(),
                ]
            })
            .collect();
        print_table(&["COL", "LOCATION", "TOOLS", "FILE"], rows);
    } else {
        let rows = report
            .plan
            .tools
            .iter()
            .map(|t| vec![t.label.clone(), t.subject.clone(), t.uom.clone()])
            .collect();
        print_table(&["LABEL", "SUBJECT", "UOM"], rows);
    }
    println!(
        "\n{} tool(s) for {} across {} location(s)",
        report.tool_count,
        report.project_name,
        report.plan.locations.len()
    );
    Ok(())
}
