//! Bluebeam (BTX) tool generation: one tool per active item per location it
//! is toggled on for, grouped into per-location bundles.

use crate::a1::column_letter;
use crate::error::{Result, TakeoffError};
use crate::layout::SheetLayout;
use crate::toggles::ScopeItemRow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Styles / catalog
// ---------------------------------------------------------------------------

/// Display metadata for a tool. Passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
}

#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Styles for the given item ids. Items without a style are omitted.
    async fn styles(&self, item_ids: &[String]) -> Result<HashMap<String, ToolStyle>>;
}

/// A catalog loaded once from a YAML map of item id to style.
#[derive(Debug, Clone, Default)]
pub struct StaticToolCatalog {
    styles: HashMap<String, ToolStyle>,
}

impl StaticToolCatalog {
    pub fn new(styles: HashMap<String, ToolStyle>) -> Self {
        Self { styles }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let styles: HashMap<String, ToolStyle> = serde_yaml::from_str(&data)?;
        Ok(Self::new(styles))
    }

    pub fn load_or_empty(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

#[async_trait]
impl ToolCatalog for StaticToolCatalog {
    async fn styles(&self, item_ids: &[String]) -> Result<HashMap<String, ToolStyle>> {
        Ok(item_ids
            .iter()
            .filter_map(|id| self.styles.get(id).map(|s| (id.clone(), s.clone())))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Units / plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUnit {
    pub label: String,
    pub item_id: String,
    pub section: String,
    pub location: String,
    pub column: usize,
    pub letter: String,
    /// `ITEM | LOCATION`, split on ` | ` by the importer.
    pub subject: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub uom: String,
    pub style: ToolStyle,
}

/// A location as the bundles see it: one column under one name. The same
/// column named differently by two sections is two global locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalLocation {
    pub column: usize,
    pub letter: String,
    pub name: String,
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BtxBundle {
    pub location: String,
    pub column: usize,
    pub letter: String,
    pub file_name: String,
    pub tools: Vec<ToolUnit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolPlan {
    pub tools: Vec<ToolUnit>,
    pub locations: Vec<GlobalLocation>,
}

impl ToolPlan {
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn bundles(&self, project_name: &str) -> Vec<BtxBundle> {
        self.locations
            .iter()
            .map(|loc| BtxBundle {
                location: loc.name.clone(),
                column: loc.column,
                letter: loc.letter.clone(),
                file_name: bundle_file_name(project_name, &loc.name),
                tools: self
                    .tools
                    .iter()
                    .filter(|t| t.column == loc.column && t.location == loc.name)
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}

pub fn tool_subject(item_id: &str, location: &str) -> String {
    format!("{item_id} | {location}")
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `Smith Residence`, `2nd Floor` -> `Smith_Residence_2nd_Floor_Tools.btx`
pub fn bundle_file_name(project_name: &str, location: &str) -> String {
    format!("{}_{}_Tools.btx", sanitize(project_name), sanitize(location))
}

/// Build one tool per (active item, toggled location). Each item draws its
/// location names from its own section, so differently named sections never
/// leak names into each other.
pub fn generate_tools(
    items: &[ScopeItemRow],
    layout: &SheetLayout,
    styles: &HashMap<String, ToolStyle>,
) -> Result<ToolPlan> {
    let mut plan = ToolPlan::default();
    for item in items.iter().filter(|i| i.has_any_toggle) {
        let section = layout
            .section(&item.section)
            .ok_or_else(|| TakeoffError::MissingSectionLayout(item.section.clone()))?;
        let style = styles.get(&item.item_id).cloned().unwrap_or_default();
        let label = style
            .label
            .clone()
            .filter(|l| !l.trim().is_empty())
            .or_else(|| Some(item.tool_name.clone()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| item.item_id.clone());

        for loc in item.active_locations(section) {
            match plan
                .locations
                .iter_mut()
                .find(|g| g.column == loc.index && g.name == loc.name)
            {
                Some(global) => {
                    if !global.sections.contains(&section.id) {
                        global.sections.push(section.id.clone());
                    }
                }
                None => plan.locations.push(GlobalLocation {
                    column: loc.index,
                    letter: column_letter(loc.index),
                    name: loc.name.clone(),
                    sections: vec![section.id.clone()],
                }),
            }
            plan.tools.push(ToolUnit {
                label: label.clone(),
                item_id: item.item_id.clone(),
                section: section.id.clone(),
                location: loc.name.clone(),
                column: loc.index,
                letter: loc.letter.clone(),
                subject: tool_subject(&item.item_id, &loc.name),
                uom: item.uom.clone(),
                style: style.clone(),
            });
        }
    }
    plan.locations.sort_by_key(|g| g.column);
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use crate::layout::{LocationColumn, Section};
    use tempfile::TempDir;

    fn loc(index: usize, name: &str) -> LocationColumn {
        LocationColumn {
            index,
            letter: column_letter(index),
            name: name.to_string(),
        }
    }

    fn item(id: &str, section: &str, toggles: &[bool]) -> ScopeItemRow {
        ScopeItemRow {
            row: 4,
            item_id: id.to_string(),
            section: section.to_string(),
            scope: String::new(),
            unit_cost: CellValue::Empty,
            r_value: CellValue::Empty,
            thickness: CellValue::Empty,
            material_type: CellValue::Empty,
            uom: "SF".to_string(),
            bid_type: CellValue::Empty,
            tool_name: String::new(),
            toggles: toggles.to_vec(),
            has_any_toggle: toggles.iter().any(|t| *t),
        }
    }

    fn layout() -> SheetLayout {
        SheetLayout {
            sections: vec![
                Section::new("ROOFING", 3, 35).with_locations(vec![
                    loc(0, "1st Floor"),
                    loc(1, "2nd Floor"),
                    loc(2, "Roof"),
                ]),
                Section::new("BALCONIES", 40, 48).with_locations(vec![
                    loc(0, "Front"),
                    loc(1, "Rear Elevation"),
                ]),
            ],
        }
    }

    #[test]
    fn tool_count_is_sum_of_on_toggles() {
        let items = vec![
            item("A", "ROOFING", &[true, false, true]),
            item("B", "ROOFING", &[false, false, false]),
            item("C", "ROOFING", &[true, true, true]),
        ];
        let plan = generate_tools(&items, &layout(), &HashMap::new()).unwrap();
        assert_eq!(plan.tool_count(), 5);
        assert!(plan.tools.iter().all(|t| t.item_id != "B"));
    }

    #[test]
    fn section_names_stay_separate_at_one_column() {
        let items = vec![
            item("MR-001", "ROOFING", &[false, true, false]),
            item("MR-030", "BALCONIES", &[false, true]),
        ];
        let plan = generate_tools(&items, &layout(), &HashMap::new()).unwrap();
        let names: Vec<_> = plan
            .locations
            .iter()
            .map(|g| (g.column, g.name.as_str()))
            .collect();
        assert_eq!(names, vec![(1, "2nd Floor"), (1, "Rear Elevation")]);

        let bundles = plan.bundles("Smith Residence");
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].tools.len(), 1);
        assert_eq!(bundles[0].tools[0].item_id, "MR-001");
        assert_eq!(bundles[1].tools[0].subject, "MR-030 | Rear Elevation");
        assert_eq!(bundles[1].file_name, "Smith_Residence_Rear_Elevation_Tools.btx");
    }

    #[test]
    fn active_item_without_locations_yields_no_tools() {
        let layout = SheetLayout {
            sections: vec![
                Section::new("ROOFING", 3, 35),
                Section::new("BALCONIES", 40, 48).with_locations(vec![loc(6, "Rear Elevation")]),
            ],
        };
        let active = item("A", "ROOFING", &[true]);
        assert!(active.has_any_toggle);
        let plan = generate_tools(
            &[active, item("B", "BALCONIES", &[true])],
            &layout,
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(plan.tool_count(), 1);
        assert!(plan.tools.iter().all(|t| t.item_id == "B"));
        assert_eq!(plan.locations.len(), 1);
        assert_eq!(plan.locations[0].sections, vec!["BALCONIES"]);
    }

    #[test]
    fn missing_section_layout_is_an_error() {
        let err = generate_tools(&[item("A", "EXTERIOR", &[true])], &layout(), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, TakeoffError::MissingSectionLayout(s) if s == "EXTERIOR"));
    }

    #[test]
    fn labels_fall_back_to_tool_name_then_item_id() {
        let mut named = item("MR-002", "ROOFING", &[true]);
        named.tool_name = "Insulation".into();
        let styles = HashMap::from([(
            "MR-003".to_string(),
            ToolStyle {
                label: Some("Membrane".into()),
                color: Some("#FF0000".into()),
                ..Default::default()
            },
        )]);
        let items = vec![
            item("MR-001", "ROOFING", &[true]),
            named,
            item("MR-003", "ROOFING", &[true]),
        ];
        let plan = generate_tools(&items, &layout(), &styles).unwrap();
        let labels: Vec<_> = plan.tools.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["MR-001", "Insulation", "Membrane"]);
        assert_eq!(plan.tools[2].style.color.as_deref(), Some("#FF0000"));
    }

    #[tokio::test]
    async fn static_catalog_loads_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tools.yaml");
        std::fs::write(
            &path,
            "MR-001VB:\n  label: Vapor Barrier\n  color: \"#00FF00\"\n  line_width: 2\n",
        )
        .unwrap();
        let catalog = StaticToolCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        let styles = catalog
            .styles(&["MR-001VB".to_string(), "MR-999".to_string()])
            .await
            .unwrap();
        assert_eq!(styles.len(), 1);
        assert_eq!(styles["MR-001VB"].line_width, Some(2.0));
    }
}
