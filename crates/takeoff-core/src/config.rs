use crate::a1::{parse_cell, parse_cells, Column};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "takeoff.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SheetsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding an OAuth bearer token for the Sheets API.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_api_base() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_token_env() -> String {
    "GOOGLE_SHEETS_TOKEN".to_string()
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".takeoff/projects.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Setup tab
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub header_row: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpan {
    pub first: Column,
    pub last: Column,
}

impl ColumnSpan {
    pub fn contains(&self, index: usize) -> bool {
        index >= self.first.index() && index <= self.last.index()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> {
        self.first.index()..=self.last.index()
    }
}

/// Metadata columns of the Setup tab. Location toggle columns are discovered
/// from header text, not listed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupColumns {
    pub item_id: Column,
    pub unit_cost: Column,
    pub scope: Column,
    pub r_value: Column,
    pub thickness: Column,
    pub material_type: Column,
    pub uom: Column,
    pub bid_type: Column,
    pub tool_name: Column,
}

impl Default for SetupColumns {
    fn default() -> Self {
        Self {
            item_id: Column::new(0),
            unit_cost: Column::new(1),
            scope: Column::new(2),
            r_value: Column::new(3),
            thickness: Column::new(4),
            material_type: Column::new(5),
            uom: Column::new(13),
            bid_type: Column::new(14),
            tool_name: Column::new(15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupTabConfig {
    pub tab: String,
    pub sections: Vec<SectionSpec>,
    /// Last row that can hold section items (the tracker sits below).
    pub last_row: u32,
    pub last_column: Column,
    /// Columns that may hold location toggles. `None` means any
    /// non-reserved header column.
    pub location_span: Option<ColumnSpan>,
    pub columns: SetupColumns,
    /// Item identifiers must start with this prefix when set.
    pub item_prefix: Option<String>,
    pub reserved_headers: Vec<String>,
}

fn default_setup_sections() -> Vec<SectionSpec> {
    [("ROOFING", 3), ("WATERPROOFING", 36), ("BALCONIES", 40), ("EXTERIOR", 49)]
        .into_iter()
        .map(|(name, header_row)| SectionSpec {
            name: name.to_string(),
            header_row,
        })
        .collect()
}

pub fn default_reserved_headers() -> Vec<String> {
    [
        "item_id",
        "item id",
        "itemid",
        "unit cost",
        "unit_cost",
        "scope",
        "description",
        "r",
        "r-value",
        "r_value",
        "in",
        "thickness",
        "type",
        "material",
        "material_type",
        "uom",
        "bid type",
        "bid_type",
        "tool name",
        "bluebeam tool name",
        "total measurements",
        "total meas",
        "total cost",
        "row type",
        "notes",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for SetupTabConfig {
    fn default() -> Self {
        Self {
            tab: "Setup".to_string(),
            sections: default_setup_sections(),
            last_row: 70,
            last_column: Column::new(17),
            location_span: Some(ColumnSpan {
                first: Column::new(6),
                last: Column::new(12),
            }),
            columns: SetupColumns::default(),
            item_prefix: Some("MR-".to_string()),
            reserved_headers: default_reserved_headers(),
        }
    }
}

// ---------------------------------------------------------------------------
// Takeoff (version) tab scanning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeoffTabConfig {
    pub tab: String,
    pub scan_range: String,
    pub section_labels: Vec<String>,
    /// Header row assumed when scanning finds no section header.
    pub fallback_header_row: u32,
}

impl Default for TakeoffTabConfig {
    fn default() -> Self {
        Self {
            tab: "DATE".to_string(),
            scan_range: "A1:Z200".to_string(),
            section_labels: vec![
                "ROOFING".to_string(),
                "BALCONIES".to_string(),
                "EXTERIOR".to_string(),
            ],
            fallback_header_row: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Version materialization
// ---------------------------------------------------------------------------

/// Destination columns on a version tab for values copied from Setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionColumns {
    pub unit_cost: Column,
    pub scope: Column,
    pub r_value: Column,
    pub thickness: Column,
    pub material_type: Column,
    pub bid_type: Column,
}

impl Default for VersionColumns {
    fn default() -> Self {
        Self {
            unit_cost: Column::new(1),
            scope: Column::new(2),
            r_value: Column::new(3),
            thickness: Column::new(4),
            material_type: Column::new(5),
            bid_type: Column::new(15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionConfig {
    pub template_tab: String,
    /// chrono format string for the base version name.
    pub name_format: String,
    pub project_name_cell: String,
    pub columns: VersionColumns,
    pub transfer_toggles: bool,
    pub formula_probe: String,
    /// Location-cell range inspected before deleting a version.
    pub data_probe: String,
    pub protected_tabs: Vec<String>,
    pub tracker_status: String,
    pub ledger_status: String,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            template_tab: "DATE".to_string(),
            name_format: "%m-%d-%Y".to_string(),
            project_name_cell: "A2".to_string(),
            columns: VersionColumns::default(),
            transfer_toggles: true,
            formula_probe: "O4:O10".to_string(),
            data_probe: "G4:M67".to_string(),
            protected_tabs: vec!["Setup".to_string(), "Library".to_string()],
            tracker_status: "In Progress".to_string(),
            ledger_status: "Draft".to_string(),
        }
    }
}

impl VersionConfig {
    pub fn is_protected(&self, tab: &str) -> bool {
        self.protected_tabs.iter().any(|p| p.eq_ignore_ascii_case(tab))
    }
}

// ---------------------------------------------------------------------------
// Tracker / cache / tools / server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub first_row: u32,
    pub capacity: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            first_row: 74,
            capacity: 7,
        }
    }
}

impl TrackerConfig {
    pub fn last_row(&self) -> u32 {
        self.first_row + self.capacity.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub setup_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { setup_ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// YAML file mapping item ids to Bluebeam tool styles.
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3141 }
    }
}

// ---------------------------------------------------------------------------
// TakeoffConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TakeoffConfig {
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub setup: SetupTabConfig,
    #[serde(default)]
    pub takeoff: TakeoffTabConfig,
    #[serde(default)]
    pub version: VersionConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl TakeoffConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: TakeoffConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Resolve relative paths in the config against the directory holding
    /// the config file.
    pub fn rebase(mut self, base: &Path) -> Self {
        if self.store.path.is_relative() {
            self.store.path = base.join(&self.store.path);
        }
        if let Some(catalog) = self.tools.catalog.as_mut() {
            if catalog.is_relative() {
                *catalog = base.join(&*catalog);
            }
        }
        self
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.setup.sections.is_empty() {
            warn(WarnLevel::Error, "setup.sections is empty".to_string());
        }
        for pair in self.setup.sections.windows(2) {
            if pair[1].header_row <= pair[0].header_row {
                warn(
                    WarnLevel::Error,
                    format!(
                        "setup section '{}' (row {}) must come after '{}' (row {})",
                        pair[1].name, pair[1].header_row, pair[0].name, pair[0].header_row
                    ),
                );
            }
        }
        if let Some(last) = self.setup.sections.last() {
            if last.header_row >= self.setup.last_row {
                warn(
                    WarnLevel::Error,
                    format!(
                        "setup section '{}' starts at or after setup.last_row {}",
                        last.name, self.setup.last_row
                    ),
                );
            }
        }

        if self.takeoff.fallback_header_row == 0 {
            warn(
                WarnLevel::Error,
                "takeoff.fallback_header_row must be at least 1".to_string(),
            );
        }
        if self.tracker.capacity == 0 {
            warn(WarnLevel::Error, "tracker.capacity must be at least 1".to_string());
        }
        if self.tracker.first_row <= self.setup.last_row {
            warn(
                WarnLevel::Error,
                format!(
                    "tracker.first_row {} overlaps the setup item area (last_row {})",
                    self.tracker.first_row, self.setup.last_row
                ),
            );
        }

        if let Some(span) = self.setup.location_span {
            if span.first > span.last {
                warn(
                    WarnLevel::Error,
                    format!("setup.location_span {}:{} is reversed", span.first, span.last),
                );
            }
            let c = &self.setup.columns;
            for (name, col) in [
                ("item_id", c.item_id),
                ("unit_cost", c.unit_cost),
                ("scope", c.scope),
                ("tool_name", c.tool_name),
            ] {
                if span.contains(col.index()) {
                    warn(
                        WarnLevel::Warning,
                        format!("setup.columns.{name} ({col}) lies inside the location span"),
                    );
                }
            }
            if span.last > self.setup.last_column {
                warn(
                    WarnLevel::Warning,
                    format!(
                        "setup.location_span ends at {} beyond setup.last_column {}",
                        span.last, self.setup.last_column
                    ),
                );
            }
        }

        if !self.version.name_format.contains('%') {
            warn(
                WarnLevel::Warning,
                format!(
                    "version.name_format '{}' has no date fields; \
                     every version will share one base name",
                    self.version.name_format
                ),
            );
        }
        if parse_cell(&self.version.project_name_cell).is_none() {
            warn(
                WarnLevel::Error,
                format!(
                    "version.project_name_cell '{}' is not a cell reference",
                    self.version.project_name_cell
                ),
            );
        }
        for (name, range) in [
            ("version.formula_probe", &self.version.formula_probe),
            ("version.data_probe", &self.version.data_probe),
            ("takeoff.scan_range", &self.takeoff.scan_range),
        ] {
            if parse_cells(range).is_none() {
                warn(WarnLevel::Error, format!("{name} '{range}' is not an A1 range"));
            }
        }
        if self.version.is_protected(&self.version.template_tab) {
            warn(
                WarnLevel::Warning,
                format!(
                    "version.template_tab '{}' is listed as protected",
                    self.version.template_tab
                ),
            );
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_validate_cleanly() {
        let cfg = TakeoffConfig::default();
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
        assert_eq!(cfg.tracker.last_row(), 80);
        assert_eq!(cfg.setup.columns.tool_name.letter(), "P");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r#"
setup:
  tab: Config
  location_span: { first: H, last: K }
version:
  name_format: "%Y-%m-%d"
"#;
        let cfg: TakeoffConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.setup.tab, "Config");
        assert_eq!(cfg.setup.sections.len(), 4);
        let span = cfg.setup.location_span.unwrap();
        assert_eq!((span.first.index(), span.last.index()), (7, 10));
        assert_eq!(cfg.version.name_format, "%Y-%m-%d");
        assert_eq!(cfg.version.template_tab, "DATE");
        assert_eq!(cfg.tracker.first_row, 74);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut cfg = TakeoffConfig::default();
        cfg.server.port = 9000;
        cfg.save(&path).unwrap();
        let loaded = TakeoffConfig::load(&path).unwrap();
        assert_eq!(loaded.server.port, 9000);
        assert_eq!(loaded.setup.columns, SetupColumns::default());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = TakeoffConfig::load_or_default(Some(&dir.path().join("nope.yaml"))).unwrap();
        assert_eq!(cfg.setup.tab, "Setup");
    }

    #[test]
    fn overlapping_tracker_is_an_error() {
        let mut cfg = TakeoffConfig::default();
        cfg.tracker.first_row = 60;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("tracker.first_row")));
    }

    #[test]
    fn zero_fallback_header_row_is_an_error() {
        let mut cfg = TakeoffConfig::default();
        cfg.takeoff.fallback_header_row = 0;
        assert!(cfg.validate().iter().any(|w| {
            w.level == WarnLevel::Error && w.message.contains("takeoff.fallback_header_row")
        }));
    }

    #[test]
    fn unordered_sections_are_an_error() {
        let mut cfg = TakeoffConfig::default();
        cfg.setup.sections.swap(0, 1);
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("must come after")));
    }

    #[test]
    fn bad_probe_range_is_an_error() {
        let mut cfg = TakeoffConfig::default();
        cfg.version.formula_probe = "O:O".to_string();
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("formula_probe")));
    }

    #[test]
    fn rebase_resolves_relative_store() {
        let cfg = TakeoffConfig::default().rebase(Path::new("/srv/ko"));
        assert_eq!(cfg.store.path, PathBuf::from("/srv/ko/.takeoff/projects.db"));
    }
}
