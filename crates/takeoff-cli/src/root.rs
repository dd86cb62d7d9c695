use anyhow::Context;
use std::path::{Path, PathBuf};
use takeoff_core::config::{TakeoffConfig, CONFIG_FILE};

/// Where the configuration comes from.
pub struct ConfigSource {
    /// The config file, if one was given or found.
    pub path: Option<PathBuf>,
    /// Directory that relative paths in the config resolve against.
    pub base: PathBuf,
}

/// Locate the config file.
///
/// Priority:
/// 1. `--config` flag / `TAKEOFF_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `takeoff.yaml`
/// 3. No file: defaults, with `cwd` as the base
pub fn resolve_config(explicit: Option<&Path>) -> ConfigSource {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    if let Some(p) = explicit {
        let path = if p.is_relative() { cwd.join(p) } else { p.to_path_buf() };
        let base = path.parent().map(Path::to_path_buf).unwrap_or(cwd);
        return ConfigSource {
            path: Some(path),
            base,
        };
    }

    let mut dir = cwd.clone();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return ConfigSource {
                path: Some(candidate),
                base: dir,
            };
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => break,
        }
    }

    ConfigSource {
        path: None,
        base: cwd,
    }
}

impl ConfigSource {
    /// Load the config (defaults when the file is absent) with relative
    /// paths resolved against `base`.
    pub fn load(&self) -> anyhow::Result<TakeoffConfig> {
        let config = TakeoffConfig::load_or_default(self.path.as_deref()).with_context(|| {
            format!(
                "failed to load config {}",
                self.path.as_deref().unwrap_or(Path::new(CONFIG_FILE)).display()
            )
        })?;
        Ok(config.rebase(&self.base))
    }

    /// Where `config init` writes.
    pub fn target(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| self.base.join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_config_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        let source = resolve_config(Some(&path));
        assert_eq!(source.path.as_deref(), Some(path.as_path()));
        assert_eq!(source.base, dir.path());
    }

    #[test]
    fn missing_explicit_file_loads_defaults_rebased() {
        let dir = TempDir::new().unwrap();
        let source = resolve_config(Some(&dir.path().join("takeoff.yaml")));
        let config = source.load().unwrap();
        assert_eq!(config.store.path, dir.path().join(".takeoff/projects.db"));
    }

    #[test]
    fn target_defaults_to_base() {
        let dir = TempDir::new().unwrap();
        let source = ConfigSource {
            path: None,
            base: dir.path().to_path_buf(),
        };
        assert_eq!(source.target(), dir.path().join(CONFIG_FILE));
    }
}
