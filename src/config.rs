use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::storage::OpenOptions;

pub const DATABASE_EXTENSION: &str = "sqlite";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DataManagerConfig {
    pub database: Option<String>,
    pub create_as_needed: Option<bool>,
}

impl DataManagerConfig {
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            create_as_needed: self.create_as_needed.unwrap_or(true),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("data-manager.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("results.sqlite")
}

/// Append the `.sqlite` extension unless the name already carries it
pub fn resolve_database_path(name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    match path.extension() {
        Some(ext) if ext == DATABASE_EXTENSION => path,
        _ => PathBuf::from(format!("{}.{}", name, DATABASE_EXTENSION)),
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<DataManagerConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: DataManagerConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &DataManagerConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_database_path() {
        assert_eq!(resolve_database_path("results"), PathBuf::from("results.sqlite"));
        assert_eq!(resolve_database_path("results.sqlite"), PathBuf::from("results.sqlite"));
        assert_eq!(resolve_database_path("runs/v1.db"), PathBuf::from("runs/v1.db.sqlite"));
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data-manager.toml");
        assert!(load_config(Some(&path)).unwrap().is_none());

        let config = DataManagerConfig {
            database: Some("results.sqlite".into()),
            create_as_needed: Some(false),
        };
        write_config(&path, &config, false).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), Some(config.clone()));
        assert!(!config.open_options().create_as_needed);

        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &DataManagerConfig::default(), true).unwrap();
        let reloaded = load_config(Some(&path)).unwrap().unwrap();
        assert!(reloaded.open_options().create_as_needed);
    }

    #[test]
    fn test_ensure_db_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("results.sqlite");
        ensure_db_dir(&db).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
