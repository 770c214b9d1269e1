use std::fs;
use std::path::{Path, PathBuf};

use crate::io::file_store::{FileStore, items_path, save};
use crate::io::store::{ItemTable, StoreError};
use crate::model::config::Config;

/// Name of the project directory holding config, items and logs
pub const PROJECT_DIR: &str = "tiered";

const CONFIG_TEMPLATE: &str = include_str!("../templates/config.toml");

/// Error type for project I/O operations
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("not a tiered project: no tiered/ directory found")]
    NotAProject,
    #[error("a project already exists at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config.toml: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("could not edit config.toml: {0}")]
    ConfigEdit(#[from] toml_edit::TomlError),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A discovered project: its root and the `tiered/` directory inside it.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub dir: PathBuf,
    pub config: Config,
}

impl Project {
    pub fn open_store(&self) -> Result<FileStore, StoreError> {
        FileStore::open(&self.dir)
    }
}

/// Walk up from `start` looking for a `tiered/config.toml`.
pub fn discover_project(start: &Path) -> Result<PathBuf, ProjectError> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(PROJECT_DIR).join("config.toml").is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(ProjectError::NotAProject);
        }
    }
}

pub fn load_project(root: &Path) -> Result<Project, ProjectError> {
    let dir = root.join(PROJECT_DIR);
    if !dir.is_dir() {
        return Err(ProjectError::NotAProject);
    }
    let (config, _) = crate::io::config_io::read_config(&dir)?;
    Ok(Project {
        root: root.to_path_buf(),
        dir,
        config,
    })
}

/// Create `tiered/` under `root` with the default config and an empty list.
pub fn init_project(root: &Path) -> Result<Project, ProjectError> {
    let dir = root.join(PROJECT_DIR);
    if dir.join("config.toml").exists() {
        return Err(ProjectError::AlreadyInitialized(dir));
    }
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("config.toml"), CONFIG_TEMPLATE)?;
    if !items_path(&dir).exists() {
        save(&dir, &ItemTable::default(), 0)?;
    }
    fs::write(dir.join(".gitignore"), ".lock\n.recovery.log\n")?;
    load_project(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::OrderStore;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_discover_from_subdirectory() {
        let tmp = TempDir::new().unwrap();
        let project = init_project(tmp.path()).unwrap();
        assert_eq!(project.config, Config::default());
        assert!(project.dir.join("items.json").exists());

        let nested = tmp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(discover_project(&nested).unwrap(), tmp.path());

        let store = project.open_store().unwrap();
        assert_eq!(store.revision(), 0);
        assert!(store.items().unwrap().is_empty());
    }

    #[test]
    fn test_init_twice_is_rejected() {
        let tmp = TempDir::new().unwrap();
        init_project(tmp.path()).unwrap();
        assert!(matches!(
            init_project(tmp.path()).unwrap_err(),
            ProjectError::AlreadyInitialized(_)
        ));
    }

    #[test]
    fn test_discover_outside_project_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            discover_project(tmp.path()).unwrap_err(),
            ProjectError::NotAProject
        ));
    }
}
