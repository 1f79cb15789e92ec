use crate::core::config::data::Config;
use crate::core::config::ConfigError;
use directories::ProjectDirs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const CONFIG_FILE_NAME: &str = "config.toml";
const HISTORY_FILE_NAME: &str = "history.sqlite3";

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("org", "lotb", "lotb").ok_or(ConfigError::NoProjectDirs)
}

impl Config {
    /// Loads `config_path`, or the default config when the file is absent.
    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Writes atomically through a temp file in the target directory.
    pub fn save_to_path(&self, config_path: &Path) -> Result<(), ConfigError> {
        let write_error = |source: std::io::Error| ConfigError::Write {
            path: config_path.to_path_buf(),
            source,
        };
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_error)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_error)?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(write_error)?;
        temp_file.as_file_mut().sync_all().map_err(write_error)?;
        temp_file
            .persist(config_path)
            .map_err(|err| write_error(err.error))?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE_NAME))
    }

    /// The configured database, or `history.sqlite3` in the data directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join(HISTORY_FILE_NAME)),
        }
    }
}
