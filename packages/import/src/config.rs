//! Layered configuration.
//!
//! Precedence, lowest first: built-in defaults, a TOML file, the
//! `DOCIMPORT_DATABASE` environment variable, command-line flags. The file
//! is `--config` if given, else `$DOCIMPORT_CONFIG`, else `docimport.toml`
//! in the working directory when present.
//!
//! ```toml
//! database = "data/docimport.duckdb"
//! collection = "inventory"
//! batch_size = 1000
//! delimiter = "|"
//! onerror = "ignore"
//! ordered = true
//! has_header = true
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use docimport_field_models::ErrorPolicy;
use docimport_store::paths;
use serde::Deserialize;

use crate::ImportOptions;
use crate::reader::parse_delimiter;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "DOCIMPORT_CONFIG";

/// Configuration file looked for in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "docimport.toml";

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`Config`].
    #[error("invalid configuration in {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Values read from a configuration file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub collection: Option<String>,
    pub audit_collection: Option<String>,
    pub batch_size: Option<usize>,
    pub delimiter: Option<String>,
    pub onerror: Option<ErrorPolicy>,
    pub ordered: Option<bool>,
    pub has_header: Option<bool>,
}

impl Config {
    /// Loads the configuration file chosen by `explicit`, `$DOCIMPORT_CONFIG`
    /// or the working directory, or defaults if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a named file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path(explicit, std::env::var_os(CONFIG_ENV)) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Reads and parses one file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::de::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Store path: `cli`, then `$DOCIMPORT_DATABASE`, then the file value,
    /// then the default under `data/`.
    #[must_use]
    pub fn database_path(&self, cli: Option<&Path>) -> PathBuf {
        database_path(cli, std::env::var_os(paths::DATABASE_ENV), self.database.as_deref())
    }

    /// Overlays the file's values onto `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a bad delimiter or a zero batch
    /// size.
    pub fn apply(&self, options: &mut ImportOptions) -> Result<(), ConfigError> {
        if let Some(collection) = &self.collection {
            options.collection.clone_from(collection);
        }
        if let Some(audit) = &self.audit_collection {
            options.audit_collection.clone_from(audit);
        }
        if let Some(batch_size) = self.batch_size {
            if batch_size == 0 {
                return Err(ConfigError::Invalid {
                    key: "batch_size",
                    message: "must be at least 1".to_string(),
                });
            }
            options.batch_size = batch_size;
        }
        if let Some(delimiter) = &self.delimiter {
            options.delimiter = parse_delimiter(delimiter).map_err(|e| ConfigError::Invalid {
                key: "delimiter",
                message: e.to_string(),
            })?;
        }
        if let Some(policy) = self.onerror {
            options.policy = policy;
        }
        if let Some(ordered) = self.ordered {
            options.ordered = ordered;
        }
        if let Some(has_header) = self.has_header {
            options.has_header = has_header;
        }
        Ok(())
    }
}

fn config_path(explicit: Option<&Path>, env: Option<OsString>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.is_file().then_some(local)
}

fn database_path(cli: Option<&Path>, env: Option<OsString>, file: Option<&Path>) -> PathBuf {
    cli.map(Path::to_path_buf)
        .or_else(|| env.filter(|p| !p.is_empty()).map(PathBuf::from))
        .or_else(|| file.map(Path::to_path_buf))
        .unwrap_or_else(|| paths::data_dir().join(paths::DATABASE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Config {
        toml::de::from_str(text).unwrap()
    }

    #[test]
    fn file_values_override_defaults() {
        let config = parse(
            r#"
            collection = "inventory"
            batch_size = 1000
            delimiter = "\\t"
            onerror = "ignore"
            ordered = true
            has_header = true
            "#,
        );

        let mut options = ImportOptions::default();
        config.apply(&mut options).unwrap();

        assert_eq!(options.collection, "inventory");
        assert_eq!(options.audit_collection, "audit");
        assert_eq!(options.batch_size, 1000);
        assert_eq!(options.delimiter, b'\t');
        assert_eq!(options.policy, ErrorPolicy::Ignore);
        assert!(options.ordered);
        assert!(options.has_header);
    }

    #[test]
    fn empty_file_changes_nothing() {
        let mut options = ImportOptions::default();
        parse("").apply(&mut options).unwrap();
        assert_eq!(options, ImportOptions::default());
    }

    #[test]
    fn rejects_bad_values() {
        let mut options = ImportOptions::default();
        assert!(matches!(
            parse("batch_size = 0").apply(&mut options),
            Err(ConfigError::Invalid {
                key: "batch_size",
                ..
            })
        ));
        assert!(matches!(
            parse("delimiter = \"::\"").apply(&mut options),
            Err(ConfigError::Invalid {
                key: "delimiter",
                ..
            })
        ));
        assert!(toml::de::from_str::<Config>("colection = \"x\"").is_err());
    }

    #[test]
    fn database_precedence() {
        let file = Path::new("from_file.duckdb");
        assert_eq!(
            database_path(
                Some(Path::new("cli.duckdb")),
                Some("env.duckdb".into()),
                Some(file)
            ),
            PathBuf::from("cli.duckdb")
        );
        assert_eq!(
            database_path(None, Some("env.duckdb".into()), Some(file)),
            PathBuf::from("env.duckdb")
        );
        assert_eq!(database_path(None, None, Some(file)), file.to_path_buf());
        assert_eq!(
            database_path(None, None, None),
            PathBuf::from("data").join("docimport.duckdb")
        );
    }

    #[test]
    fn explicit_config_path_wins() {
        let explicit = Path::new("mine.toml");
        assert_eq!(
            config_path(Some(explicit), Some("env.toml".into())),
            Some(explicit.to_path_buf())
        );
        assert_eq!(
            config_path(None, Some("env.toml".into())),
            Some(PathBuf::from("env.toml"))
        );
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "database = \"x.duckdb\"\ncollection = \"c\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.collection.as_deref(), Some("c"));
        assert_eq!(config.database, Some(PathBuf::from("x.duckdb")));

        assert!(matches!(
            Config::load(Some(&dir.path().join("nope.toml"))),
            Err(ConfigError::Io { .. })
        ));
    }
}
