//! Default locations for the `DuckDB` store file.

use std::path::{Path, PathBuf};

/// Environment variable overriding the store path.
pub const DATABASE_ENV: &str = "DOCIMPORT_DATABASE";

/// Store file name under [`data_dir`].
pub const DATABASE_FILE: &str = "docimport.duckdb";

/// Returns the `data/` directory under the current working directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
