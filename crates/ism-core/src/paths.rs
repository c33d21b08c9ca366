use crate::error::{IsmError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ISM_DIR: &str = ".ism";
pub const CONFIG_FILE: &str = ".ism/ism.yaml";
pub const POLICY_DB_FILE: &str = ".ism/policies.redb";
pub const REGISTRY_FILE: &str = ".ism/managed.yaml";
pub const CATALOG_FILE: &str = ".ism/indices.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn ism_dir(root: &Path) -> PathBuf {
    root.join(ISM_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn policy_db_path(root: &Path) -> PathBuf {
    root.join(POLICY_DB_FILE)
}

pub fn registry_path(root: &Path) -> PathBuf {
    root.join(REGISTRY_FILE)
}

pub fn catalog_path(root: &Path) -> PathBuf {
    root.join(CATALOG_FILE)
}

// ---------------------------------------------------------------------------
// Index name validation
// ---------------------------------------------------------------------------

static INDEX_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn index_name_re() -> &'static Regex {
    INDEX_NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._\-]*$").unwrap())
}

/// Lowercase, no whitespace or path separators, not starting with `-`, `_`
/// or `.`, at most 255 bytes.
pub fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 || !index_name_re().is_match(name) {
        return Err(IsmError::validation(format!("invalid index name '{name}'")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
