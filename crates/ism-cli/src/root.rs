use ism_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the data directory holding `.ism/`.
///
/// `--root` / `ISM_ROOT` wins; otherwise walk upward from the working
/// directory looking for `.ism/`, falling back to the working directory so
/// that `ism init` has somewhere to create it.
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or(cwd)
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(paths::ISM_DIR).is_dir())
        .map(Path::to_path_buf)
}
