use std::path::{Path, PathBuf};

/// Resolve the switchyard state directory.
///
/// Priority:
/// 1. `--root` flag / `SWITCHYARD_ROOT` env var (passed in as `explicit`),
///    made absolute against the current directory
/// 2. `~/.switchyard`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p),
        None => switchyard_core::paths::default_root(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let result = resolve_root(Some(Path::new("state")));
        assert!(result.is_absolute());
        assert!(result.ends_with("state"));
    }

    #[test]
    fn default_root_is_dot_switchyard() {
        assert!(resolve_root(None).ends_with(".switchyard"));
    }
}
