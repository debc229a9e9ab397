use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DEFAULT_ROOT_DIR: &str = ".switchyard";
pub const PROFILES_DIR: &str = "profiles";

pub const CONFIG_FILE: &str = "config.yaml";
pub const PROFILES_FILE: &str = "profiles.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `~/.switchyard`, or `./.switchyard` when no home directory is known.
pub fn default_root() -> PathBuf {
    home::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_ROOT_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn profiles_path(root: &Path) -> PathBuf {
    root.join(PROFILES_FILE)
}

pub fn profiles_dir(root: &Path) -> PathBuf {
    root.join(PROFILES_DIR)
}

pub fn profile_file(root: &Path, file: &str) -> PathBuf {
    profiles_dir(root).join(file)
}
