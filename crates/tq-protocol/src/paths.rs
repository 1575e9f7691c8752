use std::path::PathBuf;

/// Returns the config/data directory path for tq.
pub fn dirs_path() -> PathBuf {
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_dir).join("tq")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("tq")
    } else {
        PathBuf::from("/tmp/tq")
    }
}

/// Returns the client config file path.
pub fn config_path() -> PathBuf {
    dirs_path().join("config.toml")
}
