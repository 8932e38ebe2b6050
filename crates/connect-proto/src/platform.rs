use std::path::PathBuf;

/// Directory name used under the platform data/config roots.
const APP_DIR: &str = "connect";

pub const DEFAULT_API_PORT: u16 = 8998;

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/connect/ (XDG layout) rather
    // than Application Support so logs land in the same place everywhere
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    // Honour a portable config.toml next to the executable first
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                if exe_dir.join("config.toml").exists() {
                    return exe_dir.to_path_buf();
                }
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// Milliseconds since the unix epoch, as used by cluster timestamps.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
