use std::path::PathBuf;

use eyre::OptionExt;

pub trait ConfigManager: Sized + Clone + Send + Sync {
    fn get_log_path(&self) -> eyre::Result<PathBuf>;
}

#[derive(Default, Clone, Debug)]
pub struct LocalConfigManager {}

impl LocalConfigManager {
    pub fn new() -> Self {
        Self {}
    }
}

#[cfg(not(target_os = "windows"))]
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(target_os = "windows")]
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

pub fn data_dir() -> eyre::Result<PathBuf> {
    let data_dir = match std::env::var_os("XDG_DATA_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => home_dir()
            .ok_or_eyre("Neither XDG_DATA_HOME nor HOME is set")?
            .join(".local")
            .join("share"),
    };

    Ok(data_dir.join("logswitch"))
}

impl ConfigManager for LocalConfigManager {
    fn get_log_path(&self) -> eyre::Result<PathBuf> {
        Ok(data_dir()?.join("logswitch.log"))
    }
}
