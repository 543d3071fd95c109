use std::{env, io, path::PathBuf};

use anyhow::{anyhow, Result};

pub const APPLICATION_NAME: &str = "dayrecap";

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

fn xdg_dir(variable: &str, fallback: &str) -> Option<PathBuf> {
    let mut path = env::var_os(variable)
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|home| home.join(fallback)))?;
    path.push(APPLICATION_NAME);
    Some(path)
}

/// Logs, evidence logs and the daily cycle state. `$XDG_STATE_HOME/dayrecap`.
pub fn state_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        env::var_os("APPDATA").map(|v| PathBuf::from(v).join(APPLICATION_NAME))
    }
    #[cfg(not(windows))]
    {
        xdg_dir("XDG_STATE_HOME", ".local/state")
    }
}

/// Generated reports. `$XDG_DATA_HOME/dayrecap`.
pub fn data_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        state_dir().map(|v| v.join("reports"))
    }
    #[cfg(not(windows))]
    {
        xdg_dir("XDG_DATA_HOME", ".local/share")
    }
}

/// `$XDG_CONFIG_HOME/dayrecap`.
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        state_dir()
    }
    #[cfg(not(windows))]
    {
        xdg_dir("XDG_CONFIG_HOME", ".config")
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|v| v.join("config.toml"))
}

/// Expands a leading `~` into the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

pub fn create_application_default_path() -> Result<PathBuf> {
    let path = state_dir().ok_or_else(|| anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))?;

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::expand_home;

    #[test]
    fn test_expand_home_keeps_plain_paths() {
        assert_eq!(expand_home("/var/log"), PathBuf::from("/var/log"));
        assert_eq!(expand_home("relative/dir"), PathBuf::from("relative/dir"));
        assert_eq!(expand_home("~user/dir"), PathBuf::from("~user/dir"));
    }

    #[test]
    fn test_expand_home_prefix() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_home("~/projects"), PathBuf::from(home).join("projects"));
        }
    }
}
