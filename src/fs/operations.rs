use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use serde::de::DeserializeOwned;
use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt},
};
use tracing::warn;

/// Path with `suffix` appended to the file name. `changes.json` + `.tmp` -> `changes.json.tmp`.
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("unnamed"));
    name.push(suffix);
    path.with_file_name(name)
}

/// Replaces the content of `path` so that readers either see the old or the new content, never a
/// partially written file. The data is written into a temporary sibling which is then renamed
/// over the target.
pub async fn write_atomically(path: &Path, content: &[u8]) -> Result<(), io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let temporary = sibling_path(path, ".tmp");

    let mut file = File::create(&temporary).await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temporary, path).await
}

/// Reads a JSON document. Missing and empty files produce `None`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&content)?))
}

/// Moves an unreadable file out of the way so that it can be inspected later instead of being
/// overwritten. Earlier quarantined copies are kept, later ones get `.corrupt.1`, `.corrupt.2`...
pub async fn quarantine(path: &Path) -> Result<PathBuf, io::Error> {
    let mut target = sibling_path(path, ".corrupt");
    let mut attempt = 0;
    while fs::try_exists(&target).await? {
        attempt += 1;
        target = sibling_path(path, &format!(".corrupt.{attempt}"));
    }
    fs::rename(path, &target).await?;
    warn!("Moved unreadable file {path:?} to {target:?}");
    Ok(target)
}

/// Advisory lock held on a sidecar file. The lock is released by [FileLock::release] or, on any
/// other exit path, when the file is closed on drop.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub async fn exclusive(target: &Path) -> Result<Self, io::Error> {
        let file = Self::open(target).await?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    pub async fn shared(target: &Path) -> Result<Self, io::Error> {
        let file = Self::open(target).await?;
        file.lock_shared()?;
        Ok(Self { file })
    }

    async fn open(target: &Path) -> Result<File, io::Error> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(sibling_path(target, ".lock"))
            .await
    }

    pub async fn release(self) -> Result<(), io::Error> {
        self.file.unlock_async().await
    }
}
