//! Persisting response bodies to files.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use snafu::ResultExt as _;
use tokio::io::AsyncWriteExt as _;

use super::{
    CreateFileSnafu, KeepTempFileSnafu, RemoveExistingSnafu, ResolveError, TempFileSnafu,
    WriteFileSnafu,
};
use crate::contract::Download;

const TEMP_PREFIX: &str = "flare-download-";
const TEMP_SUFFIX: &str = ".tmp";

/// Writes `bytes` to the file named by `download`, or to a new temp file.
///
/// Temp files are kept after the call; the caller owns them.
pub(crate) async fn persist(bytes: &[u8], download: Option<&Download>) -> Result<PathBuf, ResolveError> {
    let target = match download.and_then(|download| download.path.as_ref()) {
        Some(path) if path.as_os_str().is_empty() => {
            tracing::warn!("Download path is empty, falling back to a temp file");
            None
        }
        Some(path) => Some(path),
        None => None,
    };

    let path = match target {
        Some(path) => {
            let overwrite = download.is_some_and(|download| download.overwrite);
            create_target(path, overwrite).await?
        }
        None => create_temp()?,
    };

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&path)
        .await
        .context(WriteFileSnafu { path: &path })?;
    file.write_all(bytes)
        .await
        .context(WriteFileSnafu { path: &path })?;
    file.flush().await.context(WriteFileSnafu { path: &path })?;

    tracing::debug!(path = %path.display(), len = bytes.len(), "Persisted response body");
    Ok(path)
}

async fn create_target(path: &Path, overwrite: bool) -> Result<PathBuf, ResolveError> {
    if overwrite {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).context(RemoveExistingSnafu { path }),
        }
    }

    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .context(CreateFileSnafu { path })?;
    Ok(path.to_path_buf())
}

fn create_temp() -> Result<PathBuf, ResolveError> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile()
        .context(TempFileSnafu)?
        .into_temp_path()
        .keep()
        .context(KeepTempFileSnafu)
}
