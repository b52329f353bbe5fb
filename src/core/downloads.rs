//! Saving assistant-generated files into the download directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::api::{ApiError, AssistantsApi};
use crate::core::message::DownloadableFile;

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Fetch the file's bytes and write them, unchanged, under `dir`.
///
/// Returns the path written. An existing file is never replaced: the name
/// gains a ` (n)` suffix before the extension instead.
pub async fn save_file(
    api: &dyn AssistantsApi,
    file: &DownloadableFile,
    dir: &Path,
) -> Result<PathBuf, ApiError> {
    let bytes = api.file_content(&file.file_id).await?;
    fs::create_dir_all(dir).await?;

    let name = local_name(&file.filename, &file.file_id);
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(numbered_name(&name, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(mut handle) => {
                handle.write_all(&bytes).await?;
                handle.flush().await?;
                info!(file_id = %file.file_id, path = %path.display(), bytes = bytes.len(), "saved file");
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free file name for {name} in {}", dir.display()),
    )
    .into())
}

/// Save every file in order; one failure does not stop the rest.
pub async fn download_files(
    api: &dyn AssistantsApi,
    files: &[DownloadableFile],
    dir: &Path,
) -> Vec<(DownloadableFile, Result<PathBuf, ApiError>)> {
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let result = save_file(api, file, dir).await;
        results.push((file.clone(), result));
    }
    results
}

/// The last path component of the remote filename, so sandbox paths such as
/// `/mnt/data/chart.png` cannot escape the download directory.
fn local_name(filename: &str, file_id: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        file_id.to_string()
    } else {
        base.to_string()
    }
}

fn numbered_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({attempt}){}", &name[..dot], &name[dot..]),
        _ => format!("{name} ({attempt})"),
    }
}
