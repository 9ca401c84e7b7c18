//! Copying picked source files into the session's working directory.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Copy chunk size
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Copy `source` into `staging_dir` under its own file name
///
/// Best-effort: a failed copy is logged and the destination path is still
/// returned, so the failure shows up when the file is read.
pub async fn stage_asset(source: &Path, staging_dir: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "asset".into());
    let destination = staging_dir.join(file_name);

    match copy_streaming(source, &destination).await {
        Ok(bytes) => debug!("Staged {:?} ({} bytes)", destination, bytes),
        Err(e) => warn!("Failed to stage {:?}: {}", source, e),
    }

    destination
}

async fn copy_streaming(source: &Path, destination: &Path) -> std::io::Result<u64> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut input = File::open(source).await?;
    let mut output = File::create(destination).await?;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        let read = input.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        output.write_all(&buffer[..read]).await?;
        copied += read as u64;
    }

    output.flush().await?;
    Ok(copied)
}
