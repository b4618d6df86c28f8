//! # redline-store
//!
//! Stores uploaded annotated screenshots as PNG files and hands back opaque
//! handles (the file names). Files are never deleted.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use redline_core::{RedlineError, Result, ScreenshotHandle};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const PNG_MIME: &str = "image/png";

/// Decode a `data:image/png;base64,...` URL (or bare base64) into PNG bytes
pub fn decode_data_url(input: &str) -> Result<Vec<u8>> {
    let input = input.trim();

    let payload = match input.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| RedlineError::Decode("data URL has no payload".to_string()))?;
            let mime = header.strip_suffix(";base64").ok_or_else(|| {
                RedlineError::Decode("data URL is not base64 encoded".to_string())
            })?;
            if !mime.eq_ignore_ascii_case(PNG_MIME) {
                return Err(RedlineError::Decode(format!(
                    "expected {}, got '{}'",
                    PNG_MIME, mime
                )));
            }
            payload
        }
        None => input,
    };

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(RedlineError::Decode("empty payload".to_string()));
    }

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| RedlineError::Decode(e.to_string()))?;

    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err(RedlineError::Decode("payload is not a PNG image".to_string()));
    }

    Ok(bytes)
}

/// File name for a screenshot taken at `now`
fn file_name(now: DateTime<Utc>, attempt: usize) -> String {
    let stamp = now.format("%Y-%m-%dT%H-%M-%S-%3fZ");
    if attempt == 0 {
        format!("screenshot_{}.png", stamp)
    } else {
        format!("screenshot_{}-{}.png", stamp, attempt)
    }
}

/// Write all of `bytes`, removing `path` if the write fails partway
async fn write_complete<W: AsyncWrite + Unpin>(path: &Path, mut file: W, bytes: &[u8]) -> Result<()> {
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        if let Err(remove) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove partial screenshot {}: {}", path.display(), remove);
        }
        return Err(e.into());
    }
    Ok(())
}

/// Directory of uploaded screenshots
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let dir = tokio::fs::canonicalize(dir).await?;
        debug!("Screenshot store at {}", dir.display());
        Ok(Self { dir })
    }

    /// Absolute path of the store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decode and persist a screenshot, returning its handle
    pub async fn save(&self, data_url: &str) -> Result<ScreenshotHandle> {
        let bytes = decode_data_url(data_url)?;
        let now = Utc::now();

        let mut attempt = 0;
        loop {
            let name = file_name(now, attempt);
            let path = self.dir.join(&name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    write_complete(&path, file, &bytes).await?;
                    info!("Screenshot saved: {} ({} bytes)", name, bytes.len());
                    return Ok(ScreenshotHandle::new(name));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Absolute path of a stored screenshot
    pub async fn resolve(&self, handle: &ScreenshotHandle) -> Result<PathBuf> {
        if !handle.is_well_formed() {
            return Err(RedlineError::NotFound(format!("screenshot {}", handle)));
        }
        let path = self.dir.join(handle.as_str());
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(RedlineError::NotFound(format!("screenshot {}", handle))),
        }
    }
}
