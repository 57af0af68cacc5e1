use anyhow::{Result, anyhow};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Multipart field name carrying the profile image.
pub const IMAGE_FIELD: &str = "image";

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

#[derive(Debug, Error)]
#[error("Invalid file type")]
pub struct InvalidFileType;

/// Flat directory of uploaded profile images, addressed by filename.
pub struct ImageStore {
    dir: PathBuf,
}

/// Metadata of a stored image, enough to answer a conditional GET.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub path: PathBuf,
    pub len: u64,
    pub etag: String,
    pub content_type: &'static str,
}

impl ImageStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<field>-<unix millis>-<random>.<ext>`, keeping the lowercased
    /// extension of the client's filename. Only png, jpg, jpeg and gif pass.
    pub fn generate_filename(field: &str, original_name: &str) -> Result<String, InvalidFileType> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
            .ok_or(InvalidFileType)?;

        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: u32 = rand::rng().random_range(0..=1_000_000_000);
        Ok(format!("{}-{}-{}.{}", field, millis, suffix, ext))
    }

    /// Map a client-supplied name to a path inside the store. Anything that
    /// could climb out of the directory resolves to nothing.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
        {
            return None;
        }
        Some(self.dir.join(name))
    }

    /// Write to a temporary sibling, then rename into place so readers never
    /// see a partial file.
    pub async fn save(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self
            .resolve(filename)
            .ok_or_else(|| anyhow!("Refusing to store image as {:?}", filename))?;
        let tmp = self.dir.join(format!(".{}.part", filename));

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            fs::remove_file(&tmp).await.ok();
            return Err(anyhow!("Failed to store image {}: {}", filename, e));
        }

        info!("Stored image {} ({} bytes)", filename, data.len());
        Ok(path)
    }

    /// Look up an image. `Ok(None)` for unknown or unsafe names.
    pub async fn stat(&self, name: &str) -> Result<Option<StoredImage>> {
        let Some(path) = self.resolve(name) else {
            warn!("Rejected image name {:?}", name);
            return Ok(None);
        };

        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(StoredImage {
            etag: validator(metadata.modified()?),
            content_type: content_type_for(&path),
            len: metadata.len(),
            path,
        }))
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let Some(path) = self.resolve(name) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted image {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Cache validator derived from the modification time, in milliseconds since
/// the epoch with any sub-millisecond part as a decimal fraction.
pub fn validator(modified: SystemTime) -> String {
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let millis = nanos / 1_000_000;
    let fraction = nanos % 1_000_000;

    if fraction == 0 {
        millis.to_string()
    } else {
        let digits = format!("{:06}", fraction);
        format!("{}.{}", millis, digits.trim_end_matches('0'))
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
