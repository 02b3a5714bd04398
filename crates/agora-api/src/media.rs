use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use agora_types::forms::ImageUpload;

const MAX_EXTENSION_LEN: usize = 8;

/// On-disk store for uploaded message images.
///
/// Files are content-addressed: the SHA-256 of the bytes names the file and
/// its first two byte pairs shard it into `images/ab/cd/`. Identical uploads
/// share one file. Paths handed out are relative to the media root and
/// always use `/` separators.
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("Media root: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a stored file.
    pub fn file_path(&self, relative: &str) -> PathBuf {
        relative.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Writes the upload (unless an identical one exists) and returns its
    /// relative path.
    pub async fn save_image(&self, upload: &ImageUpload) -> Result<String> {
        let hash = hex::encode(Sha256::digest(&upload.data));
        let relative = format!(
            "images/{}/{}/{}.{}",
            &hash[0..2],
            &hash[2..4],
            hash,
            extension_for(&upload.filename)
        );

        let target = self.file_path(&relative);
        if fs::try_exists(&target).await? {
            return Ok(relative);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &upload.data).await?;
        info!("Stored image {} ({} bytes)", relative, upload.data.len());

        Ok(relative)
    }

    /// Deletes a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, relative: &str) -> Result<()> {
        match fs::remove_file(self.file_path(relative)).await {
            Ok(()) => {
                info!("Removed image {}", relative);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Lowercased extension of the uploaded filename, or `bin` when it has none
/// usable.
fn extension_for(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| "bin".to_string())
}
