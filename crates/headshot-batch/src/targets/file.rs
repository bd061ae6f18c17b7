use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use headshot_common::{HeadshotError, ResultLocator, Result};
use tracing::warn;
use uuid::Uuid;

use crate::export::ExportTarget;

/// Saves results into a directory on the local filesystem.
pub struct FileExportTarget {
    dir: PathBuf,
    client: reqwest::Client,
}

impl FileExportTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| {
                HeadshotError::InternalError(format!("failed to create export client: {err}"))
            })?;
        Ok(Self {
            dir: dir.into(),
            client,
        })
    }

    async fn fetch(&self, locator: &ResultLocator) -> Result<Vec<u8>> {
        if locator.is_data_url() {
            let (_, data) = locator.decode_inline()?;
            return Ok(data);
        }
        if !locator.is_remote() {
            return Err(HeadshotError::Export(format!(
                "unsupported result locator {locator}"
            )));
        }

        let response = self
            .client
            .get(locator.as_str())
            .send()
            .await
            .map_err(|err| HeadshotError::Export(format!("failed to download {locator}: {err}")))?;
        if !response.status().is_success() {
            return Err(HeadshotError::Export(format!(
                "download of {locator} returned status {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| HeadshotError::Export(format!("failed to read {locator}: {err}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ExportTarget for FileExportTarget {
    async fn save(&self, locator: &ResultLocator, filename: &str) -> Result<()> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename == ".." {
            return Err(HeadshotError::InvalidArgument(format!(
                "invalid export filename {filename:?}"
            )));
        }

        let data = self.fetch(locator).await?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(filename);
        let tmp_path = self.dir.join(format!(".{filename}.{}.tmp", Uuid::new_v4()));
        let written = match tokio::fs::write(&tmp_path, data).await {
            Ok(()) => tokio::fs::rename(&tmp_path, &path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove temp export file");
            }
            return Err(err.into());
        }
        Ok(())
    }
}
