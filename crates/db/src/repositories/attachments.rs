use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use deskbot_core::domain::attachment::{
    disambiguate_name, sanitize_filename, AttachmentLimits, StagedAttachment, StagingUsage,
};
use deskbot_core::domain::conversation::UserId;

use super::{AttachmentStore, RepositoryError};

/// Filesystem staging area. Each user gets a directory named by the blake3
/// hash of their id, so neither ids nor filenames can escape `base_dir`.
pub struct FsAttachmentStore {
    base_dir: PathBuf,
    limits: AttachmentLimits,
}

impl FsAttachmentStore {
    pub fn new(base_dir: impl Into<PathBuf>, limits: AttachmentLimits) -> Self {
        Self { base_dir: base_dir.into(), limits }
    }

    pub fn user_dir(&self, user: &UserId) -> PathBuf {
        self.base_dir.join(blake3::hash(user.0.as_bytes()).to_hex().as_str())
    }

    async fn staged_files(&self, user: &UserId) -> Result<Vec<(String, PathBuf)>, RepositoryError> {
        let dir = self.user_dir(user);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                files.push((name.to_owned(), entry.path()));
            }
        }
        files.sort_by(|left, right| left.0.cmp(&right.0));
        Ok(files)
    }
}

async fn write_new_file(path: &Path, content: &[u8]) -> Result<(), RepositoryError> {
    let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path).await?;
    file.write_all(content).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait::async_trait]
impl AttachmentStore for FsAttachmentStore {
    fn limits(&self) -> AttachmentLimits {
        self.limits
    }

    async fn add(
        &self,
        user: &UserId,
        filename: &str,
        content: &[u8],
    ) -> Result<String, RepositoryError> {
        let dir = self.user_dir(user);
        fs::create_dir_all(&dir).await?;

        let existing: BTreeSet<String> =
            self.staged_files(user).await?.into_iter().map(|(name, _)| name).collect();
        let name =
            disambiguate_name(&sanitize_filename(filename), |name| existing.contains(name));

        write_new_file(&dir.join(&name), content).await?;
        debug!(
            event_name = "staging.attachment_added",
            user_id = %user,
            stored_name = %name,
            size = content.len(),
            "attachment staged"
        );
        Ok(name)
    }

    async fn list_names(&self, user: &UserId) -> Result<Vec<String>, RepositoryError> {
        Ok(self.staged_files(user).await?.into_iter().map(|(name, _)| name).collect())
    }

    async fn load_all(&self, user: &UserId) -> Result<Vec<StagedAttachment>, RepositoryError> {
        let mut attachments = Vec::new();
        for (name, path) in self.staged_files(user).await? {
            let content = fs::read(&path).await?;
            attachments.push(StagedAttachment { name, content });
        }
        Ok(attachments)
    }

    async fn delete_all(&self, user: &UserId) -> Result<(), RepositoryError> {
        match fs::remove_dir_all(self.user_dir(user)).await {
            Ok(()) => {
                debug!(event_name = "staging.cleared", user_id = %user, "staged attachments removed");
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn usage(&self, user: &UserId) -> Result<StagingUsage, RepositoryError> {
        let files = self.staged_files(user).await?;
        let mut total_size = 0u64;
        for (_, path) in &files {
            total_size += fs::metadata(path).await?.len();
        }
        Ok(StagingUsage { count: files.len(), total_size })
    }
}
