//! Version-control adapter.
//!
//! The engine talks to the repository only through [`VcsAdapter`]: list
//! conflicted files, read and write their text, and stage a resolved file.
//! Paths are relative to the working directory.

pub mod git;

use std::path::Path;

use async_trait::async_trait;

use crate::errors::VcsError;

pub use git::GitRepository;

#[async_trait]
pub trait VcsAdapter: Send + Sync {
    /// Root of the working tree; proposal paths are resolved against it.
    fn workdir(&self) -> &Path;

    /// Workdir-relative paths of every file with unmerged index entries.
    async fn list_conflicted_files(&self) -> Result<Vec<String>, VcsError>;

    async fn read_file(&self, path: &str) -> Result<String, VcsError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<(), VcsError>;

    /// Mark `path` as resolved in the index.
    async fn stage(&self, path: &str) -> Result<(), VcsError>;
}
