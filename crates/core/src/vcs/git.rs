//! Local Git repository access via `git2`.

use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use git2::Repository;
use tracing::{debug, info, instrument};

use super::VcsAdapter;
use crate::errors::VcsError;

/// [`VcsAdapter`] over a `git2::Repository` with a working tree.
pub struct GitRepository {
    repo: Mutex<Repository>,
    workdir: PathBuf,
}

impl GitRepository {
    /// Open the repository containing `path` (searching parent directories).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VcsError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::discover(path)
            .map_err(|_| VcsError::RepositoryNotFound(path.display().to_string()))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| VcsError::BareRepository(path.display().to_string()))?
            .to_path_buf();
        debug!(workdir = %workdir.display(), "repository opened");
        Ok(Self {
            repo: Mutex::new(repo),
            workdir,
        })
    }

    fn repo(&self) -> MutexGuard<'_, Repository> {
        self.repo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Join a workdir-relative path, refusing anything that escapes it.
    fn resolve(&self, relative: &str) -> Result<PathBuf, VcsError> {
        let rel = Path::new(relative);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(VcsError::PathOutsideWorkdir(relative.to_string()));
        }
        Ok(self.workdir.join(rel))
    }

    fn conflicted_paths(&self) -> Result<Vec<String>, VcsError> {
        let repo = self.repo();
        let mut index = repo.index()?;
        index.read(true)?;

        let mut paths = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                paths.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn stage_path(&self, relative: &str) -> Result<(), VcsError> {
        let repo = self.repo();
        let mut index = repo.index()?;
        index.read(true)?;
        index.add_path(Path::new(relative))?;
        index.write()?;
        Ok(())
    }
}

#[async_trait]
impl VcsAdapter for GitRepository {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    #[instrument(skip(self))]
    async fn list_conflicted_files(&self) -> Result<Vec<String>, VcsError> {
        let paths = self.conflicted_paths()?;
        info!(count = paths.len(), "listed conflicted files");
        Ok(paths)
    }

    #[instrument(skip(self))]
    async fn read_file(&self, path: &str) -> Result<String, VcsError> {
        let full = self.resolve(path)?;
        let bytes = tokio::fs::read(&full).await?;
        String::from_utf8(bytes).map_err(|_| VcsError::NotText(path.to_string()))
    }

    #[instrument(skip(self, content), fields(len = content.len()))]
    async fn write_file(&self, path: &str, content: &str) -> Result<(), VcsError> {
        let full = self.resolve(path)?;
        tokio::fs::write(&full, content).await?;
        debug!("file written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stage(&self, path: &str) -> Result<(), VcsError> {
        self.resolve(path)?;
        self.stage_path(path)?;
        info!("staged");
        Ok(())
    }
}
