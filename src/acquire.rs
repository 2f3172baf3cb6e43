//! Acquisition collaborators (spec §6): producers that yield
//! `(path_or_id, bytes_utf8, title?, url?)` tuples for the Indexer. Each
//! input kind is a thin collaborator, not a core subsystem.
//!
//! The filesystem/glob kinds are grounded on the teacher's
//! `connector_fs.rs`-style use of `walkdir` + `globset` for recursive,
//! pattern-filtered directory walks; network-backed kinds (snippet,
//! repository) are thin `reqwest` wrappers in the same spirit as the
//! teacher's hosted connectors, minus the connector trait machinery
//! (acquisition here is a function, not a registry-managed object).

use async_trait::async_trait;
use globset::{Glob, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// One acquired unit of content, ready to be handed to the chunker.
#[derive(Debug, Clone)]
pub struct AcquiredItem {
    pub path_or_id: String,
    pub bytes_utf8: String,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// An acquisition collaborator: yields zero or more [`AcquiredItem`]s.
#[async_trait]
pub trait Acquisition: Send + Sync {
    async fn acquire(&self) -> Result<Vec<AcquiredItem>>;
}

/// Plain text supplied directly by the caller; no I/O.
pub struct TextInput {
    pub id: String,
    pub text: String,
    pub title: Option<String>,
}

#[async_trait]
impl Acquisition for TextInput {
    async fn acquire(&self) -> Result<Vec<AcquiredItem>> {
        Ok(vec![AcquiredItem {
            path_or_id: self.id.clone(),
            bytes_utf8: self.text.clone(),
            title: self.title.clone(),
            url: None,
        }])
    }
}

/// A single local file, path-validated to stay within `root`.
pub struct FileInput {
    pub root: std::path::PathBuf,
    pub relative_path: String,
}

#[async_trait]
impl Acquisition for FileInput {
    async fn acquire(&self) -> Result<Vec<AcquiredItem>> {
        let resolved = validate_path(&self.root, &self.relative_path)?;
        let bytes = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| Error::Acquisition(format!("failed to read {}: {e}", resolved.display())))?;
        Ok(vec![AcquiredItem {
            path_or_id: self.relative_path.clone(),
            bytes_utf8: bytes,
            title: None,
            url: None,
        }])
    }
}

/// A set of local files matched by glob patterns under `root`.
pub struct FileGlobInput {
    pub root: std::path::PathBuf,
    pub patterns: Vec<String>,
}

#[async_trait]
impl Acquisition for FileGlobInput {
    async fn acquire(&self) -> Result<Vec<AcquiredItem>> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::Acquisition(format!("invalid glob {pattern:?}: {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| Error::Acquisition(format!("failed to build glob set: {e}")))?;

        let mut items = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !set.is_match(relative) {
                continue;
            }
            let Ok(bytes) = tokio::fs::read_to_string(entry.path()).await else {
                continue;
            };
            items.push(AcquiredItem {
                path_or_id: relative.to_string_lossy().to_string(),
                bytes_utf8: bytes,
                title: None,
                url: None,
            });
        }
        Ok(items)
    }
}

/// A hosted snippet (e.g. a gist), fetched by URL.
pub struct SnippetInput {
    pub url: String,
    pub client: reqwest::Client,
}

#[async_trait]
impl Acquisition for SnippetInput {
    async fn acquire(&self) -> Result<Vec<AcquiredItem>> {
        validate_url(&self.url)?;
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Acquisition(format!("failed to fetch {}: {e}", self.url)))?;
        let text = response
            .text()
            .await
            .map_err(|e| Error::Acquisition(format!("failed to read body of {}: {e}", self.url)))?;
        Ok(vec![AcquiredItem {
            path_or_id: self.url.clone(),
            bytes_utf8: text,
            title: None,
            url: Some(self.url.clone()),
        }])
    }
}

/// A hosted repository, optionally scoped to a branch and path list.
pub struct RepoInput {
    pub url: String,
    pub branch: Option<String>,
    pub paths: Vec<String>,
    pub client: reqwest::Client,
}

#[async_trait]
impl Acquisition for RepoInput {
    async fn acquire(&self) -> Result<Vec<AcquiredItem>> {
        validate_url(&self.url)?;
        let branch = self.branch.as_deref().unwrap_or("main");
        let mut items = Vec::new();
        for path in &self.paths {
            let raw_url = format!("{}/raw/{branch}/{path}", self.url.trim_end_matches('/'));
            let response = self
                .client
                .get(&raw_url)
                .send()
                .await
                .map_err(|e| Error::Acquisition(format!("failed to fetch {raw_url}: {e}")))?;
            let text = response
                .text()
                .await
                .map_err(|e| Error::Acquisition(format!("failed to read body of {raw_url}: {e}")))?;
            items.push(AcquiredItem {
                path_or_id: path.clone(),
                bytes_utf8: text,
                title: None,
                url: Some(raw_url),
            });
        }
        Ok(items)
    }
}

/// Rejects a relative path that would escape `root` via `..` traversal.
fn validate_path(root: &std::path::Path, relative: &str) -> Result<std::path::PathBuf> {
    let candidate = root.join(relative);
    let normalized: std::path::PathBuf = candidate.components().collect();
    if normalized
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(Error::Acquisition(format!("path {relative:?} escapes its root")));
    }
    Ok(candidate)
}

/// Rejects anything that is not an `http(s)` URL.
fn validate_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Acquisition(format!("{url:?} is not an http(s) URL")));
    }
    Ok(())
}
