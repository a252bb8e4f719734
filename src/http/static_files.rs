//! Static file fallback.
//!
//! # Responsibilities
//! - Map a request path onto the configured local directory
//! - Reject traversal before touching the filesystem
//! - Serve the resolved file (ranges, conditional requests, MIME types)
//!
//! # Design Decisions
//! - Any path containing `./` (so also `../`) is refused outright
//! - The configured URL prefix is stripped once
//! - A directory resolves to the configured index file

use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::config::StaticConfig;
use crate::http::request::decoded_path;

/// Why a path could not be served from the static directory.
#[derive(Debug, thiserror::Error)]
pub enum StaticError {
    #[error("path must start with /")]
    NotAbsolute,
    #[error("path traversal rejected")]
    Traversal,
    #[error("not found")]
    NotFound,
}

/// Static directory resolved from configuration.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
    prefix: String,
    index: String,
}

impl StaticFiles {
    pub fn new(base_dir: impl Into<PathBuf>, prefix: &str, index: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            prefix: prefix.to_string(),
            index: index.to_string(),
        }
    }

    pub fn from_config(config: &StaticConfig) -> Self {
        Self::new(&config.local_path, &config.prefix, &config.index)
    }

    /// Map a URL path to a file on disk. Performs no I/O.
    pub fn map_path(&self, url_path: &str) -> Result<PathBuf, StaticError> {
        let Some(rest) = url_path.strip_prefix('/') else {
            return Err(StaticError::NotAbsolute);
        };
        if url_path.contains("./") {
            return Err(StaticError::Traversal);
        }

        let rest = if self.prefix.is_empty() {
            rest.to_string()
        } else {
            rest.replacen(&self.prefix, "", 1)
        };
        let relative = Path::new(rest.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StaticError::Traversal);
        }
        Ok(self.base_dir.join(relative))
    }

    /// Resolve a URL path to an existing file, substituting the index for directories.
    pub async fn resolve(&self, url_path: &str) -> Result<PathBuf, StaticError> {
        let path = self.map_path(url_path)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| StaticError::NotFound)?;
        if !metadata.is_dir() {
            return Ok(path);
        }

        let index = path.join(&self.index);
        match tokio::fs::metadata(&index).await {
            Ok(meta) if meta.is_file() => Ok(index),
            _ => Err(StaticError::NotFound),
        }
    }

    /// Serve the file for `request`.
    pub async fn serve(&self, request: Request<Body>) -> Result<Response, StaticError> {
        let path = self.resolve(&decoded_path(request.uri())).await?;
        let response = match ServeFile::new(path).oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        Ok(response.map(Body::new))
    }
}
