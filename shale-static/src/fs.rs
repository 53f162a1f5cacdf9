//! Sandbox-rooted filesystem access

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;

/// Lexically clean an absolute URL path: collapse `.` and `..` segments
/// and redundant separators. The result always starts with `/` and never
/// escapes it, so joining it under a root cannot leave the root.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut cleaned = String::with_capacity(path.len());
    for segment in segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    cleaned
}

/// A directory that requests may not escape
#[derive(Debug, Clone)]
pub struct RootedDir {
    root: PathBuf,
}

impl RootedDir {
    /// Create an accessor rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The sandbox root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open a cleaned URL path under the root.
    ///
    /// Requests whose final segment names a hidden file (leading dot) are
    /// answered with `NotFound` before touching the filesystem, so a
    /// dotfile that exists on disk is indistinguishable from one that
    /// does not. Open errors are propagated unmodified for the caller to
    /// classify.
    pub async fn open(&self, url_path: &str) -> io::Result<(File, std::fs::Metadata)> {
        let mut full = self.root.clone();
        for segment in url_path.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }

        if url_path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .is_some_and(|name| name.starts_with('.'))
        {
            return Err(io::Error::new(io::ErrorKind::NotFound, "hidden file"));
        }

        let file = File::open(&full).await?;
        let metadata = file.metadata().await?;
        Ok((file, metadata))
    }
}
