use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use url::Url;

/// Opaque identifier of an addressable artifact: a local file path or a
/// remote URL.
///
/// Equality is identity of the address, not equivalence of content: two
/// resources are equal iff they refer to the same artifact instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    File(PathBuf),
    Remote(Url),
}

impl Resource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Resource::File(path.into())
    }

    pub fn remote(url: Url) -> Self {
        Resource::Remote(url)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Resource::File(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Resource::File(path) => Some(path),
            Resource::Remote(_) => None,
        }
    }

    /// Whether the artifact currently exists on the local filesystem.
    /// Remote resources are never locally present.
    pub fn exists(&self) -> bool {
        match self {
            Resource::File(path) => path.exists(),
            Resource::Remote(_) => false,
        }
    }

    /// Modification time of the local artifact, if it exists and the
    /// filesystem reports one.
    pub fn mtime(&self) -> Option<SystemTime> {
        match self {
            Resource::File(path) => std::fs::metadata(path).and_then(|m| m.modified()).ok(),
            Resource::Remote(_) => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::File(path) => write!(f, "{}", path.display()),
            Resource::Remote(url) => write!(f, "{url}"),
        }
    }
}
