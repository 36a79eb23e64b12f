//! Maps a validated request path onto the share root.
//!
//! `DavPath` already guarantees there are no dotdot segments; what is
//! left to enforce here is that symlinks under the root cannot lead a
//! request outside of it. The nearest existing ancestor of the target is
//! canonicalized and must still be a descendant of the canonicalized
//! root, otherwise the request fails with `PathEscape`.
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::fs;

use crate::davpath::DavPath;
use crate::errors::{DavError, DavResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ResourceKind {
    File,
    Collection,
}

/// A request path resolved to a filesystem location.
pub(crate) struct Resolved {
    /// Absolute path inside the share root. The resource may not exist.
    pub fullpath: PathBuf,
    pub kind: Option<ResourceKind>,
    pub meta: Option<Metadata>,
}

impl Resolved {
    pub fn exists(&self) -> bool {
        self.kind.is_some()
    }

    pub fn is_collection(&self) -> bool {
        self.kind == Some(ResourceKind::Collection)
    }

    pub fn is_file(&self) -> bool {
        self.kind == Some(ResourceKind::File)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Resolver {
    root: PathBuf,
}

impl Resolver {
    pub fn new(root: impl Into<PathBuf>) -> Resolver {
        Resolver { root: root.into() }
    }

    /// Resolve `path` to an absolute filesystem path strictly inside the
    /// share root, and stat what is there.
    pub async fn resolve(&self, path: &DavPath) -> DavResult<Resolved> {
        let root = fs::canonicalize(&self.root).await?;
        let fullpath = root.join(path.as_rel_pathbuf());

        // canonicalize the nearest existing ancestor; if a symlink takes
        // it outside the root the path is rejected.
        let mut anc = fullpath.clone();
        let canon = loop {
            match fs::canonicalize(&anc).await {
                Ok(c) => break c,
                Err(e) if e.kind() == ErrorKind::NotFound => match anc.parent() {
                    Some(p) => anc = p.to_path_buf(),
                    None => return Err(DavError::PathEscape),
                },
                Err(e) => return Err(e.into()),
            }
        };
        if canon != root && !canon.starts_with(&root) {
            return Err(DavError::PathEscape);
        }

        let (kind, meta) = match fs::metadata(&fullpath).await {
            Ok(m) => {
                let kind = if m.is_dir() {
                    ResourceKind::Collection
                } else {
                    ResourceKind::File
                };
                (Some(kind), Some(m))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => (None, None),
            Err(e) => return Err(e.into()),
        };

        Ok(Resolved {
            fullpath,
            kind,
            meta,
        })
    }
}
