//! The observer is the embedding application's view into the share.
//!
//! Before a mutating operation the handler asks the matching `should_*`
//! hook; a `false` answer aborts the request with 403 Forbidden before
//! anything touches the filesystem. After a successful operation exactly
//! one `did_*` notification fires. Both run synchronously inside the
//! request task; if the application wants delivery on a particular thread
//! (a UI loop, say) it queues the event itself.
use std::path::Path;

use dyn_clone::{clone_trait_object, DynClone};

use crate::davpath::DavPath;

/// Authorization hooks and completion notifications for the share.
///
/// Every method has a default implementation (permit / ignore), so an
/// observer only overrides what it cares about.
#[allow(unused_variables)]
pub trait DavObserver: Send + Sync + DynClone {
    /// Called before an uploaded file replaces `path`. The upload is
    /// available for inspection at `temp_file`.
    fn should_upload(&self, path: &DavPath, temp_file: &Path) -> bool {
        true
    }

    /// Called before a file or directory is moved.
    fn should_move(&self, from: &DavPath, to: &DavPath) -> bool {
        true
    }

    /// Called before a file or directory is copied.
    fn should_copy(&self, from: &DavPath, to: &DavPath) -> bool {
        true
    }

    /// Called before a file or directory is deleted.
    fn should_delete(&self, path: &DavPath) -> bool {
        true
    }

    /// Called before a directory is created.
    fn should_create_directory(&self, path: &DavPath) -> bool {
        true
    }

    /// A file was downloaded.
    fn did_download(&self, path: &DavPath) {}

    /// A file was uploaded.
    fn did_upload(&self, path: &DavPath) {}

    /// A file or directory was moved.
    fn did_move(&self, from: &DavPath, to: &DavPath) {}

    /// A file or directory was copied.
    fn did_copy(&self, from: &DavPath, to: &DavPath) {}

    /// A file or directory was deleted.
    fn did_delete(&self, path: &DavPath) {}

    /// A directory was created.
    fn did_create_directory(&self, path: &DavPath) {}
}

clone_trait_object!(DavObserver);

/// The default observer: permits everything, ignores all notifications.
#[derive(Debug, Clone, Default)]
pub struct AcceptAll;

impl DavObserver for AcceptAll {}
