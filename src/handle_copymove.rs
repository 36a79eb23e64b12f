use std::io;
use std::path::{Path, PathBuf};

use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};
use log::{debug, error};
use tokio::fs;

use crate::body::Body;
use crate::davheaders::{self, Depth};
use crate::davpath::DavPath;
use crate::errors::{DavError, DavResult};
use crate::util::DavMethod;

impl crate::DavInner {
    pub(crate) async fn handle_copymove(
        &self,
        req: &Request<()>,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        // get and check headers.
        let overwrite = req
            .headers()
            .typed_get::<davheaders::Overwrite>()
            .map_or(true, |o| o.0);
        let depth = match req.headers().typed_get::<Depth>() {
            Some(Depth::Infinity) | None => Depth::Infinity,
            Some(Depth::Zero) if method == DavMethod::Copy => Depth::Zero,
            _ => return Err(DavError::Status(SC::BAD_REQUEST)),
        };

        // decode and validate destination.
        let dest = req
            .headers()
            .typed_get::<davheaders::Destination>()
            .ok_or(DavError::Status(SC::BAD_REQUEST))?;
        let mut dest = DavPath::from_str(&dest.0, &self.prefix)?;

        // source must exist.
        let mut path = self.path(req);
        let source = self.resolver.resolve(&path).await?;
        if !source.exists() {
            return Err(DavError::NotFound);
        }
        let is_dir = source.is_collection();
        path.add_slash_if(is_dir);
        dest.add_slash_if(is_dir);

        if !self.policy.path_allowed(&path, is_dir) || !self.policy.path_allowed(&dest, is_dir) {
            return Err(DavError::Forbidden);
        }

        // check if source == dest, or dest is inside source.
        if path == dest {
            return Err(DavError::Forbidden);
        }
        if is_dir && dest.as_bytes().starts_with(path.as_bytes()) {
            return Err(DavError::Forbidden);
        }

        // parent of the destination must exist.
        if !self.has_parent(&dest).await {
            return Err(DavError::Conflict);
        }

        let dresolved = self.resolver.resolve(&dest).await?;
        let exists = dresolved.exists();
        if !overwrite && exists {
            return Err(DavError::PreconditionFailed);
        }

        // check locks. a MOVE must also hold the source lock; both need
        // write access to the destination.
        if method == DavMethod::Move {
            self.check_locks(req, &path)?;
        }
        self.check_locks(req, &dest)?;

        let allowed = match method {
            DavMethod::Move => self.observer.should_move(&path, &dest),
            _ => self.observer.should_copy(&path, &dest),
        };
        if !allowed {
            debug!("{:?} {} -> {} vetoed", method, path, dest);
            return Err(DavError::Forbidden);
        }

        // see if we need to delete the destination first. a plain file
        // onto file copy/rename clobbers in place.
        if exists && (is_dir || dresolved.is_collection()) {
            debug!("handle_copymove: deleting destination {}", dest);
            if dresolved.is_collection() {
                fs::remove_dir_all(&dresolved.fullpath).await?;
            } else {
                fs::remove_file(&dresolved.fullpath).await?;
            }
            self.locks.discard_below(&dest);
        }

        if method == DavMethod::Copy {
            do_copy(&source.fullpath, &dresolved.fullpath, depth).await?;
            self.observer.did_copy(&path, &dest);
        } else {
            fs::rename(&source.fullpath, &dresolved.fullpath).await?;
            // locks do not travel along with a moved resource.
            self.locks.discard_below(&path);
            self.observer.did_move(&path, &dest);
        }

        let mut res = Response::new(Body::empty());
        *res.status_mut() = if exists { SC::NO_CONTENT } else { SC::CREATED };
        Ok(res)
    }
}

// Recursive copy. Files take the reflink fast path when the filesystem
// supports it. Symlinks are not followed and not copied.
async fn do_copy(source: &Path, dest: &Path, depth: Depth) -> DavResult<()> {
    let meta = fs::symlink_metadata(source).await?;

    if meta.is_file() {
        copy_file(source, dest).await?;
        return Ok(());
    }
    if !meta.is_dir() {
        return Ok(());
    }

    // Copying a collection with Depth 0 means "just create the
    // destination collection".
    fs::create_dir(dest).await?;
    if depth == Depth::Zero {
        return Ok(());
    }

    let mut entries = fs::read_dir(source).await?;
    while let Some(dirent) = entries.next_entry().await? {
        let ft = dirent.file_type().await?;
        if ft.is_symlink() {
            debug!("do_copy: skipping symlink {:?}", dirent.path());
            continue;
        }
        let ndest = dest.join(dirent.file_name());
        if let Err(e) = Box::pin(do_copy(&dirent.path(), &ndest, depth)).await {
            error!("do_copy: {:?} -> {:?}: {}", dirent.path(), ndest, e);
            return Err(e);
        }
    }
    Ok(())
}

async fn copy_file(source: &Path, dest: &Path) -> DavResult<()> {
    let (s, d): (PathBuf, PathBuf) = (source.into(), dest.into());
    tokio::task::spawn_blocking(move || reflink_copy::reflink_or_copy(&s, &d).map(|_| ()))
        .await
        .map_err(|_| DavError::IoError(io::Error::other("copy task failed")))??;
    Ok(())
}
