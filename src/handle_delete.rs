use http::StatusCode as SC;
use http::{Request, Response};
use log::debug;
use tokio::fs;

use crate::body::Body;
use crate::errors::{DavError, DavResult};

impl crate::DavInner {
    pub(crate) async fn handle_delete(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        // RFC4918 9.6: DELETE always acts as if Depth: infinity.
        let mut path = self.path(req);
        path.remove_slash();

        let resolved = self.resolver.resolve(&path).await?;
        if !resolved.exists() {
            return Err(DavError::NotFound);
        }
        if !self.policy.path_allowed(&path, resolved.is_collection()) {
            return Err(DavError::Forbidden);
        }
        self.check_locks(req, &path)?;

        if !self.observer.should_delete(&path) {
            debug!("delete of {} vetoed", path);
            return Err(DavError::Forbidden);
        }

        if resolved.is_collection() {
            fs::remove_dir_all(&resolved.fullpath).await?;
        } else {
            fs::remove_file(&resolved.fullpath).await?;
        }

        // locks held on anything that was just removed die with it.
        self.locks.discard_below(&path);
        self.observer.did_delete(&path);

        let mut res = Response::new(Body::empty());
        *res.status_mut() = SC::NO_CONTENT;
        Ok(res)
    }
}
