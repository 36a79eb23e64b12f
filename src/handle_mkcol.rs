use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};
use log::debug;
use tokio::fs;

use crate::body::Body;
use crate::davheaders;
use crate::errors::{DavError, DavResult};

impl crate::DavInner {
    pub(crate) async fn handle_mkcol(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let mut path = self.path(req);
        if !self.policy.path_allowed(&path, true) {
            return Err(DavError::Forbidden);
        }

        let resolved = self.resolver.resolve(&path).await?;
        if resolved.exists() {
            return Err(DavError::Conflict);
        }
        if !self.has_parent(&path).await {
            return Err(DavError::Conflict);
        }
        self.check_locks(req, &path)?;

        if !self.observer.should_create_directory(&path) {
            debug!("mkcol {} vetoed", path);
            return Err(DavError::Forbidden);
        }

        fs::create_dir(&resolved.fullpath).await?;
        self.observer.did_create_directory(&path);

        let mut res = Response::new(Body::empty());
        path.add_slash();
        res.headers_mut()
            .typed_insert(davheaders::ContentLocation(path.as_url_string_with_prefix()));
        *res.status_mut() = SC::CREATED;
        Ok(res)
    }
}
