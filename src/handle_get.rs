use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};

use crate::body::Body;
use crate::errors::{DavError, DavResult};
use crate::util::systemtime_to_httpdate;

impl crate::DavInner {
    pub(crate) async fn handle_get(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let head = req.method() == http::Method::HEAD;
        let path = self.path(req);

        let resolved = self.resolver.resolve(&path).await?;
        if !resolved.exists() {
            return Err(DavError::NotFound);
        }
        // GET is for files; a collection has no content to stream.
        if resolved.is_collection() {
            return Err(DavError::Status(SC::METHOD_NOT_ALLOWED));
        }
        if !self.policy.path_allowed(&path, false) {
            return Err(DavError::Forbidden);
        }

        let Some(meta) = resolved.meta.as_ref() else {
            return Err(DavError::NotFound);
        };
        let file = tokio::fs::File::open(&resolved.fullpath).await?;

        let mut res = Response::new(Body::empty());
        let ct = path.get_mime_type_str().parse().unwrap();
        res.headers_mut().insert("Content-Type", ct);
        res.headers_mut()
            .typed_insert(headers::ContentLength(meta.len()));
        if let Ok(modified) = meta.modified() {
            let lm = systemtime_to_httpdate(modified).parse().unwrap();
            res.headers_mut().insert("Last-Modified", lm);
        }
        *res.status_mut() = SC::OK;

        if !head {
            *res.body_mut() = Body::from_file(file);
            self.observer.did_download(&path);
        }
        Ok(res)
    }
}
