use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};

use crate::body::Body;
use crate::davheaders;
use crate::errors::DavResult;

impl crate::DavInner {
    pub(crate) async fn handle_options(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());

        {
            let h = res.headers_mut();
            // Class 2 is only advertised to the mac DAV client; strict
            // clients that never lock get a plain class 1 server. The
            // LOCK/UNLOCK handlers work either way.
            if self.mac_client {
                h.typed_insert(davheaders::Dav("1,2".to_string()));
            } else {
                h.typed_insert(davheaders::Dav("1".to_string()));
            }
            h.typed_insert(davheaders::MSAuthorVia("DAV".to_string()));
            h.typed_insert(headers::ContentLength(0));
        }

        let path = self.path(req);
        let meta = if path.is_star() {
            None
        } else {
            self.resolver.resolve(&path).await.ok()
        };

        // Build the Allow header for this resource state.
        let mut v = Vec::new();
        let exists = meta.as_ref().map(|m| m.exists()).unwrap_or(false);
        let is_file = meta.as_ref().map(|m| m.is_file()).unwrap_or(false);

        if !exists && !path.is_star() {
            v.extend(["OPTIONS", "MKCOL", "PUT", "LOCK"]);
        } else {
            if is_file || path.is_star() {
                v.extend(["HEAD", "GET", "PUT"]);
            }
            v.extend(["OPTIONS", "PROPFIND", "COPY"]);
            if !path.is_root() {
                v.extend(["MOVE", "DELETE"]);
            }
            v.extend(["LOCK", "UNLOCK"]);
        }

        let allow = v.join(",").parse().unwrap();
        res.headers_mut().insert("Allow", allow);

        *res.status_mut() = SC::OK;
        Ok(res)
    }
}
