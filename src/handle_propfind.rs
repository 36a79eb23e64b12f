use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};
use log::{debug, error};
use tokio::fs;

use crate::body::Body;
use crate::davheaders::Depth;
use crate::errors::{DavError, DavResult};
use crate::props::{parse_propfind, PropRenderer};
use crate::util::dav_xml_error;

impl crate::DavInner {
    pub(crate) async fn handle_propfind(
        &self,
        req: &Request<()>,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());

        // desktop clients cache 404s and directory listings aggressively
        // unless told not to.
        let cc = "no-store, no-cache, must-revalidate".parse().unwrap();
        let pg = "no-cache".parse().unwrap();
        res.headers_mut().insert("Cache-Control", cc);
        res.headers_mut().insert("Pragma", pg);

        // Depth: infinity is refused, it makes the response size
        // unbounded. RFC default for a missing header is infinity, so
        // that is refused too.
        let depth = match req.headers().typed_get::<Depth>() {
            Some(Depth::Zero) => Depth::Zero,
            Some(Depth::One) => Depth::One,
            _ => {
                let ct = "application/xml; charset=utf-8".parse().unwrap();
                res.headers_mut().insert("Content-Type", ct);
                *res.status_mut() = SC::FORBIDDEN;
                *res.body_mut() = dav_xml_error("<D:propfind-finite-depth/>");
                return Ok(res);
            }
        };

        let mut path = self.path(req);
        let resolved = self.resolver.resolve(&path).await?;
        if !resolved.exists() {
            return Err(DavError::NotFound);
        }
        // items the policy hides do not exist, as far as clients can tell.
        if !self.policy.path_allowed(&path, resolved.is_collection()) {
            return Err(DavError::NotFound);
        }
        self.fixpath(&mut res, &mut path, &resolved);

        let reqtype = parse_propfind(xmldata)?;
        debug!("propfind: {} depth {:?}", path, depth);

        let mut pw = PropRenderer::new(&reqtype, &self.locks, self.mac_client);
        let Some(meta) = resolved.meta.as_ref() else {
            return Err(DavError::NotFound);
        };
        pw.add_resource(&path, meta);

        if resolved.is_collection() && depth == Depth::One {
            let mut entries = fs::read_dir(&resolved.fullpath).await?;
            loop {
                match entries.next_entry().await {
                    Ok(None) => break,
                    Ok(Some(dirent)) => {
                        let ft = match dirent.file_type().await {
                            Ok(ft) => ft,
                            Err(_) => continue,
                        };
                        if ft.is_symlink() {
                            continue;
                        }
                        let name = dirent.file_name();
                        if !self
                            .policy
                            .name_allowed(name.as_encoded_bytes(), ft.is_dir())
                        {
                            continue;
                        }
                        let meta = match dirent.metadata().await {
                            Ok(m) => m,
                            Err(_) => continue,
                        };
                        let mut npath = path.clone();
                        npath.push_segment(name.as_encoded_bytes());
                        npath.add_slash_if(ft.is_dir());
                        pw.add_resource(&npath, &meta);
                    }
                    Err(e) => {
                        // if we cannot finish the listing, just stop there.
                        error!("propfind: read_dir error on {}: {}", path, e);
                        break;
                    }
                }
            }
        }

        let ct = "application/xml; charset=utf-8".parse().unwrap();
        res.headers_mut().insert("Content-Type", ct);
        *res.status_mut() = SC::MULTI_STATUS;
        *res.body_mut() = Body::from(pw.into_body()?);
        Ok(res)
    }
}
