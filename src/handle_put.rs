use std::error::Error as StdError;
use std::path::{Path, PathBuf};

use bytes::Buf;
use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use log::debug;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::body::Body;
use crate::errors::{DavError, DavResult};

impl crate::DavInner {
    pub(crate) async fn handle_put<ReqBody, ReqData, ReqError>(
        &self,
        req: &Request<()>,
        body: ReqBody,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let path = self.path(req);
        if path.is_collection() {
            // the body has not been drained, the connection is a loss.
            return Err(DavError::StatusClose(SC::METHOD_NOT_ALLOWED));
        }
        if !self.policy.path_allowed(&path, false) {
            return Err(DavError::Forbidden);
        }

        let resolved = self.resolver.resolve(&path).await?;
        if resolved.is_collection() {
            return Err(DavError::StatusClose(SC::METHOD_NOT_ALLOWED));
        }
        if !self.has_parent(&path).await {
            return Err(DavError::Conflict);
        }
        self.check_locks(req, &path)?;

        // The body lands in a temporary file next to the target, which
        // then atomically replaces it. A client that disconnects halfway
        // leaves a temp file behind, never a half-written target.
        let existed = resolved.exists();
        let tmp = temp_name(&resolved.fullpath);
        if let Err(e) = write_body(&tmp, body).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        // the upload is complete; let the application inspect it.
        if !self.observer.should_upload(&path, &tmp) {
            debug!("put: upload of {} vetoed", path);
            let _ = fs::remove_file(&tmp).await;
            return Err(DavError::Forbidden);
        }

        if let Err(e) = fs::rename(&tmp, &resolved.fullpath).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        self.observer.did_upload(&path);

        // Report whether we created or updated the file.
        let mut res = Response::new(Body::empty());
        *res.status_mut() = if existed {
            SC::NO_CONTENT
        } else {
            res.headers_mut().typed_insert(headers::ContentLength(0));
            SC::CREATED
        };
        Ok(res)
    }
}

fn temp_name(target: &Path) -> PathBuf {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!(".davshare-upload-{}", Uuid::new_v4().simple()))
}

async fn write_body<ReqBody, ReqData, ReqError>(tmp: &Path, body: ReqBody) -> DavResult<()>
where
    ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    ReqData: Buf + Send + 'static,
    ReqError: StdError + Send + Sync + 'static,
{
    let mut file = fs::File::create(tmp).await?;
    let mut body = std::pin::pin!(body);
    while let Some(res) = body.as_mut().frame().await {
        let mut frame = res.map_err(|_| {
            DavError::IoError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "UnexpectedEof",
            ))
        })?;
        let Some(buf) = frame.data_mut() else {
            continue;
        };
        while buf.has_remaining() {
            let chunk = buf.chunk();
            let n = chunk.len();
            // a full disk is the one write error with its own status.
            file.write_all(chunk)
                .await
                .map_err(|_| DavError::InsufficientStorage)?;
            buf.advance(n);
        }
    }
    file.flush()
        .await
        .map_err(|_| DavError::InsufficientStorage)?;
    Ok(())
}
