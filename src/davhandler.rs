//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::buf::Buf;
use futures_util::stream::Stream;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use log::debug;

use crate::body::{Body, StreamBody};
use crate::compat::is_mac_dav_client;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::errors::{DavError, DavResult};
use crate::locks::LockTable;
use crate::observer::{AcceptAll, DavObserver};
use crate::policy::Policy;
use crate::resolve::{Resolved, Resolver};
use crate::util::{dav_method, DavMethod};

// only methods that carry an XML document read a buffered body;
// it does not need to be large.
const MAX_XML_BODY: usize = 65536;

/// WebDAV request handler serving a local directory tree.
///
/// Built with [`builder`](Self::builder); the only required setting is the
/// share root. [`handle`](Self::handle) does the actual work.
#[derive(Clone)]
pub struct DavHandler {
    config: Arc<DavConfig>,
}

/// Configuration of the handler.
#[derive(Clone)]
pub struct DavConfig {
    // Directory tree being shared.
    root: PathBuf,
    // Prefix to be stripped off when handling requests.
    prefix: Option<String>,
    // Extension allow-list. None means all extensions are allowed.
    allowed_extensions: Option<Vec<String>>,
    // May dot-prefixed items be operated on? Default false.
    allow_hidden: bool,
    // Authorization hooks and completion notifications.
    observer: Box<dyn DavObserver>,
    // The shared lock table.
    locks: LockTable,
}

impl DavConfig {
    fn new(root: impl Into<PathBuf>) -> DavConfig {
        DavConfig {
            root: root.into(),
            prefix: None,
            allowed_extensions: None,
            allow_hidden: false,
            observer: Box::new(AcceptAll),
            locks: LockTable::new(),
        }
    }

    /// Use the configuration that was built to generate a [`DavHandler`].
    pub fn build_handler(self) -> DavHandler {
        DavHandler {
            config: Arc::new(self),
        }
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a filesystem path.
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Restrict operations to files with one of these extensions
    /// (case-insensitive). The default is no restriction.
    pub fn allowed_extensions(mut self, exts: Vec<impl Into<String>>) -> Self {
        self.allowed_extensions = Some(exts.into_iter().map(|e| e.into()).collect());
        self
    }

    /// Allow operating on hidden (dot-prefixed) files and directories.
    /// The default is false.
    pub fn allow_hidden(mut self, allow: bool) -> Self {
        self.allow_hidden = allow;
        self
    }

    /// Set the observer that receives the authorization hooks and
    /// completion notifications. The default permits everything.
    pub fn observer(mut self, observer: Box<dyn DavObserver>) -> Self {
        self.observer = observer;
        self
    }
}

// The actual inner struct.
//
// At the start of the request, DavConfig is used to generate
// a DavInner struct. DavInner::handle then handles the request.
pub(crate) struct DavInner {
    pub prefix: String,
    pub resolver: Resolver,
    pub policy: Policy,
    pub observer: Box<dyn DavObserver>,
    pub locks: LockTable,
    // the macOS DAV client gets the class-2 extras.
    pub mac_client: bool,
}

impl DavHandler {
    /// Handler for `root` with the default configuration.
    pub fn new(root: impl Into<PathBuf>) -> DavHandler {
        DavConfig::new(root).build_handler()
    }

    /// Return a configuration builder.
    pub fn builder(root: impl Into<PathBuf>) -> DavConfig {
        DavConfig::new(root)
    }

    /// Process a WebDAV request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        let inner = DavInner::new(self.config.as_ref(), req.headers());
        inner.handle(req).await
    }

    /// Handles a request with a `Stream` body instead of a `HttpBody`.
    /// Used with webserver frameworks that have not
    /// opted to use the `http_body` crate just yet.
    pub async fn handle_stream<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: Stream<Item = Result<ReqData, ReqError>>,
    {
        let (parts, body) = req.into_parts();
        let req = Request::from_parts(parts, StreamBody::new(body));
        let inner = DavInner::new(self.config.as_ref(), req.headers());
        inner.handle(req).await
    }

    /// Drop expired locks from the lock table. Expiry itself is lazy;
    /// calling this periodically merely reclaims memory.
    pub fn purge_expired_locks(&self) {
        self.config.locks.purge_expired()
    }
}

impl DavInner {
    fn new(cfg: &DavConfig, headers: &http::HeaderMap) -> DavInner {
        DavInner {
            prefix: cfg.prefix.clone().unwrap_or_default(),
            resolver: Resolver::new(&cfg.root),
            policy: Policy::new(cfg.allowed_extensions.clone(), cfg.allow_hidden),
            observer: cfg.observer.clone(),
            locks: cfg.locks.clone(),
            mac_client: is_mac_dav_client(headers),
        }
    }

    // helper.
    pub(crate) fn path(&self, req: &Request<()>) -> DavPath {
        // This never fails (has been checked before)
        DavPath::from_uri(req.uri(), &self.prefix).unwrap()
    }

    // helper.
    pub(crate) async fn has_parent(&self, path: &DavPath) -> bool {
        match self.resolver.resolve(&path.parent()).await {
            Ok(r) => r.is_collection(),
            Err(_) => false,
        }
    }

    // See if this is a directory and if so, if we have
    // to fixup the path by adding a slash at the end.
    pub(crate) fn fixpath(&self, res: &mut Response<Body>, path: &mut DavPath, meta: &Resolved) {
        if meta.is_collection() && !path.is_collection() {
            path.add_slash();
            let newloc = path.as_url_string_with_prefix();
            res.headers_mut()
                .typed_insert(davheaders::ContentLocation(newloc));
        }
    }

    // the lock tokens submitted with the request, from the If header
    // and/or a bare Lock-Token header.
    pub(crate) fn submitted_tokens(&self, req: &Request<()>) -> Vec<String> {
        let mut tokens = Vec::new();
        if let Some(davheaders::If(t)) = req.headers().typed_get::<davheaders::If>() {
            tokens.extend(t);
        }
        if let Some(davheaders::LockToken(t)) = req.headers().typed_get::<davheaders::LockToken>() {
            tokens.push(t.trim_matches(|c| c == '<' || c == '>').to_string());
        }
        tokens
    }

    // check that a write to `path` is not blocked by someone else's lock.
    pub(crate) fn check_locks(&self, req: &Request<()>, path: &DavPath) -> DavResult<()> {
        let tokens = self.submitted_tokens(req);
        let tokens: Vec<&str> = tokens.iter().map(|s| s.as_str()).collect();
        match self.locks.check(path, &tokens) {
            Ok(()) => Ok(()),
            Err(_l) => Err(DavError::Locked),
        }
    }

    // drain request body and return it, up to max_size.
    pub(crate) async fn read_request<ReqBody, ReqData, ReqError>(
        &self,
        body: ReqBody,
        max_size: usize,
    ) -> DavResult<Vec<u8>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        let mut body = std::pin::pin!(body);

        while let Some(res) = body.as_mut().frame().await {
            let mut frame = res.map_err(|_| {
                DavError::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "UnexpectedEof"))
            })?;
            let Some(buf) = frame.data_mut() else {
                continue;
            };
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(data)
    }

    // internal dispatcher.
    async fn handle<ReqBody, ReqData, ReqError>(self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        // Turn any DavError results into a HTTP error response.
        match self.handle2(req).await {
            Ok(resp) => {
                debug!("== END REQUEST result OK");
                resp
            }
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                let mut resp = Response::builder()
                    .header("Content-Length", "0")
                    .status(err.statuscode());
                if err.must_close() {
                    resp = resp.header("Connection", "close");
                }
                resp.body(Body::empty()).unwrap()
            }
        }
    }

    // internal dispatcher part 2.
    async fn handle2<ReqBody, ReqData, ReqError>(
        self,
        req: Request<ReqBody>,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        // translate HTTP method to Webdav method.
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method(), req.uri());
                return Err(e);
            }
        };

        // make sure the request path is valid.
        let path = DavPath::from_uri(req.uri(), &self.prefix)?;

        // PUT is the only handler that reads the body itself. All the
        // other handlers either expect no body, or a pre-read Vec<u8>.
        let (body_strm, body_data) = match method {
            DavMethod::Put => (Some(body), Vec::new()),
            _ => (None, self.read_request(body, MAX_XML_BODY).await?),
        };

        // Not all methods accept a body.
        match method {
            DavMethod::Put | DavMethod::PropFind | DavMethod::Lock => {}
            _ => {
                if !body_data.is_empty() {
                    return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
                }
            }
        }

        debug!("== START REQUEST {:?} {}", method, path);

        match method {
            DavMethod::Options => self.handle_options(&req).await,
            DavMethod::PropFind => self.handle_propfind(&req, &body_data).await,
            DavMethod::MkCol => self.handle_mkcol(&req).await,
            DavMethod::Delete => self.handle_delete(&req).await,
            DavMethod::Lock => self.handle_lock(&req, &body_data).await,
            DavMethod::Unlock => self.handle_unlock(&req).await,
            DavMethod::Head | DavMethod::Get => self.handle_get(&req).await,
            DavMethod::Copy | DavMethod::Move => self.handle_copymove(&req, method).await,
            DavMethod::Put => self.handle_put(&req, body_strm.unwrap()).await,
        }
    }
}
