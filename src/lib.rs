//! `Webdav` (RFC4918) is HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extra methods.
//!
//! This crate implements a webdav handler that shares a local directory
//! tree, using the types from the `http` crate: you hand it an
//! `http::Request`, it gives you back an `http::Response`. The handler is
//! class 1 compliant (PROPFIND/MKCOL/COPY/MOVE plus the plain HTTP
//! methods) and carries enough class 2 (exclusive write locks) to keep
//! the macOS Finder happy. Class 2 is only advertised when that client
//! is detected, so strict clients see a plain class 1 server.
//!
//! Every request path is validated against the share root: dotdot
//! segments, encoded slashes and symlink traversal cannot escape it. An
//! extension allow-list and a hidden-file rule decide which items are
//! operable at all.
//!
//! The embedding application can hook into the share through a
//! [`DavObserver`]: authorization hooks that may veto uploads, moves,
//! copies, deletes and directory creation, plus notifications after each
//! completed operation.
//!
//! With some glue code, this handler can be used from HTTP server
//! libraries/frameworks such as hyper or axum:
//!
//! ```no_run
//! use davshare::DavHandler;
//!
//! # async fn serve() {
//! let dav = DavHandler::builder("/srv/share")
//!     .allow_hidden(false)
//!     .build_handler();
//!
//! // inside your request handler:
//! # let req = http::Request::builder().method("OPTIONS").uri("/").body(davshare::body::Body::empty()).unwrap();
//! let resp = dav.handle(req).await;
//! # let _ = resp;
//! # }
//! ```

mod compat;
mod davhandler;
mod davheaders;
mod errors;
mod handle_copymove;
mod handle_delete;
mod handle_get;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_propfind;
mod handle_put;
mod policy;
mod props;
mod resolve;
mod util;
mod xmltree_ext;

pub mod body;
pub mod davpath;
pub mod locks;
pub mod observer;

pub(crate) use crate::davhandler::DavInner;

pub use crate::davhandler::{DavConfig, DavHandler};
pub use crate::observer::{AcceptAll, DavObserver};
pub use crate::util::DavMethod;
