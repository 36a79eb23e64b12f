use std::error::Error;
use std::io::ErrorKind;

use http::StatusCode;

/// Error taxonomy of the handler.
///
/// Every variant maps to exactly one HTTP status via [`statuscode`](DavError::statuscode).
/// Filesystem errors are translated at the handler boundary; they never
/// escape a request as a panic or a raw `io::Error`.
#[derive(Debug)]
pub(crate) enum DavError {
    // error reading/parsing request xml.
    XmlReadError,
    // xml was well-formed but not what we expected.
    XmlParseError,
    // malformed request path (bad escapes, dotdot, NUL).
    InvalidPath,
    // path resolved to something outside the share root.
    PathEscape,
    NotFound,
    Conflict,
    Forbidden,
    Locked,
    PreconditionFailed,
    InsufficientStorage,
    UnknownDavMethod,
    Status(StatusCode),
    StatusClose(StatusCode),
    IoError(std::io::Error),
    XmlWriterError(xml::writer::Error),
}

pub(crate) type DavResult<T> = Result<T, DavError>;

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::IoError(e) => Some(e),
            DavError::XmlWriterError(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::XmlWriterError(_) => write!(f, "XML generate error"),
            DavError::IoError(_) => write!(f, "I/O error"),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<std::io::Error> for DavError {
    fn from(e: std::io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        DavError::XmlWriterError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(sc: StatusCode) -> Self {
        DavError::Status(sc)
    }
}

fn ioerror_to_status(ioerror: &std::io::Error) -> StatusCode {
    match ioerror.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::StorageFull | ErrorKind::QuotaExceeded => StatusCode::INSUFFICIENT_STORAGE,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::PathEscape => StatusCode::FORBIDDEN,
            DavError::NotFound => StatusCode::NOT_FOUND,
            DavError::Conflict => StatusCode::CONFLICT,
            DavError::Forbidden => StatusCode::FORBIDDEN,
            DavError::Locked => StatusCode::LOCKED,
            DavError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            DavError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::IoError(e) => ioerror_to_status(e),
            DavError::Status(e) => *e,
            DavError::StatusClose(e) => *e,
            DavError::XmlWriterError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // a request that died halfway through its body cannot be
    // followed by another one on the same connection.
    pub(crate) fn must_close(&self) -> bool {
        matches!(self, DavError::StatusClose(_) | DavError::IoError(_))
    }
}
