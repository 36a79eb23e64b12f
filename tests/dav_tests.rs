use davshare::{body::Body, DavHandler};
use http::{Request, Response, StatusCode};
use tempfile::TempDir;

fn setup() -> (DavHandler, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let handler = DavHandler::new(dir.path());
    (handler, dir)
}

fn req(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn req_body(method: &str, uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.into()))
        .unwrap()
}

async fn resp_to_string(mut resp: Response<Body>) -> String {
    use futures_util::StreamExt;

    let mut data = Vec::new();
    let body = resp.body_mut();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => data.extend_from_slice(&bytes),
            Err(e) => panic!("Error reading body stream: {}", e),
        }
    }
    String::from_utf8(data).unwrap_or_default()
}

const LOCKINFO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>test-suite</D:href></D:owner>
</D:lockinfo>"#;

#[tokio::test]
async fn test_options_advertises_class_1() {
    let (server, _dir) = setup();
    let resp = server.handle(req("OPTIONS", "/")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("dav").unwrap(), "1");
    let allow = resp.headers().get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("PROPFIND"));
    assert!(allow.contains("LOCK"));
}

#[tokio::test]
async fn test_options_advertises_class_2_to_finder() {
    let (server, _dir) = setup();
    let resp = server
        .handle(
            Request::builder()
                .method("OPTIONS")
                .uri("/")
                .header("User-Agent", "WebDAVFS/3.0.0 (03008000) Darwin/21.1.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.headers().get("dav").unwrap(), "1,2");
}

#[tokio::test]
async fn test_put_get_roundtrip() {
    let (server, _dir) = setup();

    let resp = server.handle(req_body("PUT", "/file.txt", "hello webdav")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = server.handle(req("GET", "/file.txt")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-length").unwrap(),
        &format!("{}", "hello webdav".len())
    );
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/plain"
    );
    assert_eq!(resp_to_string(resp).await, "hello webdav");

    // updating an existing file is 204
    let resp = server.handle(req_body("PUT", "/file.txt", "changed")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = server.handle(req("GET", "/file.txt")).await;
    assert_eq!(resp_to_string(resp).await, "changed");
}

#[tokio::test]
async fn test_get_missing_is_404() {
    let (server, _dir) = setup();
    let resp = server.handle(req("GET", "/nope.txt")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_without_parent_is_409() {
    let (server, _dir) = setup();
    let resp = server.handle(req_body("PUT", "/no/such/dir/f.txt", "x")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_mkcol() {
    let (server, dir) = setup();

    let resp = server.handle(req("MKCOL", "/docs")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(dir.path().join("docs").is_dir());

    // already exists
    let resp = server.handle(req("MKCOL", "/docs")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // parent missing
    let resp = server.handle(req("MKCOL", "/a/b/c")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // MKCOL does not take a body
    let resp = server.handle(req_body("MKCOL", "/other", "stuff")).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_propfind_depths() {
    let (server, _dir) = setup();
    server.handle(req("MKCOL", "/dir")).await;
    server.handle(req_body("PUT", "/dir/a.txt", "a")).await;
    server.handle(req_body("PUT", "/dir/b.txt", "b")).await;

    // depth 0: just the collection itself
    let resp = server
        .handle(
            Request::builder()
                .method("PROPFIND")
                .uri("/dir")
                .header("Depth", "0")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let body = resp_to_string(resp).await;
    assert_eq!(body.matches("<D:response>").count(), 1);
    assert!(body.contains("<D:collection>"));

    // depth 1: collection plus direct children
    let resp = server
        .handle(
            Request::builder()
                .method("PROPFIND")
                .uri("/dir")
                .header("Depth", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let body = resp_to_string(resp).await;
    assert_eq!(body.matches("<D:response>").count(), 3);
    assert!(body.contains("/dir/a.txt"));
    assert!(body.contains("/dir/b.txt"));

    // depth infinity is forbidden, as is a missing Depth header
    for r in [
        Request::builder()
            .method("PROPFIND")
            .uri("/dir")
            .header("Depth", "infinity")
            .body(Body::empty())
            .unwrap(),
        req("PROPFIND", "/dir"),
    ] {
        let resp = server.handle(r).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body = resp_to_string(resp).await;
        assert!(body.contains("propfind-finite-depth"));
    }
}

#[tokio::test]
async fn test_propfind_unknown_prop_gets_404_block() {
    let (server, _dir) = setup();
    server.handle(req_body("PUT", "/f.txt", "x")).await;

    let body = r#"<?xml version="1.0"?>
        <D:propfind xmlns:D="DAV:" xmlns:X="urn:example:">
          <D:prop><D:getcontentlength/><X:frobnicate/></D:prop>
        </D:propfind>"#;
    let resp = server
        .handle(
            Request::builder()
                .method("PROPFIND")
                .uri("/f.txt")
                .header("Depth", "0")
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let body = resp_to_string(resp).await;
    assert!(body.contains("<D:getcontentlength>1</D:getcontentlength>"));
    assert!(body.contains("404 Not Found"));
    assert!(body.contains("frobnicate"));
}

#[tokio::test]
async fn test_delete() {
    let (server, dir) = setup();
    server.handle(req("MKCOL", "/dir")).await;
    server.handle(req_body("PUT", "/dir/f.txt", "x")).await;

    let resp = server.handle(req("DELETE", "/dir")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(!dir.path().join("dir").exists());

    let resp = server.handle(req("DELETE", "/dir")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_copy_and_move() {
    let (server, dir) = setup();
    server.handle(req("MKCOL", "/src")).await;
    server.handle(req_body("PUT", "/src/f.txt", "payload")).await;

    let resp = server
        .handle(
            Request::builder()
                .method("COPY")
                .uri("/src")
                .header("Destination", "/copy")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(dir.path().join("src/f.txt").is_file());
    let resp = server.handle(req("GET", "/copy/f.txt")).await;
    assert_eq!(resp_to_string(resp).await, "payload");

    let resp = server
        .handle(
            Request::builder()
                .method("MOVE")
                .uri("/src")
                .header("Destination", "http://localhost:4918/moved")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(!dir.path().join("src").exists());
    let resp = server.handle(req("GET", "/moved/f.txt")).await;
    assert_eq!(resp_to_string(resp).await, "payload");
}

#[tokio::test]
async fn test_move_overwrite_f_leaves_both_untouched() {
    let (server, _dir) = setup();
    server.handle(req_body("PUT", "/src.txt", "source")).await;
    server.handle(req_body("PUT", "/dst.txt", "dest")).await;

    let resp = server
        .handle(
            Request::builder()
                .method("MOVE")
                .uri("/src.txt")
                .header("Destination", "/dst.txt")
                .header("Overwrite", "F")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);

    let resp = server.handle(req("GET", "/src.txt")).await;
    assert_eq!(resp_to_string(resp).await, "source");
    let resp = server.handle(req("GET", "/dst.txt")).await;
    assert_eq!(resp_to_string(resp).await, "dest");

    // with the default (Overwrite: T) the destination is replaced
    let resp = server
        .handle(
            Request::builder()
                .method("MOVE")
                .uri("/src.txt")
                .header("Destination", "/dst.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = server.handle(req("GET", "/dst.txt")).await;
    assert_eq!(resp_to_string(resp).await, "source");
}

#[tokio::test]
async fn test_copy_onto_itself_is_403() {
    let (server, _dir) = setup();
    server.handle(req_body("PUT", "/f.txt", "x")).await;
    let resp = server
        .handle(
            Request::builder()
                .method("COPY")
                .uri("/f.txt")
                .header("Destination", "/f.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_lock_lifecycle() {
    let (server, dir) = setup();

    // MKCOL /docs on an empty root
    let resp = server.handle(req("MKCOL", "/docs")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // LOCK of an unmapped resource creates a zero-length placeholder
    let resp = server.handle(req_body("LOCK", "/docs/a.txt", LOCKINFO)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let token = resp
        .headers()
        .get("lock-token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(token.contains("urn:uuid:"));
    let placeholder = dir.path().join("docs/a.txt");
    assert!(placeholder.is_file());
    assert_eq!(std::fs::metadata(&placeholder).unwrap().len(), 0);
    let body = resp_to_string(resp).await;
    assert!(body.contains("<D:lockdiscovery>"));
    assert!(body.contains("<D:exclusive>"));

    // PUT with the token succeeds, and the placeholder becomes content
    let resp = server
        .handle(
            Request::builder()
                .method("PUT")
                .uri("/docs/a.txt")
                .header("Lock-Token", token.as_str())
                .body(Body::from("contents"))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(std::fs::read(&placeholder).unwrap(), b"contents");

    // writes without the token bounce off the lock
    let resp = server.handle(req("DELETE", "/docs/a.txt")).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);
    let resp = server.handle(req_body("PUT", "/docs/a.txt", "nope")).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    // UNLOCK with the token
    let resp = server
        .handle(
            Request::builder()
                .method("UNLOCK")
                .uri("/docs/a.txt")
                .header("Lock-Token", token.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // now the DELETE goes through
    let resp = server.handle(req("DELETE", "/docs/a.txt")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_lock_conflict_and_refresh() {
    let (server, _dir) = setup();
    server.handle(req_body("PUT", "/f.txt", "x")).await;

    let resp = server.handle(req_body("LOCK", "/f.txt", LOCKINFO)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let token = resp
        .headers()
        .get("lock-token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    // a second lock on the same resource conflicts
    let resp = server.handle(req_body("LOCK", "/f.txt", LOCKINFO)).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    // refresh: LOCK with empty body and the token in the If header
    let resp = server
        .handle(
            Request::builder()
                .method("LOCK")
                .uri("/f.txt")
                .header("If", format!("({})", &token))
                .header("Timeout", "Second-120")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp_to_string(resp).await;
    assert!(body.contains("Second-120"));

    // UNLOCK with a bogus token is a conflict
    let resp = server
        .handle(
            Request::builder()
                .method("UNLOCK")
                .uri("/f.txt")
                .header("Lock-Token", "<urn:uuid:00000000-0000-0000-0000-000000000000>")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // UNLOCK without any token is a bad request
    let resp = server.handle(req("UNLOCK", "/f.txt")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deep_lock_covers_children() {
    let (server, _dir) = setup();
    server.handle(req("MKCOL", "/dir")).await;

    let resp = server
        .handle(
            Request::builder()
                .method("LOCK")
                .uri("/dir")
                .header("Depth", "infinity")
                .body(Body::from(LOCKINFO))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let token = resp
        .headers()
        .get("lock-token")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    // children are covered by the deep lock
    let resp = server.handle(req_body("PUT", "/dir/f.txt", "x")).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    let resp = server
        .handle(
            Request::builder()
                .method("PUT")
                .uri("/dir/f.txt")
                .header("If", format!("({})", &token))
                .body(Body::from("x"))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let (server, _dir) = setup();
    for uri in ["/../etc/passwd", "/%2e%2e/etc/passwd", "/a/%2e%2e/%2e%2e/x"] {
        let resp = server.handle(req("GET", uri)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "uri {}", uri);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_is_rejected() {
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();

    let (server, dir) = setup();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("leak")).unwrap();

    let resp = server.handle(req("GET", "/leak/secret.txt")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // and listings do not mention symlinked entries
    let resp = server
        .handle(
            Request::builder()
                .method("PROPFIND")
                .uri("/")
                .header("Depth", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let body = resp_to_string(resp).await;
    assert!(!body.contains("leak"));
}

#[tokio::test]
async fn test_hidden_items_are_invisible() {
    let (server, dir) = setup();
    std::fs::write(dir.path().join(".secret"), "x").unwrap();

    let resp = server
        .handle(
            Request::builder()
                .method("PROPFIND")
                .uri("/.secret")
                .header("Depth", "0")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = server.handle(req_body("PUT", "/.other", "x")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = server
        .handle(
            Request::builder()
                .method("PROPFIND")
                .uri("/")
                .header("Depth", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let body = resp_to_string(resp).await;
    assert!(!body.contains(".secret"));
}

#[tokio::test]
async fn test_extension_allow_list() {
    let dir = tempfile::tempdir().unwrap();
    let server = DavHandler::builder(dir.path())
        .allowed_extensions(vec!["txt", "md"])
        .build_handler();

    let resp = server.handle(req_body("PUT", "/ok.txt", "x")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = server.handle(req_body("PUT", "/bad.exe", "x")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = server.handle(req_body("PUT", "/noext", "x")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // directories are not subject to the extension rule
    let resp = server.handle(req("MKCOL", "/dir")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

mod observer {
    use super::*;
    use davshare::{davpath::DavPath, DavObserver};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder {
        uploads: Arc<AtomicUsize>,
        deletes: Arc<AtomicUsize>,
        deny_delete: bool,
    }

    impl DavObserver for Recorder {
        fn should_delete(&self, _path: &DavPath) -> bool {
            !self.deny_delete
        }
        fn should_upload(&self, _path: &DavPath, temp_file: &Path) -> bool {
            // the upload is inspectable before it lands
            temp_file.is_file()
        }
        fn did_upload(&self, _path: &DavPath) {
            self.uploads.fetch_add(1, Ordering::SeqCst);
        }
        fn did_delete(&self, _path: &DavPath) {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn notifications_fire_after_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder::default();
        let (uploads, deletes) = (rec.uploads.clone(), rec.deletes.clone());
        let server = DavHandler::builder(dir.path())
            .observer(Box::new(rec))
            .build_handler();

        server.handle(req_body("PUT", "/f.txt", "x")).await;
        assert_eq!(uploads.load(Ordering::SeqCst), 1);

        server.handle(req("DELETE", "/f.txt")).await;
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn veto_aborts_with_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder {
            deny_delete: true,
            ..Default::default()
        };
        let deletes = rec.deletes.clone();
        let server = DavHandler::builder(dir.path())
            .observer(Box::new(rec))
            .build_handler();

        server.handle(req_body("PUT", "/f.txt", "x")).await;
        let resp = server.handle(req("DELETE", "/f.txt")).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(dir.path().join("f.txt").is_file());
        assert_eq!(deletes.load(Ordering::SeqCst), 0);
    }
}
