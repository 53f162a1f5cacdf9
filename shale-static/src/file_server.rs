//! File server orchestration
//!
//! Resolves a request path under the root, applies the directory/index
//! and trailing-slash conventions, negotiates a content encoding, and
//! frames the file content into a response.

use crate::content;
use crate::encoder;
use crate::fs::{RootedDir, clean_path};
use crate::negotiate::{Encoding, NegotiateError, negotiate};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, header};
use shale_core::{Error, Result};
use std::io;
use std::path::PathBuf;
use thiserror::Error as ThisError;

/// Cap on directory → index rewrites for one request. The rewrite
/// settles in one hop on well-formed trees; the cap bounds the loop
/// regardless.
const MAX_INDEX_HOPS: usize = 8;

/// Configuration for the file server
#[derive(Debug, Clone)]
pub struct FileServerConfig {
    /// Root directory to serve
    pub root: PathBuf,
    /// Index file used for directory requests
    pub index: String,
    /// Supported content encodings in server preference order
    pub encodings: Vec<Encoding>,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            index: "index.html".to_string(),
            encodings: vec![Encoding::Brotli, Encoding::Gzip, Encoding::Deflate],
        }
    }
}

/// Static file server
pub struct FileServer {
    root: RootedDir,
    index: String,
    encodings: Vec<Encoding>,
}

#[derive(Debug, ThisError)]
enum ServeError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("content negotiation failed: {0}")]
    Negotiate(#[from] NegotiateError),

    #[error("index rewrite limit exceeded")]
    TooManyIndexHops,
}

impl FileServer {
    /// Create a new file server
    pub fn new(config: FileServerConfig) -> Self {
        Self {
            root: RootedDir::new(config.root),
            index: config.index,
            encodings: config.encodings,
        }
    }

    /// Create a file server for a directory with default settings
    pub fn serve_dir(root: impl Into<PathBuf>) -> Self {
        Self::new(FileServerConfig {
            root: root.into(),
            ..Default::default()
        })
    }

    /// Create a file server from raw config values, resolving encoding
    /// tokens. Unknown tokens are rejected here, at construction, so the
    /// encoder can never be asked for a transform it does not have.
    pub fn from_config(root: impl Into<PathBuf>, index: &str, tokens: &[String]) -> Result<Self> {
        let mut encodings = Vec::with_capacity(tokens.len());
        for token in tokens {
            let encoding = Encoding::from_token(token)
                .ok_or_else(|| Error::Config(format!("Unknown content encoding: {}", token)))?;
            encodings.push(encoding);
        }

        Ok(Self {
            root: RootedDir::new(root.into()),
            index: index.to_string(),
            encodings,
        })
    }

    /// Handle one request.
    ///
    /// Failures never reach the client as a body payload; they are
    /// mapped to a bare status code (404/403/406/500) here.
    pub async fn serve(&self, req: &Request<()>) -> Response<Bytes> {
        match self.try_serve(req).await {
            Ok(resp) => resp,
            Err(ServeError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                status_only(StatusCode::NOT_FOUND)
            }
            Err(ServeError::Io(err)) if err.kind() == io::ErrorKind::PermissionDenied => {
                status_only(StatusCode::FORBIDDEN)
            }
            Err(ServeError::Io(err)) => {
                tracing::error!("Failed to serve {}: {}", req.uri().path(), err);
                status_only(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Err(ServeError::Negotiate(_)) => status_only(StatusCode::NOT_ACCEPTABLE),
            Err(ServeError::TooManyIndexHops) => {
                tracing::error!(
                    "Index rewrite limit exceeded for {}",
                    req.uri().path()
                );
                status_only(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    async fn try_serve(&self, req: &Request<()>) -> std::result::Result<Response<Bytes>, ServeError> {
        let query = req.uri().query();
        // The redirect target tracks the path as the client should retry
        // it: the raw request path at first, then the rewritten index
        // path once a directory lookup has been rewritten.
        let mut request_path = req.uri().path().to_string();
        let mut lookup = clean_path(&request_path);

        for _ in 0..MAX_INDEX_HOPS {
            // The handle is owned by this iteration and released when it
            // ends, whichever exit is taken.
            let (file, metadata) = self.root.open(&lookup).await?;

            if metadata.is_dir() {
                if !request_path.ends_with('/') {
                    return Ok(redirect_with_slash(&request_path, query));
                }
                // Serve the directory's index file as if it had been
                // requested directly. If the index entry is itself a
                // directory, the next pass redirects to it with a
                // trailing slash rather than descending further.
                if lookup == "/" {
                    lookup.clear();
                }
                lookup = format!("{}/{}", lookup, self.index);
                request_path = lookup.clone();
                continue;
            }

            let accept_encoding = match req.headers().get(header::ACCEPT_ENCODING) {
                None => None,
                Some(value) => match value.to_str() {
                    Ok(s) => Some(s),
                    Err(_) => return Ok(status_only(StatusCode::NOT_ACCEPTABLE)),
                },
            };
            let Some(encoding) = negotiate(accept_encoding, &self.encodings)? else {
                return Ok(status_only(StatusCode::NOT_ACCEPTABLE));
            };

            let name = lookup.rsplit('/').next().unwrap_or(&lookup);
            let size = metadata.len();
            let modified = metadata.modified().ok();
            let served = content::serve_content(req, name, modified, file, size).await?;

            return Ok(self.respond(req, served, encoding).await?);
        }

        Err(ServeError::TooManyIndexHops)
    }

    async fn respond(
        &self,
        req: &Request<()>,
        served: content::ServedContent,
        encoding: Encoding,
    ) -> io::Result<Response<Bytes>> {
        let mut builder = Response::builder().status(served.status);

        if let Some(last_modified) = &served.last_modified {
            builder = builder.header(header::LAST_MODIFIED, last_modified.as_str());
        }
        if served.status == StatusCode::NOT_MODIFIED {
            return Ok(builder.body(Bytes::new()).unwrap());
        }

        builder = builder
            .header(header::CONTENT_TYPE, served.content_type.as_str())
            .header(header::ACCEPT_RANGES, "bytes");
        if let Some(content_range) = &served.content_range {
            builder = builder.header(header::CONTENT_RANGE, content_range.as_str());
        }

        // Even an empty body runs through the encoder: the negotiated
        // encoding is announced and the frame stays well-formed.
        let body = if encoding == Encoding::Identity {
            served.body
        } else {
            let encoded = encoder::encode_body(encoding, &served.body).await?;
            builder = builder
                .header(header::CONTENT_ENCODING, encoding.token())
                .header(header::VARY, header::ACCEPT_ENCODING.as_str());
            encoded
        };

        builder = builder.header(header::CONTENT_LENGTH, body.len());

        let body = if req.method() == Method::HEAD {
            Bytes::new()
        } else {
            body
        };

        Ok(builder.body(body).unwrap())
    }
}

/// 301 to the same path with a trailing slash, preserving the query.
/// The target is always relative, so the Location header can never be
/// steered by the Host header.
fn redirect_with_slash(path: &str, query: Option<&str>) -> Response<Bytes> {
    let mut location = format!("{}/", path);
    if let Some(query) = query {
        location.push('?');
        location.push_str(query);
    }

    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, location)
        .body(Bytes::new())
        .unwrap()
}

fn status_only(status: StatusCode) -> Response<Bytes> {
    Response::builder().status(status).body(Bytes::new()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    /// A site tree with a nested directory, an index, and a dotfile.
    fn site() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1);").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
        std::fs::create_dir(dir.path().join("secret")).unwrap();
        std::fs::write(dir.path().join("secret/.env"), "KEY=1").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_serves_regular_file() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let resp = server.serve(&request("/app.js", &[])).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&resp.body()[..], b"console.log(1);");
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/javascript"
        );
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let resp = server.serve(&request("/nope.js", &[])).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn test_dotfile_is_404_even_when_present() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let resp = server.serve(&request("/secret/.env", &[])).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_directory_without_slash_redirects() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let resp = server.serve(&request("/docs", &[])).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/docs/");
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_preserves_query() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let resp = server.serve(&request("/docs?page=2&q=a%20b", &[])).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/docs/?page=2&q=a%20b"
        );
    }

    #[tokio::test]
    async fn test_directory_with_slash_serves_index() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let resp = server.serve(&request("/docs/", &[])).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&resp.body()[..], b"<h1>docs</h1>");

        // Same outcome as requesting the index directly.
        let direct = server.serve(&request("/docs/index.html", &[])).await;
        assert_eq!(direct.status(), StatusCode::OK);
        assert_eq!(direct.body(), resp.body());
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let resp = server.serve(&request("/", &[])).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&resp.body()[..], b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_traversal_cannot_escape_root() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("victim.txt"), "outside").unwrap();
        let root = TempDir::new_in(outside.path()).unwrap();
        let server = FileServer::serve_dir(root.path());

        let resp = server.serve(&request("/../victim.txt", &[])).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_preference_wins() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let req = request("/app.js", &[("Accept-Encoding", "gzip;q=1.0, br;q=0.5")]);
        let resp = server.serve(&req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_ENCODING).unwrap(), "br");
        assert_eq!(
            resp.headers().get(header::VARY).unwrap(),
            "accept-encoding"
        );
    }

    #[tokio::test]
    async fn test_gzip_body_decodes() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let req = request("/app.js", &[("Accept-Encoding", "gzip")]);
        let resp = server.serve(&req).await;
        assert_eq!(
            resp.headers().get(header::CONTENT_ENCODING).unwrap(),
            "gzip"
        );

        let mut decoder = flate2::read::GzDecoder::new(&resp.body()[..]);
        let mut decompressed = String::new();
        decoder.read_to_string(&mut decompressed).unwrap();
        assert_eq!(decompressed, "console.log(1);");
    }

    #[tokio::test]
    async fn test_nothing_acceptable_is_406() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let req = request("/app.js", &[("Accept-Encoding", "lzma, identity;q=0")]);
        let resp = server.serve(&req).await;
        assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_accept_encoding_is_406() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let req = request("/app.js", &[("Accept-Encoding", "gzip;q=oops")]);
        let resp = server.serve(&req).await;
        assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn test_range_request() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let req = request("/app.js", &[("Range", "bytes=0-6")]);
        let resp = server.serve(&req).await;
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(&resp.body()[..], b"console");
        assert_eq!(
            resp.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes 0-6/15"
        );
    }

    #[tokio::test]
    async fn test_if_modified_since_is_304() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let resp = server.serve(&request("/app.js", &[])).await;
        let last_modified = resp
            .headers()
            .get(header::LAST_MODIFIED)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let req = request("/app.js", &[("If-Modified-Since", &last_modified)]);
        let resp = server.serve(&req).await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn test_head_omits_body() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let req = Request::builder()
            .method(Method::HEAD)
            .uri("/app.js")
            .body(())
            .unwrap();
        let resp = server.serve(&req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.body().is_empty());
        assert_eq!(resp.headers().get(header::CONTENT_LENGTH).unwrap(), "15");
    }

    #[tokio::test]
    async fn test_idempotent_responses() {
        let dir = site();
        let server = FileServer::serve_dir(dir.path());

        let first = server
            .serve(&request("/app.js", &[("Accept-Encoding", "gzip")]))
            .await;
        let second = server
            .serve(&request("/app.js", &[("Accept-Encoding", "gzip")]))
            .await;
        assert_eq!(first.status(), second.status());
        assert_eq!(
            first.headers().get(header::CONTENT_ENCODING),
            second.headers().get(header::CONTENT_ENCODING)
        );
        assert_eq!(first.body(), second.body());
    }

    #[tokio::test]
    async fn test_index_directory_redirects() {
        // index.html existing as a directory: after the rewrite the
        // lookup resolves to a directory again, so the client is
        // redirected to it instead of the server descending further.
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::create_dir(dir.path().join("docs/index.html")).unwrap();
        std::fs::write(dir.path().join("docs/index.html/index.html"), "deep").unwrap();
        let server = FileServer::serve_dir(dir.path());

        let resp = server.serve(&request("/docs/", &[])).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/docs/index.html/"
        );
        assert!(resp.body().is_empty());

        // The query survives the rewrite-then-redirect path too.
        let resp = server.serve(&request("/docs/?v=1", &[])).await;
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/docs/index.html/?v=1"
        );

        // Following the redirect serves the nested index.
        let resp = server.serve(&request("/docs/index.html/", &[])).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&resp.body()[..], b"deep");
    }

    #[tokio::test]
    async fn test_empty_file_still_announces_encoding() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.txt"), "").unwrap();
        let server = FileServer::serve_dir(dir.path());

        let req = request("/empty.txt", &[("Accept-Encoding", "gzip")]);
        let resp = server.serve(&req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_ENCODING).unwrap(),
            "gzip"
        );

        let mut decoder = flate2::read::GzDecoder::new(&resp.body()[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert!(decompressed.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_config_token_rejected() {
        let err = FileServer::from_config("/tmp", "index.html", &["lzma".to_string()]);
        assert!(err.is_err());
    }
}
