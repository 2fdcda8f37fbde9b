//! Method dispatch for the machine-facing file API.

use std::io;

use async_trait::async_trait;
use axum::{
    Json,
    body::Body,
    extract::{FromRequest, Multipart, Request},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use mime_guess::mime::{self, Mime};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, info};

use crate::error::FileServerError;
use crate::handler::RequestHandler;
use crate::path::{decode_request_path, join_upload_target, sanitize_filename};
use crate::store::FileStore;

/// Multipart field carrying the uploaded content.
const UPLOAD_FIELD: &str = "file";

/// Request methods as far as the file API distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Other,
}

impl From<&Method> for Verb {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => Verb::Get,
            Method::HEAD => Verb::Head,
            Method::POST => Verb::Post,
            Method::PUT => Verb::Put,
            Method::DELETE => Verb::Delete,
            Method::OPTIONS => Verb::Options,
            _ => Verb::Other,
        }
    }
}

/// Serves reads, listings and uploads straight from the [`FileStore`].
#[derive(Debug, Clone)]
pub struct ContentHandler {
    store: FileStore,
}

impl ContentHandler {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    async fn dispatch(&self, req: Request) -> Result<Response, FileServerError> {
        let verb = Verb::from(req.method());
        match verb {
            Verb::Get | Verb::Head => self.serve_get(req).await,
            Verb::Post | Verb::Put => self.serve_create(req, true).await,
            Verb::Delete => {
                let target = req.uri().path().to_string();
                match self.store.delete(&target).await? {}
            }
            Verb::Options => Err(FileServerError::NotImplemented("options")),
            Verb::Other => Err(FileServerError::MethodNotAllowed(req.method().clone())),
        }
    }

    /// GET/HEAD: JSON listing for directories, file content otherwise.
    async fn serve_get(&self, req: Request) -> Result<Response, FileServerError> {
        let target = decode_request_path(req.uri().path())?;
        let stat = self.store.stat(&target).await?;

        if stat.is_dir() {
            let entries = self.store.list(&target).await?;
            return Ok(Json(entries).into_response());
        }

        // ServeFile handles Range, If-Modified-Since and HEAD.
        let response = match ServeFile::new(&stat.path).oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        Ok(response.map(Body::new))
    }

    /// POST/PUT: write the raw body, or the `file` field of a multipart form.
    async fn serve_create(&self, req: Request, overwrite: bool) -> Result<Response, FileServerError> {
        let url_path = decode_request_path(req.uri().path())?;

        let written = if is_multipart(&req) {
            self.create_from_multipart(&url_path, req, overwrite).await?
        } else {
            let mut reader = stream_reader(req.into_body().into_data_stream());
            self.store.put(&url_path, &mut reader, overwrite).await?
        };

        debug!("Upload to {url_path:?} complete ({written} bytes)");
        Ok(StatusCode::CREATED.into_response())
    }

    /// A URL path ending in `/` names a directory; the upload's own file name
    /// is appended to it.
    async fn create_from_multipart(
        &self,
        url_path: &str,
        req: Request,
        overwrite: bool,
    ) -> Result<u64, FileServerError> {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|err| FileServerError::BadRequest(err.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| FileServerError::BadRequest(err.body_text()))?
        {
            if field.name() != Some(UPLOAD_FIELD) {
                continue;
            }

            let target = if url_path.ends_with('/') {
                let raw_name = field.file_name().unwrap_or_default().to_string();
                let file_name = sanitize_filename(&raw_name).ok_or_else(|| {
                    FileServerError::InvalidPath(format!("Invalid filename: {raw_name:?}"))
                })?;
                join_upload_target(url_path, &file_name)
            } else {
                url_path.to_string()
            };

            let mut reader = stream_reader(field);
            return self.store.put(&target, &mut reader, overwrite).await;
        }

        Err(FileServerError::BadRequest(format!(
            "missing multipart field {UPLOAD_FIELD:?}"
        )))
    }
}

#[async_trait]
impl RequestHandler for ContentHandler {
    fn accept(&self, _req: &Request) -> bool {
        true
    }

    async fn serve(&self, req: Request) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match self.dispatch(req).await {
            Ok(response) => {
                info!(%method, %path, status = response.status().as_u16(), "request");
                response
            }
            Err(err) => {
                let (status, _) = err.status();
                info!(%method, %path, status = status.as_u16(), error = %err, "request");
                err.into_response()
            }
        }
    }
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Mime>().ok())
        .is_some_and(|content_type| {
            content_type.type_() == mime::MULTIPART && content_type.subtype() == mime::FORM_DATA
        })
}

/// Adapt a body or multipart field stream into an `AsyncRead`.
fn stream_reader<S, E>(stream: S) -> impl AsyncRead + Unpin + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    StreamReader::new(Box::pin(stream.map_err(io::Error::other)))
}
