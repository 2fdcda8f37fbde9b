//! Browser-facing layer: rendered directory listings and the embedded UI
//! bundle, falling back to the file API for everything else.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, Method, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use minijinja::{Environment, context};
use rust_embed::RustEmbed;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::content::ContentHandler;
use crate::error::FileServerError;
use crate::handler::RequestHandler;
use crate::path::decode_request_path;
use crate::store::{EntryMetadata, sort_entries};

/// URL prefix under which the embedded bundle is served.
pub const ASSET_PREFIX: &str = "/_asset/";

const INDEX_TEMPLATE: &str = "index.html";

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Bundle;

/// Payload handed to the listing template.
#[derive(Debug, Serialize)]
struct ListingData<'a> {
    files: &'a [EntryMetadata],
    path: &'a str,
}

/// Embedded UI bundle with the listing template parsed once at startup.
#[derive(Debug)]
pub struct UiAssets {
    env: Environment<'static>,
}

impl UiAssets {
    pub fn load() -> Result<Self, FileServerError> {
        let index = Bundle::get(INDEX_TEMPLATE)
            .ok_or_else(|| FileServerError::MissingAsset(INDEX_TEMPLATE.to_string()))?;
        let source = String::from_utf8(index.data.into_owned())
            .map_err(|_| FileServerError::MissingAsset(format!("{INDEX_TEMPLATE} is not UTF-8")))?;

        Self::from_source(source)
    }

    /// Use `source` as the listing template instead of the bundled one. The
    /// rest of the bundle is still served from the embedded assets.
    pub fn from_source(source: impl Into<String>) -> Result<Self, FileServerError> {
        let mut env = Environment::new();
        env.add_template_owned(INDEX_TEMPLATE, source.into())?;
        Ok(Self { env })
    }

    /// Render the listing page around an already JSON-encoded listing.
    pub fn render_index(&self, listing: &str) -> Result<String, FileServerError> {
        let template = self.env.get_template(INDEX_TEMPLATE)?;
        Ok(template.render(context! { listing => listing })?)
    }

    /// Serve one file of the embedded bundle. The listing template is not
    /// part of the public bundle.
    pub fn serve_asset(&self, name: &str, headers: &HeaderMap) -> Response {
        if name.split('/').any(|segment| segment == "..") {
            warn!("Rejected asset path {name:?}");
            return StatusCode::NOT_FOUND.into_response();
        }
        if name == INDEX_TEMPLATE {
            return StatusCode::NOT_FOUND.into_response();
        }

        let Some(content) = Bundle::get(name) else {
            return StatusCode::NOT_FOUND.into_response();
        };

        let etag = format!("\"{}\"", hex::encode(content.metadata.sha256_hash()));
        let fresh = headers
            .get(header::IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.split(',').any(|tag| tag.trim() == etag));
        if fresh {
            return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
        }

        let mime = mime_guess::from_path(name).first_or_octet_stream().to_string();
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime),
                (
                    header::CACHE_CONTROL,
                    "public, max-age=3600, must-revalidate".to_string(),
                ),
                (header::ETAG, etag),
            ],
            Body::from(content.data),
        )
            .into_response()
    }
}

/// Whether the `Accept` header has a bare `text/html` entry. Wildcards and
/// quality parameters are not interpreted.
pub fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.split(',').any(|a| a.trim() == "text/html"))
}

/// JSON for embedding into a `<script>` element.
fn listing_json(files: &[EntryMetadata], path: &str) -> Result<String, FileServerError> {
    let json = serde_json::to_string(&ListingData { files, path }).map_err(io::Error::other)?;
    Ok(json
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026"))
}

/// Negotiates between the rendered UI, the asset bundle and the file API.
pub struct UiHandler {
    content: Arc<ContentHandler>,
    assets: Arc<UiAssets>,
}

impl UiHandler {
    pub fn new(content: Arc<ContentHandler>, assets: Arc<UiAssets>) -> Self {
        Self { content, assets }
    }

    /// Rendered listing for a directory, `None` when the target is a file.
    async fn render_listing(&self, raw_path: &str) -> Result<Option<Response>, FileServerError> {
        let target = decode_request_path(raw_path)?;
        let store = self.content.store();

        let stat = store.stat(&target).await?;
        if !stat.is_dir() {
            return Ok(None);
        }

        let mut files = store.list(&target).await?;
        sort_entries(&mut files);

        let page = self.assets.render_index(&listing_json(&files, &target)?)?;
        debug!("Rendered listing of {target:?} ({} entries)", files.len());
        Ok(Some(Html(page).into_response()))
    }
}

#[async_trait]
impl RequestHandler for UiHandler {
    fn accept(&self, req: &Request) -> bool {
        req.uri().path().starts_with(ASSET_PREFIX) || accepts_html(req.headers())
    }

    async fn serve(&self, req: Request) -> Response {
        if req.method() != Method::GET {
            return self.content.serve(req).await;
        }

        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if let Some(name) = path.strip_prefix(ASSET_PREFIX) {
            let response = self.assets.serve_asset(name, req.headers());
            info!(%method, %path, status = response.status().as_u16(), "request");
            return response;
        }

        match self.render_listing(&path).await {
            Ok(Some(response)) => {
                info!(%method, %path, status = response.status().as_u16(), "request");
                response
            }
            Ok(None) => self.content.serve(req).await,
            Err(err) => {
                let (status, _) = err.status();
                info!(%method, %path, status = status.as_u16(), error = %err, "request");
                err.into_response()
            }
        }
    }
}
