//! Polymorphic request handlers and first-match composition.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// A handler that can decide whether it wants a request before serving it.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Whether this handler is willing to serve `req`.
    fn accept(&self, req: &Request) -> bool;

    /// Serve the request. Errors are already turned into responses.
    async fn serve(&self, req: Request) -> Response;
}

/// Dispatches to the first registered handler whose `accept` returns true.
///
/// Registration order is the only precedence rule.
#[derive(Clone, Default)]
pub struct CompositeRouter {
    handlers: Vec<Arc<dyn RequestHandler>>,
}

impl CompositeRouter {
    pub fn new(handlers: Vec<Arc<dyn RequestHandler>>) -> Self {
        Self { handlers }
    }

    /// Append a handler with the lowest precedence so far.
    pub fn push(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn find(&self, req: &Request) -> Option<&Arc<dyn RequestHandler>> {
        self.handlers.iter().find(|handler| handler.accept(req))
    }
}

#[async_trait]
impl RequestHandler for CompositeRouter {
    fn accept(&self, _req: &Request) -> bool {
        true
    }

    async fn serve(&self, req: Request) -> Response {
        let handler = self.find(&req).cloned();
        match handler {
            Some(handler) => handler.serve(req).await,
            None => {
                debug!("No handler accepted {} {}", req.method(), req.uri().path());
                StatusCode::BAD_REQUEST.into_response()
            }
        }
    }
}
