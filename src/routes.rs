use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    response::Response,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handler::{CompositeRouter, RequestHandler};

/// Build the application router.
///
/// Every path goes to the composite handler chain, so its registration order
/// is the only routing precedence.
pub fn app(state: &AppState) -> Router {
    let handlers = Arc::new(state.handlers());

    Router::new()
        .fallback(dispatch)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_size))
        .layer(TraceLayer::new_for_http())
        .with_state(handlers)
}

async fn dispatch(State(handlers): State<Arc<CompositeRouter>>, req: Request) -> Response {
    handlers.serve(req).await
}
