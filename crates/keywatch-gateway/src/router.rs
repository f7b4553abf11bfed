//! Route and handler for the unsubscribe endpoint.

use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use keywatch_core::ports::outbound::Storage;
use keywatch_core::service::unsubscribe::{process_unsubscribe, UnsubscribeResult};

const BODY_SUCCESS: &str = "Thanks, we've processed your unsubscribe request.";
const BODY_INVALID: &str = "We're sorry, the link you clicked on is not valid.";
const BODY_INTERNAL: &str = "We're sorry, something went wrong.";

/// Shared handler state: the store, behind a mutex because sweeps and
/// requests mutate it from different tasks.
pub struct AppState<S> {
    pub store: Arc<Mutex<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UnsubscribeParams {
    t: Option<String>,
}

/// Builds the unsubscribe router over any storage implementation.
pub fn router<S: Storage + 'static>(store: Arc<Mutex<S>>) -> Router {
    Router::new()
        .route("/", get(handle_unsubscribe::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store })
}

async fn handle_unsubscribe<S: Storage>(
    State(state): State<AppState<S>>,
    Query(params): Query<UnsubscribeParams>,
) -> (StatusCode, &'static str) {
    let Some(token) = params.t else {
        info!("unsubscribe request without token");
        return (StatusCode::BAD_REQUEST, BODY_INVALID);
    };

    let Ok(mut store) = state.store.lock() else {
        error!("store mutex poisoned");
        return (StatusCode::INTERNAL_SERVER_ERROR, BODY_INTERNAL);
    };

    match process_unsubscribe(&mut *store, &token) {
        Ok(UnsubscribeResult::Success) => {
            info!("unsubscribe processed");
            (StatusCode::OK, BODY_SUCCESS)
        }
        Ok(UnsubscribeResult::Fail) => {
            info!("unsubscribe token not recognized");
            (StatusCode::BAD_REQUEST, BODY_INVALID)
        }
        Err(err) => {
            error!(%err, "unsubscribe failed on storage");
            (StatusCode::INTERNAL_SERVER_ERROR, BODY_INTERNAL)
        }
    }
}
