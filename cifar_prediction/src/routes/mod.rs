mod health;
mod labels;
mod metrics;
mod predict;
mod root;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(root::root::<M>))
        .route("/predict/", post(predict::predict::<M>))
        .route("/predict", post(predict::predict::<M>))
        .route("/labels", get(labels::labels::<M>))
        .route("/health", get(health::healthcheck::<M>))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
