use crate::{
    model_service::{ModelInfo, ModelService},
    server::SharedState,
};
use axum::{extract::State, response::Json};
use serde::Serialize;
use tracing::instrument;

#[derive(Serialize)]
pub struct Welcome {
    message: String,
    model: ModelInfo,
}

#[instrument(skip(state))]
pub async fn root<M: ModelService>(State(state): State<SharedState<M>>) -> Json<Welcome> {
    state.metrics.record_request("/");

    Json(Welcome {
        message: "Welcome to the CIFAR Image Classification API".to_string(),
        model: state.inference_service.model().info(),
    })
}
