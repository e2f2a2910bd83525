use crate::{architecture::ModelArchitecture, model_service::ModelService, server::SharedState};
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    architecture: ModelArchitecture,
}

/// Only reachable once the model has loaded, so being able to answer is
/// the readiness signal.
pub async fn healthcheck<M: ModelService>(State(state): State<SharedState<M>>) -> Json<Health> {
    Json(Health {
        status: "Available",
        architecture: state.inference_service.model().architecture(),
    })
}
