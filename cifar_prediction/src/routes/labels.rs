use crate::{model_service::ModelService, server::SharedState};
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Labels {
    labels: Vec<String>,
}

pub async fn labels<M: ModelService>(State(state): State<SharedState<M>>) -> Json<Labels> {
    state.metrics.record_request("/labels");

    Json(Labels {
        labels: state.inference_service.labels().as_slice().to_vec(),
    })
}
