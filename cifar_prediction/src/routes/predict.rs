use crate::{
    inference_service::ClassifyError,
    model_service::ModelService,
    prediction::PredictionResponse,
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const ROUTE: &str = "/predict/";

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Expected a multipart/form-data upload: {0}")]
    NotMultipart(#[from] MultipartRejection),
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("No file field found in the upload")]
    MissingFile,
    #[error("Invalid content type {0:?}, expected an image")]
    InvalidContentType(String),
    #[error("{0}")]
    Classify(#[from] ClassifyError),
    #[error("Prediction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PredictError {
    fn status(&self) -> StatusCode {
        match self {
            PredictError::NotMultipart(e) => e.status(),
            PredictError::Multipart(e) => e.status(),
            PredictError::MissingFile => StatusCode::BAD_REQUEST,
            PredictError::InvalidContentType(_) => StatusCode::BAD_REQUEST,
            PredictError::Classify(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PredictError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PredictError::NotMultipart(_) => "not_multipart",
            PredictError::Multipart(_) => "multipart",
            PredictError::MissingFile => "missing_file",
            PredictError::InvalidContentType(_) => "content_type",
            PredictError::Classify(ClassifyError::Decode(_)) => "decode",
            PredictError::Classify(ClassifyError::Inference(_)) => "inference",
            PredictError::Join(_) => "join",
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!("Prediction failed: {}", self);
            "Something went wrong while classifying the image".to_string()
        } else if status == StatusCode::PAYLOAD_TOO_LARGE {
            tracing::warn!("Rejected upload: {}", self);
            "Upload exceeds the size limit".to_string()
        } else {
            tracing::warn!("Rejected upload: {}", self);
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

struct Upload {
    content_type: String,
    data: Bytes,
}

fn validate_content_type(content_type: Option<&str>) -> Result<String, PredictError> {
    match content_type {
        Some(ct) if ct.trim().to_ascii_lowercase().starts_with("image/") => Ok(ct.to_string()),
        Some(ct) => Err(PredictError::InvalidContentType(ct.to_string())),
        None => Err(PredictError::InvalidContentType("<none>".to_string())),
    }
}

/// Takes the first field named `file` or carrying a file name. The content
/// type is checked before the field body is read.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, PredictError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") || field.file_name().is_some() {
            let content_type = validate_content_type(field.content_type())?;
            let data = field.bytes().await?;
            return Ok(Upload { content_type, data });
        }
    }
    Err(PredictError::MissingFile)
}

#[instrument(skip(state, multipart))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, PredictError> {
    state.metrics.record_request(ROUTE);

    let result = match multipart {
        Ok(mut multipart) => classify_upload(&state, &mut multipart).await,
        Err(rejection) => Err(PredictError::from(rejection)),
    };
    if let Err(ref err) = result {
        state.metrics.record_prediction_failure(err.kind());
    }
    result
}

async fn classify_upload<M: ModelService>(
    state: &SharedState<M>,
    multipart: &mut Multipart,
) -> Result<Json<PredictionResponse>, PredictError> {
    let upload = read_upload(multipart).await?;
    tracing::debug!(
        "Received {} bytes of {}",
        upload.data.len(),
        upload.content_type
    );

    let inference_service = state.inference_service.clone();
    let started = Instant::now();
    let predictions =
        tokio::task::spawn_blocking(move || inference_service.classify(&upload.data)).await??;
    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, ROUTE);

    if let Some(best) = predictions.first() {
        tracing::info!(
            "Classified upload as {} with confidence {:.3}",
            best.label,
            best.confidence
        );
    }

    Ok(Json(PredictionResponse { predictions }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_content_type() {
        assert!(validate_content_type(Some("image/png")).is_ok());
        assert!(validate_content_type(Some("IMAGE/JPEG")).is_ok());
        assert!(matches!(
            validate_content_type(Some("application/pdf")),
            Err(PredictError::InvalidContentType(_))
        ));
        assert!(validate_content_type(None).is_err());
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let err = PredictError::InvalidContentType("text/plain".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "content_type");
    }

    #[test]
    fn test_decode_failures_are_server_errors() {
        let decode = image::load_from_memory(b"garbage").unwrap_err();
        let err = PredictError::from(ClassifyError::from(decode));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "decode");
    }
}
