use crate::{
    labels::ClassLabels,
    model_service::{InferenceError, ModelService},
    prediction::{softmax, top_k, Prediction},
    preprocess::transform_image,
};
use image::ImageError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Error decoding image: {0}")]
    Decode(#[from] ImageError),
    #[error("{0}")]
    Inference(#[from] InferenceError),
}

/// Bytes in, ranked labels out. Cheap to clone; every clone shares the same
/// loaded model.
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
    labels: Arc<ClassLabels>,
    top_k: usize,
}

impl<M: ModelService> Clone for InferenceService<M> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            labels: self.labels.clone(),
            top_k: self.top_k,
        }
    }
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M, labels: ClassLabels, top_k: usize) -> Self {
        Self {
            model_service: Arc::new(model_service),
            labels: Arc::new(labels),
            top_k,
        }
    }

    pub fn model(&self) -> &M {
        &self.model_service
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Decodes, normalizes and classifies one image. CPU bound; callers on
    /// the async runtime should run it on a blocking thread.
    pub fn classify(&self, image_data: &[u8]) -> Result<Vec<Prediction>, ClassifyError> {
        let input = transform_image(image_data, self.model_service.architecture())?;
        let logits = self.model_service.run_inference(input.view())?;
        if let Some(position) = logits.iter().position(|score| !score.is_finite()) {
            return Err(InferenceError::Output(format!(
                "non-finite score {} for class {}",
                logits[position], position
            ))
            .into());
        }
        let probabilities = softmax(&logits);
        let predictions = top_k(&probabilities, self.top_k, &self.labels);

        for (rank, prediction) in predictions.iter().enumerate() {
            tracing::debug!(
                "Prediction {}: class={} ({}), confidence={:.3}",
                rank,
                prediction.label,
                prediction.class_index,
                prediction.confidence
            );
        }

        Ok(predictions)
    }
}
