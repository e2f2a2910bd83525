use crate::architecture::ModelArchitecture;
use ndarray::ArrayView4;
use serde::Serialize;
use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Checkpoint not found: {0:?}")]
    MissingCheckpoint(PathBuf),
    #[error("Failed to load checkpoint: {0}")]
    Runtime(#[from] ort::Error),
    #[error("Checkpoint does not match {architecture}: expected {expected}, got {actual}")]
    ShapeMismatch {
        architecture: ModelArchitecture,
        expected: String,
        actual: String,
    },
    #[error("Failed to load labels from {path:?}: {source}")]
    Labels { path: PathBuf, source: io::Error },
    #[error("{architecture} has {expected} classes but the labels file lists {actual}")]
    LabelCount {
        architecture: ModelArchitecture,
        expected: usize,
        actual: usize,
    },
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Session mutex poisoned: {0}")]
    Poisoned(String),
    #[error("Failed to build input tensor: {0}")]
    Tensor(String),
    #[error("Forward pass failed: {0}")]
    Run(String),
    #[error("Unexpected model output: {0}")]
    Output(String),
}

/// What the loaded network looks like, as reported on the root endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub architecture: ModelArchitecture,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    pub input_shape: Vec<i64>,
    pub num_classes: usize,
    pub num_instances: usize,
}

/// A loaded, read-only network. Implementations must be deterministic: the
/// same input tensor always yields the same scores.
pub trait ModelService: Send + Sync + 'static {
    fn architecture(&self) -> ModelArchitecture;

    fn info(&self) -> ModelInfo;

    /// Runs one forward pass over a `[1, 3, H, W]` tensor and returns the raw
    /// per-class scores.
    fn run_inference(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, InferenceError>;
}
