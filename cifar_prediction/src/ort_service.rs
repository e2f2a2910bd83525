use crate::{
    architecture::ModelArchitecture,
    config::{ModelConfig, Validatable},
    model_service::{InferenceError, LoadError, ModelInfo, ModelService},
};
use ndarray::ArrayView4;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Static dims must agree; ONNX reports symbolic dims as -1, which match
/// anything.
fn dims_match(expected: &[i64], actual: &[i64]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(want, got)| *got < 0 || want == got)
}

fn format_dims(dims: &[i64]) -> String {
    let dims: Vec<String> = dims
        .iter()
        .map(|d| if *d < 0 { "?".to_string() } else { d.to_string() })
        .collect();
    format!("[{}]", dims.join(", "))
}

/// Name and dims of one graph input or output; `None` dims for non-tensor
/// values.
struct TensorSpec {
    name: String,
    dims: Option<Vec<i64>>,
}

fn tensor_specs(session: &Session) -> (Vec<TensorSpec>, Vec<TensorSpec>) {
    let inputs = session
        .inputs
        .iter()
        .map(|input| TensorSpec {
            name: input.name.clone(),
            dims: input.input_type.tensor_shape().map(|shape| shape.to_vec()),
        })
        .collect();
    let outputs = session
        .outputs
        .iter()
        .map(|output| TensorSpec {
            name: output.name.clone(),
            dims: output.output_type.tensor_shape().map(|shape| shape.to_vec()),
        })
        .collect();
    (inputs, outputs)
}

/// Checks the graph against the selector and returns the name of the score
/// output. An output whose last dim equals the class count wins over one
/// whose last dim is symbolic; the score count is checked again on every
/// forward pass.
fn verify_architecture(
    inputs: &[TensorSpec],
    outputs: &[TensorSpec],
    architecture: ModelArchitecture,
) -> Result<String, LoadError> {
    let mismatch = |expected: String, actual: String| LoadError::ShapeMismatch {
        architecture,
        expected,
        actual,
    };

    let expected_input = architecture.input_shape();
    if inputs.len() != 1 {
        return Err(mismatch(
            "1 input".to_string(),
            format!("{} inputs", inputs.len()),
        ));
    }
    let input_dims = inputs[0]
        .dims
        .as_ref()
        .ok_or_else(|| mismatch(format_dims(&expected_input), "non-tensor input".to_string()))?;
    if !dims_match(&expected_input, input_dims) {
        return Err(mismatch(
            format_dims(&expected_input),
            format_dims(input_dims),
        ));
    }

    let num_classes = architecture.num_classes() as i64;
    let last_dim = |spec: &TensorSpec| spec.dims.as_ref().and_then(|dims| dims.last().copied());
    let output = outputs
        .iter()
        .find(|spec| last_dim(*spec) == Some(num_classes))
        .or_else(|| {
            outputs
                .iter()
                .find(|spec| matches!(last_dim(*spec), Some(dim) if dim < 0))
        })
        .ok_or_else(|| {
            let actual: Vec<String> = outputs
                .iter()
                .map(|spec| match &spec.dims {
                    Some(dims) => format_dims(dims),
                    None => "non-tensor".to_string(),
                })
                .collect();
            mismatch(
                format!("output [?, {}]", num_classes),
                format!("outputs {}", actual.join(", ")),
            )
        })?;

    Ok(output.name.clone())
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    architecture: ModelArchitecture,
    output_name: String,
    info: ModelInfo,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, LoadError> {
        let architecture = model_config.architecture;
        let path = model_config.get_path();
        if !path.is_file() {
            return Err(LoadError::MissingCheckpoint(path));
        }

        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .with_intra_threads(model_config.intra_threads)?
                    .commit_from_file(&path)?;
                Ok(session)
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        let first = sessions
            .first()
            .ok_or_else(|| LoadError::ShapeMismatch {
                architecture,
                expected: "at least one session".to_string(),
                actual: "0 sessions".to_string(),
            })?;
        let (inputs, outputs) = tensor_specs(first);
        let output_name = verify_architecture(&inputs, &outputs, architecture)?;

        let info = ModelInfo {
            architecture,
            input_names: inputs.into_iter().map(|spec| spec.name).collect(),
            output_names: outputs.into_iter().map(|spec| spec.name).collect(),
            input_shape: architecture.input_shape().to_vec(),
            num_classes: architecture.num_classes(),
            num_instances,
        };

        tracing::info!(
            "Loaded {} from {:?} into {} ONNX sessions",
            architecture,
            path,
            num_instances
        );

        Ok(Self {
            sessions: Arc::new(
                sessions
                    .into_iter()
                    .map(|session| Arc::new(Mutex::new(session)))
                    .collect(),
            ),
            counter: Arc::new(AtomicUsize::new(0)),
            architecture,
            output_name,
            info,
        })
    }
}

impl ModelService for OrtModelService {
    fn architecture(&self) -> ModelArchitecture {
        self.architecture
    }

    fn info(&self) -> ModelInfo {
        self.info.clone()
    }

    fn run_inference(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| InferenceError::Poisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let input = input.as_standard_layout();

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| InferenceError::Tensor(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| InferenceError::Run(e.to_string()))?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Output(e.to_string()))?;

        let num_classes = self.architecture.num_classes();
        if data.len() != num_classes {
            return Err(InferenceError::Output(format!(
                "expected {} scores, got shape {}",
                num_classes,
                format_dims(&shape.to_vec())
            )));
        }

        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn model_config(model_dir: PathBuf, checkpoint_file: &str) -> ModelConfig {
        ModelConfig {
            architecture: ModelArchitecture::Resnet18Cifar100,
            checkpoint_file: checkpoint_file.to_string(),
            model_dir,
            num_instances: 1,
            intra_threads: 1,
            top_k: 3,
        }
    }

    #[test]
    fn test_dims_match_accepts_symbolic_batch() {
        assert!(dims_match(&[1, 3, 32, 32], &[-1, 3, 32, 32]));
        assert!(dims_match(&[1, 3, 32, 32], &[1, 3, 32, 32]));
    }

    #[test]
    fn test_dims_match_rejects_wrong_resolution_or_rank() {
        assert!(!dims_match(&[1, 3, 32, 32], &[1, 3, 224, 224]));
        assert!(!dims_match(&[1, 3, 32, 32], &[3, 32, 32]));
        assert!(!dims_match(&[1, 3, 32, 32], &[1, 1, 32, 32]));
    }

    fn spec(name: &str, dims: &[i64]) -> TensorSpec {
        TensorSpec {
            name: name.to_string(),
            dims: Some(dims.to_vec()),
        }
    }

    #[test]
    fn test_verify_architecture_picks_score_output() {
        let inputs = [spec("input", &[-1, 3, 32, 32])];
        let outputs = [spec("features", &[-1, 512]), spec("logits", &[-1, 100])];

        let name =
            verify_architecture(&inputs, &outputs, ModelArchitecture::Resnet18Cifar100).unwrap();

        assert_eq!(name, "logits");
    }

    #[test]
    fn test_verify_architecture_rejects_wrong_class_count() {
        let inputs = [spec("input", &[1, 3, 32, 32])];
        let outputs = [spec("logits", &[1, 10])];

        let result = verify_architecture(&inputs, &outputs, ModelArchitecture::Resnet18Cifar100);

        match result {
            Err(LoadError::ShapeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, "output [?, 100]");
                assert_eq!(actual, "outputs [1, 10]");
            }
            other => panic!("expected a shape mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_architecture_rejects_wrong_input() {
        let outputs = [spec("logits", &[1, 100])];

        let resolution = verify_architecture(
            &[spec("input", &[1, 3, 224, 224])],
            &outputs,
            ModelArchitecture::Resnet18Cifar100,
        );
        assert!(matches!(resolution, Err(LoadError::ShapeMismatch { .. })));

        let two_inputs = verify_architecture(
            &[spec("a", &[1, 3, 32, 32]), spec("b", &[1, 3, 32, 32])],
            &outputs,
            ModelArchitecture::Resnet18Cifar100,
        );
        assert!(matches!(two_inputs, Err(LoadError::ShapeMismatch { .. })));

        let non_tensor = verify_architecture(
            &[TensorSpec {
                name: "input".to_string(),
                dims: None,
            }],
            &outputs,
            ModelArchitecture::Resnet18Cifar100,
        );
        assert!(matches!(non_tensor, Err(LoadError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_verify_architecture_accepts_symbolic_class_dim() {
        let inputs = [spec("input", &[-1, 3, 32, 32])];
        let outputs = [spec("logits", &[-1, -1])];

        let name =
            verify_architecture(&inputs, &outputs, ModelArchitecture::Resnet18Cifar10).unwrap();

        assert_eq!(name, "logits");
    }

    #[test]
    fn test_format_dims() {
        assert_eq!(format_dims(&[-1, 3, 32, 32]), "[?, 3, 32, 32]");
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = model_config(dir.path().to_path_buf(), "absent.onnx");

        let result = OrtModelService::new(&config);

        match result {
            Err(LoadError::MissingCheckpoint(path)) => {
                assert_eq!(path, dir.path().join("absent.onnx"))
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("loading a missing checkpoint must fail"),
        }
    }

    #[test]
    fn test_corrupt_checkpoint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("corrupt.onnx")).unwrap();
        file.write_all(b"definitely not a protobuf graph").unwrap();
        let config = model_config(dir.path().to_path_buf(), "corrupt.onnx");

        let result = OrtModelService::new(&config);

        assert!(matches!(result, Err(LoadError::Runtime(_))));
    }
}
