use crate::{
    architecture::ModelArchitecture,
    config::{LabelsConfig, Validatable},
    model_service::LoadError,
};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Human readable class names, indexed by network output position.
#[derive(Debug, Clone)]
pub struct ClassLabels {
    labels: Vec<String>,
}

impl ClassLabels {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn load(
        labels_cfg: &LabelsConfig,
        architecture: ModelArchitecture,
    ) -> Result<Self, LoadError> {
        let path = labels_cfg.get_path();
        let labels = load_labels(&path).map_err(|source| LoadError::Labels {
            path: path.clone(),
            source,
        })?;

        if labels.len() != architecture.num_classes() {
            return Err(LoadError::LabelCount {
                architecture,
                expected: architecture.num_classes(),
                actual: labels.len(),
            });
        }

        tracing::info!("Loaded {} class labels from {:?}", labels.len(), path);
        Ok(Self::new(labels))
    }

    pub fn get(&self, class_index: usize) -> String {
        self.labels
            .get(class_index)
            .cloned()
            .unwrap_or_else(|| format!("Unknown class {}", class_index))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

/// One label per line; surrounding whitespace and blank lines are ignored.
pub fn load_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }

    Ok(labels)
}
