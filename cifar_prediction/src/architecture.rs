use serde::{Deserialize, Serialize};
use std::fmt;

/// Network families the service knows how to feed.
///
/// The selector fixes everything the checkpoint itself does not carry: the
/// input resolution the network was trained on, the channel statistics used
/// for normalization and the size of the output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelArchitecture {
    Resnet18Cifar100,
    Resnet18Cifar10,
}

impl ModelArchitecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelArchitecture::Resnet18Cifar100 => "resnet18_cifar100",
            ModelArchitecture::Resnet18Cifar10 => "resnet18_cifar10",
        }
    }

    /// (width, height) of the network input.
    pub fn input_size(&self) -> (u32, u32) {
        (32, 32)
    }

    pub fn num_classes(&self) -> usize {
        match self {
            ModelArchitecture::Resnet18Cifar100 => 100,
            ModelArchitecture::Resnet18Cifar10 => 10,
        }
    }

    pub fn mean(&self) -> [f32; 3] {
        match self {
            ModelArchitecture::Resnet18Cifar100 => [0.5, 0.5, 0.5],
            ModelArchitecture::Resnet18Cifar10 => [0.4914, 0.4822, 0.4465],
        }
    }

    pub fn std(&self) -> [f32; 3] {
        match self {
            ModelArchitecture::Resnet18Cifar100 => [0.5, 0.5, 0.5],
            ModelArchitecture::Resnet18Cifar10 => [0.2470, 0.2435, 0.2616],
        }
    }

    /// Expected NCHW input dims with a batch of one.
    pub fn input_shape(&self) -> [i64; 4] {
        let (width, height) = self.input_size();
        [1, 3, height as i64, width as i64]
    }
}

impl fmt::Display for ModelArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_names_round_trip_through_serde() {
        let arch: ModelArchitecture = serde_json::from_str("\"resnet18_cifar100\"").unwrap();
        assert_eq!(arch, ModelArchitecture::Resnet18Cifar100);
        assert_eq!(
            serde_json::to_string(&ModelArchitecture::Resnet18Cifar10).unwrap(),
            format!("\"{}\"", ModelArchitecture::Resnet18Cifar10)
        );
    }

    #[test]
    fn test_unknown_selector_is_rejected() {
        assert!(serde_json::from_str::<ModelArchitecture>("\"vgg16\"").is_err());
    }

    #[test]
    fn test_input_shape_is_nchw() {
        assert_eq!(
            ModelArchitecture::Resnet18Cifar100.input_shape(),
            [1, 3, 32, 32]
        );
        assert_eq!(ModelArchitecture::Resnet18Cifar10.num_classes(), 10);
    }
}
