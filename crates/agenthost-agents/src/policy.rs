use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

pub const FEATURE_COUNT: usize = 4;

/// Indicator-derived input to a decision policy.
pub type Features = [f64; FEATURE_COUNT];

/// Buy and sell confidence scores. Not clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub buy: f64,
    pub sell: f64,
}

/// Pure mapping from features to confidence scores.
pub trait DecisionPolicy: Send + Sync {
    fn evaluate(&self, features: &Features) -> Confidence;
}

/// Fully connected feed-forward network with sigmoid activations.
///
/// Stored as JSON:
/// ```json
/// { "layers": [ { "weights": [[0.1, 0.2, 0.3, 0.4], ...], "biases": [0.0, ...] } ] }
/// ```
/// `weights[j][i]` connects input `i` to output `j`. The first layer takes
/// `FEATURE_COUNT` inputs and the last layer yields `[buy, sell]`.
///
/// Only validated networks can be constructed, including through serde.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "NetworkFile")]
pub struct NeuralNet {
    layers: Vec<Layer>,
}

#[derive(Deserialize)]
struct NetworkFile {
    layers: Vec<Layer>,
}

impl TryFrom<NetworkFile> for NeuralNet {
    type Error = AgentError;

    fn try_from(file: NetworkFile) -> Result<Self, AgentError> {
        let net = NeuralNet {
            layers: file.layers,
        };
        net.validate()?;
        Ok(net)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Layer {
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
}

impl Layer {
    fn inputs(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn outputs(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(row, bias)| {
                let z: f64 = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + bias;
                sigmoid(z)
            })
            .collect()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl NeuralNet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Model(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, AgentError> {
        let file: NetworkFile = serde_json::from_str(json)?;
        Self::try_from(file)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn validate(&self) -> Result<(), AgentError> {
        let mut expected_inputs = FEATURE_COUNT;
        for (n, layer) in self.layers.iter().enumerate() {
            if layer.outputs() == 0 {
                return Err(AgentError::Model(format!("layer {n} has no outputs")));
            }
            if layer.biases.len() != layer.outputs() {
                return Err(AgentError::Model(format!(
                    "layer {n} has {} biases for {} outputs",
                    layer.biases.len(),
                    layer.outputs()
                )));
            }
            if layer.weights.iter().any(|row| row.len() != expected_inputs) {
                return Err(AgentError::Model(format!(
                    "layer {n} expects {expected_inputs} inputs per row"
                )));
            }
            expected_inputs = layer.outputs();
        }

        match self.layers.last() {
            None => Err(AgentError::Model("network has no layers".to_string())),
            Some(last) if last.outputs() != 2 => Err(AgentError::Model(format!(
                "output layer must have 2 outputs, has {}",
                last.outputs()
            ))),
            Some(_) => Ok(()),
        }
    }

    pub fn run(&self, input: &[f64]) -> Vec<f64> {
        self.layers
            .iter()
            .fold(input.to_vec(), |activations, layer| {
                debug_assert_eq!(activations.len(), layer.inputs());
                layer.forward(&activations)
            })
    }
}

impl DecisionPolicy for NeuralNet {
    fn evaluate(&self, features: &Features) -> Confidence {
        let output = self.run(features);
        Confidence {
            buy: output[0],
            sell: output[1],
        }
    }
}
