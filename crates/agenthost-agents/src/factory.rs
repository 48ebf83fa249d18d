use std::collections::BTreeMap;

use agenthost_models::{AgentConfig, PropertyInfo, PropertyValue};
use serde::Serialize;

use crate::error::AgentError;
use crate::neural_net_agent::NeuralNetAgent;
use crate::runtime::Agent;

pub type BuildFn = fn(&ResolvedProperties) -> Result<Box<dyn Agent>, AgentError>;

/// Everything needed to list an agent type and construct instances of it.
#[derive(Clone, Serialize)]
pub struct AgentDescriptor {
    pub type_name: &'static str,
    pub description: &'static str,
    pub properties: Vec<PropertyInfo>,
    #[serde(skip)]
    pub build: BuildFn,
}

/// Property values for one agent instance: declared defaults overlaid with
/// configured overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProperties {
    pair: String,
    values: BTreeMap<String, PropertyValue>,
}

impl ResolvedProperties {
    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn get(&self, name: &str) -> Result<&PropertyValue, AgentError> {
        self.values
            .get(name)
            .ok_or_else(|| AgentError::Config(format!("property '{name}' is not declared")))
    }

    pub fn get_i64(&self, name: &str) -> Result<i64, AgentError> {
        let value = self.get(name)?;
        value.as_i64().ok_or_else(|| mistyped(name, "integer", value))
    }

    pub fn get_f64(&self, name: &str) -> Result<f64, AgentError> {
        let value = self.get(name)?;
        value.as_f64().ok_or_else(|| mistyped(name, "float", value))
    }

    pub fn get_str(&self, name: &str) -> Result<&str, AgentError> {
        let value = self.get(name)?;
        value.as_str().ok_or_else(|| mistyped(name, "text", value))
    }
}

fn mistyped(name: &str, expected: &str, value: &PropertyValue) -> AgentError {
    AgentError::Config(format!(
        "property '{name}' is {}, expected {expected}",
        value.kind()
    ))
}

/// Registry of agent types, keyed by type name.
pub struct AgentFactory {
    descriptors: BTreeMap<&'static str, AgentDescriptor>,
}

impl Default for AgentFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register(NeuralNetAgent::descriptor());
        factory
    }
}

impl AgentFactory {
    pub fn empty() -> Self {
        Self {
            descriptors: BTreeMap::new(),
        }
    }

    /// Add or replace an agent type.
    pub fn register(&mut self, descriptor: AgentDescriptor) {
        self.descriptors.insert(descriptor.type_name, descriptor);
    }

    pub fn descriptor(&self, type_name: &str) -> Result<&AgentDescriptor, AgentError> {
        self.descriptors
            .get(type_name)
            .ok_or_else(|| AgentError::UnknownType(type_name.to_string()))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.descriptors.values()
    }

    pub fn resolve(&self, config: &AgentConfig) -> Result<ResolvedProperties, AgentError> {
        let descriptor = self.descriptor(&config.agent_type)?;

        for name in config.properties.keys() {
            if !descriptor.properties.iter().any(|p| &p.name == name) {
                return Err(AgentError::Config(format!(
                    "agent '{}': unknown property '{name}' for type {}",
                    config.id, descriptor.type_name
                )));
            }
        }

        let mut values = BTreeMap::new();
        for info in &descriptor.properties {
            let value = match config.properties.get(&info.name) {
                Some(value) if info.default.accepts(value) => value.clone(),
                Some(value) => {
                    return Err(AgentError::Config(format!(
                        "agent '{}': property '{}' must be {}, got {}",
                        config.id,
                        info.name,
                        info.default.kind(),
                        value.kind()
                    )))
                }
                None => info.default.clone(),
            };
            values.insert(info.name.clone(), value);
        }

        Ok(ResolvedProperties {
            pair: config.pair.clone(),
            values,
        })
    }

    pub fn build(&self, config: &AgentConfig) -> Result<Box<dyn Agent>, AgentError> {
        let descriptor = self.descriptor(&config.agent_type)?;
        let props = self.resolve(config)?;
        (descriptor.build)(&props)
    }
}
