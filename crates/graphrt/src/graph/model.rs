//! Model wrapper: metadata, opset imports and persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Graph;
use crate::error::{GraphError, ModelFormatError};
use crate::schema::SchemaRegistryList;

/// Descriptive metadata carried alongside the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub producer_name: String,
    pub producer_version: String,
    pub domain: String,
    pub model_version: i64,
    pub description: String,
    pub custom_metadata: BTreeMap<String, String>,
}

/// Main graph plus the opset version imported for each operator domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    metadata: ModelMetadata,
    domain_to_version: BTreeMap<String, u32>,
    graph: Graph,
}

impl Model {
    pub fn new(graph_name: &str, domain_to_version: BTreeMap<String, u32>) -> Self {
        Model {
            metadata: ModelMetadata::default(),
            domain_to_version,
            graph: Graph::new(graph_name),
        }
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ModelMetadata {
        &mut self.metadata
    }

    pub fn domain_to_version(&self) -> &BTreeMap<String, u32> {
        &self.domain_to_version
    }

    pub fn main_graph(&self) -> &Graph {
        &self.graph
    }

    pub fn main_graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Resolves the main graph against the model's opset imports.
    pub fn resolve(&mut self, schemas: &SchemaRegistryList) -> Result<(), GraphError> {
        self.graph.resolve(schemas, &self.domain_to_version)
    }

    pub fn to_json(&self) -> Result<String, ModelFormatError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decodes a JSON model. The result is always unresolved.
    pub fn from_json(json: &str) -> Result<Self, ModelFormatError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelFormatError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelFormatError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Writes the model, as JSON when the path ends in `.json` and in binary form otherwise.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelFormatError> {
        let path = path.as_ref();
        let bytes = if is_json(path) {
            self.to_json()?.into_bytes()
        } else {
            self.to_bytes()?
        };
        fs::write(path, bytes).map_err(|source| ModelFormatError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelFormatError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ModelFormatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if is_json(path) {
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            Self::from_bytes(&bytes)
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
}
