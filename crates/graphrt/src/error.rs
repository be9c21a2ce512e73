//! Error taxonomy shared by the graph model, the registries and the session.
//!
//! Every failure is reported as a value. [`EngineError::kind`] groups errors into the four
//! categories callers usually branch on.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionState;
use crate::types::{DataType, ElementType};

/// Coarse classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The graph is malformed: dangling references, cycles, unknown operators, bad arity.
    Structural,
    /// No registered provider can execute a node.
    UnsupportedOperator,
    /// A kernel or device failed while running.
    Execution,
    /// The caller broke an API contract: wrong state, bad feeds, wrong value tag.
    ContractViolation,
}

/// Structural problems detected while building or resolving a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node name `{0}` is already used in the graph")]
    DuplicateNode(String),
    #[error("node arg `{name}` is declared as {existing} and as {requested}")]
    ArgTypeConflict {
        name: String,
        existing: DataType,
        requested: DataType,
    },
    #[error("graph is already resolved; structural edits are not allowed")]
    AlreadyResolved,
    #[error("graph has not been resolved")]
    NotResolved,
    #[error("node index {0} is out of range")]
    UnknownNode(usize),
    #[error("value `{arg}` is produced by both `{first}` and `{second}`")]
    MultipleProducers {
        arg: String,
        first: String,
        second: String,
    },
    #[error("node `{node}` consumes `{arg}` which has no producer, initializer or graph input")]
    DanglingInput { node: String, arg: String },
    #[error("graph input `{0}` is not a known value")]
    UnknownGraphInput(String),
    #[error("graph output `{0}` is never produced")]
    UnknownGraphOutput(String),
    #[error("graph contains a cycle through node `{node}`")]
    Cycle { node: String },
    #[error("node `{node}` uses domain `{domain}` which has no opset version in the model")]
    MissingOpset { node: String, domain: String },
    #[error("no schema for `{domain}:{op_type}` at opset {version} (node `{node}`)")]
    UnknownOperator {
        node: String,
        op_type: String,
        domain: String,
        version: u32,
    },
    #[error("node `{node}` ({op_type}): {message}")]
    Arity {
        node: String,
        op_type: String,
        message: String,
    },
    #[error("node `{node}` ({op_type}) is missing required attribute `{attribute}`")]
    MissingAttribute {
        node: String,
        op_type: String,
        attribute: String,
    },
    #[error("node `{node}` ({op_type}) has unexpected attribute `{attribute}`")]
    UnknownAttribute {
        node: String,
        op_type: String,
        attribute: String,
    },
    #[error("node `{node}` ({op_type}): attribute `{attribute}` must be {expected}")]
    AttributeType {
        node: String,
        op_type: String,
        attribute: String,
        expected: &'static str,
    },
    #[error("node `{node}` ({op_type}): {message}")]
    TypeConstraint {
        node: String,
        op_type: String,
        message: String,
    },
}

/// Failures while populating an operator schema registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema `{domain}:{op_type}` since version {version} is already registered")]
    Duplicate {
        op_type: String,
        domain: String,
        version: u32,
    },
    #[error("schema `{op_type}` references undeclared type parameter `{type_str}`")]
    UnknownTypeParameter { op_type: String, type_str: String },
}

/// Failures while populating a kernel registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error(
        "kernel `{domain}:{op_type}` for {provider} since version {since_version} is already registered"
    )]
    DuplicateKernel {
        op_type: String,
        domain: String,
        provider: String,
        since_version: u32,
    },
    #[error("kernel definition for `{0}` has no provider")]
    MissingProvider(String),
}

/// Misuse of a [`Value`](crate::types::Value) or [`Tensor`](crate::types::Tensor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("value holds {actual} but {expected} was requested")]
    TypeMismatch { expected: String, actual: DataType },
    #[error("value of type {0} has not been produced yet")]
    NotReady(DataType),
    #[error("value of type {0} was already fulfilled")]
    AlreadyFulfilled(DataType),
    #[error("shape {dims:?} holds {expected} elements but {actual} were supplied")]
    ElementCount {
        dims: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("tensor element type is {actual} but {expected} was requested")]
    ElementType {
        expected: ElementType,
        actual: ElementType,
    },
}

/// Failures while encoding or decoding a persisted model.
#[derive(Debug, Error)]
pub enum ModelFormatError {
    #[error("failed to access model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model encoding: {0}")]
    Binary(#[from] bincode::Error),
}

/// Error raised by kernels, fences, allocators and providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("kernel execution failure: {message}")]
    Execution { message: String },
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: String, reason: String },
    #[error(transparent)]
    Value(#[from] ValueError),
}

impl KernelError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        KernelError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        KernelError::Execution {
            message: message.into(),
        }
    }

    pub fn unimplemented(op: impl Into<String>, reason: impl Into<String>) -> Self {
        KernelError::Unimplemented {
            op: op.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for results returned by kernels and providers.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Top-level error returned by every public engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    ModelFormat(#[from] ModelFormatError),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(
        "no registered execution provider supports node `{node}` ({domain}:{op_type}, opset {version})"
    )]
    UnsupportedOperator {
        node: String,
        op_type: String,
        domain: String,
        version: u32,
    },
    #[error("failed to create kernel for node `{node}` ({op_type}) on {provider}: {source}")]
    KernelCreation {
        node: String,
        op_type: String,
        provider: String,
        #[source]
        source: KernelError,
    },
    #[error("node `{node}` ({op_type}) failed on {provider}: {source}")]
    Execution {
        node: String,
        op_type: String,
        provider: String,
        #[source]
        source: KernelError,
    },
    #[error("waiting on `{value}` before node `{node}` failed: {source}")]
    Fence {
        value: String,
        node: String,
        #[source]
        source: KernelError,
    },
    #[error("moving `{value}` between devices failed: {source}")]
    Transfer {
        value: String,
        #[source]
        source: KernelError,
    },
    #[error("node `{node}` ({op_type}) did not produce output `{output}`")]
    MissingKernelOutput {
        node: String,
        op_type: String,
        output: String,
    },
    #[error("`{operation}` is not allowed while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("execution provider `{0}` is already registered")]
    DuplicateProvider(String),
    #[error("execution provider `{provider}` has no allocator for {memory}")]
    MissingAllocator { provider: String, memory: String },
    #[error("model requires {required} inputs but the feed contains {supplied}; `{missing}` is missing")]
    MissingInput {
        required: usize,
        supplied: usize,
        missing: String,
    },
    #[error("`{0}` is not an input of the model")]
    UnknownInput(String),
    #[error("`{0}` is not an output of the model")]
    UnknownOutput(String),
    #[error("input `{name}` expects {expected} but received {actual}")]
    InputTypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },
    #[error("input `{name}` expects shape {expected} but received {actual:?}")]
    InputShapeMismatch {
        name: String,
        expected: String,
        actual: Vec<usize>,
    },
    #[error("failed to write profile to {path}: {source}")]
    ProfileOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Classifies the error into one of the four engine failure categories.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Graph(_) | EngineError::ModelFormat(_) => ErrorKind::Structural,
            EngineError::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            EngineError::KernelCreation { .. }
            | EngineError::Execution { .. }
            | EngineError::Fence { .. }
            | EngineError::Transfer { .. }
            | EngineError::MissingKernelOutput { .. }
            | EngineError::ProfileOutput { .. } => ErrorKind::Execution,
            EngineError::Schema(_)
            | EngineError::Registry(_)
            | EngineError::Value(_)
            | EngineError::InvalidState { .. }
            | EngineError::DuplicateProvider(_)
            | EngineError::MissingAllocator { .. }
            | EngineError::MissingInput { .. }
            | EngineError::UnknownInput(_)
            | EngineError::UnknownOutput(_)
            | EngineError::InputTypeMismatch { .. }
            | EngineError::InputShapeMismatch { .. } => ErrorKind::ContractViolation,
        }
    }
}

/// Result alias used throughout the public engine API.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_failure_category() {
        let structural = EngineError::from(GraphError::Cycle {
            node: "n0".to_string(),
        });
        assert_eq!(structural.kind(), ErrorKind::Structural);

        let unsupported = EngineError::UnsupportedOperator {
            node: "n0".to_string(),
            op_type: "Foo".to_string(),
            domain: "ai.onnx".to_string(),
            version: 7,
        };
        assert_eq!(unsupported.kind(), ErrorKind::UnsupportedOperator);
        assert!(unsupported.to_string().contains("n0"));

        let runtime = EngineError::Execution {
            node: "n1".to_string(),
            op_type: "Add".to_string(),
            provider: "CPUExecutionProvider".to_string(),
            source: KernelError::execution("boom"),
        };
        assert_eq!(runtime.kind(), ErrorKind::Execution);
        assert!(runtime.to_string().contains("n1"));
        assert!(runtime.to_string().contains("Add"));

        let contract = EngineError::InvalidState {
            operation: "run",
            state: SessionState::Created,
        };
        assert_eq!(contract.kind(), ErrorKind::ContractViolation);
    }
}
