use thiserror::Error;

/// Errors raised while turning a description into a plan, or while realizing a node.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Malformed graph{}: missing or invalid field '{field}': {message}", node_suffix(.node))]
    MalformedGraph {
        node: Option<String>,
        field: String,
        message: String,
    },

    #[error("Cycle detected; these nodes never became ready: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    #[error("Node '{node_id}' ({node_name}) is missing required input '{input}'")]
    MissingInput {
        node_id: String,
        node_name: String,
        input: String,
    },

    #[error("Node '{node_id}' ({node_name}) has no resolvable behavior: {reason}")]
    UnresolvedBehavior {
        node_id: String,
        node_name: String,
        reason: String,
    },

    #[error("Node '{node_id}' ({node_name}) failed: {message}")]
    InvocationFailure {
        node_id: String,
        node_name: String,
        message: String,
    },

    #[error(
        "Node '{node_id}' ({node_name}) returned {found}, expected a mapping with keys [{}]",
        .expected.join(", ")
    )]
    OutputShapeMismatch {
        node_id: String,
        node_name: String,
        expected: Vec<String>,
        found: String,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),
}

fn node_suffix(node: &Option<String>) -> String {
    match node {
        Some(id) => format!(" at node '{}'", id),
        None => String::new(),
    }
}

impl EngineError {
    pub(crate) fn malformed(
        node: Option<&str>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        EngineError::MalformedGraph {
            node: node.map(str::to_string),
            field: field.into(),
            message: message.into(),
        }
    }

    /// The node this error is attributed to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            EngineError::MalformedGraph { node, .. } => node.as_deref(),
            EngineError::MissingInput { node_id, .. }
            | EngineError::UnresolvedBehavior { node_id, .. }
            | EngineError::InvocationFailure { node_id, .. }
            | EngineError::OutputShapeMismatch { node_id, .. } => Some(node_id),
            EngineError::CycleDetected { .. } | EngineError::Plan(_) => None,
        }
    }
}

/// Errors produced by behaviors and behavior compilers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BehaviorError {
    #[error("Compilation of '{name}' failed: {message}")]
    Compile { name: String, message: String },

    #[error("'{function}' {message}")]
    Arity { function: String, message: String },

    #[error(
        "Type mismatch during operation '{operation}': expected {expected}, but found {found}"
    )]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("Name '{0}' is not defined")]
    UnknownName(String),

    #[error("{0}")]
    Custom(String),
}

/// Errors from the reference script compiler's front end.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("line {line}: unexpected character '{found}'")]
    UnexpectedChar { line: usize, found: char },

    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },

    #[error("line {line}: expected {expected}, found {found}")]
    UnexpectedToken {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("function '{0}' is not defined in the source")]
    FunctionNotFound(String),
}

/// Errors from saving or loading execution plan artifacts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Plan I/O failed: {0}")]
    Io(String),

    #[error("Plan encoding failed: {0}")]
    Encode(String),

    #[error("Plan decoding failed: {0}")]
    Decode(String),

    #[error("Plan is inconsistent: {0}")]
    Inconsistent(String),
}
