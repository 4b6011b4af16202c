use crate::error::EngineError;
use crate::interpreter::ExecutionReport;
use crate::plan::ExecutionPlan;
use serde::{Deserialize, Serialize};

/// Consumes a resolved plan. Both execution strategies share this seam.
pub trait Backend {
    type Output;

    fn execute(&self, plan: &ExecutionPlan) -> Result<Self::Output, EngineError>;
}

/// The available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendChoice {
    /// Runs every node now and collects their outputs.
    #[default]
    Interpreter,
    /// Emits a standalone program that performs the same calls in the same order.
    Generator,
}

/// What a backend selected at run time produced.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutput {
    Report(ExecutionReport),
    Program(String),
}

impl BackendOutput {
    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            BackendOutput::Report(report) => Some(report),
            BackendOutput::Program(_) => None,
        }
    }

    pub fn program(&self) -> Option<&str> {
        match self {
            BackendOutput::Program(text) => Some(text),
            BackendOutput::Report(_) => None,
        }
    }
}
