//! A small Python-flavoured script language used as the reference
//! [`BehaviorCompiler`].
//!
//! Supported: `def` blocks with positional/default parameters, assignments,
//! expression statements and `return`, arithmetic with Python's integer/float
//! rules, comparisons, `and`/`or`/`not`, list and dict literals, indexing and a
//! handful of builtins (`abs`, `min`, `max`, `len`, `str`, `int`, `float`,
//! `round`, `sum`, `print`). Top-level `import` lines are ignored.

mod engine;
pub mod expression;
pub mod parsing;

use crate::error::{BehaviorError, ScriptError};
use crate::registry::{Arguments, Behavior, BehaviorCompiler};
use crate::value::Value;
use engine::ScriptEngine;
use expression::FunctionDef;
use std::sync::Arc;

/// Compiles node source text into [`ScriptFunction`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptCompiler;

impl ScriptCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Parses `source` and returns the function called `name`.
    pub fn function(&self, name: &str, source: &str) -> Result<ScriptFunction, ScriptError> {
        parse_functions_named(name, source).map(|definition| ScriptFunction { definition })
    }
}

fn parse_functions_named(name: &str, source: &str) -> Result<FunctionDef, ScriptError> {
    parsing::parse_functions(source)?
        .into_iter()
        .find(|f| f.name == name)
        .ok_or_else(|| ScriptError::FunctionNotFound(name.to_string()))
}

impl BehaviorCompiler for ScriptCompiler {
    fn compile(&self, name: &str, source: &str) -> Result<Arc<dyn Behavior>, BehaviorError> {
        let function = self.function(name, source).map_err(|e| BehaviorError::Compile {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Arc::new(function))
    }
}

/// A parsed function, callable with keyword arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptFunction {
    definition: FunctionDef,
}

impl ScriptFunction {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.definition.params.iter().map(|p| p.name.as_str())
    }
}

impl Behavior for ScriptFunction {
    fn call(&self, args: &Arguments) -> Result<Value, BehaviorError> {
        ScriptEngine::bind(&self.definition, args)?.run()
    }
}
