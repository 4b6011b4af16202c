use crate::backend::{BackendChoice, BackendOutput};
use crate::codegen::ScriptGenerator;
use crate::error::EngineError;
use crate::graph::Graph;
use crate::interpreter::{CancelToken, ExecutionMode, ExecutionReport, Interpreter, OutputPolicy};
use crate::plan::{ExecutionPlan, Planner};
use crate::registry::{BehaviorCompiler, Registry};
use crate::script::ScriptCompiler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Tunables that can come from a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: ExecutionMode,
    pub output_policy: OutputPolicy,
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Owns everything a run needs: no state is shared between engines.
pub struct Engine {
    registry: Registry,
    compiler: Arc<dyn BehaviorCompiler>,
    config: EngineConfig,
}

pub struct EngineBuilder {
    registry: Registry,
    compiler: Option<Arc<dyn BehaviorCompiler>>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            compiler: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the bundled [`ScriptCompiler`].
    pub fn with_compiler(mut self, compiler: impl BehaviorCompiler + 'static) -> Self {
        self.compiler = Some(Arc::new(compiler));
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn with_output_policy(mut self, policy: OutputPolicy) -> Self {
        self.config.output_policy = policy;
        self
    }

    pub fn build(self) -> Engine {
        let compiler: Arc<dyn BehaviorCompiler> = match self.compiler {
            Some(compiler) => compiler,
            None => Arc::new(ScriptCompiler::new()),
        };
        Engine {
            registry: self.registry,
            compiler,
            config: self.config,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Node ids in execution order.
    pub fn order(&self, graph: &Graph) -> Result<Vec<String>, EngineError> {
        Ok(self
            .plan(graph)?
            .nodes
            .into_iter()
            .map(|node| node.id)
            .collect())
    }

    pub fn plan(&self, graph: &Graph) -> Result<ExecutionPlan, EngineError> {
        let plan = Planner::new(graph).plan()?;
        info!(nodes = plan.len(), "planned graph");
        Ok(plan)
    }

    /// Interprets the graph. Only malformed or cyclic graphs fail as a whole;
    /// node-level problems are reported inside the [`ExecutionReport`].
    pub fn run(&self, graph: &Graph) -> Result<ExecutionReport, EngineError> {
        Ok(self.run_plan(&self.plan(graph)?))
    }

    pub fn run_with_cancel(
        &self,
        graph: &Graph,
        token: CancelToken,
    ) -> Result<ExecutionReport, EngineError> {
        Ok(self.run_plan_with_cancel(&self.plan(graph)?, token))
    }

    pub fn run_plan(&self, plan: &ExecutionPlan) -> ExecutionReport {
        self.interpreter().run(plan)
    }

    pub fn run_plan_with_cancel(
        &self,
        plan: &ExecutionPlan,
        token: CancelToken,
    ) -> ExecutionReport {
        self.interpreter().with_cancel_token(token).run(plan)
    }

    /// Emits the equivalent standalone program.
    pub fn generate(&self, graph: &Graph) -> Result<String, EngineError> {
        self.generate_plan(&self.plan(graph)?)
    }

    pub fn generate_plan(&self, plan: &ExecutionPlan) -> Result<String, EngineError> {
        ScriptGenerator::new(&self.registry).generate(plan)
    }

    pub fn execute(
        &self,
        choice: BackendChoice,
        graph: &Graph,
    ) -> Result<BackendOutput, EngineError> {
        let plan = self.plan(graph)?;
        match choice {
            BackendChoice::Interpreter => Ok(BackendOutput::Report(self.run_plan(&plan))),
            BackendChoice::Generator => self.generate_plan(&plan).map(BackendOutput::Program),
        }
    }

    fn interpreter(&self) -> Interpreter<'_> {
        Interpreter::new(&self.registry, &*self.compiler)
            .with_mode(self.config.mode)
            .with_output_policy(self.config.output_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_partial_json() {
        let config = EngineConfig::from_json(r#"{"mode": {"parallel": {"workers": 4}}}"#).unwrap();
        assert_eq!(config.mode, ExecutionMode::Parallel { workers: 4 });
        assert_eq!(config.output_policy, OutputPolicy::Strict);

        let config =
            EngineConfig::from_json(r#"{"mode": "sequential", "output_policy": "lenient"}"#)
                .unwrap();
        assert_eq!(config.mode, ExecutionMode::Sequential);
        assert_eq!(config.output_policy, OutputPolicy::Lenient);
    }

    #[test]
    fn builder_overrides_config() {
        let engine = Engine::builder()
            .with_config(EngineConfig {
                mode: ExecutionMode::Parallel { workers: 2 },
                ..Default::default()
            })
            .with_output_policy(OutputPolicy::Lenient)
            .build();
        assert_eq!(engine.config().mode, ExecutionMode::Parallel { workers: 2 });
        assert_eq!(engine.config().output_policy, OutputPolicy::Lenient);
    }
}
