#![allow(dead_code)]

use rundag::model::{DefinitionGraph, ObjectMeta, RunInstance, StepSpec};

pub const TEST_NAMESPACE: &str = "default";

/// Builder for `DefinitionGraph` to simplify test setup.
pub struct GraphBuilder {
    name: String,
    namespace: String,
    steps: Vec<StepSpec>,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: TEST_NAMESPACE.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> DefinitionGraph {
        DefinitionGraph::new(ObjectMeta::new(self.namespace, self.name), self.steps)
    }
}

/// Builder for `StepSpec`.
pub struct StepBuilder {
    step: StepSpec,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            step: StepSpec::new(name, "busybox"),
        }
    }

    pub fn image(mut self, image: &str) -> Self {
        self.step.image = image.to_string();
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.step.dependencies.push(dep.to_string());
        self
    }

    pub fn replicas(mut self, replicas: u32) -> Self {
        self.step.replicas = replicas;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.step.envs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn command(mut self, command: &[&str]) -> Self {
        self.step.command = command.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.step.args.push(arg.to_string());
        self
    }

    pub fn build(self) -> StepSpec {
        self.step
    }
}

/// Builder for `RunInstance`.
pub struct RunBuilder {
    run: RunInstance,
}

impl RunBuilder {
    pub fn new(name: &str, graph: &str) -> Self {
        Self {
            run: RunInstance::new(ObjectMeta::new(TEST_NAMESPACE, name), graph),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.run.metadata.namespace = namespace.to_string();
        self
    }

    pub fn finalizer(mut self, token: &str) -> Self {
        self.run.metadata.finalizers.push(token.to_string());
        self
    }

    pub fn build(self) -> RunInstance {
        self.run
    }
}

/// Graph whose steps are given as `(name, dependencies)` pairs.
pub fn graph_from_edges(name: &str, steps: &[(&str, &[&str])]) -> DefinitionGraph {
    steps
        .iter()
        .fold(GraphBuilder::new(name), |builder, (step, deps)| {
            let step = deps
                .iter()
                .fold(StepBuilder::new(step), |s, dep| s.after(dep));
            builder.with_step(step.build())
        })
        .build()
}
