use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use crate::config::StageDef;
use crate::error::StageError;
use crate::installer::HookInstaller;

pub const INSTALL_HOOKS: &str = "install-hooks";
pub const COMPILE: &str = "compile";
pub const VERIFY: &str = "verify";

/// What a stage does once its prerequisites are done
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageAction {
    /// Copy the tracked hooks into the hooks directory
    InstallHooks,
    /// Shell commands, run in order; the first failure stops the stage
    Commands(Vec<String>),
}

/// A named, orderable unit of work
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub action: StageAction,
    /// Stages that must complete before this one starts
    pub prerequisites: Vec<String>,
}

/// Directed dependency graph between named stages
#[derive(Debug, Default)]
pub struct StageGraph {
    stages: Vec<Stage>,
    index: HashMap<String, usize>,
}

#[derive(Clone, Copy)]
enum Mark {
    Visiting,
    Done,
}

impl StageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// `install-hooks`, plus `compile` and `verify` which both require it
    pub fn with_builtins() -> Self {
        let mut graph = Self::new();
        graph.insert(INSTALL_HOOKS, StageAction::InstallHooks);
        graph.add_stage(COMPILE);
        graph.add_stage(VERIFY);

        for stage in [COMPILE, VERIFY] {
            // both names were just registered
            let _ = graph.must_run_before(INSTALL_HOOKS, stage);
        }
        graph
    }

    /// Built-in stages extended with user definitions.
    /// Dependencies may name stages defined later in the list.
    pub fn from_config(defs: &[StageDef]) -> Result<Self, StageError> {
        let mut graph = Self::with_builtins();

        for def in defs {
            graph.add_stage(&def.name);
        }
        for def in defs {
            if !def.commands.is_empty() {
                graph.add_commands(&def.name, &def.commands)?;
            }
            for dep in &def.depends_on {
                graph.must_run_before(dep, &def.name)?;
            }
        }

        Ok(graph)
    }

    /// Register a command stage; an existing stage of that name is kept as is.
    pub fn add_stage(&mut self, name: &str) {
        if !self.index.contains_key(name) {
            self.insert(name, StageAction::Commands(Vec::new()));
        }
    }

    fn insert(&mut self, name: &str, action: StageAction) {
        self.index.insert(name.to_string(), self.stages.len());
        self.stages.push(Stage {
            name: name.to_string(),
            action,
            prerequisites: Vec::new(),
        });
    }

    pub fn add_commands(&mut self, name: &str, commands: &[String]) -> Result<(), StageError> {
        let stage = self.get_mut(name)?;
        match &mut stage.action {
            StageAction::Commands(existing) => {
                existing.extend(commands.iter().cloned());
                Ok(())
            }
            StageAction::InstallHooks => Err(StageError::BuiltinStage(name.to_string())),
        }
    }

    /// Declare that `before` must complete before `after` starts
    pub fn must_run_before(&mut self, before: &str, after: &str) -> Result<(), StageError> {
        if !self.index.contains_key(before) {
            return Err(StageError::UnknownStage(before.to_string()));
        }
        let stage = self.get_mut(after)?;
        if !stage.prerequisites.iter().any(|p| p == before) {
            stage.prerequisites.push(before.to_string());
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Stage, StageError> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.stages[i]),
            None => Err(StageError::UnknownStage(name.to_string())),
        }
    }

    /// Execution order for `targets`: every stage after all of its
    /// prerequisites, each stage once. Deterministic for a given graph.
    pub fn plan(&self, targets: &[String]) -> Result<Vec<&Stage>, StageError> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut order = Vec::new();

        for target in targets {
            self.visit(target, &mut marks, &mut stack, &mut order)?;
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &str,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        order: &mut Vec<&'a Stage>,
    ) -> Result<(), StageError> {
        let stage = self
            .get(name)
            .ok_or_else(|| StageError::UnknownStage(name.to_string()))?;

        match marks.get(stage.name.as_str()) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|s| *s == stage.name).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(stage.name.clone());
                return Err(StageError::DependencyCycle(cycle));
            }
            None => {}
        }

        marks.insert(&stage.name, Mark::Visiting);
        stack.push(&stage.name);
        for prerequisite in &stage.prerequisites {
            self.visit(prerequisite, marks, stack, order)?;
        }
        stack.pop();
        marks.insert(&stage.name, Mark::Done);
        order.push(stage);

        Ok(())
    }
}

/// Runs planned stages one after another in the repository root
pub struct Runner<'a> {
    graph: &'a StageGraph,
    installer: &'a HookInstaller,
    workdir: &'a Path,
}

impl<'a> Runner<'a> {
    pub fn new(graph: &'a StageGraph, installer: &'a HookInstaller, workdir: &'a Path) -> Self {
        Runner {
            graph,
            installer,
            workdir,
        }
    }

    /// Run `targets` and everything they depend on.
    /// Returns the names of the stages that ran, in order.
    pub fn run(&self, targets: &[String]) -> Result<Vec<String>, StageError> {
        let plan = self.graph.plan(targets)?;
        tracing::debug!(
            plan = ?plan.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "stage plan"
        );

        let mut ran = Vec::with_capacity(plan.len());
        for stage in plan {
            self.run_stage(stage)?;
            ran.push(stage.name.clone());
        }
        Ok(ran)
    }

    fn run_stage(&self, stage: &Stage) -> Result<(), StageError> {
        tracing::info!(stage = %stage.name, "running stage");

        match &stage.action {
            StageAction::InstallHooks => {
                self.installer
                    .install()
                    .map_err(|source| StageError::Install {
                        stage: stage.name.clone(),
                        source,
                    })?;
            }
            StageAction::Commands(commands) => {
                for command in commands {
                    self.run_command(&stage.name, command)?;
                }
            }
        }

        Ok(())
    }

    fn run_command(&self, stage: &str, command: &str) -> Result<(), StageError> {
        tracing::debug!(stage, command, "running command");

        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.workdir)
            .status()
            .map_err(|source| StageError::Spawn {
                stage: stage.to_string(),
                command: command.to_string(),
                source,
            })?;

        if !status.success() {
            tracing::error!(stage, command, %status, "command failed");
            return Err(StageError::CommandFailed {
                stage: stage.to_string(),
                command: command.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}
