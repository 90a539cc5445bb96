//! Stage tree transformation
//!
//! Converts the validated stage tree into an arena of [`TransformedStage`]
//! nodes. Each node knows its depth, its enclosing group and its preceding
//! sibling by [`StageId`], which is what the assembler walks to wire
//! workspaces and execution order.

use super::mangle::mangle_to_rfc1035_label;
use super::options::CompileOptions;
use super::pod_template::PodTemplateLookup;
use super::resources::{Inputs, LABEL_STAGE_NAME, ObjectMeta, Outputs, Task, TaskResource};
use super::steps::{StepContext, generate_steps};
use crate::pipeline::{
    Agent, CompileError, Container, EnvVar, Stage, StageBody, merge_containers, scoped_env,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Workspace given to top-level stages that do not name one
pub const DEFAULT_WORKSPACE: &str = "default";

/// Workspace meaning the stage needs no upstream workspace
pub const EMPTY_WORKSPACE: &str = "empty";

/// Name of the workspace preparation step
pub const GIT_MERGE_STEP: &str = "git-merge";

/// Handle to a node in a [`StageArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StageId(usize);

/// What a transformed stage holds
#[derive(Debug, Clone, PartialEq)]
pub enum StageKind {
    /// A leaf compiled to a task
    Task(Box<Task>),
    /// Children run one after another
    Sequential(Vec<StageId>),
    /// Children run side by side
    Parallel(Vec<StageId>),
}

/// A stage after transformation
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedStage {
    /// Stage name as written
    pub name: String,
    /// Pipeline task name for leaves
    pub task_name: String,
    /// Zero at top level
    pub depth: usize,
    /// The group this stage is nested in
    pub enclosing: Option<StageId>,
    /// The stage before this one in the same group, never set for parallel branches
    pub previous_sibling: Option<StageId>,
    /// Resolved workspace name
    pub workspace: String,
    /// Body
    pub kind: StageKind,
    /// Name of the pipeline task, assigned during assembly
    pub pipeline_task: Option<String>,
}

/// Owner of every transformed stage of one compile call
#[derive(Debug, Clone, Default)]
pub struct StageArena {
    nodes: Vec<TransformedStage>,
}

impl StageArena {
    /// Creates an empty arena
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, stage: TransformedStage) -> StageId {
        self.nodes.push(stage);
        StageId(self.nodes.len() - 1)
    }

    /// Returns the node for `id`.
    ///
    /// Ids are only handed out by this arena, so lookups always succeed.
    #[must_use]
    pub fn get(&self, id: StageId) -> &TransformedStage {
        &self.nodes[id.0]
    }

    /// Mutable access to the node for `id`
    pub fn get_mut(&mut self, id: StageId) -> &mut TransformedStage {
        &mut self.nodes[id.0]
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no stage has been transformed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of a group, empty for leaves
    #[must_use]
    pub fn children(&self, id: StageId) -> &[StageId] {
        match &self.get(id).kind {
            StageKind::Sequential(children) | StageKind::Parallel(children) => children,
            StageKind::Task(_) => &[],
        }
    }

    /// The task of a leaf
    #[must_use]
    pub fn task(&self, id: StageId) -> Option<&Task> {
        match &self.get(id).kind {
            StageKind::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Mutable access to the task of a leaf
    pub fn task_mut(&mut self, id: StageId) -> Option<&mut Task> {
        match &mut self.get_mut(id).kind {
            StageKind::Task(task) => Some(task),
            _ => None,
        }
    }

    /// The ancestor of `id` at `depth`, or `id` itself at its own depth
    #[must_use]
    pub fn enclosing_at(&self, id: StageId, depth: usize) -> Option<StageId> {
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.get(cur);
            if node.depth == depth {
                return Some(cur);
            }
            current = node.enclosing;
        }
        None
    }

    /// True if neither `enclosing` nor any of its ancestors has a preceding sibling
    #[must_use]
    pub fn is_nested_first(&self, enclosing: Option<StageId>) -> bool {
        let mut current = enclosing;
        while let Some(cur) = current {
            let node = self.get(cur);
            if node.previous_sibling.is_some() {
                return false;
            }
            current = node.enclosing;
        }
        true
    }

    /// Leaves under `id` in flattened execution order
    #[must_use]
    pub fn linear_tasks(&self, id: StageId) -> Vec<StageId> {
        match &self.get(id).kind {
            StageKind::Task(_) => vec![id],
            StageKind::Sequential(children) | StageKind::Parallel(children) => children
                .iter()
                .flat_map(|child| self.linear_tasks(*child))
                .collect(),
        }
    }

    /// Leaves that finish `id`: the last child of a sequence, every branch of a
    /// parallel group, or the leaf itself
    #[must_use]
    pub fn end_stages(&self, id: StageId) -> Vec<StageId> {
        match &self.get(id).kind {
            StageKind::Task(_) => vec![id],
            StageKind::Sequential(children) => children
                .last()
                .map(|last| self.end_stages(*last))
                .unwrap_or_default(),
            StageKind::Parallel(children) => children
                .iter()
                .flat_map(|child| self.end_stages(*child))
                .collect(),
        }
    }

    /// Leaves that run immediately before `id`
    #[must_use]
    pub fn previous_non_block_stages(&self, id: StageId) -> Vec<StageId> {
        let node = self.get(id);
        match (node.previous_sibling, node.enclosing) {
            (Some(previous), _) => self.end_stages(previous),
            (None, Some(enclosing)) => self.previous_non_block_stages(enclosing),
            (None, None) => Vec::new(),
        }
    }

    /// Finds the pipeline task providing `stage`'s workspace, walking back
    /// from `sibling`.
    ///
    /// Sequential siblings are searched from their last child. A parallel
    /// group enclosing `stage` is only searched in the branch holding `stage`;
    /// any other parallel group is skipped. Only leaves already assigned a
    /// pipeline task qualify.
    #[must_use]
    pub fn find_workspace_provider(
        &self,
        stage: StageId,
        mut sibling: Option<StageId>,
    ) -> Option<String> {
        let workspace = &self.get(stage).workspace;
        if workspace == EMPTY_WORKSPACE {
            return None;
        }

        while let Some(id) = sibling {
            let node = self.get(id);
            match &node.kind {
                StageKind::Sequential(children) => {
                    let provider = children
                        .last()
                        .and_then(|last| self.find_workspace_provider(stage, Some(*last)));
                    if provider.is_some() {
                        return provider;
                    }
                }
                StageKind::Parallel(branches) if self.enclosing_at(stage, node.depth) == Some(id) => {
                    let provider = branches
                        .iter()
                        .filter(|branch| {
                            self.enclosing_at(stage, self.get(**branch).depth) == Some(**branch)
                        })
                        .find_map(|branch| self.find_workspace_provider(stage, Some(*branch)));
                    if provider.is_some() {
                        return provider;
                    }
                }
                StageKind::Parallel(_) => {}
                StageKind::Task(_) => {
                    if let Some(pipeline_task) = &node.pipeline_task
                        && node.workspace == *workspace
                    {
                        return Some(pipeline_task.clone());
                    }
                }
            }
            sibling = node.previous_sibling;
        }
        None
    }
}

/// What a stage inherits from its parent
#[derive(Debug, Clone)]
pub struct ParentScope<'a> {
    /// Environment
    pub env: Vec<EnvVar>,
    /// Effective agent
    pub agent: Option<&'a Agent>,
    /// Resolved workspace
    pub workspace: String,
    /// Effective container overrides
    pub container: Container,
    /// Base working directory
    pub base_dir: Option<&'a str>,
    /// Depth of the stages being transformed
    pub depth: usize,
    /// Group the stages are nested in
    pub enclosing: Option<StageId>,
    /// Target path for the workspace of the first task
    pub workspace_path: Option<&'a str>,
}

impl<'a> ParentScope<'a> {
    /// Scope for top-level stages
    #[must_use]
    pub fn root(
        env: &[EnvVar],
        agent: Option<&'a Agent>,
        container: Option<&Container>,
        base_dir: Option<&'a str>,
    ) -> Self {
        Self {
            env: env.to_vec(),
            agent,
            workspace: DEFAULT_WORKSPACE.to_string(),
            container: container.cloned().unwrap_or_default(),
            base_dir,
            depth: 0,
            enclosing: None,
            workspace_path: None,
        }
    }
}

/// Transforms stages into an arena
pub struct Transformer<'a> {
    options: &'a CompileOptions,
    templates: &'a dyn PodTemplateLookup,
    arena: StageArena,
}

impl<'a> Transformer<'a> {
    /// Creates a transformer with an empty arena
    #[must_use]
    pub fn new(options: &'a CompileOptions, templates: &'a dyn PodTemplateLookup) -> Self {
        Self {
            options,
            templates,
            arena: StageArena::new(),
        }
    }

    /// The arena built so far
    #[must_use]
    pub fn arena(&self) -> &StageArena {
        &self.arena
    }

    /// Mutable access to the arena
    pub fn arena_mut(&mut self) -> &mut StageArena {
        &mut self.arena
    }

    /// Consumes the transformer, returning the arena
    #[must_use]
    pub fn into_arena(self) -> StageArena {
        self.arena
    }

    /// Transforms `stage` and everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Unsupported`] for stage post blocks and
    /// stage timeout, retry, stash or unstash, and [`CompileError::Merge`]
    /// when container overrides cannot be merged.
    pub fn transform_stage<'s>(
        &mut self,
        stage: &'s Stage,
        parent: &ParentScope<'s>,
        previous_sibling: Option<StageId>,
    ) -> Result<StageId, CompileError> {
        check_supported(stage)?;

        let own_container = stage.container_options().cloned().unwrap_or_default();
        let container = merge_containers(&parent.container, &own_container)
            .map_err(|e| CompileError::merge("stage and parent container overrides", e))?;

        let scope = ParentScope {
            env: scoped_env(stage.env(), &parent.env),
            agent: stage.agent.as_ref().or(parent.agent),
            workspace: stage
                .workspace()
                .map_or_else(|| parent.workspace.clone(), ToString::to_string),
            container,
            base_dir: stage.dir.as_deref().or(parent.base_dir),
            depth: parent.depth + 1,
            enclosing: None,
            workspace_path: parent.workspace_path,
        };

        let body = stage.body().ok_or_else(|| {
            CompileError::unsupported(format!(
                "stage {} has no steps, sequential stages, or parallel stages",
                stage.name
            ))
        })?;

        let node = TransformedStage {
            name: stage.name.clone(),
            task_name: stage.task_name(),
            depth: parent.depth,
            enclosing: parent.enclosing,
            previous_sibling,
            workspace: scope.workspace.clone(),
            kind: StageKind::Sequential(Vec::new()),
            pipeline_task: None,
        };

        match body {
            StageBody::Steps(_) => {
                let task = self.build_task(stage, &scope, parent, previous_sibling)?;
                let id = self.arena.push(TransformedStage {
                    kind: StageKind::Task(Box::new(task)),
                    ..node
                });
                Ok(id)
            }
            StageBody::Sequential(children) => {
                let id = self.arena.push(node);
                let mut ids = Vec::with_capacity(children.len());
                let mut previous = None;
                for (i, child) in children.iter().enumerate() {
                    let child_scope = ParentScope {
                        enclosing: Some(id),
                        workspace_path: if i == 0 { scope.workspace_path } else { None },
                        ..scope.clone()
                    };
                    let child_id = self.transform_stage(child, &child_scope, previous)?;
                    ids.push(child_id);
                    previous = Some(child_id);
                }
                self.arena.get_mut(id).kind = StageKind::Sequential(ids);
                Ok(id)
            }
            StageBody::Parallel(branches) => {
                let id = self.arena.push(node);
                let mut ids = Vec::with_capacity(branches.len());
                for (i, branch) in branches.iter().enumerate() {
                    let branch_scope = ParentScope {
                        enclosing: Some(id),
                        workspace_path: if i == 0 { scope.workspace_path } else { None },
                        ..scope.clone()
                    };
                    ids.push(self.transform_stage(branch, &branch_scope, None)?);
                }
                self.arena.get_mut(id).kind = StageKind::Parallel(ids);
                Ok(id)
            }
        }
    }

    fn build_task(
        &self,
        stage: &Stage,
        scope: &ParentScope<'_>,
        parent: &ParentScope<'_>,
        previous_sibling: Option<StageId>,
    ) -> Result<Task, CompileError> {
        let options = self.options;

        let mut labels: BTreeMap<String, String> = options.labels.clone();
        labels.insert(
            LABEL_STAGE_NAME.to_string(),
            mangle_to_rfc1035_label(&stage.name, ""),
        );
        let mut task = Task::new(ObjectMeta {
            name: mangle_to_rfc1035_label(
                &format!("{}-{}", options.pipeline_id, stage.name),
                &options.build_id,
            ),
            namespace: options.namespace.clone(),
            labels,
        });

        if previous_sibling.is_none() && self.arena.is_nested_first(parent.enclosing) {
            task.spec.steps.push(self.preparation_step(scope)?);
        }

        task.spec.inputs = Some(Inputs {
            resources: vec![TaskResource::workspace(
                scope.workspace_path.unwrap_or(&options.source_dir),
            )],
            params: options.task_params.clone(),
        });
        task.spec.outputs = Some(Outputs {
            resources: vec![TaskResource::workspace("")],
        });

        let image = scope.agent.map(Agent::image_str).unwrap_or_default();
        let ctx = StepContext {
            inherited_image: image,
            source_dir: &options.source_dir,
            base_dir: scope.base_dir,
            env: &scope.env,
            parent_container: &scope.container,
            templates: self.templates,
        };

        let mut counter = 0;
        let mut volumes = BTreeMap::new();
        for step in &stage.steps {
            let generated = generate_steps(step, &ctx, counter)?;
            counter = generated.counter;
            task.spec.steps.extend(generated.containers);
            volumes.extend(generated.volumes);
        }
        task.spec.volumes = volumes.into_values().collect();

        debug!(
            task = %task.metadata.name,
            stage = %stage.name,
            steps = task.spec.steps.len(),
            "Generated task"
        );
        Ok(task)
    }

    /// The implicit step that materialises the source workspace.
    fn preparation_step(&self, scope: &ParentScope<'_>) -> Result<Container, CompileError> {
        let step = Container {
            name: GIT_MERGE_STEP.to_string(),
            image: self.options.builder_image.clone(),
            command: vec!["jx".to_string()],
            args: ["step", "git", "merge", "--verbose"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            working_dir: self.options.default_working_dir(),
            env: scope.env.clone(),
            ..Default::default()
        };
        merge_containers(&scope.container, &step)
            .map_err(|e| CompileError::merge("stage container overrides and git merge step", e))
    }
}

fn check_supported(stage: &Stage) -> Result<(), CompileError> {
    if !stage.post.is_empty() {
        return Err(CompileError::unsupported("post on stages not yet supported"));
    }
    if let Some(options) = &stage.options {
        if options.timeout.is_some() {
            return Err(CompileError::unsupported(
                "Timeout on stage not yet supported",
            ));
        }
        if options.retry > 0 {
            return Err(CompileError::unsupported("Retry on stage not yet supported"));
        }
        if options.stash.is_some() {
            return Err(CompileError::unsupported("Stash on stage not yet supported"));
        }
        if options.unstash.is_some() {
            return Err(CompileError::unsupported(
                "Unstash on stage not yet supported",
            ));
        }
    }
    Ok(())
}
