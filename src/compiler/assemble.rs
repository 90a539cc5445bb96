//! Pipeline assembly
//!
//! Ties the phases together: validate, transform every top-level stage,
//! then wire the flattened tasks into pipeline tasks with workspace
//! providers and execution order.

use super::mangle::mangle_to_rfc1035_label;
use super::options::CompileOptions;
use super::pod_template::PodTemplateLookup;
use super::resources::{
    CompiledPipeline, ObjectMeta, Pipeline, PipelineDeclaredResource, PipelineStructure,
    PipelineStructureStage, PipelineTask, PipelineTaskInputResource, PipelineTaskOutputResource,
    PipelineTaskResources, ResourceType, TaskRef, WORKSPACE_RESOURCE,
};
use super::transform::{ParentScope, StageArena, StageId, StageKind, Transformer};
use crate::pipeline::{CompileError, PipelineDefinition, Validate};
use tracing::{debug, info};

/// Compiles a pipeline definition into a pipeline, its tasks and its structure.
///
/// The definition is validated first; nothing is produced unless every
/// stage compiles.
///
/// # Errors
///
/// Returns [`CompileError::Validation`] for structural problems and name
/// collisions, [`CompileError::Unsupported`] for features this compiler does
/// not generate, and [`CompileError::Merge`] when container overrides clash.
pub fn compile(
    def: &PipelineDefinition,
    options: &CompileOptions,
    templates: &dyn PodTemplateLookup,
) -> Result<CompiledPipeline, CompileError> {
    debug!(stages = def.stage_count(), "Validating pipeline");
    def.validate()?;

    if !def.post.is_empty() {
        return Err(CompileError::unsupported(
            "Post at top level not yet supported",
        ));
    }
    let root_options = def.options.as_ref();
    if root_options.is_some_and(|o| o.retry > 0) {
        return Err(CompileError::unsupported(
            "Retry at top level not yet supported",
        ));
    }
    let timeout_seconds = root_options
        .and_then(|o| o.timeout.as_ref())
        .map(crate::pipeline::Timeout::to_duration)
        .transpose()?
        .map(|d| d.as_secs());

    let root_scope = ParentScope::root(
        def.env(),
        def.agent.as_ref(),
        root_options.and_then(|o| o.container_options.as_ref()),
        def.dir.as_deref(),
    );

    let mut transformer = Transformer::new(options, templates);
    let mut top_level = Vec::with_capacity(def.stages.len());
    let mut previous = None;
    for (i, stage) in def.stages.iter().enumerate() {
        let scope = ParentScope {
            workspace_path: if i == 0 {
                options.workspace_path.as_deref()
            } else {
                None
            },
            ..root_scope.clone()
        };
        let id = transformer.transform_stage(stage, &scope, previous)?;
        top_level.push(id);
        previous = Some(id);
    }
    let mut arena = transformer.into_arena();

    let leaves: Vec<StageId> = top_level
        .iter()
        .flat_map(|id| arena.linear_tasks(*id))
        .collect();

    let mut pipeline_tasks = Vec::with_capacity(leaves.len());
    for leaf in &leaves {
        let pipeline_task = create_pipeline_task(&arena, *leaf, &options.pipeline_id);
        debug!(
            name = %pipeline_task.name,
            from = ?pipeline_task.workspace_from(),
            run_after = ?pipeline_task.run_after,
            "Wired pipeline task"
        );
        arena.get_mut(*leaf).pipeline_task = Some(pipeline_task.name.clone());
        pipeline_tasks.push(pipeline_task);
    }

    if let Some(last) = top_level.last() {
        for end in arena.end_stages(*last) {
            drop_workspace_output(&mut arena, end, &mut pipeline_tasks);
        }
    }

    let tasks = leaves
        .iter()
        .filter_map(|leaf| arena.task(*leaf).cloned())
        .collect::<Vec<_>>();

    let name = mangle_to_rfc1035_label(&options.pipeline_id, &options.build_id);
    let metadata = ObjectMeta {
        name,
        namespace: options.namespace.clone(),
        labels: options.labels.clone(),
    };

    let mut pipeline = Pipeline::new(metadata.clone());
    pipeline.spec.resources.push(PipelineDeclaredResource {
        name: options.pipeline_id.clone(),
        resource_type: ResourceType::Git,
    });
    pipeline.spec.tasks = pipeline_tasks;
    pipeline.spec.timeout_seconds = timeout_seconds;

    let mut structure = PipelineStructure::new(metadata);
    for id in &top_level {
        push_structure(&arena, *id, &mut structure.stages);
    }

    info!(
        pipeline = %pipeline.name(),
        tasks = tasks.len(),
        "Compiled pipeline"
    );
    Ok(CompiledPipeline {
        pipeline,
        tasks,
        structure,
    })
}

fn create_pipeline_task(arena: &StageArena, id: StageId, pipeline_id: &str) -> PipelineTask {
    let node = arena.get(id);
    let provider = arena.find_workspace_provider(id, arena.enclosing_at(id, 0));
    let run_after = arena
        .previous_non_block_stages(id)
        .into_iter()
        .filter_map(|previous| arena.get(previous).pipeline_task.clone())
        .collect();

    PipelineTask {
        name: node.task_name.clone(),
        task_ref: TaskRef {
            name: arena
                .task(id)
                .map(|task| task.name().to_string())
                .unwrap_or_default(),
        },
        resources: Some(PipelineTaskResources {
            inputs: vec![PipelineTaskInputResource {
                name: WORKSPACE_RESOURCE.to_string(),
                resource: pipeline_id.to_string(),
                from: provider.into_iter().collect(),
            }],
            outputs: vec![PipelineTaskOutputResource {
                name: WORKSPACE_RESOURCE.to_string(),
                resource: pipeline_id.to_string(),
            }],
        }),
        run_after,
    }
}

/// Terminal tasks have no consumer for their workspace.
fn drop_workspace_output(arena: &mut StageArena, id: StageId, pipeline_tasks: &mut [PipelineTask]) {
    if let Some(task) = arena.task_mut(id) {
        task.spec.outputs = None;
    }
    let Some(name) = arena.get(id).pipeline_task.as_deref() else {
        return;
    };
    if let Some(resources) = pipeline_tasks
        .iter_mut()
        .find(|t| t.name == name)
        .and_then(|t| t.resources.as_mut())
    {
        resources.outputs.clear();
    }
}

fn push_structure(arena: &StageArena, id: StageId, stages: &mut Vec<PipelineStructureStage>) {
    let node = arena.get(id);
    let names = |ids: &[StageId]| -> Vec<String> {
        ids.iter().map(|child| arena.get(*child).name.clone()).collect()
    };

    let mut entry = PipelineStructureStage {
        name: node.name.clone(),
        depth: node.depth,
        parent: node.enclosing.map(|e| arena.get(e).name.clone()),
        previous: node.previous_sibling.map(|p| arena.get(p).name.clone()),
        ..Default::default()
    };
    match &node.kind {
        StageKind::Task(task) => entry.task_ref = Some(task.name().to_string()),
        StageKind::Sequential(children) => entry.stages = names(children),
        StageKind::Parallel(children) => entry.parallel = names(children),
    }
    stages.push(entry);

    for child in arena.children(id) {
        push_structure(arena, *child, stages);
    }
}
