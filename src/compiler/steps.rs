//! Step and loop generation
//!
//! Turns a declared step into the ordered step containers of a task. Loops
//! expand outer-loop-major, and the step counter is threaded through every
//! expansion so unnamed steps are numbered across the whole task.

use super::mangle::mangle_to_rfc1035_label;
use super::options::WORKSPACE_ROOT;
use super::pod_template::{PodTemplate, PodTemplateLookup};
use crate::pipeline::{
    CompileError, Container, EnvVar, Step, StepKind, Volume, merge_containers, scoped_env,
};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Commands with this prefix run directly instead of through the shell
pub const DIRECT_EXEC_PREFIX: &str = "/kaniko";

/// Shell wrapping every other command
pub const SHELL: [&str; 2] = ["/bin/sh", "-c"];

/// What a step inherits from its stage
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Image used when the step does not pick one
    pub inherited_image: &'a str,
    /// Source checkout directory under `/workspace`
    pub source_dir: &'a str,
    /// Working directory inherited from the stage or pipeline
    pub base_dir: Option<&'a str>,
    /// Ambient environment
    pub env: &'a [EnvVar],
    /// Effective container overrides
    pub parent_container: &'a Container,
    /// Pod templates by image
    pub templates: &'a dyn PodTemplateLookup,
}

/// Output of [`generate_steps`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedSteps {
    /// Step containers in execution order
    pub containers: Vec<Container>,
    /// Volumes required by the containers, by name
    pub volumes: BTreeMap<String, Volume>,
    /// Step counter after generation
    pub counter: usize,
}

impl GeneratedSteps {
    fn extend(&mut self, other: GeneratedSteps) {
        self.containers.extend(other.containers);
        self.volumes.extend(other.volumes);
        self.counter = other.counter;
    }
}

/// Generates the containers for `step`, starting from `counter`.
///
/// # Errors
///
/// Returns [`CompileError::Unsupported`] for reusable-step references and
/// [`CompileError::Merge`] if a pod template cannot be merged with the
/// container overrides.
pub fn generate_steps(
    step: &Step,
    ctx: &StepContext<'_>,
    counter: usize,
) -> Result<GeneratedSteps, CompileError> {
    let image = step.requested_image().unwrap_or(ctx.inherited_image);

    match step.kind() {
        Some(StepKind::Command { command, args }) => {
            command_container(step, command, args, image, ctx, counter)
        }
        Some(StepKind::Loop(l)) => {
            let mut generated = GeneratedSteps {
                counter,
                ..Default::default()
            };
            for (i, value) in l.values.iter().enumerate() {
                let loop_env = scoped_env(&[EnvVar::new(&l.variable, value)], ctx.env);
                let loop_ctx = StepContext {
                    inherited_image: image,
                    env: &loop_env,
                    ..*ctx
                };
                for nested in &l.steps {
                    let mut nested = nested.clone();
                    if !nested.name.is_empty() {
                        nested.name = format!("{}{}", nested.name, i + 1);
                    }
                    let expanded = generate_steps(&nested, &loop_ctx, generated.counter)?;
                    generated.extend(expanded);
                }
            }
            Ok(generated)
        }
        Some(StepKind::Reference(_)) | None => Err(CompileError::unsupported(
            "syntactic sugar steps not yet supported",
        )),
    }
}

fn command_container(
    step: &Step,
    command: &str,
    args: &[String],
    image: &str,
    ctx: &StepContext<'_>,
    counter: usize,
) -> Result<GeneratedSteps, CompileError> {
    let mut volumes = BTreeMap::new();

    let template = ctx.templates.lookup(image);
    let mut container = match (template, template.and_then(PodTemplate::base_container)) {
        (Some(template), Some(base)) => {
            for volume in &template.volumes {
                volumes.insert(volume.name.clone(), volume.clone());
            }
            merge_containers(base, ctx.parent_container).map_err(|e| {
                CompileError::merge("pod template and parent container", e)
            })?
        }
        (template, _) => {
            if template.is_some() {
                warn!(image, "Pod template has no containers, using a plain shell container");
            }
            let mut c = ctx.parent_container.clone();
            c.image = image.to_string();
            c.command = SHELL.iter().map(ToString::to_string).collect();
            c
        }
    };

    if command.starts_with(DIRECT_EXEC_PREFIX) {
        container.command = vec![command.to_string()];
        container.args = args.to_vec();
    } else {
        container.args = vec![step.full_command()];
    }

    container.working_dir = working_dir(ctx.source_dir, step_dir(step, ctx.base_dir));

    let counter = counter + 1;
    container.name = if step.name.is_empty() {
        format!("step{}", counter + 1)
    } else {
        mangle_to_rfc1035_label(&step.name, "")
    };

    container.stdin = false;
    container.tty = false;
    container.env = scoped_env(&step.env, &scoped_env(ctx.env, &container.env));

    debug!(step = %container.name, image = %container.image, "Generated step");

    Ok(GeneratedSteps {
        containers: vec![container],
        volumes,
        counter,
    })
}

fn step_dir<'a>(step: &'a Step, base_dir: Option<&'a str>) -> Option<&'a str> {
    if step.dir.is_empty() {
        base_dir
    } else {
        Some(&step.dir)
    }
}

/// Resolves a step's working directory.
///
/// Absolute directories are used as given; relative ones are joined under
/// `/workspace/<source_dir>`, which is also the default.
#[must_use]
pub fn working_dir(source_dir: &str, dir: Option<&str>) -> String {
    let mut path = PathBuf::from(WORKSPACE_ROOT);
    let dir = match dir {
        Some(dir) if Path::new(dir).is_absolute() => {
            path = PathBuf::from("/");
            dir
        }
        Some(dir) => {
            push_clean(&mut path, source_dir);
            dir
        }
        None => source_dir,
    };
    push_clean(&mut path, dir);
    path.to_string_lossy().into_owned()
}

fn push_clean(path: &mut PathBuf, relative: &str) {
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::ParentDir => {
                path.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::pod_template::NoPodTemplates;
    use std::cell::Cell;
    use crate::pipeline::{Loop, VolumeMount};
    use pretty_assertions::assert_eq;

    fn ctx<'a>(env: &'a [EnvVar], parent: &'a Container) -> StepContext<'a> {
        StepContext {
            inherited_image: "some-image",
            source_dir: "source",
            base_dir: None,
            env,
            parent_container: parent,
            templates: &NoPodTemplates,
        }
    }

    #[test]
    fn test_command_step_uses_shell() {
        let parent = Container::default();
        let step = Step::command("echo").with_arg("hello").with_arg("world");

        let generated = generate_steps(&step, &ctx(&[], &parent), 0).unwrap();

        assert_eq!(generated.counter, 1);
        let c = &generated.containers[0];
        assert_eq!(c.name, "step2");
        assert_eq!(c.image, "some-image");
        assert_eq!(c.command, vec!["/bin/sh", "-c"]);
        assert_eq!(c.args, vec!["echo hello world"]);
        assert_eq!(c.working_dir, "/workspace/source");
        assert!(!c.stdin && !c.tty);
    }

    #[test]
    fn test_named_step_is_mangled() {
        let parent = Container::default();
        let step = Step::command("ls").with_name("A Step With Spaces And Such");
        let generated = generate_steps(&step, &ctx(&[], &parent), 3).unwrap();
        assert_eq!(generated.containers[0].name, "a-step-with-spaces-and-such");
        assert_eq!(generated.counter, 4);
    }

    #[test]
    fn test_kaniko_runs_directly() {
        let parent = Container::default();
        let step = Step::command("/kaniko/executor")
            .with_arg("--dockerfile=Dockerfile")
            .with_arg("--destination=repo/image");
        let c = &generate_steps(&step, &ctx(&[], &parent), 0)
            .unwrap()
            .containers[0];
        assert_eq!(c.command, vec!["/kaniko/executor"]);
        assert_eq!(
            c.args,
            vec!["--dockerfile=Dockerfile", "--destination=repo/image"]
        );
    }

    #[test]
    fn test_image_precedence() {
        let parent = Container::default();
        let mut step = Step::command("ls");
        step.agent = Some(crate::pipeline::Agent::image("agent-image"));
        let c = generate_steps(&step, &ctx(&[], &parent), 0).unwrap();
        assert_eq!(c.containers[0].image, "agent-image");

        let step = step.with_image("step-image");
        let c = generate_steps(&step, &ctx(&[], &parent), 0).unwrap();
        assert_eq!(c.containers[0].image, "step-image");
    }

    #[test]
    fn test_loop_binds_variable_and_threads_counter() {
        let parent = Container::default();
        let env = vec![EnvVar::new("OTHER", "x")];
        let step = Step::looped(Loop::new(
            "LOOP_VAR",
            vec!["a".into(), "b".into()],
            vec![Step::command("echo $LOOP_VAR")],
        ));

        let generated = generate_steps(&step, &ctx(&env, &parent), 0).unwrap();

        assert_eq!(generated.counter, 2);
        let names: Vec<_> = generated.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["step2", "step3"]);
        assert_eq!(
            generated.containers[0].env,
            vec![EnvVar::new("LOOP_VAR", "a"), EnvVar::new("OTHER", "x")]
        );
        assert_eq!(
            generated.containers[1].env,
            vec![EnvVar::new("LOOP_VAR", "b"), EnvVar::new("OTHER", "x")]
        );
    }

    #[test]
    fn test_nested_loops_expand_outer_major() {
        let parent = Container::default();
        let inner = Step::looped(Loop::new(
            "INNER",
            vec!["1".into(), "2".into()],
            vec![Step::command("echo").with_name("echo-step")],
        ));
        let outer = Step::looped(Loop::new(
            "OUTER",
            vec!["x".into(), "y".into(), "z".into()],
            vec![inner],
        ));

        let generated = generate_steps(&outer, &ctx(&[], &parent), 0).unwrap();

        assert_eq!(generated.containers.len(), 6);
        assert_eq!(generated.counter, 6);
        let pairs: Vec<(String, String)> = generated
            .containers
            .iter()
            .map(|c| {
                let get = |n: &str| {
                    c.env
                        .iter()
                        .find(|e| e.name == n)
                        .map(|e| e.value.clone())
                        .unwrap_or_default()
                };
                (get("OUTER"), get("INNER"))
            })
            .collect();
        assert_eq!(pairs[0], ("x".to_string(), "1".to_string()));
        assert_eq!(pairs[1], ("x".to_string(), "2".to_string()));
        assert_eq!(pairs[5], ("z".to_string(), "2".to_string()));
        assert_eq!(generated.containers[0].name, "echo-step1");
        assert_eq!(generated.containers[1].name, "echo-step2");
    }

    #[test]
    fn test_step_env_overrides_ambient() {
        let parent = Container {
            env: vec![EnvVar::new("FROM_OPTIONS", "1"), EnvVar::new("SHARED", "options")],
            ..Default::default()
        };
        let env = vec![EnvVar::new("SHARED", "stage")];
        let step = Step::command("ls").with_env("STEP_ONLY", "yes");

        let c = &generate_steps(&step, &ctx(&env, &parent), 0)
            .unwrap()
            .containers[0];
        assert_eq!(
            c.env,
            vec![
                EnvVar::new("FROM_OPTIONS", "1"),
                EnvVar::new("SHARED", "stage"),
                EnvVar::new("STEP_ONLY", "yes"),
            ]
        );
    }

    #[test]
    fn test_pod_template_is_the_base_container() {
        let mut templates = BTreeMap::new();
        templates.insert(
            "maven".to_string(),
            PodTemplate::new(Container {
                name: "maven".into(),
                image: "maven:3.6-jdk-8".into(),
                command: vec!["/bin/bash".into(), "-c".into()],
                env: vec![EnvVar::new("MAVEN_OPTS", "-Xmx1g")],
                volume_mounts: vec![VolumeMount {
                    name: "settings".into(),
                    mount_path: "/root/.m2".into(),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .with_volume(Volume {
                name: "settings".into(),
                ..Default::default()
            }),
        );
        let parent = Container::default();
        let context = StepContext {
            inherited_image: "maven",
            templates: &templates,
            ..ctx(&[], &parent)
        };

        let generated = generate_steps(&Step::command("mvn install"), &context, 0).unwrap();

        let c = &generated.containers[0];
        assert_eq!(c.image, "maven:3.6-jdk-8");
        assert_eq!(c.command, vec!["/bin/bash", "-c"]);
        assert_eq!(c.args, vec!["mvn install"]);
        assert_eq!(c.name, "step2");
        assert_eq!(c.env, vec![EnvVar::new("MAVEN_OPTS", "-Xmx1g")]);
        assert!(generated.volumes.contains_key("settings"));
    }

    struct CountingTemplates {
        templates: BTreeMap<String, PodTemplate>,
        lookups: Cell<usize>,
    }

    impl PodTemplateLookup for CountingTemplates {
        fn lookup(&self, image: &str) -> Option<&PodTemplate> {
            self.lookups.set(self.lookups.get() + 1);
            self.templates.lookup(image)
        }
    }

    #[test]
    fn test_empty_pod_template_falls_back_to_shell() {
        let mut templates = BTreeMap::new();
        templates.insert("maven".to_string(), PodTemplate::default());
        let templates = CountingTemplates {
            templates,
            lookups: Cell::new(0),
        };
        let parent = Container::default();
        let context = StepContext {
            inherited_image: "maven",
            templates: &templates,
            ..ctx(&[], &parent)
        };

        let generated = generate_steps(&Step::command("mvn install"), &context, 0).unwrap();

        let c = &generated.containers[0];
        assert_eq!(c.image, "maven");
        assert_eq!(c.command, vec!["/bin/sh", "-c"]);
        assert!(generated.volumes.is_empty());
        assert_eq!(templates.lookups.get(), 1);
    }

    #[test]
    fn test_step_reference_is_unsupported() {
        let parent = Container::default();
        let err = generate_steps(&Step::reference("some-step"), &ctx(&[], &parent), 0)
            .unwrap_err();
        assert_eq!(err.to_string(), "syntactic sugar steps not yet supported");
    }

    #[test]
    fn test_working_dir() {
        assert_eq!(working_dir("source", None), "/workspace/source");
        assert_eq!(working_dir("source", Some("./sub")), "/workspace/source/sub");
        assert_eq!(working_dir("source", Some("a/../b")), "/workspace/source/b");
        assert_eq!(working_dir("source", Some("/tmp/build")), "/tmp/build");
    }
}
