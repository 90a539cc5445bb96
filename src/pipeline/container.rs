//! Container configuration and environment scoping
//!
//! Containers appear in two places: as `containerOptions` overrides written
//! by pipeline authors, and as the generated step containers. Overrides are
//! chained pipeline → stage → step and pod template → override with
//! [`merge_containers`], which applies one fixed rule per field:
//!
//! | field | rule |
//! |---|---|
//! | `name`, `image`, `workingDir`, `imagePullPolicy` | child wins when set |
//! | `command`, `args` | child replaces when non-empty |
//! | `env` | union keyed by `name`, child wins |
//! | `ports` | union keyed by `containerPort`, child wins |
//! | `volumeMounts` | union keyed by `mountPath`, child wins |
//! | `resources.limits`, `resources.requests` | map union, child wins |
//! | `securityContext` | field by field, child wins when set |
//! | `stdin`, `tty` | set if either side sets it |

use super::errors::MergeError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Reference to a key inside a secret or config map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeySelector {
    /// Name of the secret or config map.
    pub name: String,
    /// Key within it.
    pub key: String,
    /// Whether the reference may be absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

/// Reference to a field of the running pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldSelector {
    /// Path of the field, e.g. `metadata.name`.
    pub field_path: String,
}

/// Source for an environment variable's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvVarSource {
    /// Selects a key of a secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<KeySelector>,
    /// Selects a key of a config map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<KeySelector>,
    /// Selects a field of the pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_ref: Option<FieldSelector>,
}

/// An environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Literal value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Value taken from elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    /// Creates a variable with a literal value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            value_from: None,
        }
    }
}

/// A port exposed by a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerPort {
    /// Optional port name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Port number inside the container.
    pub container_port: u16,
    /// Protocol, defaults to TCP on the runner side.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
}

/// A volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolumeMount {
    /// Name of the volume.
    pub name: String,
    /// Where it is mounted.
    pub mount_path: String,
    /// Whether it is mounted read-only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    /// Sub path within the volume.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_path: String,
}

/// CPU and memory requests and limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceRequirements {
    /// Upper bounds, e.g. `cpu: "2"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    /// Guaranteed amounts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

impl ResourceRequirements {
    fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// Security settings for a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityContext {
    /// Run privileged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    /// UID to run as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    /// Require a non-root user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
}

/// A container specification, used both for overrides and generated steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Container {
    /// Container name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Image reference.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    /// Entrypoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Entrypoint arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Exposed ports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    /// Mounted volumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    /// Resource requests and limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Pull policy.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_pull_policy: String,
    /// Security settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    /// Keep stdin open.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stdin: bool,
    /// Allocate a TTY.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tty: bool,
}

impl Container {
    /// Returns true if nothing is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A pod volume. Only the name is interpreted; the source is passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Volume {
    /// Volume name, used to deduplicate volumes within a task.
    pub name: String,
    /// Volume source, e.g. `secret`, `hostPath` or `emptyDir`.
    #[serde(flatten)]
    pub source: BTreeMap<String, serde_yaml::Value>,
}

/// Overlays `own` on top of `parent`, keyed by variable name.
///
/// The result is sorted by name so that generated output is stable.
#[must_use]
pub fn scoped_env(own: &[EnvVar], parent: &[EnvVar]) -> Vec<EnvVar> {
    let mut env: BTreeMap<&str, &EnvVar> = BTreeMap::new();
    for var in parent.iter().chain(own) {
        env.insert(var.name.as_str(), var);
    }
    env.into_values().cloned().collect()
}

/// Merges two optional containers, with `child` overriding `parent`.
///
/// A missing side yields the other side unchanged.
///
/// # Errors
///
/// Returns [`MergeError`] if a keyed list entry lacks its key or repeats one.
pub fn merge_optional(
    parent: Option<&Container>,
    child: Option<&Container>,
) -> Result<Option<Container>, MergeError> {
    match (parent, child) {
        (None, None) => Ok(None),
        (Some(p), None) => Ok(Some(p.clone())),
        (None, Some(c)) => Ok(Some(c.clone())),
        (Some(p), Some(c)) => merge_containers(p, c).map(Some),
    }
}

/// Merges `child` onto `parent` using the rule table in the module docs.
///
/// # Errors
///
/// Returns [`MergeError`] if a keyed list entry lacks its key or repeats one.
pub fn merge_containers(parent: &Container, child: &Container) -> Result<Container, MergeError> {
    let resources = match (&parent.resources, &child.resources) {
        (None, None) => None,
        (p, c) => {
            let mut merged = p.clone().unwrap_or_default();
            if let Some(c) = c {
                merged.limits.extend(c.limits.clone());
                merged.requests.extend(c.requests.clone());
            }
            (!merged.is_empty()).then_some(merged)
        }
    };

    let security_context = match (&parent.security_context, &child.security_context) {
        (None, None) => None,
        (p, c) => {
            let p = p.clone().unwrap_or_default();
            let c = c.clone().unwrap_or_default();
            Some(SecurityContext {
                privileged: c.privileged.or(p.privileged),
                run_as_user: c.run_as_user.or(p.run_as_user),
                run_as_non_root: c.run_as_non_root.or(p.run_as_non_root),
            })
        }
    };

    Ok(Container {
        name: pick_scalar(&parent.name, &child.name),
        image: pick_scalar(&parent.image, &child.image),
        command: pick_list(&parent.command, &child.command),
        args: pick_list(&parent.args, &child.args),
        working_dir: pick_scalar(&parent.working_dir, &child.working_dir),
        env: merge_keyed("env", "name", &parent.env, &child.env, |e| {
            (!e.name.is_empty()).then(|| e.name.clone())
        })?,
        ports: merge_keyed(
            "ports",
            "containerPort",
            &parent.ports,
            &child.ports,
            |p| (p.container_port != 0).then(|| p.container_port.to_string()),
        )?,
        volume_mounts: merge_keyed(
            "volumeMounts",
            "mountPath",
            &parent.volume_mounts,
            &child.volume_mounts,
            |m| (!m.mount_path.is_empty()).then(|| m.mount_path.clone()),
        )?,
        resources,
        image_pull_policy: pick_scalar(&parent.image_pull_policy, &child.image_pull_policy),
        security_context,
        stdin: parent.stdin || child.stdin,
        tty: parent.tty || child.tty,
    })
}

fn pick_scalar(parent: &str, child: &str) -> String {
    if child.is_empty() { parent } else { child }.to_string()
}

fn pick_list(parent: &[String], child: &[String]) -> Vec<String> {
    if child.is_empty() { parent } else { child }.to_vec()
}

/// Keyed union: parent entries keep their position (replaced in place when the
/// child has the same key), new child entries are appended in child order.
fn merge_keyed<T, F>(
    list: &'static str,
    key: &'static str,
    parent: &[T],
    child: &[T],
    key_of: F,
) -> Result<Vec<T>, MergeError>
where
    T: Clone,
    F: Fn(&T) -> Option<String>,
{
    let keyed = |items: &[T]| -> Result<Vec<(String, T)>, MergeError> {
        let mut seen = HashSet::new();
        items
            .iter()
            .map(|item| {
                let k = key_of(item).ok_or(MergeError::MissingMergeKey { list, key })?;
                if !seen.insert(k.clone()) {
                    return Err(MergeError::DuplicateMergeKey { list, value: k });
                }
                Ok((k, item.clone()))
            })
            .collect()
    };

    let mut merged = keyed(parent)?;
    for (k, item) in keyed(child)? {
        match merged.iter_mut().find(|(existing, _)| *existing == k) {
            Some(slot) => slot.1 = item,
            None => merged.push((k, item)),
        }
    }

    Ok(merged.into_iter().map(|(_, item)| item).collect())
}
