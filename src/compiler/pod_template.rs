//! Pod template lookup
//!
//! A pod template supplies the base container (and any volumes it needs)
//! for steps running in a given image.

use crate::pipeline::{Container, Volume};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Base pod definition for an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PodTemplate {
    /// Containers; only the first is used as the step base
    #[serde(default)]
    pub containers: Vec<Container>,

    /// Volumes required by the containers
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

impl PodTemplate {
    /// Creates a template with a single container
    #[must_use]
    pub fn new(container: Container) -> Self {
        Self {
            containers: vec![container],
            volumes: Vec::new(),
        }
    }

    /// Adds a volume
    #[must_use]
    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.volumes.push(volume);
        self
    }

    /// The container steps are based on
    #[must_use]
    pub fn base_container(&self) -> Option<&Container> {
        self.containers.first()
    }
}

/// Finds the pod template registered for an image
pub trait PodTemplateLookup {
    /// Returns the template for `image`, if one is registered
    fn lookup(&self, image: &str) -> Option<&PodTemplate>;
}

impl PodTemplateLookup for HashMap<String, PodTemplate> {
    fn lookup(&self, image: &str) -> Option<&PodTemplate> {
        self.get(image)
    }
}

impl PodTemplateLookup for BTreeMap<String, PodTemplate> {
    fn lookup(&self, image: &str) -> Option<&PodTemplate> {
        self.get(image)
    }
}

/// Lookup with no templates registered
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPodTemplates;

impl PodTemplateLookup for NoPodTemplates {
    fn lookup(&self, _image: &str) -> Option<&PodTemplate> {
        None
    }
}
