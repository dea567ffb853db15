//! Deployment targets
//!
//! A target is one deployable service: the action to run on redeploy and the
//! pattern every requested image must satisfy. Patterns are compiled when the
//! target is built, so an invalid pattern fails at load time and never during
//! a request.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

/// Image validation failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// No target with this identifier
    #[error("Target {0} not found")]
    NotFound(String),

    /// The image does not satisfy the target's pattern
    #[error("Image {image} is not allowed for target {target}")]
    Forbidden { target: String, image: String },
}

/// A deployable service
#[derive(Debug, Clone)]
pub struct Target {
    /// Unique identifier, also the container name
    pub id: String,

    /// Executable or interpreter to run (e.g. `/bin/sh`)
    pub binary: String,

    /// Script passed as the first argument to `binary`
    pub script: String,

    pattern: Regex,
}

impl Target {
    /// Creates a target, compiling its image acceptance pattern
    pub fn new(
        id: impl Into<String>,
        binary: impl Into<String>,
        script: impl Into<String>,
        must_match: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            id: id.into(),
            binary: binary.into(),
            script: script.into(),
            pattern: Regex::new(must_match)?,
        })
    }

    /// The image acceptance pattern as written in configuration
    pub fn must_match(&self) -> &str {
        self.pattern.as_str()
    }

    /// Whether `image` satisfies this target's pattern
    ///
    /// The pattern is searched anywhere in the image reference; authors anchor
    /// it with `^`/`$` when they need a full match.
    pub fn accepts(&self, image: &str) -> bool {
        self.pattern.is_match(image)
    }
}

/// The configured set of targets, keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    targets: HashMap<String, Target>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target, returning the previous one with the same identifier
    pub fn insert(&mut self, target: Target) -> Option<Target> {
        self.targets.insert(target.id.clone(), target)
    }

    pub fn get(&self, id: &str) -> Option<&Target> {
        self.targets.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Looks up `target_id` and checks `image` against its pattern
    ///
    /// This is the authorization boundary between an authenticated caller and
    /// a destructive redeploy; nothing may touch containers before it passes.
    pub fn validate(&self, target_id: &str, image: &str) -> Result<&Target, MatchError> {
        let target = self
            .get(target_id)
            .ok_or_else(|| MatchError::NotFound(target_id.to_string()))?;

        if !target.accepts(image) {
            warn!(
                target = %target.id,
                image = %image,
                pattern = %target.must_match(),
                "Image did not match target"
            );
            return Err(MatchError::Forbidden {
                target: target.id.clone(),
                image: image.to_string(),
            });
        }

        Ok(target)
    }
}

impl FromIterator<Target> for TargetSet {
    fn from_iter<I: IntoIterator<Item = Target>>(iter: I) -> Self {
        let mut set = Self::new();
        for target in iter {
            set.insert(target);
        }
        set
    }
}
