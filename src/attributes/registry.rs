use std::collections::HashMap;
use thiserror::Error;

use super::{Attribute, License, Loc, Stars};
use crate::config::AttributeSpec;

/// Builds a fresh attribute instance
pub type AttributeFactory = Box<dyn Fn() -> Box<dyn Attribute>>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no implementation registered for the {name} attribute")]
pub struct UnknownAttribute {
    pub name: String,
}

/// A declared attribute with its implementation attached, if it resolved.
///
/// Disabled attributes and attributes whose name is not registered carry no
/// implementation and are never invoked.
pub struct ResolvedAttribute<'a> {
    pub spec: &'a AttributeSpec,
    implementation: Option<Box<dyn Attribute>>,
}

impl<'a> ResolvedAttribute<'a> {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_resolved(&self) -> bool {
        self.implementation.is_some()
    }

    pub fn implementation(&self) -> Option<&dyn Attribute> {
        self.implementation.as_deref()
    }
}

impl std::fmt::Debug for ResolvedAttribute<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAttribute")
            .field("spec", self.spec)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Maps attribute names to factories
#[derive(Default)]
pub struct AttributeRegistry {
    factories: HashMap<String, AttributeFactory>,
}

impl AttributeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every attribute that ships with this crate
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Loc::NAME, || Box::new(Loc));
        registry.register(License::NAME, || Box::new(License));
        registry.register(Stars::NAME, || Box::new(Stars));
        registry
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Attribute> + 'static,
    {
        let name = name.into();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            tracing::debug!(attribute = %name, "Replaced attribute factory");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the implementation registered under `name`
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Attribute>, UnknownAttribute> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| UnknownAttribute {
                name: name.to_string(),
            })
    }

    /// Attach implementations to the enabled specs, in declaration order.
    ///
    /// A spec that fails to resolve is reported and left without an
    /// implementation; it does not stop resolution of the others.
    pub fn resolve<'a>(&self, specs: &'a [AttributeSpec]) -> Vec<ResolvedAttribute<'a>> {
        specs
            .iter()
            .map(|spec| {
                let implementation = if !spec.enabled {
                    tracing::debug!(attribute = %spec.name, "Attribute disabled, not loading");
                    None
                } else {
                    match self.instantiate(&spec.name) {
                        Ok(attribute) => Some(attribute),
                        Err(e) => {
                            tracing::warn!("Failed to load the {} attribute: {}", spec.name, e);
                            None
                        }
                    }
                };
                ResolvedAttribute {
                    spec,
                    implementation,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for AttributeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeRegistry")
            .field("attributes", &self.names())
            .finish()
    }
}
