//! Template registry and composition resolver
//!
//! The registry borrows the templates it indexes and looks them up by id or by
//! name. An exact id match always wins over a name match, and a name resolves
//! to the highest version carrying it.
//!
//! Resolution walks the reference graph depth-first with an explicit stack.
//! The ids on the stack are the current ancestry; reaching one of them again is
//! a cycle. Finished nodes are memoised, so diamond-shaped graphs are fine.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::entity::PromptTemplate;
use super::template;
use super::validation::TemplateError;
use super::variable::VariableDefinition;

/// Two-key index over a set of templates
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry<'a> {
    by_id: HashMap<&'a str, &'a PromptTemplate>,
    by_name: HashMap<&'a str, &'a PromptTemplate>,
}

struct Frame<'a> {
    template: &'a PromptTemplate,
    children: Vec<&'a PromptTemplate>,
    next: usize,
}

impl<'a> TemplateRegistry<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry over the given templates
    pub fn from_templates(templates: impl IntoIterator<Item = &'a PromptTemplate>) -> Self {
        let mut registry = Self::new();

        for template in templates {
            registry.insert(template);
        }

        registry
    }

    /// Index a template by id and by name (latest version wins the name)
    pub fn insert(&mut self, template: &'a PromptTemplate) {
        self.by_id.insert(template.id().as_str(), template);

        let newer = self
            .by_name
            .get(template.name())
            .is_none_or(|existing| existing.version() < template.version());

        if newer {
            self.by_name.insert(template.name(), template);
        }
    }

    /// Find a template by exact id, falling back to name
    pub fn lookup(&self, reference: &str) -> Option<&'a PromptTemplate> {
        self.by_id
            .get(reference)
            .or_else(|| self.by_name.get(reference))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Inline all `{{> ref}}` directives of `root`, recursively
    pub fn resolve_content(&self, root: &'a PromptTemplate) -> Result<String, TemplateError> {
        self.fold(
            root,
            |t| t.includes(),
            |t, done: &HashMap<&'a str, String>| {
                Ok(template::substitute_includes(t.content(), |reference| {
                    self.lookup(reference)
                        .and_then(|parent| done.get(parent.id().as_str()))
                        .map(String::as_str)
                }))
            },
        )
    }

    /// Merge the variables of `extends` parents and included templates into `root`'s
    ///
    /// Parent variables come first in first-seen order; a name already defined
    /// closer to the child is never duplicated, and the child's own definitions
    /// always take precedence.
    pub fn resolve_variables(
        &self,
        root: &'a PromptTemplate,
    ) -> Result<Vec<VariableDefinition>, TemplateError> {
        self.fold(root, variable_sources, |t, done: &HashMap<&'a str, Vec<VariableDefinition>>| {
            let own: HashSet<&str> = t.variables().iter().map(|v| v.name()).collect();
            let mut seen_parents = HashSet::new();
            let mut merged: Vec<VariableDefinition> = Vec::new();

            for reference in variable_sources(t) {
                let Some(parent) = self.lookup(&reference) else {
                    continue;
                };

                if !seen_parents.insert(parent.id().as_str()) {
                    continue;
                }

                let Some(inherited) = done.get(parent.id().as_str()) else {
                    continue;
                };

                for var in inherited {
                    let duplicate = own.contains(var.name())
                        || merged.iter().any(|m: &VariableDefinition| m.name() == var.name());

                    if !duplicate {
                        merged.push(var.clone());
                    }
                }
            }

            merged.extend(t.variables().iter().cloned());
            Ok(merged)
        })
    }

    /// Post-order fold over the reference graph reachable from `root`
    fn fold<T>(
        &self,
        root: &'a PromptTemplate,
        edges: impl Fn(&PromptTemplate) -> Vec<String>,
        mut combine: impl FnMut(&'a PromptTemplate, &HashMap<&'a str, T>) -> Result<T, TemplateError>,
    ) -> Result<T, TemplateError> {
        let mut done: HashMap<&'a str, T> = HashMap::new();
        let mut ancestry: HashSet<&'a str> = HashSet::new();
        let mut stack: Vec<Frame<'a>> = Vec::new();

        ancestry.insert(root.id().as_str());
        stack.push(self.frame(root, &edges)?);

        while let Some(frame) = stack.last_mut() {
            if let Some(&child) = frame.children.get(frame.next) {
                frame.next += 1;

                if done.contains_key(child.id().as_str()) {
                    continue;
                }

                if ancestry.contains(child.id().as_str()) {
                    let mut chain: Vec<String> =
                        stack.iter().map(|f| f.template.name().to_string()).collect();
                    chain.push(child.name().to_string());
                    debug!(?chain, "Circular template reference");
                    return Err(TemplateError::CircularReference { chain });
                }

                ancestry.insert(child.id().as_str());
                let next = self.frame(child, &edges)?;
                stack.push(next);
            } else {
                let Some(finished) = stack.pop() else {
                    break;
                };

                let value = combine(finished.template, &done)?;
                ancestry.remove(finished.template.id().as_str());
                done.insert(finished.template.id().as_str(), value);
            }
        }

        debug!(template = root.name(), visited = done.len(), "Template references resolved");

        done.remove(root.id().as_str())
            .ok_or_else(|| TemplateError::validation("Template resolution produced no result"))
    }

    /// Resolve the outgoing references of a template, deduplicated by target id
    fn frame(
        &self,
        template: &'a PromptTemplate,
        edges: &impl Fn(&PromptTemplate) -> Vec<String>,
    ) -> Result<Frame<'a>, TemplateError> {
        let mut children: Vec<&'a PromptTemplate> = Vec::new();

        for reference in edges(template) {
            let target =
                self.lookup(&reference)
                    .ok_or_else(|| TemplateError::UnresolvedReference {
                        template: template.name().to_string(),
                        reference: reference.clone(),
                    })?;

            if !children.iter().any(|c| c.id() == target.id()) {
                children.push(target);
            }
        }

        Ok(Frame {
            template,
            children,
            next: 0,
        })
    }
}

/// `extends` references followed by include directives, in declaration order
fn variable_sources(template: &PromptTemplate) -> Vec<String> {
    let mut sources: Vec<String> = template.extends().to_vec();
    sources.extend(template.includes());
    sources
}
