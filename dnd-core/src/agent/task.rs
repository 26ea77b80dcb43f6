//! Named prompt templates.
//!
//! A [`Task`] binds a prompt template to a description of what the agent
//! should return. Templates use `{name}` placeholders; every placeholder must
//! be supplied before anything is sent.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use thiserror::Error;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("invalid placeholder regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task '{task}' is missing required input '{input}'")]
    MissingInput { task: String, input: String },
}

/// A unit of work for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    pub name: &'static str,
    pub description: &'static str,
    pub template: &'static str,
    pub expected_output: &'static str,
}

impl Task {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        template: &'static str,
        expected_output: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            template,
            expected_output,
        }
    }

    /// Placeholder names used by the description and template, in order of
    /// first appearance.
    pub fn required_inputs(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for text in [self.description, self.template] {
            for caps in PLACEHOLDER.captures_iter(text) {
                if let Some(name) = caps.get(1).map(|m| m.as_str()) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    /// Fill the placeholders and assemble the full prompt.
    pub fn render(&self, inputs: &TaskInputs) -> Result<String, TaskError> {
        Ok(format!(
            "{}\n\n{}\n\nExpected output: {}",
            fill(self.name, self.description, inputs)?,
            fill(self.name, self.template, inputs)?.trim(),
            self.expected_output
        ))
    }
}

/// Substitute every `{name}` placeholder in `template`.
///
/// Substituted values are not scanned again.
pub fn fill(task: &str, template: &str, inputs: &TaskInputs) -> Result<String, TaskError> {
    if let Some(missing) = PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|name| !inputs.contains(name))
    {
        return Err(TaskError::MissingInput {
            task: task.to_string(),
            input: missing.to_string(),
        });
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            inputs.get(&caps[1]).unwrap_or_default().to_string()
        })
        .into_owned())
}

/// Values for a task's placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInputs {
    values: BTreeMap<String, String>,
}

impl TaskInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}
