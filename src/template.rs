//! Template interpolation for sink paths and table names
//!
//! Handles `{{ variable }}` interpolation. Known variables:
//! - `{{ collection }}` - the collection being written
//! - `{{ run_id }}` - the current run id
//! - `{{ env.NAME }}` - an environment variable
//! - any extra variable set with [`TemplateContext::set_var`]

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}").unwrap()
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for one collection of one run
    pub fn for_collection(collection: &str, run_id: &str) -> Self {
        let mut ctx = Self::new();
        ctx.set_var("collection", collection);
        ctx.set_var("run_id", run_id);
        ctx
    }

    /// Set a variable
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Look up a variable; `env.NAME` reads the environment
    pub fn get(&self, path: &str) -> Option<String> {
        if let Some(name) = path.strip_prefix("env.") {
            return std::env::var(name).ok();
        }
        self.vars.get(path).cloned()
    }
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut errors = Vec::new();
    let rendered = TEMPLATE_REGEX.replace_all(template, |cap: &regex::Captures<'_>| {
        let var_path = &cap[1];
        ctx.get(var_path).unwrap_or_else(|| {
            errors.push(var_path.to_string());
            String::new()
        })
    });

    if errors.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(errors.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Extract all variable names from a template
pub fn extract_variables(template: &str) -> Vec<String> {
    TEMPLATE_REGEX
        .captures_iter(template)
        .map(|cap| cap[1].to_string())
        .collect()
}
