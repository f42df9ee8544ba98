//! Prompts: named text templates rendered with caller-supplied arguments.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::tool::{require_i64, require_str};

/// One declared argument of a prompt template.
#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PromptArgument {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }
}

/// Describes a prompt to callers.
#[derive(Debug, Clone, Serialize)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
}

/// A named text template.
pub trait Prompt: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn arguments(&self) -> Vec<PromptArgument>;

    /// Render the template with the given arguments.
    fn render(&self, args: &Map<String, Value>) -> Result<String>;

    fn to_definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            arguments: self.arguments(),
        }
    }
}

pub struct GreetingPrompt;

impl Prompt for GreetingPrompt {
    fn name(&self) -> &str {
        "greeting_prompt"
    }

    fn description(&self) -> &str {
        "Generate a greeting prompt"
    }

    fn arguments(&self) -> Vec<PromptArgument> {
        vec![PromptArgument::required("name", "Name to greet")]
    }

    fn render(&self, args: &Map<String, Value>) -> Result<String> {
        let name = require_str(args, "name")?;
        Ok(format!("Please greet {} in a friendly way", name))
    }
}

pub struct MathPrompt;

impl Prompt for MathPrompt {
    fn name(&self) -> &str {
        "math_prompt"
    }

    fn description(&self) -> &str {
        "Generate a math operation prompt"
    }

    fn arguments(&self) -> Vec<PromptArgument> {
        vec![
            PromptArgument::required("operation", "Operation to perform (add/multiply)"),
            PromptArgument::required("x", "First number"),
            PromptArgument::required("y", "Second number"),
        ]
    }

    fn render(&self, args: &Map<String, Value>) -> Result<String> {
        let operation = require_str(args, "operation")?;
        let x = require_i64(args, "x")?;
        let y = require_i64(args, "y")?;
        Ok(format!("Please {} the numbers {} and {}", operation, x, y))
    }
}
