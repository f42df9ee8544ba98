//! Tools: the named, remotely invocable operations a server exposes.

pub mod interactive;
pub mod math;
pub mod notify;
pub mod text;
pub mod weather;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CallError;
use crate::prompt::{Prompt, PromptDefinition};
use crate::resource::Resource;
use crate::server::CallContext;

/// Describes a tool to callers: name, purpose, and argument schema.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool that can be executed by the server on behalf of a caller.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (unique within a registry)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON Schema for the arguments
    fn parameters_schema(&self) -> Value;

    /// Execute the tool. The context is the body's line back to the caller:
    /// progress/log emission and the elicit/sample suspension points.
    async fn execute(&self, args: Map<String, Value>, ctx: CallContext) -> Result<Value>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

/// Pull a required string argument out of a call's argument map.
pub fn require_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("argument '{}' must be a string", key))
}

/// Pull a required integer argument out of a call's argument map.
pub fn require_i64(args: &Map<String, Value>, key: &str) -> Result<i64> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow::anyhow!("argument '{}' must be an integer", key))
}

/// Registry of tools, resources, and prompts for one server endpoint.
///
/// Built up at startup, then shared immutably by the serving loop. Pure data
/// registration: the interesting machinery lives in the call path.
#[derive(Default)]
pub struct Registry {
    tools: HashMap<String, Arc<dyn Tool>>,
    resources: HashMap<String, Arc<dyn Resource>>,
    prompts: HashMap<String, Arc<dyn Prompt>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn register_resource(&mut self, resource: Arc<dyn Resource>) {
        self.resources.insert(resource.uri().to_string(), resource);
    }

    pub fn register_prompt(&mut self, prompt: Arc<dyn Prompt>) {
        self.prompts.insert(prompt.name().to_string(), prompt);
    }

    /// All tool definitions, sorted by name for deterministic listings.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|tool| tool.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Describe a single tool by name.
    pub fn describe(&self, name: &str) -> Option<ToolDefinition> {
        self.tools.get(name).map(|tool| tool.to_definition())
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered resource URIs, sorted.
    pub fn resource_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.resources.keys().cloned().collect();
        uris.sort();
        uris
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        let resource = self
            .resources
            .get(uri)
            .ok_or_else(|| anyhow::anyhow!("unknown resource: {}", uri))?;
        resource.read().await
    }

    /// All prompt definitions, sorted by name.
    pub fn prompt_definitions(&self) -> Vec<PromptDefinition> {
        let mut defs: Vec<PromptDefinition> =
            self.prompts.values().map(|prompt| prompt.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Render a prompt template with the given arguments.
    pub fn render_prompt(&self, name: &str, args: &Map<String, Value>) -> Result<String> {
        let prompt = self
            .prompts
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("unknown prompt: {}", name))?;
        prompt.render(args)
    }

    /// Execute a tool by name, mapping failures into the call taxonomy.
    pub(crate) async fn execute(
        &self,
        name: &str,
        args: Map<String, Value>,
        ctx: CallContext,
    ) -> Result<Value, CallError> {
        let Some(tool) = self.tools.get(name) else {
            return Err(CallError::ToolNotFound(name.to_string()));
        };
        validate_required(&tool.parameters_schema(), &args)?;

        match tool.execute(args, ctx).await {
            Ok(value) => Ok(value),
            Err(err) => match err.downcast::<CallError>() {
                Ok(call_err) => Err(call_err),
                Err(err) => Err(CallError::ToolExecution(format!("{:#}", err))),
            },
        }
    }
}

/// Reject calls missing arguments the schema marks required, before the tool
/// body runs.
fn validate_required(schema: &Value, args: &Map<String, Value>) -> Result<(), CallError> {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return Ok(());
    };
    for key in required.iter().filter_map(Value::as_str) {
        if !args.contains_key(key) {
            return Err(CallError::InvalidArguments(format!(
                "missing required argument '{}'",
                key
            )));
        }
    }
    Ok(())
}

/// The integration toolset: arithmetic, text, and the interactive tools,
/// plus the hello resource and the two demo prompts.
pub fn integration_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(Arc::new(math::AddTool));
    registry.register(Arc::new(math::MultiplyTool));
    registry.register(Arc::new(text::GreetTool));
    registry.register(Arc::new(text::EchoTool));
    registry.register(Arc::new(interactive::AskForNameTool));
    registry.register(Arc::new(interactive::ProgressTool));
    registry.register(Arc::new(interactive::SimpleSampleTool));
    registry.register_resource(Arc::new(crate::resource::HelloResource));
    registry.register_prompt(Arc::new(crate::prompt::GreetingPrompt));
    registry.register_prompt(Arc::new(crate::prompt::MathPrompt));
    registry
}

/// Toolset with just the canned weather lookup.
pub fn weather_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(Arc::new(weather::WeatherTool));
    registry
}

/// Toolset with just webhook notification delivery.
pub fn notify_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(Arc::new(notify::SlackNotifyTool::new()));
    registry
}
