//! Resources: named readable values addressed by URI.

use anyhow::Result;
use async_trait::async_trait;

/// A named readable value a server exposes alongside its tools.
#[async_trait]
pub trait Resource: Send + Sync {
    /// URI the resource is addressed by (e.g. `message://hello`)
    fn uri(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Produce the current value.
    async fn read(&self) -> Result<String>;
}

/// The demo resource.
pub struct HelloResource;

#[async_trait]
impl Resource for HelloResource {
    fn uri(&self) -> &str {
        "message://hello"
    }

    fn description(&self) -> &str {
        "A simple hello message resource"
    }

    async fn read(&self) -> Result<String> {
        Ok("Hello from the resource!".to_string())
    }
}
