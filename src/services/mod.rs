//! Built-in services that ship with the engine binary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use crate::registry::{
    ActionDefinition, ReactionContext, ReactionDefinition, ReactionExecutor, ReactionOutcome,
    RegistryError, ServiceDescriptor, ServiceRegistry,
};

/// Registry holding every built-in service.
pub fn builtin_registry() -> Result<ServiceRegistry, RegistryError> {
    let mut registry = ServiceRegistry::new();
    registry.register(echo_service())?;
    Ok(registry)
}

/// Diagnostic service: `echo.received` events trigger `echo.log`, which writes the
/// interpolated config to the log and returns it as output.
pub fn echo_service() -> ServiceDescriptor {
    ServiceDescriptor::new("echo")
        .action(
            ActionDefinition::new("echo.received", "Echo received")
                .description("Any event injected for smoke-testing a deployment"),
        )
        .reaction(
            ReactionDefinition::new("echo.log", "Log message")
                .description("Writes the reaction config to the engine log"),
        )
        .executor(Arc::new(EchoExecutor))
}

struct EchoExecutor;

#[async_trait]
impl ReactionExecutor for EchoExecutor {
    async fn execute(&self, ctx: &ReactionContext) -> anyhow::Result<ReactionOutcome> {
        let message = ctx
            .reaction
            .config
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        info!(
            event_id = %ctx.event.id,
            mapping = %ctx.mapping.name,
            message,
            "echo reaction",
        );

        Ok(ReactionOutcome::succeeded(json!({
            "reaction_type": ctx.reaction.kind,
            "config": ctx.reaction.config,
        })))
    }
}
