//! Static registry of the third-party services the engine can act on.
//!
//! Populated once at startup. Lookups go through the service prefix of a dotted type
//! (`slack.post` belongs to `slack`), so every definition id must carry its service's prefix.

mod capability;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub use capability::{
    ActionDefinition, CredentialProvider, EventContext, MappingContext, ReactionContext,
    ReactionDefinition, ReactionExecutor, ReactionOutcome, SharedEventFilter,
};

use crate::types::mapping::service_prefix;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid service name: {0:?}")]
    InvalidName(String),
    #[error("service '{0}' is already registered")]
    DuplicateService(String),
    #[error("duplicate action id '{id}' in service '{service}'")]
    DuplicateAction { service: String, id: String },
    #[error("duplicate reaction id '{id}' in service '{service}'")]
    DuplicateReaction { service: String, id: String },
    #[error("id '{id}' does not belong to service '{service}'")]
    ForeignId { service: String, id: String },
}

#[derive(Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Credentials come from a per-user OAuth grant, so a missing one is worth a warning.
    pub oauth: bool,
    pub actions: Vec<ActionDefinition>,
    pub reactions: Vec<ReactionDefinition>,
    pub credentials: Option<Arc<dyn CredentialProvider>>,
    pub executor: Option<Arc<dyn ReactionExecutor>>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            oauth: false,
            actions: Vec::new(),
            reactions: Vec::new(),
            credentials: None,
            executor: None,
        }
    }

    pub fn oauth(mut self) -> Self {
        self.oauth = true;
        self
    }

    pub fn action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }

    pub fn reaction(mut self, reaction: ReactionDefinition) -> Self {
        self.reactions.push(reaction);
        self
    }

    pub fn credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ReactionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.is_empty() || self.name.contains('.') {
            return Err(RegistryError::InvalidName(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            self.check_owned(&action.id)?;
            if !seen.insert(action.id.as_str()) {
                return Err(RegistryError::DuplicateAction {
                    service: self.name.clone(),
                    id: action.id.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for reaction in &self.reactions {
            self.check_owned(&reaction.id)?;
            if !seen.insert(reaction.id.as_str()) {
                return Err(RegistryError::DuplicateReaction {
                    service: self.name.clone(),
                    id: reaction.id.clone(),
                });
            }
        }

        Ok(())
    }

    fn check_owned(&self, id: &str) -> Result<(), RegistryError> {
        if service_prefix(id) == self.name && id.len() > self.name.len() + 1 {
            Ok(())
        } else {
            Err(RegistryError::ForeignId {
                service: self.name.clone(),
                id: id.to_string(),
            })
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("oauth", &self.oauth)
            .field("actions", &self.actions)
            .field("reactions", &self.reactions)
            .field("credentials", &self.credentials.is_some())
            .field("executor", &self.executor.is_some())
            .finish()
    }
}

/// A reaction type resolved to its definition and the executor that performs it.
#[derive(Clone)]
pub struct ResolvedReaction<'a> {
    pub definition: &'a ReactionDefinition,
    pub executor: Arc<dyn ReactionExecutor>,
}

#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, ServiceDescriptor>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: ServiceDescriptor) -> Result<(), RegistryError> {
        if self.services.contains_key(&service.name) {
            return Err(RegistryError::DuplicateService(service.name));
        }
        service.validate()?;

        tracing::debug!(
            service = %service.name,
            actions = service.actions.len(),
            reactions = service.reactions.len(),
            "registered service",
        );
        self.services.insert(service.name.clone(), service);
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }

    pub fn action(&self, kind: &str) -> Option<&ActionDefinition> {
        self.service(service_prefix(kind))?
            .actions
            .iter()
            .find(|action| action.id == kind)
    }

    /// `None` when the type is unknown or its service has no executor.
    pub fn reaction(&self, kind: &str) -> Option<ResolvedReaction<'_>> {
        let service = self.service(service_prefix(kind))?;
        let definition = service.reactions.iter().find(|reaction| reaction.id == kind)?;
        let executor = service.executor.clone()?;
        Some(ResolvedReaction {
            definition,
            executor,
        })
    }
}
