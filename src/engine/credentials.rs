use std::sync::Arc;

use tracing::warn;

use crate::registry::ServiceRegistry;
use crate::store::CredentialStore;
use crate::types::UserServiceConfig;
use crate::types::mapping::service_prefix;

/// Resolves the credentials a reaction runs with.
///
/// A service's own credential provider wins over the stored per-user configuration.
/// Resolution never fails: anything that goes wrong yields an empty configuration, and
/// the reaction is attempted with it so the resulting failure lands in the audit trail.
#[derive(Clone)]
pub struct CredentialResolver {
    registry: Arc<ServiceRegistry>,
    store: Arc<dyn CredentialStore>,
}

impl CredentialResolver {
    pub fn new(registry: Arc<ServiceRegistry>, store: Arc<dyn CredentialStore>) -> Self {
        Self { registry, store }
    }

    pub async fn resolve(&self, reaction_type: &str, user_id: i64) -> UserServiceConfig {
        let service = service_prefix(reaction_type);
        if service.is_empty() {
            return UserServiceConfig::default();
        }

        let descriptor = self.registry.service(service);
        let oauth = descriptor.is_some_and(|descriptor| descriptor.oauth);

        if let Some(provider) = descriptor.and_then(|descriptor| descriptor.credentials.clone()) {
            return match provider.credentials(user_id).await {
                Ok(credentials) => UserServiceConfig {
                    credentials,
                    ..Default::default()
                },
                Err(e) => {
                    warn!(service, user_id, error = %e, "credential provider failed");
                    UserServiceConfig::default()
                }
            };
        }

        match self.store.get_user_service_config(user_id, service).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                if oauth {
                    warn!(service, user_id, "no stored credentials for oauth service");
                }
                UserServiceConfig::default()
            }
            Err(e) => {
                warn!(service, user_id, error = %e, "failed to load user service config");
                UserServiceConfig::default()
            }
        }
    }
}
