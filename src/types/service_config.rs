use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stored per-user configuration for one third-party service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserServiceConfig {
    pub credentials: BTreeMap<String, String>,
    pub settings: Map<String, Value>,
}
