use std::collections::BTreeMap;
use std::sync::Arc;

use crate::runtime::{AgentRuntime, EchoAgent};

/// Named agents available to the backend, with a configurable default.
/// Adding an agent means registering it here; no endpoint changes needed.
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<dyn AgentRuntime>>,
    default_name: String,
}

impl AgentRegistry {
    pub fn new(default_name: impl Into<String>) -> Self {
        Self { agents: BTreeMap::new(), default_name: default_name.into() }
    }

    pub fn register(mut self, name: impl Into<String>, agent: Arc<dyn AgentRuntime>) -> Self {
        self.agents.insert(name.into(), agent);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentRuntime>> {
        self.agents.get(name).cloned()
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new("echo").register("echo", Arc::new(EchoAgent))
    }
}
