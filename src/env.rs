//! Environment variable collaborator
//!
//! Resolution rules (repository precedence, webhook fallbacks, notification
//! settings) read ambient configuration through [`EnvSource`] so they stay
//! pure functions over an injected key-value source.

use std::collections::HashMap;
use std::env;

/// Read-only key-value source for ambient configuration
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Process environment backed source
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnv;

impl EnvSource for SystemEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// Fixed map backed source, used as a test double
#[derive(Debug, Default, Clone)]
pub struct MapEnv {
    values: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl EnvSource for MapEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
