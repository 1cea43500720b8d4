//! Holds one named `CircuitBreaker` per external dependency (vector store,
//! relational DB, source API), created lazily on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use medretrieve_common::config::BreakerSettings;

use crate::breaker::CircuitBreaker;

pub struct BreakerRegistry {
    settings: BreakerSettings,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self { settings, breakers: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, dependency: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers.entry(dependency.to_string()).or_insert_with(|| Arc::new(CircuitBreaker::new(dependency, self.settings.clone()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_the_same_breaker_instance_for_the_same_dependency() {
        let registry = BreakerRegistry::new(BreakerSettings::default());
        let a = registry.get("vector_store");
        let b = registry.get("vector_store");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_dependencies_get_independent_breakers() {
        let registry = BreakerRegistry::new(BreakerSettings::default());
        let a = registry.get("vector_store");
        let b = registry.get("relational_db");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
