//! Metric handler registry: maps `handler-class` identifiers to factories.
//!
//! Handler classes are registered at startup, before any policy is loaded.
//! The policy loader resolves every metric entry through the registry and
//! rejects identifiers it does not know.

use super::builtins::{EvalMetrics, HistoryBasedMetric, Loss, PerProcessState, TrainingState};
use super::{HandlerArgs, MetricHandler};
use crate::error::MetricError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a handler instance from its metric name and `arguments`.
pub type HandlerFactory =
    Arc<dyn Fn(&str, &HandlerArgs) -> Result<Box<dyn MetricHandler>, MetricError> + Send + Sync>;

/// The registry holds every known handler class.
#[derive(Clone)]
pub struct MetricRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the built-in handler classes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, HandlerFactory); 5] = [
            (Loss::CLASS, Arc::new(Loss::create)),
            (EvalMetrics::CLASS, Arc::new(EvalMetrics::create)),
            (HistoryBasedMetric::CLASS, Arc::new(HistoryBasedMetric::create)),
            (TrainingState::CLASS, Arc::new(TrainingState::create)),
            (PerProcessState::CLASS, Arc::new(PerProcessState::create)),
        ];
        for (class, factory) in builtins {
            registry.factories.insert(class.to_string(), factory);
        }
        registry
    }

    /// Register a handler class. Returns error if the class is already registered.
    pub fn register(&mut self, handler_class: &str, factory: HandlerFactory) -> Result<(), MetricError> {
        if self.factories.contains_key(handler_class) {
            return Err(MetricError::AlreadyRegistered {
                handler_class: handler_class.to_string(),
            });
        }
        debug!(handler_class, "Registering metric handler class");
        self.factories.insert(handler_class.to_string(), factory);
        Ok(())
    }

    /// Register a handler class from a plain function or closure.
    pub fn register_fn<F>(&mut self, handler_class: &str, factory: F) -> Result<(), MetricError>
    where
        F: Fn(&str, &HandlerArgs) -> Result<Box<dyn MetricHandler>, MetricError>
            + Send
            + Sync
            + 'static,
    {
        self.register(handler_class, Arc::new(factory))
    }

    /// Get a factory by class identifier.
    pub fn get(&self, handler_class: &str) -> Option<&HandlerFactory> {
        self.factories.get(handler_class)
    }

    pub fn contains(&self, handler_class: &str) -> bool {
        self.factories.contains_key(handler_class)
    }

    /// Registered class identifiers, sorted.
    pub fn list_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.factories.keys().cloned().collect();
        classes.sort();
        classes
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricContext;
    use crate::state::LoopConfig;
    use crate::trigger::Trigger;
    use crate::value::{MetricMap, MetricValue};

    /// A handler that always reports a constant.
    struct ConstHandler {
        name: String,
    }

    impl MetricHandler for ConstHandler {
        fn name(&self) -> &str {
            &self.name
        }

        fn handler_class(&self) -> &str {
            "Const"
        }

        fn events(&self) -> &[Trigger] {
            &Trigger::ALL
        }

        fn validate(&self, _config: &LoopConfig) -> bool {
            true
        }

        fn compute(&mut self, _ctx: &MetricContext<'_>) -> Option<MetricMap> {
            let mut map = MetricMap::new();
            map.insert(self.name.clone(), MetricValue::Number(1.0));
            Some(map)
        }
    }

    fn const_factory(name: &str, _args: &HandlerArgs) -> Result<Box<dyn MetricHandler>, MetricError> {
        Ok(Box::new(ConstHandler {
            name: name.to_string(),
        }))
    }

    #[test]
    fn test_builtins_registered() {
        let registry = MetricRegistry::with_builtins();
        assert_eq!(
            registry.list_classes(),
            vec!["EvalMetrics", "HistoryBasedMetric", "Loss", "PerProcessState", "TrainingState"]
        );
        assert_eq!(registry.len(), 5);
        assert!(MetricRegistry::new().is_empty());
    }

    #[test]
    fn test_register_custom_class() {
        let mut registry = MetricRegistry::new();
        registry.register_fn("Const", const_factory).unwrap();
        assert!(registry.contains("Const"));

        let factory = registry.get("Const").unwrap();
        let handler = factory("one", &HandlerArgs::new()).unwrap();
        assert_eq!(handler.name(), "one");
        assert_eq!(handler.handler_class(), "Const");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = MetricRegistry::with_builtins();
        let err = registry.register_fn("Loss", const_factory).unwrap_err();
        assert!(matches!(err, MetricError::AlreadyRegistered { .. }));
    }

    #[test]
    fn test_unknown_class() {
        let registry = MetricRegistry::with_builtins();
        assert!(registry.get("Nope").is_none());
    }
}
