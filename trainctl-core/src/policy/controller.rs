//! A controller definition bound to its handler instances and compiled rules.

use super::types::ControllerDefinition;
use crate::metrics::{MetricContext, MetricHandler};
use crate::rules::CompiledRule;
use crate::trigger::Trigger;
use crate::value::MetricMap;
use std::fmt;
use tracing::debug;

/// Runtime form of one controller. Owns its handlers exclusively.
pub struct Controller {
    definition: ControllerDefinition,
    handlers: Vec<Box<dyn MetricHandler>>,
    rules: Vec<CompiledRule>,
}

impl Controller {
    pub fn new(definition: ControllerDefinition, handlers: Vec<Box<dyn MetricHandler>>) -> Self {
        let rules = definition
            .rules
            .iter()
            .map(|r| CompiledRule::compile(r))
            .collect();
        Self {
            definition,
            handlers,
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ControllerDefinition {
        &self.definition
    }

    pub fn handlers(&self) -> &[Box<dyn MetricHandler>] {
        &self.handlers
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn subscribes(&self, trigger: Trigger) -> bool {
        self.definition.subscribes(trigger)
    }

    /// Run every handler in declaration order and merge their outputs.
    /// A handler returning `None` contributes nothing. On key collisions the
    /// later handler wins.
    pub fn compute_metrics(&mut self, ctx: &MetricContext<'_>) -> MetricMap {
        let mut merged = MetricMap::new();
        for handler in &mut self.handlers {
            match handler.compute(ctx) {
                Some(values) => merged.extend(values),
                None => debug!(
                    controller = %self.definition.name,
                    metric = handler.name(),
                    "Handler produced no value"
                ),
            }
        }
        merged
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.definition.name)
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("rules", &self.rules.len())
            .finish()
    }
}
