use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use super::evaluator::{DerivedFieldEvaluator, PassReport};
use super::rule::{RuleError, RuleSet, TrackedField};
use crate::config::EngineConfig;
use crate::form::FormStore;

/// Outcome of settling every evaluator to a fixed point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettleReport {
    pub passes: u32,
    pub writes: usize,
    pub skipped: usize,
    pub stale: usize,
    pub converged: bool,
}

/// Runs several evaluators (one per tracked field) until no rule changes any cell.
#[derive(Debug)]
pub struct Recalculator<C> {
    evaluators: Vec<DerivedFieldEvaluator<C>>,
    config: EngineConfig,
}

impl<C> Recalculator<C> {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            evaluators: Vec::new(),
            config: config.clone(),
        }
    }

    /// Adds a rule set, or replaces the one already bound to the same tracked field.
    ///
    /// Each derived cell has exactly one owner across all sets.
    pub fn install(&mut self, rules: RuleSet<C>) -> Result<(), RuleError> {
        let owned: HashSet<String> = self
            .evaluators
            .iter()
            .filter(|evaluator| evaluator.tracked() != rules.tracked())
            .flat_map(|evaluator| evaluator.rules().target_shapes())
            .collect();
        if let Some(target) = rules.target_shapes().find(|shape| owned.contains(shape)) {
            return Err(RuleError::DuplicateTarget { target });
        }

        let evaluator = DerivedFieldEvaluator::new(rules).with_engine_config(&self.config);
        match self
            .evaluators
            .iter_mut()
            .find(|existing| existing.tracked() == evaluator.tracked())
        {
            Some(existing) => {
                debug!(tracked = %evaluator.tracked(), rules = evaluator.rules().len(), "replacing rule set");
                *existing = evaluator;
            }
            None => self.evaluators.push(evaluator),
        }
        Ok(())
    }

    pub fn evaluator(&self, tracked: &TrackedField) -> Option<&DerivedFieldEvaluator<C>> {
        self.evaluators
            .iter()
            .find(|evaluator| evaluator.tracked() == tracked)
    }

    pub fn evaluators(&self) -> &[DerivedFieldEvaluator<C>] {
        &self.evaluators
    }

    pub fn clear(&mut self) {
        self.evaluators.clear();
    }

    /// One pass of every evaluator, in installation order.
    pub fn run_pass<S: FormStore>(&mut self, store: &mut S, context: &C) -> PassReport {
        let mut report = PassReport::default();
        for evaluator in &mut self.evaluators {
            report.absorb(evaluator.run_pass(store, context));
        }
        report
    }

    /// Repeats passes until one writes nothing or the configured ceiling is reached.
    pub fn settle<S: FormStore>(&mut self, store: &mut S, context: &C) -> SettleReport {
        let mut settle = SettleReport::default();
        while settle.passes < self.config.max_passes {
            let pass = self.run_pass(store, context);
            settle.passes += 1;
            settle.writes += pass.writes;
            settle.skipped += pass.skipped;
            settle.stale += pass.stale;
            if pass.writes == 0 {
                settle.converged = true;
                break;
            }
        }

        if settle.converged {
            debug!(passes = settle.passes, writes = settle.writes, "derived fields settled");
        } else {
            warn!(
                passes = settle.passes,
                writes = settle.writes,
                "derived fields still changing at the pass ceiling"
            );
        }
        settle
    }
}
