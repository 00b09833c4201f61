//! Reactive derived-field evaluation.
//!
//! Rule templates declare a target cell, the cells they read, and how to compute the value.
//! An evaluator binds templates to every live record of the field it tracks and writes a
//! result back only when its normalized value differs from what the form already holds, so
//! repeated passes reach a fixed point instead of feeding on their own writes.

mod evaluator;
mod order;
mod recalc;
mod rule;

pub use evaluator::{DerivedFieldEvaluator, PassReport};
pub use recalc::{Recalculator, SettleReport};
pub use rule::{
    Alignment, ComputeFn, PassContext, RuleError, RuleInput, RuleScope, RuleSet, RuleSetBuilder,
    RuleTemplate, TrackedField, WhenFn,
};
