//! Grid-plan construction for `bog-core`'s execution engine.
//!
//! Turns the feature engine's per-tick [`bog_core::features::FeatureSnapshot`]
//! and the lifecycle FSM's current state into a [`bog_core::execution::GridPlan`],
//! the only input the execution engine needs to reconcile desired vs.
//! observed orders (spec.md §4.E).

pub mod grid_plan;

pub use grid_plan::{GridPlanBuilder, StrategyConfig};
