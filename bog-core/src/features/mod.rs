//! Rolling bar construction, volatility, and microstructure features
//! computed from tick snapshots (spec.md §4.B).

pub mod bar;
pub mod engine;
pub mod indicators;

pub use bar::{BarBuilder, BarBuilderConfig, MidBar};
pub use engine::{FeatureEngine, FeatureEngineConfig, FeatureSnapshot};
