//! Test-only helpers: a fake clock and an in-memory exchange port double.
//! Gated behind the `testing` feature so they never ship in a production
//! binary (spec.md §5: "no component reads wall-clock time directly").

pub mod helpers;

pub use helpers::{FakeClock, MockExchangePort, MockFailure};
