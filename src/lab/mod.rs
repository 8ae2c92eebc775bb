//! Deterministic lab doubles for exercising the harness without hardware.
//!
//! - [`SimulatedEngine`]: store-and-forward model of the offload device with
//!   seeded response reordering and fault injection

pub mod engine;

pub use engine::{Corruption, EngineConfig, EngineFaults, EngineStats, SimulatedEngine};
