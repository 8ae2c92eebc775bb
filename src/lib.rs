//! Out-of-order verification harness for recursive-doubling collective
//! offload engines.
//!
//! The harness drives a device under test through one or more *test sets*.
//! Each test set transmits one stimulus per level in a seeded random order,
//! then collects the device's responses in whatever order they arrive and
//! checks each one against a prefix-sum oracle:
//!
//! ```text
//! chain[0] = input[0]
//! chain[L] = input[L] + chain[L - 1]      (wrapping u32, element-wise)
//! ```
//!
//! The first protocol violation aborts the run with a typed
//! [`HarnessError`] whose [`failure_code`](HarnessError::failure_code)
//! localizes the fault to a test set, phase and fault class.
//!
//! # Modules
//!
//! - [`packet`]: wire codec and byte-level comparison
//! - [`chain`]: expected-output oracle and stimulus generation
//! - [`schedule`]: seeded transmission-order permutations
//! - [`test_set`]: one round's stimuli, order and expected chain
//! - [`matcher`]: send and receive phases with response verification
//! - [`orchestrator`]: multi-set runs over a [`Transport`]
//! - [`transport`]: transport trait and UDP adapter
//! - [`lab`]: in-process simulated device with fault injection
//! - [`config`]: layered configuration
//! - [`status`]: completion status word
//!
//! # Example
//!
//! ```
//! use rdharness::config::HarnessConfig;
//! use rdharness::lab::{EngineConfig, SimulatedEngine};
//! use rdharness::orchestrator::Harness;
//!
//! let config = HarnessConfig::default().with_test_sets(3).with_seed(7);
//! let engine = SimulatedEngine::new(EngineConfig::new(11));
//! let mut harness = Harness::new(config, engine)?;
//! let report = harness.run()?;
//! assert_eq!(report.sets_completed, 3);
//! # Ok::<(), rdharness::HarnessError>(())
//! ```

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod lab;
pub mod matcher;
pub mod orchestrator;
pub mod packet;
pub mod schedule;
pub mod status;
pub mod test_set;
pub mod transport;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{ConfigLoader, HarnessConfig};
pub use error::{FaultClass, HarnessError, Phase};
pub use orchestrator::{Harness, RunReport};
pub use status::StatusWord;
pub use transport::{DeviceId, Transport, TransportError, UdpTransport};
