//! Run orchestration.
//!
//! [`Harness`] drives a whole verification run: it queries the device once,
//! resolves and logs the scheduling seed, then executes each test set in
//! two strict phases (send every stimulus, then collect every response).
//! The first fault aborts the run.

use std::time::Instant;

use serde::Serialize;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Phase};
use crate::matcher::{collect_responses, send_stimuli};
use crate::schedule::OrderScheduler;
use crate::test_set::TestSet;
use crate::transport::{DeviceId, Transport};
use crate::util::DetRng;

/// Outcome of one verified test set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetReport {
    /// Test-set index.
    pub index: u32,
    /// Stimulus transmission order (level indices).
    pub send_order: Vec<usize>,
    /// Level indices in the order their responses arrived.
    pub arrival_order: Vec<u8>,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Seed the transmission orders were drawn from.
    pub seed: u64,
    /// Identifier reported by the device.
    pub device_id: DeviceId,
    /// Test sets fully verified.
    pub sets_completed: u32,
    /// Responses verified across all test sets.
    pub responses_verified: u64,
    /// Wall time of the run in milliseconds.
    pub elapsed_ms: u64,
    /// Per-set detail.
    pub sets: Vec<SetReport>,
}

impl RunReport {
    /// Convert to JSON for artifact storage.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Verification run over a transport.
#[derive(Debug)]
pub struct Harness<T: Transport> {
    config: HarnessConfig,
    transport: T,
    seed: u64,
}

impl<T: Transport> Harness<T> {
    /// Creates a harness after validating `config`.
    ///
    /// The scheduling seed is fixed here, from the configuration or the
    /// clock, so it can be reported whether the run passes or fails.
    pub fn new(config: HarnessConfig, transport: T) -> Result<Self, HarnessError> {
        config.validate()?;
        let seed = config.run.seed.unwrap_or_else(DetRng::clock_seed);
        Ok(Self {
            config,
            transport,
            seed,
        })
    }

    /// Seed every run of this harness draws its transmission orders from.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Consumes the harness, returning the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Executes every test set. Stops at the first fault.
    pub fn run(&mut self) -> Result<RunReport, HarnessError> {
        let result = self.run_sets();
        if let Err(err) = &result {
            tracing::error!(
                failure_code = format_args!("{:#x}", err.failure_code()),
                class = %err.class(),
                phase = %err.phase(),
                seed = self.seed,
                error = %err,
                "run aborted"
            );
        }
        result
    }

    fn run_sets(&mut self) -> Result<RunReport, HarnessError> {
        let started = Instant::now();
        let device_id = self
            .transport
            .device_identifier()
            .map_err(|err| HarnessError::transport(0, Phase::Setup, err))?;

        let seed = self.seed;
        let run = &self.config.run;
        tracing::info!(
            device_id = %device_id,
            seed,
            test_sets = run.test_sets,
            levels = self.config.packet.level_count(),
            elements = self.config.packet.element_count,
            response_level_offset = run.response_level_offset,
            "starting verification run"
        );

        let mut scheduler = OrderScheduler::new(seed);
        let timeout = run.receive_timeout();
        let mut sets = Vec::with_capacity(run.test_sets as usize);
        let mut responses_verified = 0_u64;

        for index in 0..run.test_sets {
            let span = tracing::info_span!("test_set", index);
            let _enter = span.enter();

            let set = TestSet::prepare(index, &self.config.packet, &mut scheduler);
            tracing::debug!(order = ?set.order(), "transmission order");

            send_stimuli(&mut self.transport, &set, run.dump_packets)?;
            let state = collect_responses(
                &mut self.transport,
                &set,
                run.response_level_offset,
                timeout,
                run.dump_packets,
            )?;

            responses_verified += state.received() as u64;
            tracing::info!(
                arrival = ?state.arrival_order(),
                "test set verified"
            );
            sets.push(SetReport {
                index,
                send_order: set.order().to_vec(),
                arrival_order: state.arrival_order().to_vec(),
            });
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            sets = sets.len(),
            responses_verified,
            elapsed_ms,
            "all test sets verified"
        );

        Ok(RunReport {
            seed,
            device_id,
            sets_completed: run.test_sets,
            responses_verified,
            elapsed_ms,
            sets,
        })
    }
}
