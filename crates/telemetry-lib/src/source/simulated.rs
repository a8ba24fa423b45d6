//! In-process sources for running the pipeline without real hardware

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use dashmap::DashSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::sync::Mutex;
use std::time::Instant;

use super::{Collaborator, UnitSource};
use crate::models::{UnitConfig, UnitReading};

/// Standard deviation of throughput noise (work/sec)
pub const THROUGHPUT_SIGMA: f64 = 5.0;
/// Standard deviation of power noise (watts)
pub const POWER_SIGMA: f64 = 10.0;
/// Standard deviation of temperature noise (°C)
pub const TEMPERATURE_SIGMA: f64 = 3.0;

/// Produces readings around each unit's nominal values with Gaussian noise
pub struct SimulatedUnitSource {
    started: Instant,
    offline: DashSet<String>,
    rng: Mutex<StdRng>,
}

impl Default for SimulatedUnitSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedUnitSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic noise for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            started: Instant::now(),
            offline: DashSet::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Make reads for `unit_id` fail until brought back online
    pub fn set_offline(&self, unit_id: &str, offline: bool) {
        if offline {
            self.offline.insert(unit_id.to_string());
        } else {
            self.offline.remove(unit_id);
        }
    }
}

#[async_trait]
impl UnitSource for SimulatedUnitSource {
    async fn read_unit(&self, unit: &UnitConfig) -> Result<UnitReading> {
        if self.offline.contains(&unit.unit_id) {
            bail!("unit {} is offline", unit.unit_id);
        }

        let throughput = Normal::new(unit.nominal_throughput, THROUGHPUT_SIGMA)?;
        let power = Normal::new(unit.nominal_power_watts, POWER_SIGMA)?;
        let temperature = Normal::new(unit.nominal_temperature_c, TEMPERATURE_SIGMA)?;

        let mut rng = self
            .rng
            .lock()
            .map_err(|_| anyhow!("simulated noise source lock poisoned"))?;

        Ok(UnitReading {
            throughput: throughput.sample(&mut *rng).max(0.0),
            power_watts: power.sample(&mut *rng).max(0.0),
            temperature_c: temperature.sample(&mut *rng),
            uptime_hours: self.started.elapsed().as_secs_f64() / 3600.0,
        })
    }
}

/// Collaborator that always reports the same summary
pub struct StaticCollaborator<S> {
    summary: S,
}

impl<S> StaticCollaborator<S> {
    pub fn new(summary: S) -> Self {
        Self { summary }
    }
}

#[async_trait]
impl<S: Clone + Send + Sync + 'static> Collaborator<S> for StaticCollaborator<S> {
    async fn summary(&self) -> Result<S> {
        Ok(self.summary.clone())
    }
}
