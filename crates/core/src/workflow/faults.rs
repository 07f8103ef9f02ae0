//! Fault injection checkpoints for resilience testing.
//!
//! Sagas call [`FaultInjector::checkpoint`] right after persisting a state
//! transition and before sending the next message. A failure there leaves a
//! persisted checkpoint without its follow-up message, which is exactly the
//! crash window `resume` and redelivery have to cover.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::warn;
use rand::Rng;

use crate::errors::{Error, Result};

pub trait FaultInjector: Send + Sync {
    fn checkpoint(&self, operation_id: &str) -> Result<()>;
}

/// Production setting: never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn checkpoint(&self, _operation_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Fails each checkpoint with a fixed probability.
pub struct RandomFaults {
    probability: f64,
    rng: Mutex<rand::rngs::StdRng>,
}

impl RandomFaults {
    pub fn new(probability: f64) -> Self {
        use rand::SeedableRng;
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(rand::rngs::StdRng::from_entropy()),
        }
    }
}

impl FaultInjector for RandomFaults {
    fn checkpoint(&self, operation_id: &str) -> Result<()> {
        let roll: f64 = match self.rng.lock() {
            Ok(mut rng) => rng.gen(),
            Err(poisoned) => poisoned.into_inner().gen(),
        };
        if roll < self.probability {
            warn!("Injecting fault for operation {}", operation_id);
            return Err(Error::FaultInjected(operation_id.to_string()));
        }
        Ok(())
    }
}

/// Fails the first `n` checkpoints of chosen operations.
#[derive(Clone, Default)]
pub struct ScriptedFaults {
    remaining: Arc<DashMap<String, u32>>,
    injected: Arc<DashMap<String, u32>>,
}

impl ScriptedFaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(&self, operation_id: &str, times: u32) {
        self.remaining.insert(operation_id.to_string(), times);
    }

    /// How many faults were injected for `operation_id` so far.
    pub fn injected(&self, operation_id: &str) -> u32 {
        self.injected.get(operation_id).map_or(0, |count| *count)
    }
}

impl FaultInjector for ScriptedFaults {
    fn checkpoint(&self, operation_id: &str) -> Result<()> {
        if let Some(mut remaining) = self.remaining.get_mut(operation_id) {
            if *remaining > 0 {
                *remaining -= 1;
                *self.injected.entry(operation_id.to_string()).or_insert(0) += 1;
                return Err(Error::FaultInjected(operation_id.to_string()));
            }
        }
        Ok(())
    }
}
