//! Bank settlement simulation.
//!
//! Settlement outcomes and latencies are synthetic. In test mode every
//! payment succeeds after a fixed delay; otherwise latency is randomized and
//! payments fail with a per-method probability.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::payment::{PaymentMethod, PaymentOutcome};

/// Success probability of a live UPI payment.
const UPI_SUCCESS_RATE: f64 = 0.90;

/// Success probability of a live card payment.
const CARD_SUCCESS_RATE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    /// Deterministic: always succeed after the configured test delay.
    Test,
    /// Randomized latency and outcomes.
    Live,
}

#[derive(Debug)]
pub struct Simulator {
    mode: SimulationMode,
    test_delay: Duration,
    rng: Mutex<StdRng>,
}

impl Simulator {
    pub fn new(mode: SimulationMode, test_delay: Duration) -> Self {
        Self::from_rng(mode, test_delay, StdRng::from_os_rng())
    }

    /// Simulator with a reproducible random sequence.
    pub fn seeded(mode: SimulationMode, test_delay: Duration, seed: u64) -> Self {
        Self::from_rng(mode, test_delay, StdRng::seed_from_u64(seed))
    }

    fn from_rng(mode: SimulationMode, test_delay: Duration, rng: StdRng) -> Self {
        Self {
            mode,
            test_delay,
            rng: Mutex::new(rng),
        }
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// Processing latency of a payment: 5 to 10 seconds live.
    pub fn payment_delay(&self) -> Duration {
        self.delay(5_000, 10_000)
    }

    /// Processing latency of a refund: 3 to 5 seconds live.
    pub fn refund_delay(&self) -> Duration {
        self.delay(3_000, 5_000)
    }

    /// Decide how a pending payment settles.
    pub fn payment_outcome(&self, method: &str) -> PaymentOutcome {
        if self.mode == SimulationMode::Test {
            return PaymentOutcome::Success;
        }

        let success_rate = match PaymentMethod::parse(method) {
            Some(PaymentMethod::Upi) => UPI_SUCCESS_RATE,
            Some(PaymentMethod::Card) => CARD_SUCCESS_RATE,
            None => 1.0,
        };

        if self.sample(|rng| rng.random::<f64>()) < success_rate {
            PaymentOutcome::Success
        } else {
            PaymentOutcome::bank_rejected()
        }
    }

    fn delay(&self, min_ms: u64, max_ms: u64) -> Duration {
        match self.mode {
            SimulationMode::Test => self.test_delay,
            SimulationMode::Live => {
                Duration::from_millis(self.sample(|rng| rng.random_range(min_ms..=max_ms)))
            }
        }
    }

    fn sample<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}
