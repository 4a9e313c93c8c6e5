//! Fares, the trip session, and the payment gateway boundary.
//!
//! Billing is integer cents throughout. The starting fare is charged when the
//! trip is confirmed (step 4 -> 5); usage is billed per started minute when
//! the trip ends.

use std::collections::VecDeque;
use std::sync::Mutex;

use bevy_ecs::prelude::Resource;
use thiserror::Error;

use crate::verification::VerificationSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Resource)]
pub struct FareSchedule {
    /// Flat starting fare, pre-charged at trip confirmation.
    pub base_fare_cents: u32,
    /// Usage rate per started minute of unlocked time.
    pub per_minute_rate_cents: u32,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self {
            base_fare_cents: 250,
            per_minute_rate_cents: 30,
        }
    }
}

impl FareSchedule {
    pub fn usage_fare_cents(&self, minutes_used: u64) -> u32 {
        (minutes_used as u32).saturating_mul(self.per_minute_rate_cents)
    }
}

/// Started minutes: `ceil(elapsed_seconds / 60)`.
pub fn minutes_used(elapsed_seconds: u64) -> u64 {
    elapsed_seconds.div_ceil(60)
}

/// Exists only while the booking is at step 5. Dropped on trip end, which
/// also resets the booking flow.
#[derive(Debug, Clone, PartialEq, Eq, Resource)]
pub struct TripSession {
    /// Session time when the trip became active (pre-charge succeeded).
    pub started_at: u64,
    /// Session time of the unlock, once it happened.
    pub unlocked_at: Option<u64>,
    /// Monotonic counter driven by the 1-second tick while unlocked.
    pub elapsed_seconds: u64,
    /// Whether tick events should currently be honored.
    pub ticking: bool,
    /// Guards against ticks scheduled before a stop; a tick event carrying an
    /// older generation is ignored.
    pub tick_generation: u32,
    /// Verification gates as they stood when the trip became active.
    pub verification: VerificationSnapshot,
}

impl TripSession {
    pub fn new(started_at: u64, verification: VerificationSnapshot) -> Self {
        Self {
            started_at,
            unlocked_at: None,
            elapsed_seconds: 0,
            ticking: false,
            tick_generation: 0,
            verification,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }

    pub fn minutes_used(&self) -> u64 {
        minutes_used(self.elapsed_seconds)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChargeError {
    #[error("charge declined: {0}")]
    Declined(String),
    #[error("payment gateway unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub transaction_id: String,
    pub card_last4: Option<String>,
}

/// The payment gateway boundary: accepts a charge request, returns success or
/// failure with a reference. Implementations must be `Send + Sync` so the
/// gateway can be stored as a shared ECS resource.
pub trait PaymentGateway: Send + Sync {
    fn charge(&self, user_id: &str, amount_cents: u32) -> Result<ChargeReceipt, ChargeError>;
}

/// ECS resource wrapping a boxed payment gateway.
#[derive(Resource)]
pub struct PaymentGatewayResource(pub Box<dyn PaymentGateway>);

/// Scripted gateway for tests and demos: pops queued outcomes, approving with
/// a generated reference once the script runs out. Records every call.
#[derive(Default)]
pub struct ScriptedGateway {
    outcomes: Mutex<VecDeque<Result<ChargeReceipt, ChargeError>>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedGateway {
    pub fn always_approving() -> Self {
        Self::default()
    }

    pub fn push_outcome(&self, outcome: Result<ChargeReceipt, ChargeError>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }

    pub fn push_decline(&self, reason: &str) {
        self.push_outcome(Err(ChargeError::Declined(reason.to_string())));
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl PaymentGateway for ScriptedGateway {
    fn charge(&self, user_id: &str, amount_cents: u32) -> Result<ChargeReceipt, ChargeError> {
        let call_number = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| ChargeError::Unavailable)?;
            calls.push((user_id.to_string(), amount_cents));
            calls.len()
        };
        let scripted = self
            .outcomes
            .lock()
            .map_err(|_| ChargeError::Unavailable)?
            .pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => Ok(ChargeReceipt {
                transaction_id: format!("txn-{call_number}"),
                card_last4: Some("4242".to_string()),
            }),
        }
    }
}

impl PaymentGateway for std::sync::Arc<ScriptedGateway> {
    fn charge(&self, user_id: &str, amount_cents: u32) -> Result<ChargeReceipt, ChargeError> {
        self.as_ref().charge(user_id, amount_cents)
    }
}
