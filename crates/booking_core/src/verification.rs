//! Identity verification gates.
//!
//! The external verification service supplies three independent pass/fail
//! gates. They are preconditions, not errors: unlock is simply unavailable
//! until all three hold. Update events from the service flip them live.

use bevy_ecs::prelude::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationGate {
    Identity,
    License,
    Address,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Resource)]
pub struct VerificationGates {
    pub id_approved: bool,
    pub license_approved: bool,
    pub address_approved: bool,
}

impl VerificationGates {
    pub fn all_approved() -> Self {
        Self {
            id_approved: true,
            license_approved: true,
            address_approved: true,
        }
    }

    pub fn set(&mut self, gate: VerificationGate, approved: bool) {
        match gate {
            VerificationGate::Identity => self.id_approved = approved,
            VerificationGate::License => self.license_approved = approved,
            VerificationGate::Address => self.address_approved = approved,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.id_approved && self.license_approved && self.address_approved
    }

    /// Frozen copy stored on the trip session when the trip becomes active.
    pub fn snapshot(&self) -> VerificationSnapshot {
        VerificationSnapshot {
            id_approved: self.id_approved,
            license_approved: self.license_approved,
            address_approved: self.address_approved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationSnapshot {
    pub id_approved: bool,
    pub license_approved: bool,
    pub address_approved: bool,
}
