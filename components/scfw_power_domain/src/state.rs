//! Power states, allowed-state masks, and event payloads.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use bytemuck::{Pod, Zeroable};

use scfw_sdk::event::EVENT_PARAMS_SIZE;

/// A power state.
///
/// `OFF`, `ON`, and `SLEEP` are the canonical states; products extend the
/// space with retention variants at higher indices. The state index doubles
/// as the bit position in a [`StateMask`] and as the row index of an
/// allowed-state mask table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct PowerState(pub u32);

impl Default for PowerState {
    fn default() -> Self {
        PowerState::OFF
    }
}

impl PowerState {
    pub const OFF: PowerState = PowerState(0);
    pub const ON: PowerState = PowerState(1);
    pub const SLEEP: PowerState = PowerState(2);

    /// The mask containing only this state.
    pub const fn mask(self) -> StateMask {
        StateMask::from_bits_retain(1 << self.0)
    }
}

bitflags::bitflags! {
    /// A set of power states, one bit per state index.
    ///
    /// An allowed-state mask table maps a parent's state (the row index) to
    /// the mask of states its child may hold.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateMask: u32 {
        const OFF = 1 << 0;
        const ON = 1 << 1;
        const SLEEP = 1 << 2;
    }
}

impl StateMask {
    /// Whether `state` is a member of this mask.
    pub const fn allows(self, state: PowerState) -> bool {
        self.bits() & (1 << state.0) != 0
    }
}

/// The role of a power domain within the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDomainKind {
    /// Leaf domain commanding a core power controller.
    Core,
    /// Parent of cores; its state bounds its children.
    Cluster,
    /// Peripheral device domain.
    Device,
    /// Debug infrastructure domain.
    DeviceDebug,
    /// The tree root, backed by the system power controller.
    System,
}

/// How a system shutdown request takes the system down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemShutdownMode {
    /// Power off and stay off.
    Shutdown,
    /// Full power-cycling reset.
    ColdReset,
    /// Reset without cycling power; state survives in retention.
    WarmReset,
}

impl SystemShutdownMode {
    pub(crate) const fn to_raw(self) -> u32 {
        match self {
            SystemShutdownMode::Shutdown => 0,
            SystemShutdownMode::ColdReset => 1,
            SystemShutdownMode::WarmReset => 2,
        }
    }

    pub(crate) const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SystemShutdownMode::Shutdown),
            1 => Some(SystemShutdownMode::ColdReset),
            2 => Some(SystemShutdownMode::WarmReset),
            _ => None,
        }
    }
}

/// Payload of a set-state request event.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SetStateParams {
    pub state: PowerState,
    /// Non-zero requests a composite transition of the whole subtree.
    pub subtree: u32,
}

/// Payload of a driver's transition report event.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ReportTransitionParams {
    pub state: PowerState,
}

/// Payload of the pre-transition notification.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PreTransitionParams {
    pub current_state: PowerState,
    pub target_state: PowerState,
}

/// Payload of the post-transition notification.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TransitionParams {
    pub previous_state: PowerState,
    pub current_state: PowerState,
}

/// Payload of the pre-shutdown notification and of shutdown request events.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ShutdownParams {
    pub mode: u32,
}

/// Payload of a system-suspend request event.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SuspendParams {
    pub state: PowerState,
}

// Every payload must fit the scheduler's inline parameter buffer.
const _: () = assert!(core::mem::size_of::<SetStateParams>() <= EVENT_PARAMS_SIZE);
const _: () = assert!(core::mem::size_of::<ReportTransitionParams>() <= EVENT_PARAMS_SIZE);
const _: () = assert!(core::mem::size_of::<PreTransitionParams>() <= EVENT_PARAMS_SIZE);
const _: () = assert!(core::mem::size_of::<TransitionParams>() <= EVENT_PARAMS_SIZE);
const _: () = assert!(core::mem::size_of::<ShutdownParams>() <= EVENT_PARAMS_SIZE);
const _: () = assert!(core::mem::size_of::<SuspendParams>() <= EVENT_PARAMS_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_states_have_distinct_mask_bits() {
        assert_eq!(PowerState::OFF.mask(), StateMask::OFF);
        assert_eq!(PowerState::ON.mask(), StateMask::ON);
        assert_eq!(PowerState::SLEEP.mask(), StateMask::SLEEP);
    }

    #[test]
    fn masks_answer_membership() {
        let mask = StateMask::OFF | StateMask::ON;
        assert!(mask.allows(PowerState::OFF));
        assert!(mask.allows(PowerState::ON));
        assert!(!mask.allows(PowerState::SLEEP));
    }

    #[test]
    fn product_states_extend_the_mask_space() {
        // A retention state beyond the canonical three.
        let mem_retention = PowerState(4);
        let mask = StateMask::ON | mem_retention.mask();
        assert!(mask.allows(mem_retention));
        assert!(!mask.allows(PowerState(3)));
    }

    #[test]
    fn shutdown_mode_raw_round_trip() {
        for mode in
            [SystemShutdownMode::Shutdown, SystemShutdownMode::ColdReset, SystemShutdownMode::WarmReset]
        {
            assert_eq!(SystemShutdownMode::from_raw(mode.to_raw()), Some(mode));
        }
        assert_eq!(SystemShutdownMode::from_raw(9), None);
    }
}
