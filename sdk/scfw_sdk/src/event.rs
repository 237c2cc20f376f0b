//! Event records.
//!
//! Events are fixed-size values copied into the scheduler queues; the payload
//! is an inline byte array with typed plain-old-data access, so no handler
//! signature or heap pointer ever crosses the queue boundary.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use bytemuck::{AnyBitPattern, NoUninit, Pod, Zeroable};

use crate::id::FwkId;

/// Size in bytes of an event payload.
///
/// The smallest value that fits every in-tree payload type; [`EventParams`]
/// asserts the bound on every typed access.
pub const EVENT_PARAMS_SIZE: usize = 16;

/// Inline event payload with typed plain-old-data access.
///
/// Reads and writes copy through the byte array, so payload types only need
/// to be plain-old-data; alignment of the array is irrelevant.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EventParams([u8; EVENT_PARAMS_SIZE]);

impl EventParams {
    /// An all-zero payload.
    pub const fn empty() -> Self {
        EventParams([0; EVENT_PARAMS_SIZE])
    }

    /// Reads a payload value of type `T` from the start of the buffer.
    pub fn read<T: AnyBitPattern>(&self) -> T {
        assert!(core::mem::size_of::<T>() <= EVENT_PARAMS_SIZE);
        bytemuck::pod_read_unaligned(&self.0[..core::mem::size_of::<T>()])
    }

    /// Writes a payload value of type `T` at the start of the buffer.
    /// Remaining bytes are left untouched.
    pub fn write<T: NoUninit>(&mut self, value: &T) {
        assert!(core::mem::size_of::<T>() <= EVENT_PARAMS_SIZE);
        self.0[..core::mem::size_of::<T>()].copy_from_slice(bytemuck::bytes_of(value));
    }

    /// The raw payload bytes.
    pub fn as_bytes(&self) -> &[u8; EVENT_PARAMS_SIZE] {
        &self.0
    }
}

impl Default for EventParams {
    fn default() -> Self {
        EventParams::empty()
    }
}

impl From<[u8; EVENT_PARAMS_SIZE]> for EventParams {
    fn from(bytes: [u8; EVENT_PARAMS_SIZE]) -> Self {
        EventParams(bytes)
    }
}

/// Payload of a response synthesized from a failed handler: the wire status
/// code of the failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct StatusParams {
    pub status: i32,
}

/// A message dispatched by the scheduler.
///
/// Events are copied by value into the queues. `id` names the event (or
/// notification) within the target (or source) module's index space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Event {
    /// Event or notification identifier.
    pub id: FwkId,
    /// Entity that emitted the event.
    pub source_id: FwkId,
    /// Entity the event is addressed to.
    pub target_id: FwkId,
    /// Request/response correlation value, preserved verbatim in responses.
    pub cookie: u32,
    /// Set on events travelling back to the requester.
    pub is_response: bool,
    /// Set when the source expects a response.
    pub response_requested: bool,
    /// Set on events delivered through the notification bus.
    pub is_notification: bool,
    /// Inline payload.
    pub params: EventParams,
}

impl Event {
    /// A new event with an empty payload and no flags set.
    pub fn new(id: FwkId, source_id: FwkId, target_id: FwkId) -> Self {
        Event { id, source_id, target_id, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Pair {
        a: u32,
        b: u32,
    }

    #[test]
    fn params_round_trip() {
        let mut params = EventParams::empty();
        params.write(&Pair { a: 0x11223344, b: 7 });
        assert_eq!(params.read::<Pair>(), Pair { a: 0x11223344, b: 7 });
    }

    #[test]
    fn write_leaves_tail_untouched() {
        let mut params = EventParams::from([0xaa; EVENT_PARAMS_SIZE]);
        params.write(&1u32);
        assert_eq!(&params.as_bytes()[4..], &[0xaa; EVENT_PARAMS_SIZE - 4][..]);
    }

    #[test]
    fn status_params_fit_the_payload() {
        let mut params = EventParams::empty();
        params.write(&StatusParams { status: -9 });
        assert_eq!(params.read::<StatusParams>().status, -9);
    }

    #[test]
    #[should_panic]
    fn oversized_payload_asserts() {
        let params = EventParams::empty();
        let _ = params.read::<[u8; EVENT_PARAMS_SIZE + 1]>();
    }

    #[test]
    fn new_event_has_no_flags() {
        let e = Event::new(FwkId::event(1, 0), FwkId::module(2), FwkId::module(1));
        assert!(!e.is_response && !e.response_requested && !e.is_notification);
        assert_eq!(e.cookie, 0);
    }
}
