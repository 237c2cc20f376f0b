//! Module descriptors, configuration, and lifecycle callbacks.
//!
//! A module is a statically linked unit owning state, APIs, and an optional
//! set of elements. The registry drives every module through the lifecycle
//! phases via the [`Module`] trait; capability exchange between modules
//! happens during the bind phase through type-erased [`ApiRef`] handles.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;

use crate::error::{FwkError, Result};
use crate::event::Event;
use crate::id::FwkId;

/// Opaque configuration data handed to a module or element at init time.
///
/// The framework never inspects it beyond presence; the owning module
/// recovers the concrete type with [`Any::downcast_ref`].
pub type OpaqueData = &'static (dyn Any + Send + Sync);

/// Broad classification of a module, used for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Directly drives hardware.
    Driver,
    /// Hardware abstraction layer over one or more drivers.
    Hal,
    /// Pure software service.
    Service,
    /// Implements a wire protocol.
    Protocol,
}

/// Static per-module descriptor consumed by the registry.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDescriptor {
    pub kind: ModuleKind,
    /// Number of distinct API indices the module exposes.
    pub api_count: usize,
    /// Number of distinct event indices the module handles.
    pub event_count: usize,
    /// Number of distinct notification indices the module can emit.
    pub notification_count: usize,
}

/// Static descriptor of one element of a module.
#[derive(Clone, Copy)]
pub struct Element {
    pub name: &'static str,
    pub sub_element_count: usize,
    /// Mandatory element data; `None` marks the element invalid and is
    /// rejected during element initialization.
    pub data: Option<OpaqueData>,
}

/// Where a module's element table comes from.
pub enum ElementTable {
    /// A fixed table known at build time.
    Static(Vec<Element>),
    /// A generator evaluated exactly once during module initialization, so
    /// the element count may depend on runtime-discovered topology.
    Generate(fn(module_id: FwkId) -> Vec<Element>),
}

impl ElementTable {
    /// An empty static table, for modules without elements.
    pub fn none() -> Self {
        ElementTable::Static(Vec::new())
    }
}

/// Static per-module configuration.
pub struct ModuleConfig {
    pub elements: ElementTable,
    pub data: Option<OpaqueData>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        ModuleConfig { elements: ElementTable::none(), data: None }
    }
}

/// Bind-phase round. APIs collected in the first round may only be invoked
/// from the second round on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindRound {
    /// Collect dependencies.
    Collect,
    /// Resolve cycles and late bindings.
    Resolve,
}

/// Outcome of event processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The request is fully handled; the scheduler posts the response if one
    /// was requested.
    Completed,
    /// Completion is asynchronous. The automatic response is suppressed and
    /// the module posts it itself once the operation finishes.
    Pending,
}

/// A type-erased handle to an API vtable owned by a module for the lifetime
/// of the program.
///
/// The owner wraps a `&'static dyn SomeApiTrait` with [`ApiRef::new`]; the
/// requester recovers it with [`ApiRef::downcast`]. Handles are written once
/// during the bind phase and read-only thereafter.
#[derive(Clone, Copy)]
pub struct ApiRef(&'static (dyn Any + Send + Sync));

impl ApiRef {
    /// Wraps a static API object. `A` is typically a trait object type such
    /// as `dyn PowerDomainDriver`.
    pub fn new<A: ?Sized + 'static>(api: &'static A) -> Self
    where
        &'static A: Any + Send + Sync,
    {
        // Leak a thin cell holding the (possibly wide) reference; bind-phase
        // allocations are never released, matching the pre-runtime allocator
        // contract.
        ApiRef(Box::leak(Box::new(api)))
    }

    /// Recovers the typed API reference, failing with `E_ACCESS` if this
    /// handle wraps a different API type.
    pub fn downcast<A: ?Sized + 'static>(&self) -> Result<&'static A>
    where
        &'static A: Any,
    {
        self.0.downcast_ref::<&'static A>().copied().ok_or(FwkError::Access)
    }
}

impl core::fmt::Debug for ApiRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ApiRef")
    }
}

/// Lifecycle callbacks of a module.
///
/// Only [`init`](Module::init) is mandatory. The default implementations of
/// the remaining callbacks make the corresponding capability absent:
/// phases succeed trivially, while `element_init`, `process_bind_request`,
/// `process_event`, and `process_notification` fail with `E_SUPPORT` if the
/// registry or scheduler ever needs them.
pub trait Module: Send {
    /// MODULE_INIT. `element_count` is the resolved length of the element
    /// table; `data` is the module configuration data.
    fn init(&mut self, module_id: FwkId, element_count: usize, data: Option<OpaqueData>) -> Result<()>;

    /// ELEMENT_INIT, called once per element in index order.
    fn element_init(&mut self, _element_id: FwkId, _sub_element_count: usize, _data: OpaqueData) -> Result<()> {
        Err(FwkError::Support)
    }

    /// POST_INIT, after all elements of all modules exist.
    fn post_init(&mut self, _module_id: FwkId) -> Result<()> {
        Ok(())
    }

    /// BIND, called per round with the module identifier first, then with
    /// every element identifier the module owns.
    fn bind(&mut self, _id: FwkId, _round: BindRound) -> Result<()> {
        Ok(())
    }

    /// START, module first then elements in index order.
    fn start(&mut self, _id: FwkId) -> Result<()> {
        Ok(())
    }

    /// Answers a bind request from `source_id` for API `api_id` on
    /// `target_id` (this module or one of its elements).
    fn process_bind_request(&mut self, _source_id: FwkId, _target_id: FwkId, _api_id: FwkId) -> Result<ApiRef> {
        Err(FwkError::Support)
    }

    /// Handles an event addressed to this module or one of its elements.
    fn process_event(&mut self, _event: &Event, _response: &mut Event) -> Result<EventOutcome> {
        Err(FwkError::Support)
    }

    /// Handles a notification (or a notification response) addressed to this
    /// module or one of its elements.
    fn process_notification(&mut self, _event: &Event, _response: &mut Event) -> Result<()> {
        Err(FwkError::Support)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Sync {
        fn greeting(&self) -> &'static str;
    }

    struct EnglishGreeter;
    impl Greeter for EnglishGreeter {
        fn greeting(&self) -> &'static str {
            "hello"
        }
    }

    trait Other: Sync {}

    static GREETER: EnglishGreeter = EnglishGreeter;

    #[test]
    fn api_ref_round_trips_a_trait_object() {
        let api = ApiRef::new(&GREETER as &dyn Greeter);
        let greeter = api.downcast::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greeting(), "hello");
    }

    #[test]
    fn api_ref_rejects_a_mismatched_type() {
        let api = ApiRef::new(&GREETER as &dyn Greeter);
        assert_eq!(api.downcast::<dyn Other>().err(), Some(FwkError::Access));
    }

    struct Minimal;
    impl Module for Minimal {
        fn init(&mut self, _: FwkId, _: usize, _: Option<OpaqueData>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn absent_callbacks_default_to_unsupported() {
        let mut m = Minimal;
        assert!(m.post_init(FwkId::module(0)).is_ok());
        assert!(m.bind(FwkId::module(0), BindRound::Collect).is_ok());
        assert!(m.start(FwkId::module(0)).is_ok());
        let event = Event::default();
        let mut response = Event::default();
        assert_eq!(m.process_event(&event, &mut response).err(), Some(FwkError::Support));
        assert_eq!(m.process_notification(&event, &mut response).err(), Some(FwkError::Support));
        assert_eq!(
            m.process_bind_request(FwkId::module(1), FwkId::module(0), FwkId::api(0, 0)).err(),
            Some(FwkError::Support)
        );
    }
}
