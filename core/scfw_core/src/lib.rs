//! SCFW framework core.
//!
//! The runtime of a module-based system-control firmware: a statically
//! enumerated registry of modules and their elements, driven through strict
//! lifecycle phases; a cooperative, single-threaded event scheduler with
//! separate normal and interrupt queues; a nestable interrupt shim; and a
//! notification bus built on the scheduler.
//!
//! A product assembles its firmware with the [`Core`] builder:
//!
//! ``` rust,no_run
//! use scfw_core::Core;
//! use scfw_sdk::error::Result;
//! use scfw_sdk::id::FwkId;
//! use scfw_sdk::module::{Module, ModuleConfig, ModuleDescriptor, ModuleKind, OpaqueData};
//! # struct Watchdog;
//! # impl Module for Watchdog {
//! #     fn init(&mut self, _: FwkId, _: usize, _: Option<OpaqueData>) -> Result<()> { Ok(()) }
//! # }
//! Core::new()
//!     .with_module(
//!         ModuleDescriptor { kind: ModuleKind::Driver, api_count: 0, event_count: 0, notification_count: 0 },
//!         Box::new(Watchdog),
//!         ModuleConfig::default(),
//!     )
//!     .start()
//!     .unwrap();
//! scfw_core::run(|| {});
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod interrupt;
pub mod irq_lock;
pub mod mm;
pub mod notification;
pub mod registry;
pub mod ring;
pub mod scheduler;

#[cfg(any(test, feature = "test_support"))]
pub mod test_support;

use alloc::boxed::Box;
use alloc::vec::Vec;

use scfw_sdk::error::Result;
use scfw_sdk::interrupt::InterruptDriver;
use scfw_sdk::module::{Module, ModuleConfig, ModuleDescriptor};

pub use notification::{notify, subscribe, unsubscribe};
pub use registry::{module_bind, ModuleState};
pub use scheduler::{
    dropped_event_count, get_current_event, process_event_queue, put_event, put_event_from_isr,
};

const DEFAULT_NORMAL_QUEUE_DEPTH: usize = 16;
const DEFAULT_ISR_QUEUE_DEPTH: usize = 8;
const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 64;

/// Assembles and initializes a firmware image.
///
/// Modules are registered in order; registration order defines the module
/// index namespace used by every identifier. [`start`](Core::start) runs the
/// lifecycle phases (MODULE_INIT, ELEMENT_INIT, POST_INIT, two BIND rounds,
/// START) with interrupts globally masked, and leaves the framework ready
/// for [`run`] or [`process_event_queue`].
pub struct Core {
    modules: Vec<(ModuleDescriptor, Box<dyn Module>, ModuleConfig)>,
    normal_queue_depth: usize,
    isr_queue_depth: usize,
    subscription_capacity: usize,
    interrupt_driver: Option<&'static dyn InterruptDriver>,
}

impl Core {
    pub fn new() -> Self {
        Core {
            modules: Vec::new(),
            normal_queue_depth: DEFAULT_NORMAL_QUEUE_DEPTH,
            isr_queue_depth: DEFAULT_ISR_QUEUE_DEPTH,
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            interrupt_driver: None,
        }
    }

    /// Registers a module. Its index is the number of modules registered
    /// before it.
    pub fn with_module(mut self, desc: ModuleDescriptor, module: Box<dyn Module>, config: ModuleConfig) -> Self {
        self.modules.push((desc, module, config));
        self
    }

    /// Registers the architecture interrupt driver.
    pub fn with_interrupt_driver(mut self, driver: &'static dyn InterruptDriver) -> Self {
        self.interrupt_driver = Some(driver);
        self
    }

    /// Overrides the event queue depths.
    pub fn with_queue_depths(mut self, normal: usize, isr: usize) -> Self {
        self.normal_queue_depth = normal;
        self.isr_queue_depth = isr;
        self
    }

    /// Overrides the notification subscription pool capacity.
    pub fn with_subscription_capacity(mut self, capacity: usize) -> Self {
        self.subscription_capacity = capacity;
        self
    }

    /// Initializes the framework and drives every module through the
    /// lifecycle. Any failure aborts the remaining phases and surfaces here.
    pub fn start(self) -> Result<()> {
        if let Some(driver) = self.interrupt_driver {
            interrupt::register_driver(driver)?;
        }
        scheduler::init(self.normal_queue_depth, self.isr_queue_depth)?;
        notification::init(self.subscription_capacity)?;
        for (desc, module, config) in self.modules {
            registry::REGISTRY.add_module(desc, module, config)?;
        }

        // Interrupts stay masked for the whole lifecycle; event processing
        // begins only once the caller enters the scheduler loop.
        let flags = interrupt::registered_driver().map(|driver| driver.global_disable());
        let result = registry::run_lifecycle();
        if let (Some(flags), Some(driver)) = (flags, interrupt::registered_driver()) {
            driver.global_enable(flags);
        }
        result
    }
}

impl Default for Core {
    fn default() -> Self {
        Core::new()
    }
}

/// The framework main loop: dispatch queued events, invoking `idle` whenever
/// both queues are empty.
pub fn run(idle: impl FnMut()) -> ! {
    scheduler::run(idle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use scfw_sdk::error::FwkError;
    use scfw_sdk::id::FwkId;
    use scfw_sdk::module::{ModuleKind, OpaqueData};

    struct Nop;
    impl Module for Nop {
        fn init(&mut self, _: FwkId, _: usize, _: Option<OpaqueData>) -> Result<()> {
            Ok(())
        }
    }

    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor { kind: ModuleKind::Service, api_count: 0, event_count: 0, notification_count: 0 }
    }

    #[test]
    fn start_brings_modules_to_started() {
        test_support::with_global_lock(|| {
            Core::new().with_module(descriptor(), Box::new(Nop), ModuleConfig::default()).start().unwrap();
            assert_eq!(registry::REGISTRY.module_state(0).unwrap(), ModuleState::Started);
        })
        .unwrap();
    }

    #[test]
    fn start_twice_is_rejected() {
        test_support::with_global_lock(|| {
            Core::new().with_module(descriptor(), Box::new(Nop), ModuleConfig::default()).start().unwrap();
            assert_eq!(
                Core::new().with_module(descriptor(), Box::new(Nop), ModuleConfig::default()).start().err(),
                Some(FwkError::State)
            );
        })
        .unwrap();
    }

    #[test]
    fn interrupts_are_masked_during_lifecycle() {
        test_support::with_global_lock(|| {
            struct MaskProbe {
                driver: &'static test_support::FakeInterruptDriver,
            }
            impl Module for MaskProbe {
                fn init(&mut self, _: FwkId, _: usize, _: Option<OpaqueData>) -> Result<()> {
                    assert!(self.driver.interrupts_masked());
                    Ok(())
                }
                fn start(&mut self, _: FwkId) -> Result<()> {
                    assert!(self.driver.interrupts_masked());
                    Ok(())
                }
            }

            let driver: &'static test_support::FakeInterruptDriver =
                alloc::boxed::Box::leak(alloc::boxed::Box::new(test_support::FakeInterruptDriver::new()));
            Core::new()
                .with_interrupt_driver(driver)
                .with_module(descriptor(), Box::new(MaskProbe { driver }), ModuleConfig::default())
                .start()
                .unwrap();
            assert!(!driver.interrupts_masked());
        })
        .unwrap();
    }
}
