//! Interrupt-driver contract.
//!
//! The framework core delegates every interrupt operation to a driver
//! implementing this trait, registered once during architecture
//! initialization. Drivers wrap their controller registers with interior
//! mutability; the framework only ever holds a shared reference.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::error::Result;

/// An interrupt service routine without a parameter.
pub type IsrFn = fn();

/// An interrupt service routine taking the parameter registered with it.
pub type IsrParamFn = fn(usize);

/// The interrupt line currently being serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqLine {
    /// A numbered peripheral interrupt line.
    Line(u32),
    /// The non-maskable interrupt vector.
    Nmi,
    /// A fault or exception vector.
    Fault,
}

/// Contract an interrupt controller driver must implement.
///
/// `global_disable` returns the controller flags prior to masking;
/// `global_enable` restores them. Implementations must make the pair
/// nestable: restoring the flags returned by the outermost `global_disable`
/// re-enables interrupts exactly when the outermost critical section ends.
#[cfg_attr(feature = "mockall", mockall::automock)]
pub trait InterruptDriver: Sync {
    /// Masks all interrupts, returning the prior flags.
    fn global_disable(&self) -> u32;

    /// Restores the flags returned by the matching [`global_disable`](InterruptDriver::global_disable).
    fn global_enable(&self, flags: u32);

    /// Whether interrupt line `irq` is enabled.
    fn is_enabled(&self, irq: u32) -> Result<bool>;

    /// Enables interrupt line `irq`.
    fn enable(&self, irq: u32) -> Result<()>;

    /// Disables interrupt line `irq`.
    fn disable(&self, irq: u32) -> Result<()>;

    /// Whether interrupt line `irq` is pending.
    fn is_pending(&self, irq: u32) -> Result<bool>;

    /// Marks interrupt line `irq` pending.
    fn set_pending(&self, irq: u32) -> Result<()>;

    /// Clears the pending state of interrupt line `irq`.
    fn clear_pending(&self, irq: u32) -> Result<()>;

    /// Registers the service routine for interrupt line `irq`.
    fn set_isr(&self, irq: u32, isr: IsrFn) -> Result<()>;

    /// Registers a service routine with a parameter for interrupt line `irq`.
    fn set_isr_param(&self, irq: u32, isr: IsrParamFn, param: usize) -> Result<()>;

    /// Registers the non-maskable interrupt service routine.
    fn set_isr_nmi(&self, isr: IsrFn) -> Result<()>;

    /// Registers the fault vector service routine.
    fn set_isr_fault(&self, isr: IsrFn) -> Result<()>;

    /// The line being serviced, or `None` outside interrupt context.
    fn get_current(&self) -> Option<IrqLine>;

    /// Whether execution is currently inside any interrupt service routine.
    fn is_interrupt_context(&self) -> bool;
}
