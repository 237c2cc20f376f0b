//! Interrupt shim.
//!
//! Modules reach the interrupt controller through these free functions. All
//! operations delegate to the driver registered once during architecture
//! initialization; before registration every operation fails with `E_INIT`.
//! The shim additionally tracks the global mask nesting depth so that
//! unbalanced enable calls surface as `E_STATE` instead of silently
//! unmasking inside an outer critical section.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::sync::atomic::{AtomicU32, Ordering};

use scfw_sdk::error::{FwkError, Result};
use scfw_sdk::interrupt::{InterruptDriver, IrqLine, IsrFn, IsrParamFn};

static DRIVER: spin::RwLock<Option<&'static dyn InterruptDriver>> = spin::RwLock::new(None);
static DISABLE_DEPTH: AtomicU32 = AtomicU32::new(0);

/// Registers the interrupt driver. May be called exactly once.
pub fn register_driver(driver: &'static dyn InterruptDriver) -> Result<()> {
    let mut slot = DRIVER.write();
    if slot.is_some() {
        return Err(FwkError::State);
    }
    *slot = Some(driver);
    Ok(())
}

/// The registered driver, if any. Used by the locking primitive, which
/// collapses to a plain spin lock before registration.
pub(crate) fn registered_driver() -> Option<&'static dyn InterruptDriver> {
    *DRIVER.read()
}

fn driver() -> Result<&'static dyn InterruptDriver> {
    registered_driver().ok_or(FwkError::Init)
}

/// Masks all interrupts and returns the flags to pass to the matching
/// [`global_enable`]. Nestable: only the outermost restore unmasks.
pub fn global_disable() -> Result<u32> {
    let flags = driver()?.global_disable();
    DISABLE_DEPTH.fetch_add(1, Ordering::SeqCst);
    Ok(flags)
}

/// Restores the mask state captured by the matching [`global_disable`].
pub fn global_enable(flags: u32) -> Result<()> {
    let driver = driver()?;
    if DISABLE_DEPTH
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| depth.checked_sub(1))
        .is_err()
    {
        return Err(FwkError::State);
    }
    driver.global_enable(flags);
    Ok(())
}

/// Whether interrupt line `irq` is enabled.
pub fn is_enabled(irq: u32) -> Result<bool> {
    driver()?.is_enabled(irq)
}

/// Enables interrupt line `irq`.
pub fn enable(irq: u32) -> Result<()> {
    driver()?.enable(irq)
}

/// Disables interrupt line `irq`.
pub fn disable(irq: u32) -> Result<()> {
    driver()?.disable(irq)
}

/// Whether interrupt line `irq` is pending.
pub fn is_pending(irq: u32) -> Result<bool> {
    driver()?.is_pending(irq)
}

/// Marks interrupt line `irq` pending.
pub fn set_pending(irq: u32) -> Result<()> {
    driver()?.set_pending(irq)
}

/// Clears the pending state of interrupt line `irq`.
pub fn clear_pending(irq: u32) -> Result<()> {
    driver()?.clear_pending(irq)
}

/// Registers the service routine for interrupt line `irq`.
pub fn set_isr(irq: u32, isr: IsrFn) -> Result<()> {
    driver()?.set_isr(irq, isr)
}

/// Registers a service routine with a parameter for interrupt line `irq`.
pub fn set_isr_param(irq: u32, isr: IsrParamFn, param: usize) -> Result<()> {
    driver()?.set_isr_param(irq, isr, param)
}

/// Registers the non-maskable interrupt service routine.
pub fn set_isr_nmi(isr: IsrFn) -> Result<()> {
    driver()?.set_isr_nmi(isr)
}

/// Registers the fault vector service routine.
pub fn set_isr_fault(isr: IsrFn) -> Result<()> {
    driver()?.set_isr_fault(isr)
}

/// The interrupt line currently being serviced, if any.
pub fn get_current() -> Result<Option<IrqLine>> {
    Ok(driver()?.get_current())
}

/// Whether execution is currently inside an interrupt service routine.
/// Conservatively `false` before driver registration.
pub fn is_interrupt_context() -> bool {
    registered_driver().is_some_and(|d| d.is_interrupt_context())
}

#[cfg(any(test, feature = "test_support"))]
#[doc(hidden)]
pub unsafe fn reset() {
    *DRIVER.write() = None;
    DISABLE_DEPTH.store(0, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, FakeInterruptDriver};
    use scfw_sdk::interrupt::MockInterruptDriver;

    fn noop_isr() {}

    #[test]
    fn operations_fail_before_registration() {
        test_support::with_global_lock(|| {
            assert_eq!(global_disable().err(), Some(FwkError::Init));
            assert_eq!(global_enable(0).err(), Some(FwkError::Init));
            assert_eq!(enable(3).err(), Some(FwkError::Init));
            assert_eq!(disable(3).err(), Some(FwkError::Init));
            assert_eq!(is_enabled(3).err(), Some(FwkError::Init));
            assert_eq!(set_pending(3).err(), Some(FwkError::Init));
            assert_eq!(clear_pending(3).err(), Some(FwkError::Init));
            assert_eq!(is_pending(3).err(), Some(FwkError::Init));
            assert_eq!(set_isr(3, noop_isr).err(), Some(FwkError::Init));
            assert_eq!(set_isr_nmi(noop_isr).err(), Some(FwkError::Init));
            assert_eq!(set_isr_fault(noop_isr).err(), Some(FwkError::Init));
            assert_eq!(get_current().err(), Some(FwkError::Init));
            assert!(!is_interrupt_context());
        })
        .unwrap();
    }

    #[test]
    fn registration_is_one_shot() {
        test_support::with_global_lock(|| {
            let driver: &'static FakeInterruptDriver = Box::leak(Box::new(FakeInterruptDriver::new()));
            assert!(register_driver(driver).is_ok());
            assert_eq!(register_driver(driver).err(), Some(FwkError::State));
        })
        .unwrap();
    }

    #[test]
    fn per_line_operations_delegate_to_the_driver() {
        test_support::with_global_lock(|| {
            let mut mock = MockInterruptDriver::new();
            mock.expect_enable().withf(|&irq| irq == 9).times(1).returning(|_| Ok(()));
            mock.expect_disable().withf(|&irq| irq == 9).times(1).returning(|_| Ok(()));
            mock.expect_is_enabled().withf(|&irq| irq == 9).times(1).returning(|_| Ok(true));
            mock.expect_clear_pending().withf(|&irq| irq == 9).times(1).returning(|_| Ok(()));
            mock.expect_get_current().times(1).returning(|| Some(IrqLine::Line(9)));
            let driver: &'static MockInterruptDriver = Box::leak(Box::new(mock));
            register_driver(driver).unwrap();

            assert!(enable(9).is_ok());
            assert!(disable(9).is_ok());
            assert_eq!(is_enabled(9), Ok(true));
            assert!(clear_pending(9).is_ok());
            assert_eq!(get_current(), Ok(Some(IrqLine::Line(9))));
        })
        .unwrap();
    }

    #[test]
    fn global_mask_nesting_restores_the_outermost_state() {
        test_support::with_global_lock(|| {
            let driver: &'static FakeInterruptDriver = Box::leak(Box::new(FakeInterruptDriver::new()));
            register_driver(driver).unwrap();

            let outer = global_disable().unwrap();
            let inner = global_disable().unwrap();
            assert!(driver.interrupts_masked());
            global_enable(inner).unwrap();
            assert!(driver.interrupts_masked());
            global_enable(outer).unwrap();
            assert!(!driver.interrupts_masked());
        })
        .unwrap();
    }

    #[test]
    fn unbalanced_global_enable_is_rejected() {
        test_support::with_global_lock(|| {
            let driver: &'static FakeInterruptDriver = Box::leak(Box::new(FakeInterruptDriver::new()));
            register_driver(driver).unwrap();
            assert_eq!(global_enable(1).err(), Some(FwkError::State));
        })
        .unwrap();
    }
}
