//! Framework test support.
//!
//! Code to help support testing against the framework's global state.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::any::Any;

use scfw_sdk::error::Result;
use scfw_sdk::interrupt::{InterruptDriver, IrqLine, IsrFn, IsrParamFn};

/// A global mutex used by tests to synchronize access to framework global
/// state. Tests that affect or assert things against the registry, the
/// scheduler, the notification bus, or the interrupt shim must run inside
/// [`with_global_lock`] so that parallel tests do not interact with that
/// state non-deterministically.
static GLOBAL_STATE_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// All tests touching framework globals should run from inside this. The
/// framework state is reset to empty before `f` runs.
pub fn with_global_lock<F: Fn() + std::panic::RefUnwindSafe>(f: F) -> core::result::Result<(), Box<dyn Any + Send>> {
    let _guard = GLOBAL_STATE_TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    unsafe { reset_framework() };
    std::panic::catch_unwind(|| {
        f();
    })
}

/// Resets every framework global to its pre-registration state.
pub unsafe fn reset_framework() {
    unsafe {
        crate::interrupt::reset();
        crate::registry::REGISTRY.reset();
        crate::scheduler::reset();
        crate::notification::reset();
    }
}

/// An append-only record of callback invocations, shared between test
/// modules and the test body.
pub struct CallLog(spin::Mutex<Vec<String>>);

impl CallLog {
    pub const fn new() -> Self {
        CallLog(spin::Mutex::new(Vec::new()))
    }

    pub fn record(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

impl Default for CallLog {
    fn default() -> Self {
        CallLog::new()
    }
}

/// A fresh call log with a `'static` lifetime, as module objects require.
pub fn leak_call_log() -> &'static CallLog {
    Box::leak(Box::new(CallLog::new()))
}

/// An interrupt driver fake tracking mask state, per-line state, and a
/// switchable "in interrupt context" flag, so tests can exercise the ISR
/// paths of the scheduler and notification bus from ordinary test code.
pub struct FakeInterruptDriver {
    unmasked: AtomicBool,
    in_isr: AtomicBool,
    current_line: AtomicU32,
    lines: spin::Mutex<alloc::collections::BTreeMap<u32, LineState>>,
}

#[derive(Default, Clone, Copy)]
struct LineState {
    enabled: bool,
    pending: bool,
}

impl FakeInterruptDriver {
    pub fn new() -> Self {
        FakeInterruptDriver {
            unmasked: AtomicBool::new(true),
            in_isr: AtomicBool::new(false),
            current_line: AtomicU32::new(0),
            lines: spin::Mutex::new(alloc::collections::BTreeMap::new()),
        }
    }

    /// Whether the global mask is currently applied.
    pub fn interrupts_masked(&self) -> bool {
        !self.unmasked.load(Ordering::SeqCst)
    }

    /// Simulates entering (`Some(line)`) or leaving (`None`) an interrupt
    /// service routine.
    pub fn set_interrupt_context(&self, line: Option<u32>) {
        match line {
            Some(line) => {
                self.current_line.store(line, Ordering::SeqCst);
                self.in_isr.store(true, Ordering::SeqCst);
            }
            None => self.in_isr.store(false, Ordering::SeqCst),
        }
    }
}

impl Default for FakeInterruptDriver {
    fn default() -> Self {
        FakeInterruptDriver::new()
    }
}

impl InterruptDriver for FakeInterruptDriver {
    fn global_disable(&self) -> u32 {
        self.unmasked.swap(false, Ordering::SeqCst) as u32
    }

    fn global_enable(&self, flags: u32) {
        self.unmasked.store(flags != 0, Ordering::SeqCst);
    }

    fn is_enabled(&self, irq: u32) -> Result<bool> {
        Ok(self.lines.lock().get(&irq).copied().unwrap_or_default().enabled)
    }

    fn enable(&self, irq: u32) -> Result<()> {
        self.lines.lock().entry(irq).or_default().enabled = true;
        Ok(())
    }

    fn disable(&self, irq: u32) -> Result<()> {
        self.lines.lock().entry(irq).or_default().enabled = false;
        Ok(())
    }

    fn is_pending(&self, irq: u32) -> Result<bool> {
        Ok(self.lines.lock().get(&irq).copied().unwrap_or_default().pending)
    }

    fn set_pending(&self, irq: u32) -> Result<()> {
        self.lines.lock().entry(irq).or_default().pending = true;
        Ok(())
    }

    fn clear_pending(&self, irq: u32) -> Result<()> {
        self.lines.lock().entry(irq).or_default().pending = false;
        Ok(())
    }

    fn set_isr(&self, _irq: u32, _isr: IsrFn) -> Result<()> {
        Ok(())
    }

    fn set_isr_param(&self, _irq: u32, _isr: IsrParamFn, _param: usize) -> Result<()> {
        Ok(())
    }

    fn set_isr_nmi(&self, _isr: IsrFn) -> Result<()> {
        Ok(())
    }

    fn set_isr_fault(&self, _isr: IsrFn) -> Result<()> {
        Ok(())
    }

    fn get_current(&self) -> Option<IrqLine> {
        self.in_isr.load(Ordering::SeqCst).then(|| IrqLine::Line(self.current_line.load(Ordering::SeqCst)))
    }

    fn is_interrupt_context(&self) -> bool {
        self.in_isr.load(Ordering::SeqCst)
    }
}

/// Registers a fresh leaked [`FakeInterruptDriver`] and returns it.
pub fn install_fake_interrupt_driver() -> &'static FakeInterruptDriver {
    let driver: &'static FakeInterruptDriver = Box::leak(Box::new(FakeInterruptDriver::new()));
    crate::interrupt::register_driver(driver).expect("interrupt driver already registered");
    driver
}
