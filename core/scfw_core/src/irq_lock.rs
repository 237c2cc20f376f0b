//! Interrupt-masked locking support.
//!
//! This module provides a Mutex implementation that masks interrupts through
//! the registered interrupt driver for the duration of the guard. Before a
//! driver is registered, locks collapse to a basic spin lock with no
//! interrupt interaction. The framework is single-threaded and cooperative:
//! contention on one of these locks is always either an interrupt racing the
//! main loop (prevented by the masking) or a re-entrancy bug, which panics.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
use core::{
    cell::UnsafeCell,
    fmt,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::interrupt;

/// Used to guard data with a locked mutex and masked interrupts.
pub struct IrqMutex<T: ?Sized> {
    lock: AtomicBool,
    name: &'static str,
    data: UnsafeCell<T>,
}

/// Wrapper for guarded data, which can be accessed by Deref or DerefMut on
/// this object.
pub struct IrqGuard<'a, T: ?Sized + 'a> {
    restore_flags: Option<u32>,
    lock: &'a AtomicBool,
    data: *mut T,
}

unsafe impl<T: ?Sized + Send> Sync for IrqMutex<T> {}
unsafe impl<T: ?Sized + Send> Send for IrqMutex<T> {}

unsafe impl<T: ?Sized + Sync> Sync for IrqGuard<'_, T> {}
unsafe impl<T: ?Sized + Send> Send for IrqGuard<'_, T> {}

impl<T> IrqMutex<T> {
    /// Instantiates a new IrqMutex with the given data object and name string.
    pub const fn new(data: T, name: &'static str) -> Self {
        Self { lock: AtomicBool::new(false), name, data: UnsafeCell::new(data) }
    }
}

impl<T: ?Sized> IrqMutex<T> {
    /// Locks the IrqMutex and returns an IrqGuard object used to access the
    /// data. Interrupts are masked until the guard is dropped.
    ///
    /// Safety: Lock reentrance is not supported; an attempt to re-lock
    /// something already locked will panic.
    pub fn lock(&self) -> IrqGuard<'_, T> {
        self.try_lock().unwrap_or_else(|| panic!("Re-entrant locks for {:?} not permitted.", self.name))
    }

    /// Attempts to lock the IrqMutex, and if successful, returns a guard
    /// object that can be used to access the data.
    pub fn try_lock(&self) -> Option<IrqGuard<'_, T>> {
        let restore_flags = interrupt::registered_driver().map(|driver| driver.global_disable());
        if self.lock.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_ok() {
            Some(IrqGuard { restore_flags, lock: &self.lock, data: unsafe { &mut *self.data.get() } })
        } else {
            if let Some(flags) = restore_flags {
                if let Some(driver) = interrupt::registered_driver() {
                    driver.global_enable(flags);
                }
            }
            None
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for IrqMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => write!(f, "Mutex {{ data: ").and_then(|()| (*guard).fmt(f)).and_then(|()| write!(f, "}}")),
            None => write!(f, "Mutex {{ <locked> }}"),
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for IrqGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<'a, T: ?Sized> Deref for IrqGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &'a T {
        //Safety: data is only accessible through the lock, which is held for
        //the guard's lifetime.
        unsafe { &*self.data }
    }
}

impl<'a, T: ?Sized> DerefMut for IrqGuard<'a, T> {
    fn deref_mut(&mut self) -> &'a mut T {
        //Safety: data is only accessible through the lock, which is held for
        //the guard's lifetime.
        unsafe { &mut *self.data }
    }
}

impl<T: ?Sized> Drop for IrqGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.store(false, Ordering::Release);
        if let Some(flags) = self.restore_flags {
            if let Some(driver) = interrupt::registered_driver() {
                driver.global_enable(flags);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IrqMutex;
    use crate::interrupt;
    use crate::test_support::{self, FakeInterruptDriver};

    #[test]
    fn irq_mutex_can_be_created_and_locked() {
        test_support::with_global_lock(|| {
            let mutex = IrqMutex::new(1_usize, "test_lock");
            *mutex.lock() = 2_usize;
            assert_eq!(2_usize, *mutex.lock());
        })
        .unwrap();
    }

    #[test]
    fn irq_mutex_masks_interrupts_while_held() {
        test_support::with_global_lock(|| {
            let driver: &'static FakeInterruptDriver = Box::leak(Box::new(FakeInterruptDriver::new()));
            interrupt::register_driver(driver).unwrap();

            let mutex = IrqMutex::new(1_usize, "test_lock");
            let guard = mutex.lock();
            assert!(driver.interrupts_masked());
            drop(guard);
            assert!(!driver.interrupts_masked());
        })
        .unwrap();
    }

    #[test]
    fn irq_mutex_nests_mask_state_across_distinct_locks() {
        test_support::with_global_lock(|| {
            let driver: &'static FakeInterruptDriver = Box::leak(Box::new(FakeInterruptDriver::new()));
            interrupt::register_driver(driver).unwrap();

            let outer = IrqMutex::new((), "outer");
            let inner = IrqMutex::new((), "inner");
            let outer_guard = outer.lock();
            {
                let _inner_guard = inner.lock();
                assert!(driver.interrupts_masked());
            }
            // Inner release must not unmask while the outer guard lives.
            assert!(driver.interrupts_masked());
            drop(outer_guard);
            assert!(!driver.interrupts_masked());
        })
        .unwrap();
    }

    #[test]
    fn try_lock_fails_on_a_held_lock() {
        test_support::with_global_lock(|| {
            let mutex = IrqMutex::new((), "test_lock");
            let _guard = mutex.lock();
            assert!(mutex.try_lock().is_none());
        })
        .unwrap();
    }
}
