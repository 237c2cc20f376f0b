//! Notification bus.
//!
//! Many-to-many publish/subscribe built atop the event scheduler. A
//! subscription ties `(notification, source)` to a target entity;
//! subscription records are drawn from a pool whose capacity is fixed when
//! the framework is assembled. Delivery clones the notification event once
//! per subscriber and posts it through the scheduler, so per-source ordering
//! follows queue FIFO ordering.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use scfw_sdk::error::{FwkError, Result};
use scfw_sdk::event::Event;
use scfw_sdk::id::FwkId;

use crate::interrupt;
use crate::irq_lock::IrqMutex;
use crate::registry::{Phase, REGISTRY};
use crate::scheduler;

// The main implementation of the subscription store; public interaction is
// via the free functions below, which scope the lock.
struct NotificationDb {
    /// Subscription records still available; `free + Σ list lengths` always
    /// equals the configured capacity.
    free: usize,
    capacity: usize,
    subscribers: BTreeMap<(FwkId, FwkId), Vec<FwkId>>,
}

static NOTIFICATIONS: IrqMutex<NotificationDb> =
    IrqMutex::new(NotificationDb { free: 0, capacity: 0, subscribers: BTreeMap::new() }, "notifications");

/// Sizes the subscription pool. Called once by [`crate::Core::start`].
pub(crate) fn init(capacity: usize) -> Result<()> {
    let mut db = NOTIFICATIONS.lock();
    if db.capacity != 0 || !db.subscribers.is_empty() {
        return Err(FwkError::State);
    }
    db.capacity = capacity;
    db.free = capacity;
    Ok(())
}

fn validate_subscription_ids(notification_id: FwkId, source_id: FwkId, target_id: FwkId) -> Result<()> {
    if !REGISTRY.is_valid_notification_id(notification_id)
        || !REGISTRY.is_valid_entity_id(source_id)
        || !REGISTRY.is_valid_entity_id(target_id)
        || notification_id.module_idx() != source_id.module_idx()
    {
        return Err(FwkError::Param);
    }
    Ok(())
}

/// Subscribes `target_id` to `notification_id` as emitted by `source_id`.
///
/// Subscriptions may be registered from the START phase onward, never from
/// interrupt context. A duplicate `(source, target)` subscription on the
/// same notification fails with `E_STATE`; an exhausted pool with `E_NOMEM`.
pub fn subscribe(notification_id: FwkId, source_id: FwkId, target_id: FwkId) -> Result<()> {
    if interrupt::is_interrupt_context() {
        return Err(FwkError::Access);
    }
    if !matches!(REGISTRY.phase(), Phase::Start | Phase::Running) {
        return Err(FwkError::State);
    }
    validate_subscription_ids(notification_id, source_id, target_id)?;

    let mut db = NOTIFICATIONS.lock();
    if db.free == 0 {
        log::error!("Subscription pool exhausted ({} records)", db.capacity);
        return Err(FwkError::NoMem);
    }
    let list = db.subscribers.entry((notification_id, source_id)).or_default();
    if list.contains(&target_id) {
        return Err(FwkError::State);
    }
    list.push(target_id);
    db.free -= 1;
    Ok(())
}

/// Removes the matching subscription, failing with `E_STATE` if none exists.
pub fn unsubscribe(notification_id: FwkId, source_id: FwkId, target_id: FwkId) -> Result<()> {
    if interrupt::is_interrupt_context() {
        return Err(FwkError::Access);
    }
    validate_subscription_ids(notification_id, source_id, target_id)?;

    let mut db = NOTIFICATIONS.lock();
    let list = db.subscribers.get_mut(&(notification_id, source_id)).ok_or(FwkError::State)?;
    let position = list.iter().position(|t| *t == target_id).ok_or(FwkError::State)?;
    list.remove(position);
    db.free += 1;
    Ok(())
}

/// Publishes `event` to every subscriber of `(event.id, event.source_id)`.
///
/// Callable from module or interrupt context; the interrupt path posts
/// through the ISR queue. Returns the number of successfully posted
/// notification events. Delivery is best-effort: posts lost to a full queue
/// are counted as dropped and do not fail the caller.
pub fn notify(mut event: Event) -> Result<u32> {
    let from_isr = interrupt::is_interrupt_context();
    if !REGISTRY.is_valid_entity_id(event.source_id) {
        if from_isr {
            return Err(FwkError::Param);
        }
        // Inside a handler the emitter is the entity the current event was
        // addressed to.
        match scheduler::get_current_event() {
            Some(current) => event.source_id = current.target_id,
            None => return Err(FwkError::Param),
        }
    }
    if !REGISTRY.is_valid_notification_id(event.id) || event.id.module_idx() != event.source_id.module_idx() {
        return Err(FwkError::Param);
    }

    event.is_response = false;
    event.is_notification = true;

    let targets = NOTIFICATIONS.lock().subscribers.get(&(event.id, event.source_id)).cloned().unwrap_or_default();

    let mut count = 0u32;
    for target_id in targets {
        let mut notification = event;
        notification.target_id = target_id;
        let posted = if from_isr {
            scheduler::put_event_from_isr(notification)
        } else {
            scheduler::put_event(notification).is_ok()
        };
        if posted {
            count += 1;
        }
    }
    Ok(count)
}

/// Number of unused records left in the subscription pool.
pub fn free_subscription_count() -> usize {
    NOTIFICATIONS.lock().free
}

#[cfg(any(test, feature = "test_support"))]
#[doc(hidden)]
pub unsafe fn reset() {
    let mut db = NOTIFICATIONS.lock();
    db.subscribers.clear();
    db.free = 0;
    db.capacity = 0;
}
