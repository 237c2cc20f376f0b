//! Deferred event scheduler.
//!
//! Two fixed-capacity FIFO queues hold event records: the normal queue is
//! populated from module context, the ISR queue from interrupt context. The
//! main loop drains the ISR queue ahead of the normal queue, dispatching one
//! event at a time to the target module's handler. Handlers run to
//! completion; the only suspension point is returning from a handler.
//!
//! Queue manipulation runs under the interrupt-masked lock, so an interrupt
//! service routine can never observe a half-updated queue.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use scfw_sdk::error::{FwkError, Result};
use scfw_sdk::event::{Event, StatusParams};
use scfw_sdk::module::EventOutcome;

use crate::interrupt;
use crate::irq_lock::IrqMutex;
use crate::registry::{ModuleState, REGISTRY};
use crate::ring::Ring;

struct Queues {
    normal: Ring<Event>,
    isr: Ring<Event>,
}

struct SchedulerDb {
    queues: Option<Queues>,
    /// The event currently being dispatched, if any.
    current: Option<Event>,
    /// Events lost to ISR-queue overflow; the only error channel an
    /// interrupt service routine has.
    dropped: u32,
}

static SCHEDULER: IrqMutex<SchedulerDb> =
    IrqMutex::new(SchedulerDb { queues: None, current: None, dropped: 0 }, "scheduler");

/// Sizes and readies the event queues. Called once by [`crate::Core::start`].
pub(crate) fn init(normal_depth: usize, isr_depth: usize) -> Result<()> {
    let mut db = SCHEDULER.lock();
    if db.queues.is_some() {
        return Err(FwkError::State);
    }
    db.queues = Some(Queues { normal: Ring::new(normal_depth), isr: Ring::new(isr_depth) });
    Ok(())
}

fn validate(event: &mut Event, current: Option<&Event>) -> Result<()> {
    if !REGISTRY.is_valid_entity_id(event.source_id) {
        // A handler may leave the source unset; it defaults to the entity
        // the current event was addressed to.
        match current {
            Some(current) => event.source_id = current.target_id,
            None => return Err(FwkError::Param),
        }
    }
    if !REGISTRY.is_valid_entity_id(event.target_id) {
        return Err(FwkError::Param);
    }
    // The event index space belongs to the handling module, the notification
    // index space to the emitting module; responses travel the other way.
    let anchor = if event.is_response { event.source_id } else { event.target_id };
    if event.is_notification {
        let anchor = if event.is_response { event.target_id } else { event.source_id };
        if !REGISTRY.is_valid_notification_id(event.id) || event.id.module_idx() != anchor.module_idx() {
            return Err(FwkError::Param);
        }
    } else if !REGISTRY.is_valid_event_id(event.id) || event.id.module_idx() != anchor.module_idx() {
        return Err(FwkError::Param);
    }
    Ok(())
}

/// Queues an event for deferred processing.
///
/// From interrupt context this forwards to [`put_event_from_isr`]. A full
/// normal queue fails with `E_NOMEM` and leaves the queues unchanged. A
/// request duplicating an outstanding `(source, target, cookie)` request
/// fails with `E_STATE`.
pub fn put_event(mut event: Event) -> Result<()> {
    if interrupt::is_interrupt_context() {
        return match put_event_from_isr(event) {
            true => Ok(()),
            false => Err(FwkError::NoMem),
        };
    }
    let mut db = SCHEDULER.lock();
    let current = db.current;
    validate(&mut event, current.as_ref())?;
    let queues = db.queues.as_mut().ok_or(FwkError::Init)?;
    if event.response_requested && !event.is_response {
        let duplicate = queues.normal.iter().chain(queues.isr.iter()).any(|queued| {
            queued.response_requested
                && !queued.is_response
                && queued.source_id == event.source_id
                && queued.target_id == event.target_id
                && queued.cookie == event.cookie
        });
        if duplicate {
            return Err(FwkError::State);
        }
    }
    queues.normal.push(event).map_err(|_| FwkError::NoMem)
}

/// Queues an event from an interrupt service routine. Never blocks: on
/// overflow the event is counted as dropped and `false` is returned.
pub fn put_event_from_isr(event: Event) -> bool {
    let mut db = SCHEDULER.lock();
    let Some(queues) = db.queues.as_mut() else {
        db.dropped = db.dropped.saturating_add(1);
        return false;
    };
    if queues.isr.push(event).is_err() {
        db.dropped = db.dropped.saturating_add(1);
        return false;
    }
    true
}

/// The event currently being dispatched, if a handler is executing.
pub fn get_current_event() -> Option<Event> {
    SCHEDULER.lock().current
}

/// Number of events lost to ISR-queue overflow since startup.
pub fn dropped_event_count() -> u32 {
    SCHEDULER.lock().dropped
}

fn pop_next() -> Option<Event> {
    let mut db = SCHEDULER.lock();
    let queues = db.queues.as_mut()?;
    queues.isr.pop().or_else(|| queues.normal.pop())
}

fn dispatch(event: Event) {
    let module_idx = event.target_id.module_idx();
    let (handle, state) = match REGISTRY.dispatch_handle(module_idx) {
        Ok(found) => found,
        Err(_) => {
            // Queue validation makes this unreachable short of a logic bug.
            panic!("Event {:?} targets unknown module {}", event.id, module_idx);
        }
    };
    if !matches!(state, ModuleState::Initialized | ModuleState::Bound | ModuleState::Started) {
        log::warn!("Dropping event {:?} for module {} in state {:?}", event.id, module_idx, state);
        return;
    }

    SCHEDULER.lock().current = Some(event);

    let mut response = event;
    response.source_id = event.target_id;
    response.target_id = event.source_id;
    response.is_response = true;
    response.response_requested = false;

    let outcome = {
        let mut module = handle.lock();
        if event.is_notification {
            module.process_notification(&event, &mut response).map(|()| EventOutcome::Completed)
        } else {
            module.process_event(&event, &mut response)
        }
    };

    let respond = match outcome {
        Ok(EventOutcome::Completed) => event.response_requested,
        Ok(EventOutcome::Pending) => false,
        Err(err) => {
            log::warn!("Handler for event {:?} on module {} failed: {}", event.id, module_idx, err);
            response.params.write(&StatusParams { status: err.status() });
            event.response_requested
        }
    };

    if respond {
        if response.id.is_none() {
            response.id = event.id;
        }
        response.is_response = true;
        response.is_notification = event.is_notification;
        response.response_requested = false;
        response.source_id = event.target_id;
        response.target_id = event.source_id;
        response.cookie = event.cookie;
        let mut db = SCHEDULER.lock();
        db.current = None;
        if let Some(queues) = db.queues.as_mut() {
            if queues.normal.push(response).is_err() {
                db.dropped = db.dropped.saturating_add(1);
                log::error!("Response for event {:?} lost: normal queue full", event.id);
            }
        }
    } else {
        SCHEDULER.lock().current = None;
    }
}

/// Processes a single queued event, ISR queue first. Returns whether an
/// event was dispatched.
pub fn process_next_event() -> bool {
    match pop_next() {
        Some(event) => {
            dispatch(event);
            true
        }
        None => false,
    }
}

/// Drains both queues, dispatching until no event remains.
pub fn process_event_queue() {
    while process_next_event() {}
}

/// The scheduler main loop. `idle` runs whenever both queues are empty; a
/// platform typically flushes logs and waits for an interrupt there.
pub fn run(mut idle: impl FnMut()) -> ! {
    loop {
        if !process_next_event() {
            idle();
        }
    }
}

#[cfg(any(test, feature = "test_support"))]
#[doc(hidden)]
pub unsafe fn reset() {
    let mut db = SCHEDULER.lock();
    db.queues = None;
    db.current = None;
    db.dropped = 0;
}
