//! Power-state transition engine.
//!
//! Single-domain transitions follow the protocol: permission checks against
//! the parent's and children's allowed-state masks, coalescing onto an
//! in-flight transition, an acknowledged pre-transition notification round,
//! then the driver request. Tree operations chain single-domain transitions
//! in dependency order, advanced by each driver's transition report.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use scfw_sdk::error::{FwkError, Result, STATUS_SUCCESS};
use scfw_sdk::event::{Event, StatusParams};
use scfw_sdk::id::FwkId;

use crate::ctx::Context;
use crate::state::{PowerState, PreTransitionParams, TransitionParams};
use crate::{EVENT_IDX_SET_STATE, NOTIFICATION_IDX_PRE_TRANSITION, NOTIFICATION_IDX_TRANSITION};

/// Originator of a request that expects a response.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Requester {
    pub source_id: FwkId,
    pub cookie: u32,
}

/// A composite operation: single-domain transitions queued in dependency
/// order, advanced as each one completes.
pub(crate) struct TreeOp {
    pub steps: VecDeque<(usize, PowerState)>,
    pub requester: Option<Requester>,
    /// Domain the originating request addressed; source of the final
    /// response.
    pub origin: usize,
    /// Event index of the originating request, echoed in the response.
    pub event_idx: u8,
}

/// Whether a request finished synchronously or is completing through events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    Done,
    InFlight,
}

/// Posts a response event for a request the module answers asynchronously.
pub(crate) fn respond(source_id: FwkId, event_idx: u8, requester: Requester, status: i32) {
    let mut event =
        Event::new(FwkId::event(source_id.module_idx() as u8, event_idx), source_id, requester.source_id);
    event.is_response = true;
    event.cookie = requester.cookie;
    event.params.write(&StatusParams { status });
    if let Err(err) = scfw_core::put_event(event) {
        log::error!("Response to {:?} lost: {}", requester.source_id, err);
    }
}

/// Responds to every requester waiting on domain `idx`.
pub(crate) fn respond_to_pending(ctx: &mut Context, idx: usize, status: i32) {
    let Ok(pd) = ctx.pd_mut(idx) else { return };
    let source_id = pd.id;
    for requester in core::mem::take(&mut pd.pending_requests) {
        respond(source_id, EVENT_IDX_SET_STATE, requester, status);
    }
}

/// Cancels the active tree operation, reporting `status` to its originator.
pub(crate) fn abort_tree_op(ctx: &mut Context, status: i32) {
    if let Some(op) = ctx.tree_op.take() {
        if let Some(requester) = op.requester {
            if let Ok(pd) = ctx.pd(op.origin) {
                respond(pd.id, op.event_idx, requester, status);
            }
        }
    }
}

/// Set-state request entry point for a single domain.
pub(crate) fn process_set_state_request(
    ctx: &mut Context,
    idx: usize,
    state: PowerState,
    requester: Option<Requester>,
) -> Result<Progress> {
    {
        let pd = ctx.pd(idx)?;
        if pd.current_state == state && pd.state_requested_to_driver == pd.current_state {
            return Ok(Progress::Done);
        }
    }

    if !ctx.is_allowed_by_parent(idx, state) {
        // A power-up request implies its ancestors: queue them root-first
        // and chain the transitions.
        if state == PowerState::ON && !ctx.powered_down_ancestors(idx).is_empty() {
            if ctx.tree_op.is_some() {
                return Err(FwkError::Busy);
            }
            let steps: VecDeque<(usize, PowerState)> = ctx
                .powered_down_ancestors(idx)
                .into_iter()
                .chain(core::iter::once(idx))
                .map(|domain| (domain, PowerState::ON))
                .collect();
            ctx.tree_op = Some(TreeOp { steps, requester, origin: idx, event_idx: EVENT_IDX_SET_STATE });
            advance_tree_op(ctx)?;
            return Ok(Progress::InFlight);
        }
        return Err(FwkError::State);
    }

    if !ctx.is_allowed_by_children(idx, state) {
        return Err(FwkError::State);
    }

    {
        let pd = ctx.pd_mut(idx)?;
        if pd.state_requested_to_driver != pd.current_state {
            // A transition is in flight: coalesce without re-notifying. The
            // report path re-evaluates against the new requested state.
            pd.requested_state = state;
            pd.pre_transition.valid = false;
            if let Some(requester) = requester {
                pd.pending_requests.push(requester);
            }
            return Ok(Progress::InFlight);
        }
        pd.requested_state = state;
    }

    if initiate_pre_transition_notification(ctx, idx)? {
        if let Some(requester) = requester {
            ctx.pd_mut(idx)?.pending_requests.push(requester);
        }
        return Ok(Progress::InFlight);
    }

    initiate_power_state_transition(ctx, idx)?;
    if let Some(requester) = requester {
        ctx.pd_mut(idx)?.pending_requests.push(requester);
    }
    Ok(Progress::InFlight)
}

/// Composite request over the subtree rooted at `idx`: parents first when
/// powering up, children first when powering down.
pub(crate) fn process_subtree_request(
    ctx: &mut Context,
    idx: usize,
    state: PowerState,
    requester: Option<Requester>,
) -> Result<Progress> {
    if ctx.tree_op.is_some() {
        return Err(FwkError::Busy);
    }
    let mut domains = Vec::new();
    if state == PowerState::ON {
        domains.extend(ctx.powered_down_ancestors(idx));
        domains.extend(ctx.subtree_pre_order(idx));
    } else {
        domains.extend(ctx.subtree_post_order(idx));
    }
    let steps: VecDeque<(usize, PowerState)> = domains.into_iter().map(|domain| (domain, state)).collect();
    ctx.tree_op = Some(TreeOp { steps, requester, origin: idx, event_idx: EVENT_IDX_SET_STATE });
    advance_tree_op(ctx)?;
    Ok(Progress::InFlight)
}

/// Runs queued tree-operation steps until one goes into flight, the queue
/// empties, or a step fails. Completion and failure are reported to the
/// operation's originator.
pub(crate) fn advance_tree_op(ctx: &mut Context) -> Result<()> {
    loop {
        if ctx.tree_op.is_none() {
            return Ok(());
        }
        let next = ctx.tree_op.as_mut().and_then(|op| op.steps.pop_front());
        let Some((idx, state)) = next else {
            let op = ctx.tree_op.take().expect("checked above");
            if let Some(requester) = op.requester {
                let source_id = ctx.pd(op.origin)?.id;
                respond(source_id, op.event_idx, requester, STATUS_SUCCESS);
            }
            return Ok(());
        };
        match process_set_state_request(ctx, idx, state, None) {
            Ok(Progress::InFlight) => return Ok(()),
            Ok(Progress::Done) => continue,
            Err(err) => {
                log::error!("Tree operation step for domain {} failed: {}", idx, err);
                abort_tree_op(ctx, err.status());
                return Ok(());
            }
        }
    }
}

/// Emits the pre-transition notification round for domain `idx` if one is
/// needed. Returns whether the transition must wait for acknowledgements.
pub(crate) fn initiate_pre_transition_notification(ctx: &mut Context, idx: usize) -> Result<bool> {
    let module_idx = ctx.module_id.module_idx() as u8;
    let (source_id, current_state, state) = {
        let pd = ctx.pd(idx)?;
        if pd.disable_notifications {
            return Ok(false);
        }
        let state = pd.requested_state;
        if pd.pre_transition.valid
            && pd.pre_transition.state == state
            && pd.pre_transition.response_status == STATUS_SUCCESS
        {
            // This exact transition was already unanimously acknowledged.
            return Ok(false);
        }
        if pd.pre_transition.pending_responses != 0 {
            // Let the outstanding round finish; its completion re-evaluates.
            return Ok(true);
        }
        (pd.id, pd.current_state, state)
    };

    let mut event =
        Event::new(FwkId::notification(module_idx, NOTIFICATION_IDX_PRE_TRANSITION), source_id, FwkId::none());
    event.response_requested = true;
    event.params.write(&PreTransitionParams { current_state, target_state: state });
    let count = scfw_core::notify(event)?;

    let pd = ctx.pd_mut(idx)?;
    pd.pre_transition.state = state;
    pd.pre_transition.response_status = STATUS_SUCCESS;
    pd.pre_transition.valid = true;
    pd.pre_transition.pending_responses = count;
    Ok(count != 0)
}

/// Hands the requested state to the domain's driver.
pub(crate) fn initiate_power_state_transition(ctx: &mut Context, idx: usize) -> Result<()> {
    let (driver, driver_id, requested) = {
        let pd = ctx.pd(idx)?;
        (pd.driver.ok_or(FwkError::Init)?, pd.driver_id, pd.requested_state)
    };
    driver.set_state(driver_id, requested).map_err(|err| {
        log::error!("Driver rejected state {:?} for domain {}: {}", requested, idx, err);
        FwkError::Device
    })?;
    ctx.pd_mut(idx)?.state_requested_to_driver = requested;
    Ok(())
}

/// Handles a driver's transition report for domain `idx`.
pub(crate) fn handle_report(ctx: &mut Context, idx: usize, achieved_state: PowerState) -> Result<()> {
    let module_idx = ctx.module_id.module_idx() as u8;
    let (source_id, previous_state, notify_disabled) = {
        let pd = ctx.pd_mut(idx)?;
        let previous = pd.current_state;
        pd.current_state = achieved_state;
        (pd.id, previous, pd.disable_notifications)
    };
    log::debug!("Domain {} now in state {:?}", idx, achieved_state);

    if !notify_disabled {
        let mut event =
            Event::new(FwkId::notification(module_idx, NOTIFICATION_IDX_TRANSITION), source_id, FwkId::none());
        event.response_requested = true;
        event
            .params
            .write(&TransitionParams { previous_state, current_state: achieved_state });
        let count = scfw_core::notify(event)?;
        let pd = ctx.pd_mut(idx)?;
        pd.transition_notify.pending_responses = count;
        pd.transition_notify.state = achieved_state;
        pd.transition_notify.previous_state = previous_state;
    }

    continue_transition(ctx, idx)
}

/// Completes a transition, or keeps going when the requested state moved on
/// while the driver was busy.
pub(crate) fn continue_transition(ctx: &mut Context, idx: usize) -> Result<()> {
    let (current, requested) = {
        let pd = ctx.pd(idx)?;
        (pd.current_state, pd.requested_state)
    };

    if current == requested {
        respond_to_pending(ctx, idx, STATUS_SUCCESS);
        if ctx.tree_op.is_some() {
            advance_tree_op(ctx)?;
        }
        return Ok(());
    }

    // A newer request was coalesced during the flight.
    if !ctx.is_allowed_by_parent_and_children(idx, requested) {
        respond_to_pending(ctx, idx, FwkError::State.status());
        abort_tree_op(ctx, FwkError::State.status());
        ctx.pd_mut(idx)?.requested_state = current;
        return Ok(());
    }
    if initiate_pre_transition_notification(ctx, idx)? {
        return Ok(());
    }
    if let Err(err) = initiate_power_state_transition(ctx, idx) {
        respond_to_pending(ctx, idx, err.status());
        abort_tree_op(ctx, err.status());
    }
    Ok(())
}
