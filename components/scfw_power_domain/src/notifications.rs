//! Power-domain notification handling.
//!
//! The module emits notifications with responses requested; everything that
//! arrives back through `process_notification` is therefore a response, and
//! this module does the per-domain bookkeeping: counting acknowledgements,
//! recording vetoes, and resuming or abandoning the transition they gate.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use scfw_sdk::error::{FwkError, Result, STATUS_SUCCESS};
use scfw_sdk::event::{Event, StatusParams};
use scfw_sdk::id::{FwkId, IdKind};

use crate::ctx::Context;
use crate::state::TransitionParams;
use crate::system::perform_shutdown;
use crate::transitions::{
    abort_tree_op, initiate_power_state_transition, initiate_pre_transition_notification, respond_to_pending,
};
use crate::{NOTIFICATION_IDX_PRE_SHUTDOWN, NOTIFICATION_IDX_PRE_TRANSITION, NOTIFICATION_IDX_TRANSITION};

/// Dispatches a notification response to its per-notification handler.
pub(crate) fn process_notification_response(ctx: &mut Context, event: &Event) -> Result<()> {
    if event.id.notification_idx() == NOTIFICATION_IDX_PRE_SHUTDOWN as usize {
        return process_pre_shutdown_response(ctx);
    }

    // The remaining notifications are emitted by domain elements.
    if !event.target_id.is_kind(IdKind::Element) {
        log::error!("Notification response {:?} does not address a power domain", event.id);
        return Err(FwkError::Param);
    }
    let idx = event.target_id.element_idx();
    ctx.pd(idx)?;

    match event.id.notification_idx() as u8 {
        NOTIFICATION_IDX_PRE_TRANSITION => {
            process_pre_transition_response(ctx, idx, event.params.read::<StatusParams>().status)
        }
        NOTIFICATION_IDX_TRANSITION => process_transition_response(ctx, idx),
        _ => Err(FwkError::Support),
    }
}

fn process_pre_transition_response(ctx: &mut Context, idx: usize, status: i32) -> Result<()> {
    {
        let pd = ctx.pd_mut(idx)?;
        if pd.pre_transition.pending_responses == 0 {
            log::error!("Unexpected pre-transition response for domain {}", idx);
            return Err(FwkError::State);
        }
        if status != STATUS_SUCCESS {
            pd.pre_transition.response_status = FwkError::Device.status();
        }
        pd.pre_transition.pending_responses -= 1;
        if pd.pre_transition.pending_responses != 0 {
            return Ok(());
        }
    }

    let (valid, acknowledged) = {
        let pd = ctx.pd(idx)?;
        (pd.pre_transition.valid, pd.pre_transition.response_status == STATUS_SUCCESS)
    };

    if valid {
        if acknowledged {
            // Unanimous agreement: proceed with the transition.
            if let Err(err) = initiate_power_state_transition(ctx, idx) {
                respond_to_pending(ctx, idx, err.status());
                abort_tree_op(ctx, err.status());
            }
        } else {
            // Vetoed: the domain stays where it is.
            log::warn!("Pre-transition for domain {} vetoed", idx);
            let current = ctx.pd(idx)?.current_state;
            ctx.pd_mut(idx)?.requested_state = current;
            respond_to_pending(ctx, idx, FwkError::Device.status());
            abort_tree_op(ctx, FwkError::Device.status());
        }
        return Ok(());
    }

    // The requested state changed while responses were arriving; restart the
    // processing for the new target.
    let (requested, in_flight_state, current) = {
        let pd = ctx.pd(idx)?;
        (pd.requested_state, pd.state_requested_to_driver, pd.current_state)
    };
    if requested == in_flight_state || requested == current {
        return Ok(());
    }
    if !ctx.is_allowed_by_parent_and_children(idx, requested) {
        respond_to_pending(ctx, idx, FwkError::State.status());
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

fn process_transition_response(ctx: &mut Context, idx: usize) -> Result<()> {
    let module_idx = ctx.module_id.module_idx() as u8;
    {
        let pd = ctx.pd_mut(idx)?;
        if pd.transition_notify.pending_responses == 0 {
            log::error!("Unexpected transition response for domain {}", idx);
            return Err(FwkError::State);
        }
        pd.transition_notify.pending_responses -= 1;
        if pd.transition_notify.pending_responses != 0 {
            return Ok(());
        }
        if pd.transition_notify.state == pd.current_state {
            // All notifications received for the state the domain is in.
            pd.transition_notify.previous_state = pd.current_state;
            return Ok(());
        }
    }

    // The power state moved on while responses were arriving; notify the
    // subscribers of where the domain actually is.
    let (source_id, stale_state, current_state) = {
        let pd = ctx.pd(idx)?;
        (pd.id, pd.transition_notify.state, pd.current_state)
    };
    let mut event =
        Event::new(FwkId::notification(module_idx, NOTIFICATION_IDX_TRANSITION), source_id, FwkId::none());
    event.response_requested = true;
    event.params.write(&TransitionParams { previous_state: stale_state, current_state });
    let count = scfw_core::notify(event)?;
    let pd = ctx.pd_mut(idx)?;
    pd.transition_notify.pending_responses = count;
    pd.transition_notify.state = current_state;
    Ok(())
}

fn process_pre_shutdown_response(ctx: &mut Context) -> Result<()> {
    if !ctx.shutdown.ongoing {
        return Err(FwkError::Param);
    }
    if ctx.shutdown.pending_responses == 0 {
        return Err(FwkError::State);
    }
    ctx.shutdown.pending_responses -= 1;
    if ctx.shutdown.pending_responses == 0 {
        // Every recipient acknowledged; take the system down.
        let mode = ctx.shutdown.mode;
        perform_shutdown(ctx, mode)?;
    }
    Ok(())
}
