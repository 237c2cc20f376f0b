//! System-wide shutdown, reset, and suspend flows.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use scfw_sdk::error::{FwkError, Result};
use scfw_sdk::event::Event;
use scfw_sdk::id::FwkId;

use crate::ctx::Context;
use crate::state::{PowerDomainKind, PowerState, ShutdownParams, SystemShutdownMode};
use crate::transitions::{advance_tree_op, Progress, Requester, TreeOp};
use crate::{NOTIFICATION_IDX_PRE_SHUTDOWN, NOTIFICATION_IDX_PRE_WARM_RESET};

/// Entry point for a system shutdown, cold reset, or warm reset request.
pub(crate) fn system_shutdown(
    ctx: &mut Context,
    mode: SystemShutdownMode,
    requester: Option<Requester>,
) -> Result<Progress> {
    if mode == SystemShutdownMode::WarmReset {
        // Non-power-cycling path: recipients may save state, but no
        // acknowledgement is collected and nothing is swept OFF.
        notify_warm_reset(ctx)?;
        let (driver, driver_id) = system_driver(ctx)?;
        driver.shutdown(driver_id, mode).map_err(|err| {
            log::error!("System driver rejected warm reset: {}", err);
            FwkError::Device
        })?;
        return Ok(Progress::Done);
    }

    if ctx.shutdown.ongoing {
        return Err(FwkError::Busy);
    }
    ctx.shutdown.ongoing = true;
    ctx.shutdown.mode = mode;
    ctx.shutdown.pending_responses = 0;
    ctx.shutdown.requester = None;

    let count = notify_pre_shutdown(ctx, mode)?;
    if count == 0 {
        perform_shutdown(ctx, mode)?;
        return Ok(Progress::Done);
    }
    ctx.shutdown.pending_responses = count;
    ctx.shutdown.requester = requester;
    Ok(Progress::InFlight)
}

fn notify_pre_shutdown(ctx: &mut Context, mode: SystemShutdownMode) -> Result<u32> {
    let module_idx = ctx.module_id.module_idx() as u8;
    let mut event = Event::new(
        FwkId::notification(module_idx, NOTIFICATION_IDX_PRE_SHUTDOWN),
        ctx.module_id,
        FwkId::none(),
    );
    event.response_requested = true;
    event.params.write(&ShutdownParams { mode: mode.to_raw() });
    scfw_core::notify(event)
}

/// Emits the warm-reset warning. No acknowledgement is required.
pub(crate) fn notify_warm_reset(ctx: &mut Context) -> Result<()> {
    let module_idx = ctx.module_id.module_idx() as u8;
    let event = Event::new(
        FwkId::notification(module_idx, NOTIFICATION_IDX_PRE_WARM_RESET),
        ctx.module_id,
        FwkId::none(),
    );
    scfw_core::notify(event)?;
    Ok(())
}

/// Sweeps every domain OFF, leaves before parents, then invokes the system
/// power driver. Per-domain driver failures are logged and skipped: the
/// shutdown itself must not be abandoned half-way.
pub(crate) fn perform_shutdown(ctx: &mut Context, mode: SystemShutdownMode) -> Result<()> {
    log::info!("System shutdown: {:?}", mode);
    let system = ctx.system_domain()?;
    for idx in ctx.subtree_post_order(system) {
        if idx == system {
            continue;
        }
        let pd = ctx.pd(idx)?;
        let Some(driver) = pd.driver else { continue };
        if let Err(err) = driver.set_state(pd.driver_id, PowerState::OFF) {
            log::error!("Domain {} refused to power off for shutdown: {}", idx, err);
        }
    }

    let (driver, driver_id) = system_driver(ctx)?;
    let result = match driver.shutdown(driver_id, mode) {
        // Drivers without a dedicated shutdown entry are turned plain OFF.
        Err(FwkError::Support) => driver.set_state(driver_id, PowerState::OFF).map_err(|_| FwkError::Device),
        other => other.map_err(|_| FwkError::Device),
    };
    if let Some(requester) = ctx.shutdown.requester.take() {
        let status = match &result {
            Ok(()) => scfw_sdk::error::STATUS_SUCCESS,
            Err(err) => err.status(),
        };
        crate::transitions::respond(ctx.module_id, crate::EVENT_IDX_SYSTEM_SHUTDOWN, requester, status);
    }
    result
}

/// Entry point for a system suspend request.
///
/// Permitted only when at most one core is still powered; that core is
/// prepared through its driver, swept down with its ancestors, and the
/// system domain is driven to the requested sleep state.
pub(crate) fn system_suspend(
    ctx: &mut Context,
    state: PowerState,
    requester: Option<Requester>,
) -> Result<Progress> {
    if ctx.tree_op.is_some() {
        return Err(FwkError::Busy);
    }
    let system = ctx.system_domain()?;

    let powered_cores: Vec<usize> = ctx
        .pds
        .iter()
        .enumerate()
        .filter(|(_, pd)| pd.kind == PowerDomainKind::Core && pd.current_state != PowerState::OFF)
        .map(|(idx, _)| idx)
        .collect();
    if powered_cores.len() > 1 {
        return Err(FwkError::State);
    }

    let mut steps = VecDeque::new();
    if let Some(&core) = powered_cores.first() {
        let (driver, driver_id) = {
            let pd = ctx.pd(core)?;
            (pd.driver.ok_or(FwkError::Init)?, pd.driver_id)
        };
        driver.prepare_core_for_system_suspend(driver_id).map_err(|err| {
            log::error!("Core {} could not be prepared for suspend: {}", core, err);
            FwkError::Device
        })?;
        steps.push_back((core, PowerState::OFF));
        let mut cursor = ctx.pd(core)?.parent;
        while let Some(parent) = cursor {
            if parent != system {
                steps.push_back((parent, PowerState::OFF));
            }
            cursor = ctx.pd(parent)?.parent;
        }
    }
    steps.push_back((system, state));

    ctx.tree_op = Some(TreeOp { steps, requester, origin: system, event_idx: crate::EVENT_IDX_SYSTEM_SUSPEND });
    advance_tree_op(ctx)?;
    Ok(Progress::InFlight)
}

fn system_driver(ctx: &Context) -> Result<(&'static dyn crate::PowerDomainDriver, FwkId)> {
    let system = ctx.system_domain()?;
    let pd = ctx.pd(system)?;
    Ok((pd.driver.ok_or(FwkError::Init)?, pd.driver_id))
}
