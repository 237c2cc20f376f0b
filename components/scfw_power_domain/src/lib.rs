//! Hierarchical power-domain state machine.
//!
//! A framework module managing a static tree of power domains: cores under
//! clusters, peripheral and debug devices, and a system root backed by the
//! system power controller. Every element of the module is one domain,
//! configured with its tree position, its driver binding, and an
//! allowed-state mask table consulted on every transition.
//!
//! Transitions are asynchronous. A set-state request is checked against the
//! parent's and children's masks, announced to pre-transition subscribers
//! (any of whom may veto), handed to the domain driver, and confirmed by the
//! driver's transition report, after which post-transition subscribers are
//! notified. Powering a leaf up pulls its powered-down ancestors up first;
//! composite subtree requests, system suspend, and system shutdown chain
//! individual transitions the same way.
//!
//! Subscribers answering an acknowledged notification place a
//! [`StatusParams`](scfw_sdk::event::StatusParams) payload in their
//! response; any non-success status vetoes the transition.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

mod ctx;
mod notifications;
mod state;
mod system;
mod transitions;

pub use state::{
    PowerDomainKind, PowerState, PreTransitionParams, ReportTransitionParams, SetStateParams, ShutdownParams,
    StateMask, SuspendParams, SystemShutdownMode, TransitionParams,
};

use scfw_sdk::error::{FwkError, Result, STATUS_SUCCESS};
use scfw_sdk::event::{Event, StatusParams};
use scfw_sdk::id::{FwkId, IdKind};
use scfw_sdk::module::{
    ApiRef, BindRound, EventOutcome, Module, ModuleDescriptor, ModuleKind, OpaqueData,
};

use ctx::Context;
use scfw_core::irq_lock::IrqMutex;
use transitions::{Progress, Requester};

/// API index of [`PowerDomainApi`], for clients of the state machine.
pub const API_IDX_POWER: u8 = 0;
/// API index of [`PowerDomainDriverInput`], for domain drivers.
pub const API_IDX_DRIVER_INPUT: u8 = 1;

/// Set-state request; payload [`SetStateParams`].
pub const EVENT_IDX_SET_STATE: u8 = 0;
/// Driver transition report; payload [`ReportTransitionParams`].
pub const EVENT_IDX_REPORT_TRANSITION: u8 = 1;
/// System shutdown request; payload [`ShutdownParams`].
pub const EVENT_IDX_SYSTEM_SHUTDOWN: u8 = 2;
/// System suspend request; payload [`SuspendParams`].
pub const EVENT_IDX_SYSTEM_SUSPEND: u8 = 3;

/// Acknowledged, vetoable warning before a transition; payload
/// [`PreTransitionParams`].
pub const NOTIFICATION_IDX_PRE_TRANSITION: u8 = 0;
/// Confirmation after a transition; payload [`TransitionParams`].
pub const NOTIFICATION_IDX_TRANSITION: u8 = 1;
/// Acknowledged warning before shutdown or cold reset; payload
/// [`ShutdownParams`].
pub const NOTIFICATION_IDX_PRE_SHUTDOWN: u8 = 2;
/// Unacknowledged warning before a warm reset.
pub const NOTIFICATION_IDX_PRE_WARM_RESET: u8 = 3;

/// Configuration of one power domain, carried as its element data.
pub struct PowerDomainElementConfig {
    pub kind: PowerDomainKind,
    /// Element index of the parent domain; `None` only for the system root.
    pub parent_idx: Option<usize>,
    /// Entity implementing this domain's power controller.
    pub driver_id: FwkId,
    /// API the driver exposes for [`PowerDomainDriver`].
    pub api_id: FwkId,
    /// Row per parent state; see [`StateMask`].
    pub allowed_state_mask_table: &'static [StateMask],
    pub disable_state_transition_notifications: bool,
}

/// Contract a domain power driver implements.
pub trait PowerDomainDriver: Sync {
    /// Starts a transition of `domain_id` (the driver's own element) to
    /// `state`. The driver must eventually confirm through
    /// [`PowerDomainDriverInput::report_power_state_transition`].
    fn set_state(&self, domain_id: FwkId, state: PowerState) -> Result<()>;

    /// Reads the state the hardware is actually in.
    fn get_state(&self, domain_id: FwkId) -> Result<PowerState>;

    /// Asserts a reset of the domain.
    fn reset(&self, domain_id: FwkId) -> Result<()>;

    /// Readies the calling core's domain for a system suspend.
    fn prepare_core_for_system_suspend(&self, _domain_id: FwkId) -> Result<()> {
        Err(FwkError::Support)
    }

    /// Takes the system down. Only the system domain's driver needs this;
    /// without it the domain is turned plain OFF.
    fn shutdown(&self, _domain_id: FwkId, _mode: SystemShutdownMode) -> Result<()> {
        Err(FwkError::Support)
    }
}

/// Client API of the state machine.
///
/// The asynchronous operations queue an event and complete through the
/// response to that event; they must be invoked from a handler so the
/// requester's identity is known. The synchronous reads must not be invoked
/// from this module's own handlers.
pub trait PowerDomainApi: Sync {
    /// Requests `pd_id` to transition to `state`. A power-up request pulls
    /// powered-down ancestors up first.
    fn set_state(&self, pd_id: FwkId, state: PowerState, response_requested: bool) -> Result<()>;

    /// Requests the whole subtree rooted at `pd_id` to transition, parents
    /// first when powering up, children first when powering down.
    fn set_subtree_state(&self, pd_id: FwkId, state: PowerState, response_requested: bool) -> Result<()>;

    /// The domain's current (confirmed) state.
    fn get_state(&self, pd_id: FwkId) -> Result<PowerState>;

    /// Resets a powered domain through its driver.
    fn reset(&self, pd_id: FwkId) -> Result<()>;

    /// Requests a system shutdown or reset.
    fn system_shutdown(&self, pd_module_id: FwkId, mode: SystemShutdownMode, response_requested: bool) -> Result<()>;

    /// Requests a system suspend to `state`.
    fn system_suspend(&self, pd_module_id: FwkId, state: PowerState, response_requested: bool) -> Result<()>;
}

/// API domain drivers use to confirm transitions.
pub trait PowerDomainDriverInput: Sync {
    /// Reports that `pd_id` (the power-domain element the driver backs)
    /// reached `achieved_state`. Callable from interrupt context.
    fn report_power_state_transition(&self, pd_id: FwkId, achieved_state: PowerState) -> Result<()>;
}

static PD_CTX: IrqMutex<Context> = IrqMutex::new(Context::new(), "power domain");

struct PowerApi;

impl PowerDomainApi for PowerApi {
    fn set_state(&self, pd_id: FwkId, state: PowerState, response_requested: bool) -> Result<()> {
        if !pd_id.is_kind(IdKind::Element) {
            return Err(FwkError::Param);
        }
        let mut event =
            Event::new(FwkId::event(pd_id.module_idx() as u8, EVENT_IDX_SET_STATE), FwkId::none(), pd_id);
        event.response_requested = response_requested;
        event.params.write(&SetStateParams { state, subtree: 0 });
        scfw_core::put_event(event)
    }

    fn set_subtree_state(&self, pd_id: FwkId, state: PowerState, response_requested: bool) -> Result<()> {
        if !pd_id.is_kind(IdKind::Element) {
            return Err(FwkError::Param);
        }
        let mut event =
            Event::new(FwkId::event(pd_id.module_idx() as u8, EVENT_IDX_SET_STATE), FwkId::none(), pd_id);
        event.response_requested = response_requested;
        event.params.write(&SetStateParams { state, subtree: 1 });
        scfw_core::put_event(event)
    }

    fn get_state(&self, pd_id: FwkId) -> Result<PowerState> {
        if !pd_id.is_kind(IdKind::Element) {
            return Err(FwkError::Param);
        }
        let ctx = PD_CTX.lock();
        Ok(ctx.pd(pd_id.element_idx())?.current_state)
    }

    fn reset(&self, pd_id: FwkId) -> Result<()> {
        if !pd_id.is_kind(IdKind::Element) {
            return Err(FwkError::Param);
        }
        let ctx = PD_CTX.lock();
        let pd = ctx.pd(pd_id.element_idx())?;
        if pd.current_state != PowerState::ON {
            return Err(FwkError::State);
        }
        pd.driver.ok_or(FwkError::Init)?.reset(pd.driver_id).map_err(|_| FwkError::Device)
    }

    fn system_shutdown(&self, pd_module_id: FwkId, mode: SystemShutdownMode, response_requested: bool) -> Result<()> {
        let mut event = Event::new(
            FwkId::event(pd_module_id.module_idx() as u8, EVENT_IDX_SYSTEM_SHUTDOWN),
            FwkId::none(),
            pd_module_id,
        );
        event.response_requested = response_requested;
        event.params.write(&ShutdownParams { mode: mode.to_raw() });
        scfw_core::put_event(event)
    }

    fn system_suspend(&self, pd_module_id: FwkId, state: PowerState, response_requested: bool) -> Result<()> {
        let mut event = Event::new(
            FwkId::event(pd_module_id.module_idx() as u8, EVENT_IDX_SYSTEM_SUSPEND),
            FwkId::none(),
            pd_module_id,
        );
        event.response_requested = response_requested;
        event.params.write(&SuspendParams { state });
        scfw_core::put_event(event)
    }
}

static POWER_API: PowerApi = PowerApi;

struct DriverInputApi;

impl PowerDomainDriverInput for DriverInputApi {
    fn report_power_state_transition(&self, pd_id: FwkId, achieved_state: PowerState) -> Result<()> {
        if !pd_id.is_kind(IdKind::Element) {
            return Err(FwkError::Param);
        }
        // Self-addressed so the report needs no context lookup; drivers may
        // call this from interrupt context.
        let mut event =
            Event::new(FwkId::event(pd_id.module_idx() as u8, EVENT_IDX_REPORT_TRANSITION), pd_id, pd_id);
        event.params.write(&ReportTransitionParams { state: achieved_state });
        scfw_core::put_event(event)
    }
}

static DRIVER_INPUT_API: DriverInputApi = DriverInputApi;

/// The power-domain module.
pub struct PowerDomain;

impl PowerDomain {
    /// Descriptor to register this module with.
    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor { kind: ModuleKind::Hal, api_count: 2, event_count: 4, notification_count: 4 }
    }
}

impl Module for PowerDomain {
    fn init(&mut self, module_id: FwkId, element_count: usize, _data: Option<OpaqueData>) -> Result<()> {
        let mut ctx = PD_CTX.lock();
        *ctx = Context::new();
        ctx.module_id = module_id;
        ctx.pds.reserve(element_count);
        Ok(())
    }

    fn element_init(&mut self, element_id: FwkId, _sub_element_count: usize, data: OpaqueData) -> Result<()> {
        let config = data.downcast_ref::<PowerDomainElementConfig>().ok_or(FwkError::Param)?;
        if config.allowed_state_mask_table.is_empty() {
            return Err(FwkError::Param);
        }
        PD_CTX.lock().pds.push(ctx::PdCtx::from_config(element_id, config));
        Ok(())
    }

    fn post_init(&mut self, _module_id: FwkId) -> Result<()> {
        PD_CTX.lock().build_tree()
    }

    fn bind(&mut self, id: FwkId, round: BindRound) -> Result<()> {
        if round != BindRound::Collect || !id.is_kind(IdKind::Element) {
            return Ok(());
        }
        let idx = id.element_idx();
        let (driver_id, api_id) = {
            let ctx = PD_CTX.lock();
            let pd = ctx.pd(idx)?;
            (pd.driver_id, pd.api_id)
        };
        let driver = scfw_core::module_bind(driver_id, api_id)?.downcast::<dyn PowerDomainDriver>()?;
        PD_CTX.lock().pd_mut(idx)?.driver = Some(driver);
        Ok(())
    }

    fn process_bind_request(&mut self, source_id: FwkId, _target_id: FwkId, api_id: FwkId) -> Result<ApiRef> {
        match api_id.api_idx() as u8 {
            API_IDX_POWER => Ok(ApiRef::new(&POWER_API as &dyn PowerDomainApi)),
            API_IDX_DRIVER_INPUT => {
                // Only modules acting as a domain driver may confirm
                // transitions.
                let ctx = PD_CTX.lock();
                let is_driver =
                    ctx.pds.iter().any(|pd| pd.driver_id.module_idx() == source_id.module_idx());
                if !is_driver {
                    return Err(FwkError::Access);
                }
                Ok(ApiRef::new(&DRIVER_INPUT_API as &dyn PowerDomainDriverInput))
            }
            _ => Err(FwkError::Param),
        }
    }

    fn process_event(&mut self, event: &Event, response: &mut Event) -> Result<EventOutcome> {
        if event.is_response {
            // Responses to events this module posted need no processing.
            return Ok(EventOutcome::Completed);
        }
        let mut guard = PD_CTX.lock();
        let ctx = &mut *guard;
        let requester =
            event.response_requested.then(|| Requester { source_id: event.source_id, cookie: event.cookie });

        let progress = match event.id.event_idx() as u8 {
            EVENT_IDX_SET_STATE => {
                let idx = domain_index(event.target_id)?;
                ctx.pd(idx)?;
                let params: SetStateParams = event.params.read();
                if params.subtree != 0 {
                    transitions::process_subtree_request(ctx, idx, params.state, requester)?
                } else {
                    transitions::process_set_state_request(ctx, idx, params.state, requester)?
                }
            }
            EVENT_IDX_REPORT_TRANSITION => {
                let idx = domain_index(event.target_id)?;
                let params: ReportTransitionParams = event.params.read();
                transitions::handle_report(ctx, idx, params.state)?;
                Progress::Done
            }
            EVENT_IDX_SYSTEM_SHUTDOWN => {
                let params: ShutdownParams = event.params.read();
                let mode = SystemShutdownMode::from_raw(params.mode).ok_or(FwkError::Param)?;
                system::system_shutdown(ctx, mode, requester)?
            }
            EVENT_IDX_SYSTEM_SUSPEND => {
                let params: SuspendParams = event.params.read();
                system::system_suspend(ctx, params.state, requester)?
            }
            _ => return Err(FwkError::Support),
        };

        match progress {
            Progress::Done => {
                response.params.write(&StatusParams { status: STATUS_SUCCESS });
                Ok(EventOutcome::Completed)
            }
            Progress::InFlight => Ok(EventOutcome::Pending),
        }
    }

    fn process_notification(&mut self, event: &Event, _response: &mut Event) -> Result<()> {
        // The module subscribes to nothing; only responses to its own
        // notifications arrive here.
        if !event.is_response {
            return Err(FwkError::Support);
        }
        notifications::process_notification_response(&mut PD_CTX.lock(), event)
    }
}

fn domain_index(target_id: FwkId) -> Result<usize> {
    if !target_id.is_kind(IdKind::Element) {
        return Err(FwkError::Param);
    }
    Ok(target_id.element_idx())
}
