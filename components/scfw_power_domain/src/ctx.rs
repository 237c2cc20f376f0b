//! Power-domain tree context.
//!
//! Built from element configuration during the module's init phases and
//! fixed thereafter: only the per-domain state fields change at runtime.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;

use scfw_sdk::error::{FwkError, Result};
use scfw_sdk::id::FwkId;

use crate::state::{PowerDomainKind, PowerState, StateMask, SystemShutdownMode};
use crate::transitions::{Requester, TreeOp};
use crate::PowerDomainDriver;

/// Bookkeeping for one round of pre-transition notifications.
#[derive(Default)]
pub(crate) struct PreTransitionNotifyCtx {
    pub pending_responses: u32,
    /// Target state the outstanding notification was sent for.
    pub state: PowerState,
    /// Sticky failure: any veto turns the round into a failure.
    pub response_status: i32,
    /// Cleared when the requested state changes mid-round.
    pub valid: bool,
}

/// Bookkeeping for one round of post-transition notifications.
#[derive(Default)]
pub(crate) struct TransitionNotifyCtx {
    pub pending_responses: u32,
    /// State the outstanding notification reported.
    pub state: PowerState,
    pub previous_state: PowerState,
}

pub(crate) struct PdCtx {
    pub id: FwkId,
    pub kind: PowerDomainKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub driver_id: FwkId,
    pub api_id: FwkId,
    pub driver: Option<&'static dyn PowerDomainDriver>,
    pub allowed_state_mask_table: &'static [StateMask],
    pub disable_notifications: bool,
    pub current_state: PowerState,
    pub requested_state: PowerState,
    pub state_requested_to_driver: PowerState,
    pub pre_transition: PreTransitionNotifyCtx,
    pub transition_notify: TransitionNotifyCtx,
    /// Requesters owed a response once `current_state` reaches
    /// `requested_state`.
    pub pending_requests: Vec<Requester>,
}

impl PdCtx {
    pub fn from_config(id: FwkId, config: &crate::PowerDomainElementConfig) -> Self {
        PdCtx {
            id,
            kind: config.kind,
            parent: config.parent_idx,
            children: Vec::new(),
            driver_id: config.driver_id,
            api_id: config.api_id,
            driver: None,
            allowed_state_mask_table: config.allowed_state_mask_table,
            disable_notifications: config.disable_state_transition_notifications,
            current_state: PowerState::OFF,
            requested_state: PowerState::OFF,
            state_requested_to_driver: PowerState::OFF,
            pre_transition: PreTransitionNotifyCtx::default(),
            transition_notify: TransitionNotifyCtx::default(),
            pending_requests: Vec::new(),
        }
    }
}

pub(crate) struct ShutdownCtx {
    pub ongoing: bool,
    pub pending_responses: u32,
    pub mode: SystemShutdownMode,
    /// Answered once the shutdown is actually performed.
    pub requester: Option<Requester>,
}

pub(crate) struct Context {
    pub module_id: FwkId,
    pub pds: Vec<PdCtx>,
    pub tree_op: Option<TreeOp>,
    pub shutdown: ShutdownCtx,
}

impl Context {
    pub const fn new() -> Self {
        Context {
            module_id: FwkId::none(),
            pds: Vec::new(),
            tree_op: None,
            shutdown: ShutdownCtx {
                ongoing: false,
                pending_responses: 0,
                mode: SystemShutdownMode::Shutdown,
                requester: None,
            },
        }
    }

    pub fn pd(&self, idx: usize) -> Result<&PdCtx> {
        self.pds.get(idx).ok_or(FwkError::Param)
    }

    pub fn pd_mut(&mut self, idx: usize) -> Result<&mut PdCtx> {
        self.pds.get_mut(idx).ok_or(FwkError::Param)
    }

    /// Links children to parents and validates the tree shape. Runs once,
    /// after every element exists.
    pub fn build_tree(&mut self) -> Result<()> {
        for idx in 0..self.pds.len() {
            let Some(parent) = self.pds[idx].parent else {
                if self.pds[idx].kind != PowerDomainKind::System {
                    log::error!("Power domain {:?} has no parent but is not the system domain", self.pds[idx].id);
                    return Err(FwkError::Param);
                }
                continue;
            };
            if parent >= self.pds.len() || parent == idx {
                return Err(FwkError::Param);
            }
            if self.pds[parent].kind == PowerDomainKind::Core {
                log::error!("Power domain {:?} declares a core as its parent", self.pds[idx].id);
                return Err(FwkError::Param);
            }
            self.pds[parent].children.push(idx);
        }
        Ok(())
    }

    /// Whether `state` is permitted for domain `idx` under its parent's
    /// current state.
    pub fn is_allowed_by_parent(&self, idx: usize, state: PowerState) -> bool {
        let pd = &self.pds[idx];
        let row = match pd.parent {
            Some(parent) => self.pds[parent].current_state.0 as usize,
            None => 0,
        };
        pd.allowed_state_mask_table.get(row).is_some_and(|mask| mask.allows(state))
    }

    /// Whether every child of domain `idx` could keep its current state if
    /// `idx` moved to `state`.
    pub fn is_allowed_by_children(&self, idx: usize, state: PowerState) -> bool {
        self.pds[idx].children.iter().all(|&child| {
            self.pds[child]
                .allowed_state_mask_table
                .get(state.0 as usize)
                .is_some_and(|mask| mask.allows(self.pds[child].current_state))
        })
    }

    pub fn is_allowed_by_parent_and_children(&self, idx: usize, state: PowerState) -> bool {
        self.is_allowed_by_parent(idx, state) && self.is_allowed_by_children(idx, state)
    }

    /// The domain indices of the subtree rooted at `root`, children before
    /// parents.
    pub fn subtree_post_order(&self, root: usize) -> Vec<usize> {
        let mut order = Vec::new();
        self.visit_post_order(root, &mut order);
        order
    }

    fn visit_post_order(&self, idx: usize, order: &mut Vec<usize>) {
        for &child in &self.pds[idx].children {
            self.visit_post_order(child, order);
        }
        order.push(idx);
    }

    /// The domain indices of the subtree rooted at `root`, parents before
    /// children.
    pub fn subtree_pre_order(&self, root: usize) -> Vec<usize> {
        let mut order = self.subtree_post_order(root);
        order.reverse();
        order
    }

    /// The index of the system (root) domain.
    pub fn system_domain(&self) -> Result<usize> {
        self.pds.iter().position(|pd| pd.kind == PowerDomainKind::System).ok_or(FwkError::Support)
    }

    /// Ancestors of `idx` whose current state is not `ON`, ordered root
    /// first. The power-up path for a leaf request.
    pub fn powered_down_ancestors(&self, idx: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut cursor = self.pds[idx].parent;
        while let Some(parent) = cursor {
            if self.pds[parent].current_state != PowerState::ON {
                chain.push(parent);
            }
            cursor = self.pds[parent].parent;
        }
        chain.reverse();
        chain
    }
}
