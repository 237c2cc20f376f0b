//! SCFW SDK
//!
//! Value types and contracts shared by the SCFW framework core and every
//! module built on it: tagged identifiers, the status taxonomy, event
//! records, module descriptors and lifecycle callbacks, the interrupt-driver
//! contract, and the diagnostic log drain.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod error;
pub mod event;
pub mod id;
pub mod interrupt;
pub mod log;
pub mod module;
