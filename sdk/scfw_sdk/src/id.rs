//! Tagged framework identifiers.
//!
//! Every addressable entity in the framework (module, element, sub-element,
//! API, event, or notification) is named by a [`FwkId`]: a 32-bit value
//! carrying a kind tag and the indices for that kind. Identifiers are pure
//! values with no runtime state; constructing one does not imply the entity
//! exists.
//!
//! The bit layout is private to this module. Code elsewhere must go through
//! the constructors and accessors, which enforce the kind tag with debug
//! assertions.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// The kind of entity a [`FwkId`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Sentinel identifier naming nothing.
    None,
    /// A module.
    Module,
    /// An element owned by a module.
    Element,
    /// A sub-element leaf within an element.
    SubElement,
    /// An API exposed by a module.
    Api,
    /// An event handled by a module.
    Event,
    /// A notification emitted by a module or element.
    Notification,
}

// Layout: [31:28] kind tag, [7:0] module index. Element identifiers carry the
// element index in [19:8] and sub-element identifiers additionally use
// [27:20]. Api/event/notification indices live in [15:8].
const TAG_SHIFT: u32 = 28;
const TAG_NONE: u32 = 0;
const TAG_MODULE: u32 = 1;
const TAG_ELEMENT: u32 = 2;
const TAG_SUB_ELEMENT: u32 = 3;
const TAG_API: u32 = 4;
const TAG_EVENT: u32 = 5;
const TAG_NOTIFICATION: u32 = 6;

const ELEMENT_IDX_SHIFT: u32 = 8;
const ELEMENT_IDX_MAX: u16 = 0xfff;
const SUB_ELEMENT_IDX_SHIFT: u32 = 20;
const SECONDARY_IDX_SHIFT: u32 = 8;

/// A compact tagged identifier naming any addressable framework entity.
///
/// The ordering is that of the raw tagged value and carries no meaning
/// beyond letting identifiers key ordered collections.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FwkId(u32);

impl FwkId {
    /// The sentinel identifier, distinguishable from every other kind.
    pub const fn none() -> Self {
        FwkId(TAG_NONE << TAG_SHIFT)
    }

    /// Identifier of the module with index `module_idx`.
    pub const fn module(module_idx: u8) -> Self {
        FwkId((TAG_MODULE << TAG_SHIFT) | module_idx as u32)
    }

    /// Identifier of element `element_idx` of module `module_idx`.
    pub const fn element(module_idx: u8, element_idx: u16) -> Self {
        debug_assert!(element_idx <= ELEMENT_IDX_MAX);
        FwkId(
            (TAG_ELEMENT << TAG_SHIFT)
                | ((element_idx as u32) << ELEMENT_IDX_SHIFT)
                | module_idx as u32,
        )
    }

    /// Identifier of a sub-element leaf within an element.
    pub const fn sub_element(module_idx: u8, element_idx: u16, sub_element_idx: u8) -> Self {
        debug_assert!(element_idx <= ELEMENT_IDX_MAX);
        FwkId(
            (TAG_SUB_ELEMENT << TAG_SHIFT)
                | ((sub_element_idx as u32) << SUB_ELEMENT_IDX_SHIFT)
                | ((element_idx as u32) << ELEMENT_IDX_SHIFT)
                | module_idx as u32,
        )
    }

    /// Identifier of API `api_idx` exposed by module `module_idx`.
    pub const fn api(module_idx: u8, api_idx: u8) -> Self {
        FwkId((TAG_API << TAG_SHIFT) | ((api_idx as u32) << SECONDARY_IDX_SHIFT) | module_idx as u32)
    }

    /// Identifier of event `event_idx` handled by module `module_idx`.
    pub const fn event(module_idx: u8, event_idx: u8) -> Self {
        FwkId((TAG_EVENT << TAG_SHIFT) | ((event_idx as u32) << SECONDARY_IDX_SHIFT) | module_idx as u32)
    }

    /// Identifier of notification `notification_idx` emitted by module `module_idx`.
    pub const fn notification(module_idx: u8, notification_idx: u8) -> Self {
        FwkId(
            (TAG_NOTIFICATION << TAG_SHIFT)
                | ((notification_idx as u32) << SECONDARY_IDX_SHIFT)
                | module_idx as u32,
        )
    }

    /// The kind of entity this identifier names.
    pub const fn kind(self) -> IdKind {
        match self.0 >> TAG_SHIFT {
            TAG_MODULE => IdKind::Module,
            TAG_ELEMENT => IdKind::Element,
            TAG_SUB_ELEMENT => IdKind::SubElement,
            TAG_API => IdKind::Api,
            TAG_EVENT => IdKind::Event,
            TAG_NOTIFICATION => IdKind::Notification,
            _ => IdKind::None,
        }
    }

    /// Whether this identifier is of kind `kind`.
    pub fn is_kind(self, kind: IdKind) -> bool {
        self.kind() == kind
    }

    /// Whether this is the sentinel identifier.
    pub fn is_none(self) -> bool {
        self.kind() == IdKind::None
    }

    /// Whether this identifier names a module, element, or sub-element.
    pub fn is_entity(self) -> bool {
        matches!(self.kind(), IdKind::Module | IdKind::Element | IdKind::SubElement)
    }

    /// The module index. Valid for every kind except `None`.
    pub fn module_idx(self) -> usize {
        debug_assert!(!self.is_none(), "module_idx on a none identifier");
        (self.0 & 0xff) as usize
    }

    /// The element index. Valid for `Element` and `SubElement` identifiers.
    pub fn element_idx(self) -> usize {
        debug_assert!(
            matches!(self.kind(), IdKind::Element | IdKind::SubElement),
            "element_idx on a {:?} identifier",
            self.kind()
        );
        ((self.0 >> ELEMENT_IDX_SHIFT) & ELEMENT_IDX_MAX as u32) as usize
    }

    /// The sub-element index. Valid for `SubElement` identifiers.
    pub fn sub_element_idx(self) -> usize {
        debug_assert!(self.is_kind(IdKind::SubElement), "sub_element_idx on a {:?} identifier", self.kind());
        ((self.0 >> SUB_ELEMENT_IDX_SHIFT) & 0xff) as usize
    }

    /// The API index. Valid for `Api` identifiers.
    pub fn api_idx(self) -> usize {
        debug_assert!(self.is_kind(IdKind::Api), "api_idx on a {:?} identifier", self.kind());
        ((self.0 >> SECONDARY_IDX_SHIFT) & 0xff) as usize
    }

    /// The event index. Valid for `Event` identifiers.
    pub fn event_idx(self) -> usize {
        debug_assert!(self.is_kind(IdKind::Event), "event_idx on a {:?} identifier", self.kind());
        ((self.0 >> SECONDARY_IDX_SHIFT) & 0xff) as usize
    }

    /// The notification index. Valid for `Notification` identifiers.
    pub fn notification_idx(self) -> usize {
        debug_assert!(self.is_kind(IdKind::Notification), "notification_idx on a {:?} identifier", self.kind());
        ((self.0 >> SECONDARY_IDX_SHIFT) & 0xff) as usize
    }

    /// The module identifier obtained by truncating this identifier.
    pub fn to_module(self) -> FwkId {
        debug_assert!(!self.is_none(), "to_module on a none identifier");
        FwkId::module((self.0 & 0xff) as u8)
    }

    /// The element identifier obtained by truncating a sub-element identifier.
    /// Element identifiers pass through unchanged.
    pub fn to_element(self) -> FwkId {
        debug_assert!(
            matches!(self.kind(), IdKind::Element | IdKind::SubElement),
            "to_element on a {:?} identifier",
            self.kind()
        );
        FwkId::element((self.0 & 0xff) as u8, ((self.0 >> ELEMENT_IDX_SHIFT) & ELEMENT_IDX_MAX as u32) as u16)
    }
}

impl Default for FwkId {
    fn default() -> Self {
        FwkId::none()
    }
}

impl core::fmt::Debug for FwkId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind() {
            IdKind::None => write!(f, "[NONE]"),
            IdKind::Module => write!(f, "[MOD {}]", self.module_idx()),
            IdKind::Element => write!(f, "[MOD {} ELEM {}]", self.module_idx(), self.element_idx()),
            IdKind::SubElement => write!(
                f,
                "[MOD {} ELEM {} SUB {}]",
                self.module_idx(),
                self.element_idx(),
                self.sub_element_idx()
            ),
            IdKind::Api => write!(f, "[MOD {} API {}]", self.module_idx(), self.api_idx()),
            IdKind::Event => write!(f, "[MOD {} EVENT {}]", self.module_idx(), self.event_idx()),
            IdKind::Notification => {
                write!(f, "[MOD {} NOTIF {}]", self.module_idx(), self.notification_idx())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn module_round_trip() {
        let id = FwkId::module(7);
        assert_eq!(id.kind(), IdKind::Module);
        assert_eq!(id.module_idx(), 7);
    }

    #[test_case(0, 0)]
    #[test_case(3, 11)]
    #[test_case(255, 0xfff)]
    fn element_round_trip(m: u8, e: u16) {
        let id = FwkId::element(m, e);
        assert_eq!(id.kind(), IdKind::Element);
        assert_eq!(id.module_idx(), m as usize);
        assert_eq!(id.element_idx(), e as usize);
    }

    #[test]
    fn sub_element_round_trip() {
        let id = FwkId::sub_element(4, 100, 9);
        assert_eq!(id.kind(), IdKind::SubElement);
        assert_eq!(id.module_idx(), 4);
        assert_eq!(id.element_idx(), 100);
        assert_eq!(id.sub_element_idx(), 9);
    }

    #[test]
    fn secondary_indices_round_trip() {
        assert_eq!(FwkId::api(2, 7).api_idx(), 7);
        assert_eq!(FwkId::event(2, 3).event_idx(), 3);
        assert_eq!(FwkId::notification(2, 5).notification_idx(), 5);
        assert_eq!(FwkId::api(2, 7).module_idx(), 2);
    }

    #[test]
    fn truncation() {
        let sub = FwkId::sub_element(6, 2, 1);
        assert_eq!(sub.to_element(), FwkId::element(6, 2));
        assert_eq!(sub.to_module(), FwkId::module(6));
        assert_eq!(FwkId::element(6, 2).to_element(), FwkId::element(6, 2));
        assert_eq!(FwkId::notification(6, 0).to_module(), FwkId::module(6));
    }

    #[test]
    fn equality_requires_kind_and_indices() {
        assert_eq!(FwkId::module(1), FwkId::module(1));
        assert_ne!(FwkId::module(1), FwkId::module(2));
        assert_ne!(FwkId::module(1), FwkId::element(1, 0));
        assert_ne!(FwkId::event(1, 0), FwkId::notification(1, 0));
    }

    #[test]
    fn none_is_distinct() {
        assert!(FwkId::none().is_none());
        assert!(!FwkId::module(0).is_none());
        assert_ne!(FwkId::none(), FwkId::module(0));
        assert_eq!(FwkId::default(), FwkId::none());
    }

    #[test]
    fn entity_predicate() {
        assert!(FwkId::module(0).is_entity());
        assert!(FwkId::element(0, 0).is_entity());
        assert!(FwkId::sub_element(0, 0, 0).is_entity());
        assert!(!FwkId::api(0, 0).is_entity());
        assert!(!FwkId::none().is_entity());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "element_idx")]
    fn out_of_kind_accessor_asserts() {
        let _ = FwkId::module(1).element_idx();
    }
}
