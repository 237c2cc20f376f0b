//! Module registry and lifecycle.
//!
//! A single process-wide registry owns the ordered list of module contexts.
//! Module indices are assigned in registration order and form the stable
//! namespace used by identifiers. The lifecycle runs in strict phases across
//! the whole registry: MODULE_INIT, ELEMENT_INIT, POST_INIT, two BIND
//! rounds, then START. Any callback failure aborts the remaining phases and
//! surfaces to the caller of [`crate::Core::start`].
//!
//! Module objects live behind per-module locks separate from the registry's
//! structural data, so a handler is free to call back into the framework
//! (bind, subscribe, post events) while it runs.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{boxed::Box, sync::Arc, vec::Vec};

use scfw_sdk::error::{FwkError, Result};
use scfw_sdk::id::{FwkId, IdKind};
use scfw_sdk::module::{ApiRef, BindRound, ElementTable, Module, ModuleConfig, ModuleDescriptor, OpaqueData};

use crate::irq_lock::IrqMutex;

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Uninitialized,
    Initialized,
    Bound,
    Started,
    Suspended,
}

/// Lifecycle phase of the framework as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    PreInit,
    ModuleInit,
    ElementInit,
    PostInit,
    Bind(BindRound),
    Start,
    Running,
}

type ModuleHandle = Arc<IrqMutex<Box<dyn Module>>>;

struct ElementCtx {
    #[allow(dead_code)]
    name: &'static str,
    sub_element_count: usize,
    data: Option<OpaqueData>,
}

struct ModuleCtx {
    desc: ModuleDescriptor,
    state: ModuleState,
    module: ModuleHandle,
    config_data: Option<OpaqueData>,
    element_table: Option<ElementTable>,
    elements: Vec<ElementCtx>,
}

struct RegistryDb {
    modules: Vec<ModuleCtx>,
    phase: Phase,
    /// Module currently executing its `bind` callback; source of bind requests.
    current_binder: FwkId,
}

impl RegistryDb {
    const fn new() -> Self {
        RegistryDb { modules: Vec::new(), phase: Phase::PreInit, current_binder: FwkId::none() }
    }

    fn module(&self, idx: usize) -> Result<&ModuleCtx> {
        self.modules.get(idx).ok_or(FwkError::Param)
    }

    fn module_mut(&mut self, idx: usize) -> Result<&mut ModuleCtx> {
        self.modules.get_mut(idx).ok_or(FwkError::Param)
    }
}

// The main registry implementation; public interaction goes through the
// [`LockedRegistry`] wrapper, which scopes the structural lock so that it is
// never held across a module callback.
pub(crate) struct LockedRegistry {
    inner: IrqMutex<RegistryDb>,
}

pub(crate) static REGISTRY: LockedRegistry = LockedRegistry { inner: IrqMutex::new(RegistryDb::new(), "registry") };

impl LockedRegistry {
    pub fn add_module(&self, desc: ModuleDescriptor, module: Box<dyn Module>, config: ModuleConfig) -> Result<usize> {
        let mut db = self.inner.lock();
        if db.phase != Phase::PreInit {
            return Err(FwkError::State);
        }
        if db.modules.len() > u8::MAX as usize {
            return Err(FwkError::NoMem);
        }
        let idx = db.modules.len();
        db.modules.push(ModuleCtx {
            desc,
            state: ModuleState::Uninitialized,
            module: Arc::new(IrqMutex::new(module, "module")),
            config_data: config.data,
            element_table: Some(config.elements),
            elements: Vec::new(),
        });
        Ok(idx)
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    fn set_phase(&self, phase: Phase) {
        self.inner.lock().phase = phase;
    }

    fn set_current_binder(&self, id: FwkId) {
        self.inner.lock().current_binder = id;
    }

    fn module_handles(&self) -> Vec<(usize, ModuleHandle)> {
        self.inner.lock().modules.iter().enumerate().map(|(idx, ctx)| (idx, ctx.module.clone())).collect()
    }

    /// Evaluates the module's element table, exactly once, and returns the
    /// element count.
    fn resolve_elements(&self, idx: usize) -> Result<usize> {
        let (table, module_id) = {
            let mut db = self.inner.lock();
            let ctx = db.module_mut(idx)?;
            (ctx.element_table.take().ok_or(FwkError::State)?, FwkId::module(idx as u8))
        };
        // The generator runs outside the structural lock; it may inspect
        // runtime-discovered topology through other subsystems.
        let elements = match table {
            ElementTable::Static(elements) => elements,
            ElementTable::Generate(generate) => generate(module_id),
        };
        let mut db = self.inner.lock();
        let ctx = db.module_mut(idx)?;
        ctx.elements = elements
            .into_iter()
            .map(|e| ElementCtx { name: e.name, sub_element_count: e.sub_element_count, data: e.data })
            .collect();
        Ok(ctx.elements.len())
    }

    fn config_data(&self, idx: usize) -> Result<Option<OpaqueData>> {
        Ok(self.inner.lock().module(idx)?.config_data)
    }

    pub fn element_count(&self, idx: usize) -> Result<usize> {
        Ok(self.inner.lock().module(idx)?.elements.len())
    }

    fn element_info(&self, idx: usize, element_idx: usize) -> Result<(usize, Option<OpaqueData>)> {
        let db = self.inner.lock();
        let element = db.module(idx)?.elements.get(element_idx).ok_or(FwkError::Param)?;
        Ok((element.sub_element_count, element.data))
    }

    fn set_module_state(&self, idx: usize, state: ModuleState) -> Result<()> {
        self.inner.lock().module_mut(idx)?.state = state;
        Ok(())
    }

    pub fn module_state(&self, idx: usize) -> Result<ModuleState> {
        Ok(self.inner.lock().module(idx)?.state)
    }

    pub fn descriptor(&self, idx: usize) -> Result<ModuleDescriptor> {
        Ok(self.inner.lock().module(idx)?.desc)
    }

    /// Handle used by the scheduler to dispatch into a module.
    pub fn dispatch_handle(&self, idx: usize) -> Result<(ModuleHandle, ModuleState)> {
        let db = self.inner.lock();
        let ctx = db.module(idx)?;
        Ok((ctx.module.clone(), ctx.state))
    }

    /// Whether `id` names an existing module, element, or sub-element.
    pub fn is_valid_entity_id(&self, id: FwkId) -> bool {
        let db = self.inner.lock();
        let Some(ctx) = (match id.kind() {
            IdKind::Module | IdKind::Element | IdKind::SubElement => db.modules.get(id.module_idx()),
            _ => None,
        }) else {
            return false;
        };
        match id.kind() {
            IdKind::Module => true,
            IdKind::Element => id.element_idx() < ctx.elements.len(),
            IdKind::SubElement => ctx
                .elements
                .get(id.element_idx())
                .is_some_and(|e| id.sub_element_idx() < e.sub_element_count),
            _ => unreachable!(),
        }
    }

    /// Whether `id` names an event index the target module declares.
    pub fn is_valid_event_id(&self, id: FwkId) -> bool {
        if !id.is_kind(IdKind::Event) {
            return false;
        }
        let db = self.inner.lock();
        db.modules.get(id.module_idx()).is_some_and(|ctx| id.event_idx() < ctx.desc.event_count)
    }

    /// Whether `id` names a notification index the source module declares.
    pub fn is_valid_notification_id(&self, id: FwkId) -> bool {
        if !id.is_kind(IdKind::Notification) {
            return false;
        }
        let db = self.inner.lock();
        db.modules.get(id.module_idx()).is_some_and(|ctx| id.notification_idx() < ctx.desc.notification_count)
    }

    #[cfg(any(test, feature = "test_support"))]
    #[doc(hidden)]
    pub unsafe fn reset(&self) {
        let mut db = self.inner.lock();
        db.modules.clear();
        db.phase = Phase::PreInit;
        db.current_binder = FwkId::none();
    }
}

/// Acquires a typed API reference from another module during the bind phase.
///
/// The target answers through its `process_bind_request`; the returned
/// [`ApiRef`] stays valid for the lifetime of the program. A bind cycle
/// within a round (the target binding back into a module that is currently
/// executing `bind`) fails with `E_BUSY`; the second bind round is the
/// supported way to resolve such cycles.
pub fn module_bind(target_id: FwkId, api_id: FwkId) -> Result<ApiRef> {
    let (handle, source_id) = {
        let db = REGISTRY.inner.lock();
        if !matches!(db.phase, Phase::Bind(_)) {
            return Err(FwkError::State);
        }
        if !api_id.is_kind(IdKind::Api) || !target_id.is_entity() {
            return Err(FwkError::Param);
        }
        let ctx = db.module(target_id.module_idx())?;
        if api_id.module_idx() != target_id.module_idx() || api_id.api_idx() >= ctx.desc.api_count {
            return Err(FwkError::Param);
        }
        if target_id.is_kind(IdKind::Element) && target_id.element_idx() >= ctx.elements.len() {
            return Err(FwkError::Param);
        }
        if ctx.state == ModuleState::Uninitialized {
            return Err(FwkError::State);
        }
        (ctx.module.clone(), db.current_binder)
    };
    let mut module = handle.try_lock().ok_or(FwkError::Busy)?;
    module.process_bind_request(source_id, target_id, api_id)
}

/// Runs the lifecycle phases over every registered module, in registration
/// order. Interrupts are expected to be globally masked by the caller.
pub(crate) fn run_lifecycle() -> Result<()> {
    let handles = REGISTRY.module_handles();

    // MODULE_INIT: element tables resolve here, so a dynamic generator fires
    // right before its module's init.
    REGISTRY.set_phase(Phase::ModuleInit);
    for (idx, handle) in &handles {
        let module_id = FwkId::module(*idx as u8);
        let element_count = REGISTRY.resolve_elements(*idx)?;
        let data = REGISTRY.config_data(*idx)?;
        handle.lock().init(module_id, element_count, data).inspect_err(|err| {
            log::error!("Initialization of module {:?} failed: {}", module_id, err);
        })?;
        REGISTRY.set_module_state(*idx, ModuleState::Initialized)?;
    }

    REGISTRY.set_phase(Phase::ElementInit);
    for (idx, handle) in &handles {
        for element_idx in 0..REGISTRY.element_count(*idx)? {
            let element_id = FwkId::element(*idx as u8, element_idx as u16);
            let (sub_element_count, data) = REGISTRY.element_info(*idx, element_idx)?;
            let data = data.ok_or(FwkError::Param).inspect_err(|_| {
                log::error!("Element {:?} rejected: missing element data", element_id);
            })?;
            handle.lock().element_init(element_id, sub_element_count, data).inspect_err(|err| {
                log::error!("Initialization of element {:?} failed: {}", element_id, err);
            })?;
        }
    }

    REGISTRY.set_phase(Phase::PostInit);
    for (idx, handle) in &handles {
        handle.lock().post_init(FwkId::module(*idx as u8))?;
    }

    for round in [BindRound::Collect, BindRound::Resolve] {
        REGISTRY.set_phase(Phase::Bind(round));
        for (idx, handle) in &handles {
            let module_id = FwkId::module(*idx as u8);
            REGISTRY.set_current_binder(module_id);
            handle.lock().bind(module_id, round).inspect_err(|err| {
                log::error!("Bind round {:?} of module {:?} failed: {}", round, module_id, err);
            })?;
            for element_idx in 0..REGISTRY.element_count(*idx)? {
                handle.lock().bind(FwkId::element(*idx as u8, element_idx as u16), round)?;
            }
        }
        REGISTRY.set_current_binder(FwkId::none());
    }
    for (idx, _) in &handles {
        REGISTRY.set_module_state(*idx, ModuleState::Bound)?;
    }

    REGISTRY.set_phase(Phase::Start);
    for (idx, handle) in &handles {
        let module_id = FwkId::module(*idx as u8);
        handle.lock().start(module_id).inspect_err(|err| {
            log::error!("Start of module {:?} failed: {}", module_id, err);
        })?;
        for element_idx in 0..REGISTRY.element_count(*idx)? {
            handle.lock().start(FwkId::element(*idx as u8, element_idx as u16))?;
        }
        REGISTRY.set_module_state(*idx, ModuleState::Started)?;
    }

    REGISTRY.set_phase(Phase::Running);
    log::info!("Module lifecycle complete: {} modules started", handles.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, CallLog};
    use alloc::format;
    use alloc::string::String;
    use alloc::vec;
    use scfw_sdk::module::{Element, ModuleKind};

    fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor { kind: ModuleKind::Service, api_count: 1, event_count: 1, notification_count: 0 }
    }

    struct Recorder {
        tag: &'static str,
        log: &'static CallLog,
    }

    impl Module for Recorder {
        fn init(&mut self, _module_id: FwkId, element_count: usize, _data: Option<OpaqueData>) -> Result<()> {
            self.log.record(format!("{}.init({})", self.tag, element_count));
            Ok(())
        }

        fn element_init(&mut self, element_id: FwkId, _sub_element_count: usize, _data: OpaqueData) -> Result<()> {
            self.log.record(format!("{}.element_init[{}]", self.tag, element_id.element_idx()));
            Ok(())
        }

        fn bind(&mut self, id: FwkId, round: BindRound) -> Result<()> {
            if id.is_kind(IdKind::Module) {
                self.log.record(format!("{}.bind(round={})", self.tag, round as usize));
            }
            Ok(())
        }

        fn start(&mut self, id: FwkId) -> Result<()> {
            if id.is_kind(IdKind::Module) {
                self.log.record(format!("{}.start", self.tag));
            }
            Ok(())
        }
    }

    static ELEMENT_DATA: u32 = 0;

    fn element(name: &'static str) -> Element {
        Element { name, sub_element_count: 0, data: Some(&ELEMENT_DATA) }
    }

    fn generated_elements(_module_id: FwkId) -> Vec<Element> {
        vec![element("gen0")]
    }

    #[test]
    fn lifecycle_call_order_is_phase_major() {
        test_support::with_global_lock(|| {
            let log = test_support::leak_call_log();
            for (tag, elements) in [
                ("A", ElementTable::none()),
                ("B", ElementTable::Static(vec![element("b0"), element("b1")])),
                ("C", ElementTable::Generate(generated_elements)),
            ] {
                REGISTRY
                    .add_module(
                        descriptor(),
                        Box::new(Recorder { tag, log }),
                        ModuleConfig { elements, data: None },
                    )
                    .unwrap();
            }
            run_lifecycle().unwrap();
            let expected: Vec<String> = [
                "A.init(0)",
                "B.init(2)",
                "C.init(1)",
                "B.element_init[0]",
                "B.element_init[1]",
                "C.element_init[0]",
                "A.bind(round=0)",
                "B.bind(round=0)",
                "C.bind(round=0)",
                "A.bind(round=1)",
                "B.bind(round=1)",
                "C.bind(round=1)",
                "A.start",
                "B.start",
                "C.start",
            ]
            .iter()
            .map(|s| String::from(*s))
            .collect();
            assert_eq!(log.entries(), expected);
            assert_eq!(REGISTRY.module_state(0).unwrap(), ModuleState::Started);
            assert_eq!(REGISTRY.phase(), Phase::Running);
        })
        .unwrap();
    }

    struct FailingInit;
    impl Module for FailingInit {
        fn init(&mut self, _: FwkId, _: usize, _: Option<OpaqueData>) -> Result<()> {
            Err(FwkError::Device)
        }
    }

    #[test]
    fn init_failure_aborts_the_lifecycle() {
        test_support::with_global_lock(|| {
            REGISTRY.add_module(descriptor(), Box::new(FailingInit), ModuleConfig::default()).unwrap();
            assert_eq!(run_lifecycle().err(), Some(FwkError::Device));
            assert_eq!(REGISTRY.module_state(0).unwrap(), ModuleState::Uninitialized);
        })
        .unwrap();
    }

    struct Plain;
    impl Module for Plain {
        fn init(&mut self, _: FwkId, _: usize, _: Option<OpaqueData>) -> Result<()> {
            Ok(())
        }
        fn element_init(&mut self, _: FwkId, _: usize, _: OpaqueData) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn element_without_data_is_a_parameter_error() {
        test_support::with_global_lock(|| {
            let elements =
                ElementTable::Static(vec![Element { name: "bad", sub_element_count: 0, data: None }]);
            REGISTRY
                .add_module(descriptor(), Box::new(Plain), ModuleConfig { elements, data: None })
                .unwrap();
            assert_eq!(run_lifecycle().err(), Some(FwkError::Param));
        })
        .unwrap();
    }

    #[test]
    fn registration_is_rejected_after_pre_init() {
        test_support::with_global_lock(|| {
            REGISTRY.add_module(descriptor(), Box::new(Plain), ModuleConfig::default()).unwrap();
            run_lifecycle().unwrap();
            assert_eq!(
                REGISTRY.add_module(descriptor(), Box::new(Plain), ModuleConfig::default()).err(),
                Some(FwkError::State)
            );
        })
        .unwrap();
    }

    #[test]
    fn entity_id_validity() {
        test_support::with_global_lock(|| {
            let elements = ElementTable::Static(vec![Element {
                name: "e0",
                sub_element_count: 2,
                data: Some(&ELEMENT_DATA),
            }]);
            REGISTRY
                .add_module(descriptor(), Box::new(Plain), ModuleConfig { elements, data: None })
                .unwrap();
            run_lifecycle().unwrap();

            assert!(REGISTRY.is_valid_entity_id(FwkId::module(0)));
            assert!(REGISTRY.is_valid_entity_id(FwkId::element(0, 0)));
            assert!(REGISTRY.is_valid_entity_id(FwkId::sub_element(0, 0, 1)));
            assert!(!REGISTRY.is_valid_entity_id(FwkId::element(0, 1)));
            assert!(!REGISTRY.is_valid_entity_id(FwkId::sub_element(0, 0, 2)));
            assert!(!REGISTRY.is_valid_entity_id(FwkId::module(1)));
            assert!(!REGISTRY.is_valid_entity_id(FwkId::none()));
            assert!(!REGISTRY.is_valid_entity_id(FwkId::api(0, 0)));

            assert!(REGISTRY.is_valid_event_id(FwkId::event(0, 0)));
            assert!(!REGISTRY.is_valid_event_id(FwkId::event(0, 1)));
            assert!(!REGISTRY.is_valid_notification_id(FwkId::notification(0, 0)));
        })
        .unwrap();
    }

    struct Binder {
        api: Option<ApiRef>,
    }

    trait Adder: Sync {
        fn add(&self, a: u32, b: u32) -> u32;
    }

    struct AdderImpl;
    impl Adder for AdderImpl {
        fn add(&self, a: u32, b: u32) -> u32 {
            a + b
        }
    }
    static ADDER: AdderImpl = AdderImpl;

    impl Module for Binder {
        fn init(&mut self, _: FwkId, _: usize, _: Option<OpaqueData>) -> Result<()> {
            Ok(())
        }
        fn bind(&mut self, id: FwkId, round: BindRound) -> Result<()> {
            if round == BindRound::Collect && id.is_kind(IdKind::Module) {
                self.api = Some(module_bind(FwkId::module(1), FwkId::api(1, 0))?);
            }
            Ok(())
        }
        fn start(&mut self, _: FwkId) -> Result<()> {
            let adder = self.api.expect("bound").downcast::<dyn Adder>()?;
            assert_eq!(adder.add(2, 3), 5);
            Ok(())
        }
    }

    struct Provider;

    impl Module for Provider {
        fn init(&mut self, _: FwkId, _: usize, _: Option<OpaqueData>) -> Result<()> {
            Ok(())
        }
        fn process_bind_request(&mut self, source_id: FwkId, target_id: FwkId, api_id: FwkId) -> Result<ApiRef> {
            if api_id.api_idx() != 0 {
                return Err(FwkError::Param);
            }
            // The framework names the module whose bind callback is running.
            assert_eq!(source_id, FwkId::module(0));
            assert_eq!(target_id, FwkId::module(1));
            Ok(ApiRef::new(&ADDER as &dyn Adder))
        }
    }

    #[test]
    fn bind_hands_out_a_typed_api() {
        test_support::with_global_lock(|| {
            REGISTRY.add_module(descriptor(), Box::new(Binder { api: None }), ModuleConfig::default()).unwrap();
            REGISTRY.add_module(descriptor(), Box::new(Provider), ModuleConfig::default()).unwrap();
            run_lifecycle().unwrap();
        })
        .unwrap();
    }

    #[test]
    fn bind_is_rejected_outside_the_bind_phase() {
        test_support::with_global_lock(|| {
            REGISTRY.add_module(descriptor(), Box::new(Plain), ModuleConfig::default()).unwrap();
            assert_eq!(module_bind(FwkId::module(0), FwkId::api(0, 0)).err(), Some(FwkError::State));
        })
        .unwrap();
    }

    struct SelfBinder;
    impl Module for SelfBinder {
        fn init(&mut self, _: FwkId, _: usize, _: Option<OpaqueData>) -> Result<()> {
            Ok(())
        }
        fn bind(&mut self, id: FwkId, round: BindRound) -> Result<()> {
            if round == BindRound::Collect && id.is_kind(IdKind::Module) {
                // Binding into a module whose bind is on the stack is a cycle.
                assert_eq!(module_bind(FwkId::module(0), FwkId::api(0, 0)).err(), Some(FwkError::Busy));
            }
            Ok(())
        }
    }

    #[test]
    fn bind_cycles_surface_as_busy() {
        test_support::with_global_lock(|| {
            REGISTRY.add_module(descriptor(), Box::new(SelfBinder), ModuleConfig::default()).unwrap();
            run_lifecycle().unwrap();
        })
        .unwrap();
    }
}
