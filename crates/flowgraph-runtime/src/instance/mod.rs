//! Graph instances: per-target execution state over shared graph snapshots.
//!
//! A [`GraphInstance`] binds one host target to a [`GraphHandle`] and the
//! handle's base chain. The snapshots are shared and never mutated; the
//! instance owns everything that changes while a graph runs: variable slots,
//! auto-property backing fields, cached node outputs, per-element runtime
//! data, delegate identities, call frames, state records and parked routines.
//!
//! All storage is keyed by [`RuntimeId`] (container uid plus element id), so
//! it stays reachable when a newer snapshot replaces the element objects but
//! keeps their ids. Every public entry point first calls
//! [`GraphInstance::refresh`], which adopts newly published snapshots,
//! initializes elements that appeared, and forgets elements that vanished.
//!
//! # Modules
//!
//! - `context` -- [`MemberContext`] implementation (variables, properties,
//!   parameters, function calls, delegates)
//! - `eval` -- value-port evaluation (literals, operators, pure member reads)
//! - `exec` -- flow execution: frame stack, jump unwinding, suspension, calls

mod context;
mod eval;
mod exec;

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use flowgraph_core::node::ports;
use flowgraph_core::{
    ContainerKind, DelegateRef, ElementId, ElementKind, ElementTag, Graph, GraphUid, MemberContext, MemberData,
    NodeKind, PortId, PortKind, PortRef, RuntimeId, TypeName, TypeRegistry, Value,
};

use crate::config::InstanceConfig;
use crate::error::RuntimeError;
use crate::handle::GraphHandle;
use crate::rebind::{ElementRef, PortHandle, RebindMap};
use crate::scheduler::{CoroutineScheduler, QueueScheduler, RoutineId};
use crate::state::{FlowState, StateGraphRunner, StateKey};
use crate::trace::TraceEntry;

use exec::Routine;

/// One graph of the base chain together with the snapshot the instance
/// currently runs against.
struct Layer {
    handle: Rc<GraphHandle>,
    snapshot: Rc<Graph>,
}

/// A single active synchronous call of a graph function.
#[derive(Debug)]
struct CallFrame {
    /// Which function this frame is executing.
    function: ElementId,
    /// Layer the function belongs to.
    layer: usize,
    /// Parameter values, converted to the declared parameter types. Ref and
    /// out slots are copied back to the caller when the call returns.
    args: Vec<Value>,
    /// Generic arguments bound by the caller.
    generic_args: Vec<TypeName>,
    /// Function-scoped local variables, created on first access.
    locals: HashMap<ElementId, Value>,
}

/// Execution state of one host target running a graph.
pub struct GraphInstance {
    /// Base chain, most-base first; the last layer is the instance's own graph.
    layers: Vec<Layer>,
    /// Layer whose snapshot member access currently resolves against.
    active: usize,
    registry: Rc<TypeRegistry>,
    target: Value,
    config: InstanceConfig,
    /// Variables, auto-property backing fields and scope-level locals.
    slots: HashMap<RuntimeId, Value>,
    /// Cached values of flow-node outputs (member results, loop indices).
    outputs: HashMap<(RuntimeId, PortId), Value>,
    element_data: HashMap<(RuntimeId, TypeId), Box<dyn Any>>,
    delegates: HashMap<RuntimeId, DelegateRef>,
    /// Event name to entry nodes, in registration order.
    handlers: IndexMap<String, Vec<(usize, ElementId)>>,
    initialized: HashSet<RuntimeId>,
    /// Rebind maps keyed by container and the version they map from. Only
    /// maps reaching the adopted snapshot are kept.
    rebind_maps: HashMap<(GraphUid, u64), Rc<RebindMap>>,
    calls: Vec<CallFrame>,
    runner: StateGraphRunner,
    /// Routines parked at a `Wait` node.
    routines: HashMap<RoutineId, Routine>,
    next_routine: u64,
    scheduler: Box<dyn CoroutineScheduler>,
    output: Vec<Value>,
    trace: Vec<TraceEntry>,
    /// Inputs read by the node currently executing, for its trace entry.
    traced_inputs: Vec<(PortId, Value)>,
    /// Nesting of value-port evaluation.
    eval_depth: usize,
}

impl GraphInstance {
    /// Creates an instance for `target` and runs the initialize hook of every
    /// element in the handle's chain, most-base first.
    pub fn new(handle: Rc<GraphHandle>, registry: Rc<TypeRegistry>, target: Value, config: InstanceConfig) -> Self {
        let layers: Vec<Layer> = handle
            .chain()
            .into_iter()
            .map(|handle| Layer {
                snapshot: handle.current(),
                handle,
            })
            .collect();
        let active = layers.len() - 1;
        let mut instance = GraphInstance {
            layers,
            active,
            registry,
            target,
            config,
            slots: HashMap::new(),
            outputs: HashMap::new(),
            element_data: HashMap::new(),
            delegates: HashMap::new(),
            handlers: IndexMap::new(),
            initialized: HashSet::new(),
            rebind_maps: HashMap::new(),
            calls: Vec::new(),
            runner: StateGraphRunner::new(),
            routines: HashMap::new(),
            next_routine: 0,
            scheduler: Box::new(QueueScheduler::new()),
            output: Vec::new(),
            trace: Vec::new(),
            traced_inputs: Vec::new(),
            eval_depth: 0,
        };
        instance.initialize();
        instance
    }

    /// Replaces the coroutine scheduler. Routines already parked stay with
    /// the previous scheduler, so call this before running anything.
    pub fn with_scheduler(mut self, scheduler: Box<dyn CoroutineScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Initializes every element not yet initialized, most-base first.
    ///
    /// Called by [`GraphInstance::new`]; calling it again only reaches
    /// elements added since, so each element is initialized exactly once.
    pub fn initialize(&mut self) -> usize {
        (0..self.layers.len()).map(|layer| self.initialize_layer(layer)).sum()
    }

    fn initialize_layer(&mut self, layer: usize) -> usize {
        let snapshot = Rc::clone(&self.layers[layer].snapshot);
        let uid = snapshot.uid();
        let mut fresh = 0;
        for id in snapshot.walk() {
            if !self.initialized.insert(RuntimeId::new(uid, id)) {
                continue;
            }
            if let Some(element) = snapshot.get(id) {
                self.initialize_element(layer, uid, id, &element.kind);
                fresh += 1;
            }
        }
        fresh
    }

    fn initialize_element(&mut self, layer: usize, uid: GraphUid, id: ElementId, kind: &ElementKind) {
        let key = RuntimeId::new(uid, id);
        match kind {
            ElementKind::Variable(def) => {
                self.slots.insert(key, initial_value(&def.ty, &def.default));
            }
            ElementKind::Property(decl) if decl.is_auto() => {
                self.slots.insert(key, initial_value(&decl.ty, &decl.default));
            }
            ElementKind::Node(node) => {
                if let NodeKind::EventEntry { event } = &node.kind {
                    self.handlers.entry(event.clone()).or_default().push((layer, id));
                }
            }
            _ => {}
        }
    }

    // ---- Snapshots and live rebind ----

    /// Adopts snapshots published since the last call.
    ///
    /// For each swapped layer, storage of elements without an equivalent in
    /// the new snapshot is dropped and new elements are initialized. Returns
    /// `true` if any layer changed.
    pub fn refresh(&mut self) -> bool {
        let mut changed = false;
        for layer in 0..self.layers.len() {
            let current = self.layers[layer].handle.current();
            let previous = Rc::clone(&self.layers[layer].snapshot);
            if current.version() == previous.version() {
                continue;
            }
            let map = self.rebind_map(&previous, &current);
            let uid = current.uid();
            let vanished: Vec<ElementId> = previous
                .elements()
                .map(|el| el.id())
                .filter(|&id| map.get(id).is_none())
                .collect();
            for &id in &vanished {
                self.forget(RuntimeId::new(uid, id));
            }
            for entries in self.handlers.values_mut() {
                entries.retain(|&(l, id)| l != layer || map.get(id).is_some());
            }
            let adopted = current.version();
            self.rebind_maps
                .retain(|&(owner, _), map| owner != uid || map.to_version() >= adopted);
            self.layers[layer].snapshot = current;
            let fresh = self.initialize_layer(layer);
            tracing::debug!(
                %uid,
                from = previous.version(),
                to = self.layers[layer].snapshot.version(),
                vanished = vanished.len(),
                fresh,
                "adopted graph snapshot"
            );
            changed = true;
        }
        changed
    }

    fn forget(&mut self, key: RuntimeId) {
        self.slots.remove(&key);
        self.delegates.remove(&key);
        self.initialized.remove(&key);
        self.outputs.retain(|(owner, _), _| *owner != key);
        self.element_data.retain(|(owner, _), _| *owner != key);
    }

    /// Old-to-new map between two snapshots of one container, computed once
    /// per pair.
    fn rebind_map(&mut self, old: &Graph, new: &Graph) -> Rc<RebindMap> {
        let key = (old.uid(), old.version());
        if let Some(map) = self.rebind_maps.get(&key) {
            if map.to_version() == new.version() {
                return Rc::clone(map);
            }
        }
        let map = Rc::new(RebindMap::build(old, new));
        self.rebind_maps.insert(key, Rc::clone(&map));
        map
    }

    fn layer_of(&self, uid: GraphUid) -> Option<usize> {
        self.layers.iter().position(|layer| layer.handle.uid() == uid)
    }

    /// The snapshot of the instance's own (most-derived) graph.
    pub fn snapshot(&self) -> Rc<Graph> {
        Rc::clone(&self.layers[self.layers.len() - 1].snapshot)
    }

    fn active_snapshot(&self) -> Rc<Graph> {
        Rc::clone(&self.layers[self.active].snapshot)
    }

    pub fn handle(&self) -> &Rc<GraphHandle> {
        &self.layers[self.layers.len() - 1].handle
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn target(&self) -> &Value {
        &self.target
    }

    /// Storage key of `id` in the active graph.
    pub fn runtime_id(&self, id: ElementId) -> RuntimeId {
        RuntimeId::new(self.layers[self.active].handle.uid(), id)
    }

    /// Reference to `id` in the active graph's current snapshot.
    pub fn element_ref(&self, id: ElementId) -> Option<ElementRef> {
        ElementRef::new(&self.layers[self.active].snapshot, id)
    }

    /// Reference to a port in the active graph's current snapshot.
    pub fn port_handle(&self, port: &PortRef) -> Option<PortHandle> {
        PortHandle::new(&self.layers[self.active].snapshot, port)
    }

    /// Returns `true` if `element` points into the snapshot its container
    /// currently publishes.
    pub fn is_valid(&self, element: &ElementRef) -> bool {
        self.layer_of(element.container())
            .is_some_and(|layer| self.layers[layer].handle.version() == element.version())
    }

    /// Relocates `element` in the current snapshot of its container.
    ///
    /// A current reference is returned unchanged. A stale one is looked up
    /// first among the rebound references cached in element data, then
    /// through the rebind map; the result is cached. `None` means the element
    /// no longer exists.
    pub fn get_valid_element(&mut self, element: &ElementRef) -> Option<ElementRef> {
        self.refresh();
        let layer = self.layer_of(element.container())?;
        let current = Rc::clone(&self.layers[layer].snapshot);
        if element.version() == current.version() {
            return Some(element.clone());
        }
        let slot = (element.runtime_id(), TypeId::of::<ElementRef>());
        if let Some(cached) = self.element_data.get(&slot).and_then(|d| d.downcast_ref::<ElementRef>()) {
            if cached.version() == current.version() {
                return Some(cached.clone());
            }
        }
        let map = self.rebind_map(element.snapshot(), &current);
        match map.get(element.id()).and_then(|id| ElementRef::new(&current, id)) {
            Some(rebound) => {
                self.element_data.insert(slot, Box::new(rebound.clone()));
                Some(rebound)
            }
            None => {
                tracing::debug!(
                    element = %element.id(),
                    version = element.version(),
                    current = current.version(),
                    "element has no equivalent in the current snapshot"
                );
                None
            }
        }
    }

    /// Relocates `port` through its node, keeping the port key and direction.
    pub fn get_valid_port(&mut self, port: &PortHandle) -> Option<PortHandle> {
        let node = self.get_valid_element(&port.node)?;
        if node.same_object(&port.node) {
            return Some(port.clone());
        }
        let kind = node
            .snapshot()
            .port(&PortRef::new(node.id(), port.port.clone()))
            .ok()?
            .kind;
        (kind == port.kind).then(|| PortHandle {
            node,
            port: port.port.clone(),
            kind,
        })
    }

    // ---- Per-element data ----

    pub fn set_element_data<T: Any>(&mut self, owner: ElementId, value: T) {
        let key = self.runtime_id(owner);
        self.element_data.insert((key, TypeId::of::<T>()), Box::new(value));
    }

    pub fn get_element_data<T: Any>(&self, owner: ElementId) -> Option<&T> {
        self.element_data
            .get(&(self.runtime_id(owner), TypeId::of::<T>()))
            .and_then(|data| data.downcast_ref())
    }

    pub fn get_element_data_mut<T: Any>(&mut self, owner: ElementId) -> Option<&mut T> {
        let key = self.runtime_id(owner);
        self.element_data
            .get_mut(&(key, TypeId::of::<T>()))
            .and_then(|data| data.downcast_mut())
    }

    pub fn remove_element_data<T: Any>(&mut self, owner: ElementId) -> Option<T> {
        let key = self.runtime_id(owner);
        let data = self.element_data.remove(&(key, TypeId::of::<T>()))?;
        data.downcast::<T>().ok().map(|boxed| *boxed)
    }

    // ---- Delegates and events ----

    /// The delegate bound to `function` in the active graph. Repeated calls
    /// return the same delegate, so it can later be unsubscribed.
    pub fn delegate(&mut self, function: ElementId) -> DelegateRef {
        let key = self.runtime_id(function);
        self.delegates
            .entry(key)
            .or_insert_with(|| DelegateRef::new(key.container, function))
            .clone()
    }

    /// Subscribes graph function `function` to the event `event` refers to.
    pub fn subscribe(&mut self, event: &MemberData, function: ElementId) -> Result<(), RuntimeError> {
        self.refresh();
        let delegate = self.delegate(function);
        let graph = self.active_snapshot();
        event
            .add_listener(self, delegate)
            .map_err(|e| RuntimeError::member(&graph.name, function, e))
    }

    /// Removes the subscription made by [`GraphInstance::subscribe`].
    pub fn unsubscribe(&mut self, event: &MemberData, function: ElementId) -> Result<bool, RuntimeError> {
        self.refresh();
        let delegate = self.delegate(function);
        let graph = self.active_snapshot();
        event
            .remove_listener(self, &delegate)
            .map_err(|e| RuntimeError::member(&graph.name, function, e))
    }

    /// Raises the event `event` refers to, calling every subscriber.
    pub fn raise(&mut self, event: &MemberData, mut args: Vec<Value>) -> Result<(), RuntimeError> {
        self.refresh();
        let graph = self.active_snapshot();
        event
            .invoke(self, None, &mut args)
            .map(|_| ())
            .map_err(|e| RuntimeError::member(&graph.name, graph.root(), e))
    }

    // ---- Entry points ----

    /// Runs every entry node registered for `event`, base graphs first.
    /// Returns the number of handlers started.
    pub fn trigger_event(&mut self, event: &str) -> Result<usize, RuntimeError> {
        self.refresh();
        let handlers = self.handlers.get(event).cloned().unwrap_or_default();
        if handlers.is_empty() {
            tracing::debug!(event, "no handler registered");
        }
        for &(layer, entry) in &handlers {
            let snapshot = Rc::clone(&self.layers[layer].snapshot);
            let id = self.next_routine_id();
            let mut routine = Routine::new(id, layer, Rc::clone(&snapshot));
            routine.follow(&snapshot, entry, ports::EXIT);
            tracing::debug!(event, routine = %id, entry = %entry, "event handler started");
            self.continue_routine(routine)?;
        }
        Ok(handlers.len())
    }

    /// Calls the graph function `name`, searching the derived graph first.
    pub fn call_function(&mut self, name: &str, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.refresh();
        let (layer, function) = self
            .find_member(ContainerKind::Functions, name)
            .ok_or_else(|| RuntimeError::FunctionNotFound {
                graph: self.snapshot().name.clone(),
                name: name.to_string(),
            })?;
        let previous = std::mem::replace(&mut self.active, layer);
        let result = self.call_graph_function(function, &[], &mut args);
        self.active = previous;
        result
    }

    /// Current value of the graph variable `name`.
    pub fn get_variable(&mut self, name: &str) -> Result<Value, RuntimeError> {
        self.refresh();
        let (layer, id) = self.find_variable(name)?;
        let previous = std::mem::replace(&mut self.active, layer);
        let result = MemberContext::variable(self, id);
        self.active = previous;
        result.map_err(|e| RuntimeError::member(&self.layers[layer].snapshot.name, id, e))
    }

    /// Assigns the graph variable `name`, converting to its declared type.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.refresh();
        let (layer, id) = self.find_variable(name)?;
        let previous = std::mem::replace(&mut self.active, layer);
        let result = MemberContext::set_variable(self, id, value);
        self.active = previous;
        result.map_err(|e| RuntimeError::member(&self.layers[layer].snapshot.name, id, e))
    }

    fn find_variable(&self, name: &str) -> Result<(usize, ElementId), RuntimeError> {
        self.find_member(ContainerKind::Variables, name)
            .ok_or_else(|| RuntimeError::VariableNotFound {
                graph: self.snapshot().name.clone(),
                name: name.to_string(),
            })
    }

    /// Finds a direct child of a pinned container, derived graph first.
    fn find_member(&self, container: ContainerKind, name: &str) -> Option<(usize, ElementId)> {
        self.layers.iter().enumerate().rev().find_map(|(i, layer)| {
            let graph = &layer.snapshot;
            graph.find_child(graph.container(container), name).map(|id| (i, id))
        })
    }

    /// Current value of any port of the derived graph.
    pub fn read_port(&mut self, port: &PortRef) -> Result<Value, RuntimeError> {
        self.refresh();
        let graph = self.active_snapshot();
        self.port_in(&graph, port)
    }

    // ---- State flow ----

    /// Follows the flow output `output` to the input it is connected to and
    /// starts that input as an independent routine.
    ///
    /// An input that is already running is left alone. Returns the input's
    /// state afterwards: `Running` if the routine suspended, `Finished` if it
    /// ran to completion, `Idle` if `output` is not connected.
    pub fn run_state(&mut self, output: &PortRef) -> Result<FlowState, RuntimeError> {
        self.refresh();
        let graph = self.active_snapshot();
        if graph.port_kind(output) != Some(PortKind::FlowOutput) {
            return Err(RuntimeError::Internal {
                message: format!("port {}:{} is not a flow output", output.node, output.port.as_str()),
            });
        }
        self.start_state(self.active, output)
    }

    /// Forces the state of flow input `input` to `Finished` and discards the
    /// routine driving it. Returns `true` if a routine was running.
    pub fn stop_state(&mut self, input: &PortRef) -> bool {
        let key = self.state_key(input);
        match self.runner.stop(&key) {
            Some(routine) => {
                self.scheduler.cancel(routine);
                self.routines.remove(&routine);
                tracing::debug!(%routine, node = %input.node, "state stopped");
                true
            }
            None => false,
        }
    }

    pub fn state_of(&self, input: &PortRef) -> FlowState {
        self.runner.state_of(&self.state_key(input))
    }

    fn state_key(&self, input: &PortRef) -> StateKey {
        StateKey::new(self.runtime_id(input.node), input.port.clone())
    }

    // ---- Scheduling ----

    /// Advances the scheduler by one frame of `delta` seconds and resumes the
    /// routines that became due. Returns how many were resumed.
    pub fn tick(&mut self, delta: f64) -> Result<usize, RuntimeError> {
        self.refresh();
        let mut resumed = 0;
        for id in self.scheduler.advance(delta) {
            if self.routines.contains_key(&id) {
                self.resume_parked(id)?;
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// Resumes a parked routine immediately, regardless of its wait.
    pub fn resume_routine(&mut self, id: RoutineId) -> Result<(), RuntimeError> {
        self.refresh();
        self.scheduler.cancel(id);
        self.resume_parked(id)
    }

    /// Number of routines parked at a `Wait` node.
    pub fn pending_routines(&self) -> usize {
        self.routines.len()
    }

    /// Ids of the parked routines, oldest first.
    pub fn parked_routines(&self) -> Vec<RoutineId> {
        let mut ids: Vec<RoutineId> = self.routines.keys().copied().collect();
        ids.sort();
        ids
    }

    fn next_routine_id(&mut self) -> RoutineId {
        self.next_routine += 1;
        RoutineId(self.next_routine)
    }

    // ---- Output ----

    /// Values printed so far, in order.
    pub fn output(&self) -> &[Value] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.output)
    }

    /// Recorded trace entries; empty unless tracing is enabled.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }
}

impl fmt::Debug for GraphInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphInstance")
            .field("graph", &self.snapshot().name)
            .field("layers", &self.layers.len())
            .field("versions", &self.layers.iter().map(|l| l.snapshot.version()).collect::<Vec<_>>())
            .field("slots", &self.slots.len())
            .field("parked", &self.routines.len())
            .finish()
    }
}

/// Starting value of a variable or auto property: its default, or the
/// type's default when none is set.
fn initial_value(ty: &TypeName, default: &Value) -> Value {
    if default.is_null() {
        Value::default_for(ty)
    } else {
        default.duplicate()
    }
}

/// Element-kind check shared by the member context.
fn has_tag(graph: &Graph, id: ElementId, tag: ElementTag) -> bool {
    graph.get(id).is_some_and(|el| el.kind.tag() == tag)
}
