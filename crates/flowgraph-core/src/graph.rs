//! Graph: the element tree of one graph definition.
//!
//! [`Graph`] owns every [`GraphElement`] in a petgraph `StableGraph` arena.
//! Arena edges mirror the parent relation (parent -> child), while sibling
//! order lives in each element's `children` list. All tree mutations go
//! through `Graph` methods so the two stay consistent.
//!
//! Every graph is created with a root and four pinned sub-containers
//! (variables, properties, functions, main). Element ids are allocated
//! monotonically and are never reused within a graph while the old owner is
//! still present; looking an element up goes through a lazily rebuilt
//! id -> index cache that falls back to a linear scan, so a stale cache entry
//! can never hand out the wrong element.
//!
//! Connections between node ports are handled in
//! [`connection`](crate::connection), which extends `Graph` with the port API.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use petgraph::algo::has_path_connecting;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::Directed;
use serde::{Deserialize, Serialize};

use crate::element::{
    ContainerKind, DetachedElement, ElementKind, FunctionDecl, GraphElement, IndexerDecl,
    PropertyDecl, VariableDef,
};
use crate::error::CoreError;
use crate::id::{ConnectionId, ElementId, GraphUid, PortRef};
use crate::node::{NodeData, NodeKind};
use crate::port::{Connection, Port};
use crate::types::TypeName;
use crate::value::Value;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Arena edge from a parent element to one of its children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contains;

/// One graph definition: the element tree plus its connection table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    uid: GraphUid,
    /// Snapshot version; bumped by whoever publishes an edited copy.
    version: u64,
    arena: StableGraph<GraphElement, Contains, Directed, u32>,
    root: ElementId,
    next_id: u32,
    pub(crate) connections: IndexMap<ConnectionId, Connection>,
    pub(crate) next_connection_id: u32,
    #[serde(skip)]
    index: RefCell<HashMap<ElementId, NodeIndex<u32>>>,
}

impl Graph {
    /// Creates an empty graph with a fresh process-unique uid.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_uid(name, GraphUid(NEXT_UID.fetch_add(1, Ordering::Relaxed)))
    }

    /// Creates an empty graph with a caller-chosen uid.
    pub fn with_uid(name: impl Into<String>, uid: GraphUid) -> Self {
        let mut graph = Graph {
            name: name.into(),
            uid,
            version: 1,
            arena: StableGraph::new(),
            root: ElementId::NONE,
            next_id: 1,
            connections: IndexMap::new(),
            next_connection_id: 1,
            index: RefCell::new(HashMap::new()),
        };
        let root_idx = graph.insert_raw(GraphElement::new("root", ElementKind::Root), None);
        graph.root = graph.arena[root_idx].id;
        for (name, kind) in [
            ("variables", ContainerKind::Variables),
            ("properties", ContainerKind::Properties),
            ("functions", ContainerKind::Functions),
            ("main", ContainerKind::Main),
        ] {
            graph.insert_raw(
                GraphElement::new(name, ElementKind::Container(kind)),
                Some(root_idx),
            );
        }
        graph
    }

    // -----------------------------------------------------------------------
    // Identity and versioning
    // -----------------------------------------------------------------------

    pub fn uid(&self) -> GraphUid {
        self.uid
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Advances the snapshot version. Called once per published edit.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Makes this tree the successor of `previous`: same container identity,
    /// version exactly one greater. Used when a deserialized tree replaces a
    /// live one.
    pub fn supersede(&mut self, previous: &Graph) {
        self.uid = previous.uid;
        self.version = previous.version + 1;
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Returns the mandatory sub-container of the given kind.
    ///
    /// `Group` has no canonical instance and maps to the root.
    pub fn container(&self, kind: ContainerKind) -> ElementId {
        self.get(self.root)
            .into_iter()
            .flat_map(|root| root.children.iter().copied())
            .find(|&child| {
                matches!(
                    self.get(child).map(|c| &c.kind),
                    Some(ElementKind::Container(k)) if *k == kind
                )
            })
            .unwrap_or(self.root)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    fn lookup(&self, id: ElementId) -> Option<NodeIndex<u32>> {
        if id.is_none() {
            return None;
        }
        if let Some(&idx) = self.index.borrow().get(&id) {
            if self.arena.node_weight(idx).is_some_and(|e| e.id == id) {
                return Some(idx);
            }
        }
        let found = self.arena.node_indices().find(|&i| self.arena[i].id == id);
        let mut cache = self.index.borrow_mut();
        match found {
            Some(idx) => {
                cache.insert(id, idx);
            }
            None => {
                cache.remove(&id);
            }
        }
        found
    }

    fn index_of(&self, id: ElementId) -> Result<NodeIndex<u32>, CoreError> {
        self.lookup(id).ok_or(CoreError::ElementNotFound { id })
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.lookup(id).is_some()
    }

    pub fn get(&self, id: ElementId) -> Option<&GraphElement> {
        self.lookup(id).map(|idx| &self.arena[idx])
    }

    /// Mutable access to an element's name, comment and payload. Tree links
    /// stay private to the graph.
    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut GraphElement> {
        self.lookup(id).map(move |idx| &mut self.arena[idx])
    }

    pub fn node(&self, id: ElementId) -> Result<&NodeData, CoreError> {
        self.get(id)
            .ok_or(CoreError::ElementNotFound { id })?
            .as_node()
            .ok_or(CoreError::NotANode { id })
    }

    pub(crate) fn node_mut(&mut self, id: ElementId) -> Result<&mut NodeData, CoreError> {
        self.get_mut(id)
            .ok_or(CoreError::ElementNotFound { id })?
            .as_node_mut()
            .ok_or(CoreError::NotANode { id })
    }

    pub fn port(&self, port: &PortRef) -> Result<&Port, CoreError> {
        self.node(port.node)?
            .port(&port.port)
            .ok_or_else(|| CoreError::PortNotFound { port: port.clone() })
    }

    pub fn element_count(&self) -> usize {
        self.arena.node_count()
    }

    /// All live elements, in arena order.
    pub fn elements(&self) -> impl Iterator<Item = &GraphElement> {
        self.arena.node_weights()
    }

    /// All element ids in pre-order from the root, following sibling order.
    pub fn walk(&self) -> Vec<ElementId> {
        let mut out = self.descendants(self.root);
        out.insert(0, self.root);
        out
    }

    /// Descendants of `id` in pre-order. Children missing from the arena are
    /// skipped.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = match self.get(id) {
            Some(el) => el.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            if let Some(el) = self.get(next) {
                out.push(next);
                stack.extend(el.children.iter().rev().copied());
            }
        }
        out
    }

    /// Pre-order subtree rooted at `id` (inclusive), failing if any listed
    /// child is missing from the arena.
    fn checked_subtree(&self, id: ElementId) -> Result<Vec<ElementId>, CoreError> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let el = self.get(next).ok_or_else(|| CoreError::GraphInconsistency {
                reason: format!("element {next} is listed as a child but is not in the graph"),
            })?;
            out.push(next);
            stack.extend(el.children.iter().rev().copied());
        }
        Ok(out)
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut current = self.get(id).and_then(GraphElement::parent);
        while let Some(parent) = current {
            if out.contains(&parent) {
                break;
            }
            out.push(parent);
            current = self.get(parent).and_then(GraphElement::parent);
        }
        out
    }

    /// Returns `true` if `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor_of(&self, ancestor: ElementId, id: ElementId) -> bool {
        match (self.lookup(ancestor), self.lookup(id)) {
            (Some(a), Some(b)) if a != b => has_path_connecting(&self.arena, a, b, None),
            _ => false,
        }
    }

    pub fn find_child(&self, parent: ElementId, name: &str) -> Option<ElementId> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.get(c).is_some_and(|el| el.name == name))
    }

    /// First element named `name` in pre-order.
    pub fn find_by_name(&self, name: &str) -> Option<ElementId> {
        self.walk()
            .into_iter()
            .find(|&id| self.get(id).is_some_and(|el| el.name == name))
    }

    /// Nearest enclosing function of `id` (not `id` itself).
    pub fn owning_function(&self, id: ElementId) -> Option<ElementId> {
        self.ancestors(id)
            .into_iter()
            .find(|&a| self.get(a).is_some_and(|el| el.as_function().is_some()))
    }

    pub fn function(&self, id: ElementId) -> Option<&FunctionDecl> {
        self.get(id)?.as_function()
    }

    /// The `FunctionEntry` node of a function body.
    pub fn function_entry(&self, function: ElementId) -> Option<ElementId> {
        self.descendants(function).into_iter().find(|&id| {
            matches!(
                self.get(id).and_then(GraphElement::as_node).map(|n| &n.kind),
                Some(NodeKind::FunctionEntry)
            )
        })
    }

    /// All event entry nodes, in pre-order, with their event names.
    pub fn event_entries(&self) -> Vec<(ElementId, String)> {
        self.walk()
            .into_iter()
            .filter_map(|id| match self.get(id)?.as_node()?.kind {
                NodeKind::EventEntry { ref event } => Some((id, event.clone())),
                _ => None,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Raw arena mutation
    // -----------------------------------------------------------------------

    /// Ids only grow: `next_id` stays above every id ever issued.
    fn allocate_id(&mut self) -> ElementId {
        let id = ElementId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }

    /// Raises the id counters above every element and connection id present.
    ///
    /// Trees built through this API never need it; a deserialized tree
    /// whose persisted counters were edited by hand does. Returns `true` if
    /// a counter moved.
    pub fn repair_counters(&mut self) -> bool {
        let max_element = self.arena.node_weights().map(|e| e.id.0).max().unwrap_or(0);
        let max_connection = self.connections.keys().map(|c| c.0).max().unwrap_or(0);
        let mut moved = false;
        if self.next_id <= max_element {
            self.next_id = max_element + 1;
            moved = true;
        }
        if self.next_connection_id <= max_connection {
            self.next_connection_id = max_connection + 1;
            moved = true;
        }
        moved
    }

    /// Inserts `element` with a fresh id and appends it to `parent`.
    fn insert_raw(&mut self, mut element: GraphElement, parent: Option<NodeIndex<u32>>) -> NodeIndex<u32> {
        let id = self.allocate_id();
        element.id = id;
        element.parent = None;
        element.children.clear();
        element.destroyed = false;
        if let Some(node) = element.as_node_mut() {
            for port in &mut node.ports {
                port.connections.clear();
            }
        }
        let idx = self.arena.add_node(element);
        self.index.borrow_mut().insert(id, idx);
        if let Some(parent_idx) = parent {
            self.link(idx, parent_idx, None);
        }
        idx
    }

    fn link(&mut self, idx: NodeIndex<u32>, parent_idx: NodeIndex<u32>, position: Option<usize>) {
        let id = self.arena[idx].id;
        let parent_id = self.arena[parent_idx].id;
        self.arena[idx].parent = Some(parent_id);
        let siblings = &mut self.arena[parent_idx].children;
        let at = position.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(at, id);
        self.arena.add_edge(parent_idx, idx, Contains);
    }

    fn unlink(&mut self, idx: NodeIndex<u32>) {
        let id = self.arena[idx].id;
        let Some(parent_id) = self.arena[idx].parent.take() else {
            return;
        };
        if let Some(parent_idx) = self.lookup(parent_id) {
            self.arena[parent_idx].children.retain(|c| *c != id);
            if let Some(edge) = self.arena.find_edge(parent_idx, idx) {
                self.arena.remove_edge(edge);
            }
        }
    }

    fn remove_raw(&mut self, id: ElementId) {
        self.clear_element_connections(id);
        if let Some(idx) = self.lookup(id) {
            self.arena.remove_node(idx);
        }
        self.index.borrow_mut().remove(&id);
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Adds a single element under `parent` and returns its new id.
    pub fn add_element(&mut self, parent: ElementId, element: GraphElement) -> Result<ElementId, CoreError> {
        if element.is_destroyed() {
            return Err(CoreError::DestroyedElement { name: element.name });
        }
        if matches!(element.kind, ElementKind::Root) {
            return Err(CoreError::PinnedElement {
                element: ElementId::NONE,
                name: element.name,
            });
        }
        let parent_idx = self.index_of(parent)?;
        let idx = self.insert_raw(element, Some(parent_idx));
        Ok(self.arena[idx].id)
    }

    /// Adds a node, building its ports from `kind`.
    pub fn add_node(&mut self, parent: ElementId, name: impl Into<String>, kind: NodeKind) -> Result<ElementId, CoreError> {
        let ports = kind.build_ports(self);
        self.add_element(
            parent,
            GraphElement::new(name, ElementKind::Node(NodeData::new(kind, ports))),
        )
    }

    pub fn add_variable(&mut self, name: impl Into<String>, ty: TypeName, default: Value) -> Result<ElementId, CoreError> {
        let parent = self.container(ContainerKind::Variables);
        self.add_element(
            parent,
            GraphElement::new(name, ElementKind::Variable(VariableDef::new(ty, default))),
        )
    }

    /// Adds a local variable under a function (or any scope element).
    pub fn add_local_variable(
        &mut self,
        scope: ElementId,
        name: impl Into<String>,
        ty: TypeName,
        default: Value,
    ) -> Result<ElementId, CoreError> {
        self.add_element(
            scope,
            GraphElement::new(name, ElementKind::LocalVariable(VariableDef::new(ty, default))),
        )
    }

    pub fn add_property(&mut self, name: impl Into<String>, decl: PropertyDecl) -> Result<ElementId, CoreError> {
        let parent = self.container(ContainerKind::Properties);
        self.add_element(parent, GraphElement::new(name, ElementKind::Property(decl)))
    }

    pub fn add_indexer(&mut self, name: impl Into<String>, decl: IndexerDecl) -> Result<ElementId, CoreError> {
        let parent = self.container(ContainerKind::Properties);
        self.add_element(parent, GraphElement::new(name, ElementKind::Indexer(decl)))
    }

    /// Adds a function under the functions container together with its
    /// `FunctionEntry` node. Returns the function id.
    pub fn add_function(&mut self, name: impl Into<String>, decl: FunctionDecl) -> Result<ElementId, CoreError> {
        let parent = self.container(ContainerKind::Functions);
        let function = self.add_element(parent, GraphElement::new(name, ElementKind::Function(decl)))?;
        self.add_node(function, "entry", NodeKind::FunctionEntry)?;
        Ok(function)
    }

    pub fn add_group(&mut self, parent: ElementId, name: impl Into<String>) -> Result<ElementId, CoreError> {
        self.add_element(
            parent,
            GraphElement::new(name, ElementKind::Container(ContainerKind::Group)),
        )
    }

    pub fn rename(&mut self, id: ElementId, name: impl Into<String>) -> Result<(), CoreError> {
        self.get_mut(id).ok_or(CoreError::ElementNotFound { id })?.name = name.into();
        Ok(())
    }

    pub fn set_comment(&mut self, id: ElementId, comment: impl Into<String>) -> Result<(), CoreError> {
        self.get_mut(id).ok_or(CoreError::ElementNotFound { id })?.comment = comment.into();
        Ok(())
    }

    /// Child ids of `id` in sibling order.
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.get(id).map_or(&[], GraphElement::children)
    }

    /// Replaces a node's kind and rebuilds its ports.
    ///
    /// Connections survive on ports whose id and kind are unchanged; the
    /// rest are removed.
    pub fn set_node_kind(&mut self, id: ElementId, kind: NodeKind) -> Result<(), CoreError> {
        self.node(id)?;
        let fresh = kind.build_ports(self);
        let old_ports = self.node(id)?.ports.clone();
        let mut kept_ports = Vec::with_capacity(fresh.len());
        for mut port in fresh {
            if let Some(old) = old_ports.iter().find(|p| p.id == port.id && p.kind == port.kind) {
                port.connections = old.connections.clone();
            }
            kept_ports.push(port);
        }
        for old in &old_ports {
            let survives = kept_ports.iter().any(|p| p.id == old.id && p.kind == old.kind);
            if !survives {
                self.clear_connections(&PortRef::new(id, old.id.clone()));
            }
        }
        let node = self.node_mut(id)?;
        node.kind = kind;
        node.ports = kept_ports;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Re-parenting and ordering
    // -----------------------------------------------------------------------

    /// Moves `id` to the end of `new_parent`'s children.
    ///
    /// Fails without mutating if the element is pinned or if `new_parent` is
    /// the element itself or one of its descendants.
    pub fn set_parent(&mut self, id: ElementId, new_parent: ElementId) -> Result<(), CoreError> {
        let idx = self.index_of(id)?;
        let parent_idx = self.index_of(new_parent)?;
        let element = &self.arena[idx];
        if !element.can_change_parent() {
            return Err(CoreError::PinnedElement {
                element: id,
                name: element.name.clone(),
            });
        }
        if id == new_parent || self.is_ancestor_of(id, new_parent) {
            return Err(CoreError::CycleDetected {
                element: id,
                parent: new_parent,
            });
        }
        if element.parent == Some(new_parent) {
            return Ok(());
        }
        self.unlink(idx);
        self.link(idx, parent_idx, None);
        Ok(())
    }

    /// Position of `id` among its siblings.
    pub fn sibling_index(&self, id: ElementId) -> Option<usize> {
        let parent = self.get(id)?.parent?;
        self.get(parent)?.children.iter().position(|c| *c == id)
    }

    /// Moves `id` to `index` among its siblings, clamped to the last slot.
    pub fn set_sibling_index(&mut self, id: ElementId, index: usize) -> Result<(), CoreError> {
        let parent = self.parent_of(id)?;
        let parent_idx = self.index_of(parent)?;
        let siblings = &mut self.arena[parent_idx].children;
        siblings.retain(|c| *c != id);
        let at = index.min(siblings.len());
        siblings.insert(at, id);
        Ok(())
    }

    /// Places `id` directly after `other`, re-parenting it if needed.
    pub fn place_behind(&mut self, id: ElementId, other: ElementId) -> Result<(), CoreError> {
        self.place_next_to(id, other, 1)
    }

    /// Places `id` directly before `other`, re-parenting it if needed.
    pub fn place_in_front(&mut self, id: ElementId, other: ElementId) -> Result<(), CoreError> {
        self.place_next_to(id, other, 0)
    }

    fn place_next_to(&mut self, id: ElementId, other: ElementId, offset: usize) -> Result<(), CoreError> {
        if id == other {
            return Ok(());
        }
        let parent = self.parent_of(other)?;
        self.set_parent(id, parent)?;
        let parent_idx = self.index_of(parent)?;
        let siblings = &mut self.arena[parent_idx].children;
        siblings.retain(|c| *c != id);
        let at = siblings
            .iter()
            .position(|c| *c == other)
            .map_or(siblings.len(), |p| p + offset);
        siblings.insert(at, id);
        Ok(())
    }

    fn parent_of(&self, id: ElementId) -> Result<ElementId, CoreError> {
        let element = self.get(id).ok_or(CoreError::ElementNotFound { id })?;
        element.parent.ok_or_else(|| CoreError::PinnedElement {
            element: id,
            name: element.name.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Destruction and cross-graph moves
    // -----------------------------------------------------------------------

    /// Destroys `id` and its subtree, children first.
    ///
    /// Destroying an id that is not in the graph is a no-op.
    pub fn destroy(&mut self, id: ElementId) -> Result<(), CoreError> {
        let Some(idx) = self.lookup(id) else {
            return Ok(());
        };
        let element = &self.arena[idx];
        if !element.can_change_parent() {
            return Err(CoreError::PinnedElement {
                element: id,
                name: element.name.clone(),
            });
        }
        let subtree = self.checked_subtree(id)?;
        self.unlink(idx);
        for &member in subtree.iter().rev() {
            self.remove_raw(member);
        }
        Ok(())
    }

    /// Copies the subtree rooted at `id` into a detached value, keeping the
    /// connections that run between elements of the subtree.
    pub fn extract(&self, id: ElementId) -> Result<DetachedElement, CoreError> {
        let subtree = self.checked_subtree(id)?;
        let members: HashSet<ElementId> = subtree.iter().copied().collect();
        let connections = self
            .connections
            .values()
            .filter(|c| {
                members.contains(&c.output.node)
                    && members.contains(&c.input.node)
                    && !self.is_dangling(c.id)
            })
            .map(|c| (c.output.clone(), c.input.clone()))
            .collect();
        let mut detached = self.clone_detached(id)?;
        detached.connections = connections;
        Ok(detached)
    }

    fn clone_detached(&self, id: ElementId) -> Result<DetachedElement, CoreError> {
        let source = self.get(id).ok_or(CoreError::ElementNotFound { id })?;
        let mut element = source.clone();
        element.id = ElementId::NONE;
        element.parent = None;
        element.children.clear();
        element.destroyed = false;
        if let Some(node) = element.as_node_mut() {
            for port in &mut node.ports {
                port.connections.clear();
            }
        }
        let children = source
            .children
            .iter()
            .map(|&child| self.clone_detached(child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DetachedElement {
            element,
            origin: id,
            children,
            connections: Vec::new(),
        })
    }

    /// Removes the subtree rooted at `id` from this graph and returns it
    /// detached (all ids reset to `ElementId::NONE`).
    ///
    /// Connections to elements outside the subtree are dropped.
    pub fn detach(&mut self, id: ElementId) -> Result<DetachedElement, CoreError> {
        let idx = self.index_of(id)?;
        let element = &self.arena[idx];
        if !element.can_change_parent() {
            return Err(CoreError::PinnedElement {
                element: id,
                name: element.name.clone(),
            });
        }
        let detached = self.extract(id)?;
        let subtree = self.checked_subtree(id)?;
        self.unlink(idx);
        for &member in subtree.iter().rev() {
            self.remove_raw(member);
        }
        Ok(detached)
    }

    /// Attaches a detached subtree under `parent`, assigning fresh ids.
    ///
    /// Fails without mutating if `parent` is missing or any element of the
    /// subtree was destroyed. Internal connections are re-created; those
    /// whose ports no longer exist are dropped.
    pub fn attach(&mut self, parent: ElementId, detached: DetachedElement) -> Result<ElementId, CoreError> {
        fn find_destroyed(d: &DetachedElement) -> Option<&str> {
            if d.is_destroyed() {
                return Some(&d.element.name);
            }
            d.children.iter().find_map(find_destroyed)
        }
        fn collect_connections(d: &DetachedElement, out: &mut Vec<(PortRef, PortRef)>) {
            out.extend(d.connections.iter().cloned());
            for child in &d.children {
                collect_connections(child, out);
            }
        }

        let parent_idx = self.index_of(parent)?;
        if let Some(name) = find_destroyed(&detached) {
            return Err(CoreError::DestroyedElement { name: name.to_string() });
        }
        if matches!(detached.element.kind, ElementKind::Root) {
            return Err(CoreError::PinnedElement {
                element: ElementId::NONE,
                name: detached.element.name,
            });
        }
        let mut pending = Vec::new();
        collect_connections(&detached, &mut pending);
        let mut remap = HashMap::new();
        let id = self.insert_detached(parent_idx, detached, &mut remap);
        for (output, input) in pending {
            if let (Some(&out_node), Some(&in_node)) = (remap.get(&output.node), remap.get(&input.node)) {
                // Ports of a copied subtree are unchanged, so this only fails
                // for hand-built detached values.
                if let Err(err) = self.connect(
                    PortRef::new(out_node, output.port),
                    PortRef::new(in_node, input.port),
                ) {
                    tracing::debug!(graph = %self.name, error = %err, "dropped connection while attaching");
                }
            }
        }
        Ok(id)
    }

    fn insert_detached(
        &mut self,
        parent_idx: NodeIndex<u32>,
        detached: DetachedElement,
        remap: &mut HashMap<ElementId, ElementId>,
    ) -> ElementId {
        let DetachedElement {
            element,
            origin,
            children,
            ..
        } = detached;
        let idx = self.insert_raw(element, Some(parent_idx));
        let id = self.arena[idx].id;
        if !origin.is_none() {
            remap.insert(origin, id);
        }
        for child in children {
            self.insert_detached(idx, child, remap);
        }
        id
    }

    /// Moves the subtree rooted at `id` into `target` under `parent`.
    ///
    /// The element receives a fresh id from `target`; `parent` is checked
    /// before anything is removed from `self`.
    pub fn transfer(&mut self, id: ElementId, target: &mut Graph, parent: ElementId) -> Result<ElementId, CoreError> {
        target.index_of(parent)?;
        let detached = self.detach(id)?;
        target.attach(parent, detached)
    }

    /// Copies the subtree rooted at `id` under `parent` in the same graph.
    pub fn duplicate(&mut self, id: ElementId, parent: ElementId) -> Result<ElementId, CoreError> {
        let copy = self.extract(id)?;
        self.attach(parent, copy)
    }
}
