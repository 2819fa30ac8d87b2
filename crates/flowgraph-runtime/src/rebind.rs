//! Live rebind of references into superseded graph snapshots.
//!
//! An [`ElementRef`] pins the snapshot it was taken from. Once the owning
//! [`GraphHandle`](crate::GraphHandle) publishes a newer snapshot the
//! reference is stale (the counterpart of an element marked invalid by a
//! newer deserialized tree) but still readable. A [`RebindMap`], computed
//! once per snapshot pair, says which old element ids have an equivalent in
//! the new snapshot: same id, same element kind. Anything else is a miss,
//! which callers treat as "this element no longer exists".

use std::collections::HashMap;
use std::rc::Rc;

use flowgraph_core::{ElementId, ElementTag, Graph, GraphElement, GraphUid, PortId, PortKind, PortRef, RuntimeId};

/// A reference to an element inside one specific snapshot.
#[derive(Debug, Clone)]
pub struct ElementRef {
    snapshot: Rc<Graph>,
    id: ElementId,
    tag: ElementTag,
}

impl ElementRef {
    /// Returns `None` if `id` is not in `snapshot`.
    pub fn new(snapshot: &Rc<Graph>, id: ElementId) -> Option<Self> {
        let tag = snapshot.get(id)?.kind.tag();
        Some(ElementRef {
            snapshot: Rc::clone(snapshot),
            id,
            tag,
        })
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn tag(&self) -> ElementTag {
        self.tag
    }

    pub fn container(&self) -> GraphUid {
        self.snapshot.uid()
    }

    /// Version of the snapshot this reference points into.
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    pub fn runtime_id(&self) -> RuntimeId {
        RuntimeId::new(self.container(), self.id)
    }

    pub fn snapshot(&self) -> &Rc<Graph> {
        &self.snapshot
    }

    /// The referenced element as it exists in the pinned snapshot.
    pub fn element(&self) -> Option<&GraphElement> {
        self.snapshot.get(self.id)
    }

    /// Returns `true` if both references point at the same element object
    /// (same snapshot, same id).
    pub fn same_object(&self, other: &ElementRef) -> bool {
        Rc::ptr_eq(&self.snapshot, &other.snapshot) && self.id == other.id
    }
}

/// A reference to a port of a node inside one specific snapshot.
#[derive(Debug, Clone)]
pub struct PortHandle {
    pub node: ElementRef,
    pub port: PortId,
    pub kind: PortKind,
}

impl PortHandle {
    /// Returns `None` if the node or the port is not in `snapshot`.
    pub fn new(snapshot: &Rc<Graph>, port: &PortRef) -> Option<Self> {
        let kind = snapshot.port(port).ok()?.kind;
        Some(PortHandle {
            node: ElementRef::new(snapshot, port.node)?,
            port: port.port.clone(),
            kind,
        })
    }

    pub fn port_ref(&self) -> PortRef {
        PortRef::new(self.node.id(), self.port.clone())
    }

    pub fn version(&self) -> u64 {
        self.node.version()
    }
}

/// Old-id to new-id mapping between two snapshots of one container.
#[derive(Debug, Clone)]
pub struct RebindMap {
    from_version: u64,
    to_version: u64,
    ids: HashMap<ElementId, ElementId>,
}

impl RebindMap {
    /// Pairs every element of `old` with the element of `new` that has the
    /// same id and the same kind.
    pub fn build(old: &Graph, new: &Graph) -> Self {
        let ids = old
            .elements()
            .filter_map(|el| {
                let candidate = new.get(el.id())?;
                (candidate.kind.tag() == el.kind.tag()).then_some((el.id(), candidate.id()))
            })
            .collect();
        RebindMap {
            from_version: old.version(),
            to_version: new.version(),
            ids,
        }
    }

    pub fn from_version(&self) -> u64 {
        self.from_version
    }

    pub fn to_version(&self) -> u64 {
        self.to_version
    }

    /// New id of an old element, or `None` if it has no equivalent.
    pub fn get(&self, old: ElementId) -> Option<ElementId> {
        self.ids.get(&old).copied()
    }

    /// Number of elements that survived the swap.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Relocates a port: node through the map, then the same port key with
    /// the same direction on the new node.
    pub fn port(&self, new: &Graph, old_port: &PortRef, kind: PortKind) -> Option<PortRef> {
        let node = self.get(old_port.node)?;
        let rebound = PortRef::new(node, old_port.port.clone());
        (new.port(&rebound).ok()?.kind == kind).then_some(rebound)
    }
}
