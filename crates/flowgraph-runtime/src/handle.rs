//! Graph handles: the owner of a graph definition and its snapshots.
//!
//! A [`GraphHandle`] is what running instances hold on to. It exposes the
//! current immutable [`Graph`] snapshot, the stable container identity used
//! in runtime storage keys, and an optional base graph for layered
//! initialization. Structural edits never mutate a published snapshot: the
//! editor clones it, edits the copy, and publishes it with the next version.
//! Instances notice the new version the next time they run and rebind.

use std::cell::RefCell;
use std::rc::Rc;

use flowgraph_core::{CoreError, Graph, GraphUid};
use flowgraph_storage::codec;

use crate::error::RuntimeError;

pub struct GraphHandle {
    uid: GraphUid,
    current: RefCell<Rc<Graph>>,
    base: Option<Rc<GraphHandle>>,
}

impl GraphHandle {
    /// Wraps `graph` as the first published snapshot.
    pub fn new(graph: Graph) -> Rc<Self> {
        Rc::new(GraphHandle {
            uid: graph.uid(),
            current: RefCell::new(Rc::new(graph)),
            base: None,
        })
    }

    /// Like [`GraphHandle::new`], layered on top of `base`.
    pub fn with_base(graph: Graph, base: Rc<GraphHandle>) -> Rc<Self> {
        Rc::new(GraphHandle {
            uid: graph.uid(),
            current: RefCell::new(Rc::new(graph)),
            base: Some(base),
        })
    }

    pub fn uid(&self) -> GraphUid {
        self.uid
    }

    pub fn name(&self) -> String {
        self.current.borrow().name.clone()
    }

    /// The snapshot instances should run against.
    pub fn current(&self) -> Rc<Graph> {
        Rc::clone(&self.current.borrow())
    }

    pub fn version(&self) -> u64 {
        self.current.borrow().version()
    }

    pub fn base(&self) -> Option<&Rc<GraphHandle>> {
        self.base.as_ref()
    }

    /// This handle and its bases, most-base first.
    pub fn chain(self: &Rc<Self>) -> Vec<Rc<GraphHandle>> {
        let mut out = vec![Rc::clone(self)];
        let mut next = self.base.clone();
        while let Some(handle) = next {
            next = handle.base.clone();
            out.push(handle);
        }
        out.reverse();
        out
    }

    /// Replaces the current snapshot.
    ///
    /// `graph` must belong to this container and carry exactly the next
    /// version; anything else is rejected and the current snapshot stays.
    pub fn publish(&self, graph: Graph) -> Result<Rc<Graph>, RuntimeError> {
        if graph.uid() != self.uid {
            return Err(RuntimeError::ForeignSnapshot { graph: graph.name });
        }
        let expected = self.version() + 1;
        if graph.version() != expected {
            return Err(RuntimeError::VersionSkew {
                graph: graph.name.clone(),
                expected,
                published: graph.version(),
            });
        }
        let snapshot = Rc::new(graph);
        *self.current.borrow_mut() = Rc::clone(&snapshot);
        tracing::debug!(uid = %self.uid, version = expected, "published graph snapshot");
        Ok(snapshot)
    }

    /// Clones the current snapshot, applies `edit`, and publishes the result.
    ///
    /// If `edit` fails nothing is published.
    pub fn edit<R>(&self, edit: impl FnOnce(&mut Graph) -> Result<R, CoreError>) -> Result<R, RuntimeError> {
        let mut draft = Graph::clone(&self.current());
        let out = edit(&mut draft)?;
        draft.bump_version();
        self.publish(draft)?;
        Ok(out)
    }

    /// Decodes a serialized tree that supersedes the current snapshot and
    /// publishes it.
    pub fn replace_from(&self, bytes: &[u8]) -> Result<Rc<Graph>, RuntimeError> {
        let graph = codec::decode_superseding(bytes, &self.current())?;
        self.publish(graph)
    }
}

impl std::fmt::Debug for GraphHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphHandle")
            .field("uid", &self.uid)
            .field("version", &self.version())
            .field("base", &self.base.as_ref().map(|b| b.uid))
            .finish()
    }
}
