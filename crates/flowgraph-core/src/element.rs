//! Graph elements: the atomic unit of the persisted tree.
//!
//! A [`GraphElement`] carries its name, comment, tree links and a closed
//! [`ElementKind`]. Tree links (`id`, `parent`, `children`) are owned by the
//! [`Graph`](crate::graph::Graph) and can only change through its methods.
//! Elements that are not part of a tree travel as [`DetachedElement`]
//! subtrees with `id == ElementId::NONE`.

use serde::{Deserialize, Serialize};

use crate::id::{ElementId, PortRef};
use crate::node::NodeData;
use crate::types::{ParameterDef, TypeName};
use crate::value::Value;

/// A node of the element tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphElement {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    pub kind: ElementKind,
    pub(crate) id: ElementId,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
    #[serde(default)]
    pub(crate) destroyed: bool,
}

impl GraphElement {
    /// Creates a detached element (`id == 0`, no parent).
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        GraphElement {
            name: name.into(),
            comment: String::new(),
            kind,
            id: ElementId::NONE,
            parent: None,
            children: Vec::new(),
            destroyed: false,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// Children in sibling order.
    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Returns `false` for the root and the mandatory sub-containers.
    pub fn can_change_parent(&self) -> bool {
        match &self.kind {
            ElementKind::Root => false,
            ElementKind::Container(kind) => !kind.is_pinned(),
            _ => true,
        }
    }

    pub fn as_node(&self) -> Option<&NodeData> {
        match &self.kind {
            ElementKind::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut NodeData> {
        match &mut self.kind {
            ElementKind::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionDecl> {
        match &self.kind {
            ElementKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// The closed set of element kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElementKind {
    /// The root of a graph; exactly one per graph.
    Root,
    Container(ContainerKind),
    /// Graph-level variable, stored per running instance.
    Variable(VariableDef),
    /// Variable scoped to a function body (reset on every call) or to a scope.
    LocalVariable(VariableDef),
    Property(PropertyDecl),
    Indexer(IndexerDecl),
    Function(FunctionDecl),
    Node(NodeData),
}

impl ElementKind {
    pub fn tag(&self) -> ElementTag {
        match self {
            ElementKind::Root => ElementTag::Root,
            ElementKind::Container(_) => ElementTag::Container,
            ElementKind::Variable(_) => ElementTag::Variable,
            ElementKind::LocalVariable(_) => ElementTag::LocalVariable,
            ElementKind::Property(_) => ElementTag::Property,
            ElementKind::Indexer(_) => ElementTag::Indexer,
            ElementKind::Function(_) => ElementTag::Function,
            ElementKind::Node(_) => ElementTag::Node,
        }
    }
}

/// Fieldless discriminant of [`ElementKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementTag {
    Root,
    Container,
    Variable,
    LocalVariable,
    Property,
    Indexer,
    Function,
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Variables,
    Properties,
    Functions,
    /// Holds the event-driven main flow.
    Main,
    /// Free-form user grouping.
    Group,
}

impl ContainerKind {
    /// Mandatory sub-containers cannot be moved.
    pub fn is_pinned(self) -> bool {
        !matches!(self, ContainerKind::Group)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDef {
    pub ty: TypeName,
    #[serde(default)]
    pub default: Value,
}

impl VariableDef {
    pub fn new(ty: TypeName, default: Value) -> Self {
        VariableDef { ty, default }
    }
}

/// A graph property. Without accessor functions it is auto-backed by
/// instance storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub ty: TypeName,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub getter: Option<ElementId>,
    #[serde(default)]
    pub setter: Option<ElementId>,
}

impl PropertyDecl {
    pub fn auto(ty: TypeName, default: Value) -> Self {
        PropertyDecl {
            ty,
            default,
            getter: None,
            setter: None,
        }
    }

    pub fn is_auto(&self) -> bool {
        self.getter.is_none() && self.setter.is_none()
    }

    pub fn can_read(&self) -> bool {
        self.is_auto() || self.getter.is_some()
    }

    pub fn can_write(&self) -> bool {
        self.is_auto() || self.setter.is_some()
    }
}

/// A parameterised property implemented by getter/setter functions.
///
/// The getter takes the index arguments; the setter takes the index
/// arguments followed by the assigned value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerDecl {
    pub params: Vec<ParameterDef>,
    pub ty: TypeName,
    #[serde(default)]
    pub getter: Option<ElementId>,
    #[serde(default)]
    pub setter: Option<ElementId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericParameterDef {
    pub name: String,
    /// Type used when no argument is bound for this parameter.
    pub constraint: TypeName,
}

/// A graph function; its body is the subtree under the function element,
/// entered through its `FunctionEntry` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub params: Vec<ParameterDef>,
    pub return_type: TypeName,
    #[serde(default)]
    pub generic_params: Vec<GenericParameterDef>,
}

impl FunctionDecl {
    pub fn new(params: Vec<ParameterDef>, return_type: TypeName) -> Self {
        FunctionDecl {
            params,
            return_type,
            generic_params: Vec::new(),
        }
    }

    pub fn with_generic(mut self, name: impl Into<String>, constraint: TypeName) -> Self {
        self.generic_params.push(GenericParameterDef {
            name: name.into(),
            constraint,
        });
        self
    }
}

// ---------------------------------------------------------------------------
// Detached subtrees
// ---------------------------------------------------------------------------

/// A subtree that is not part of any graph.
///
/// `origin` remembers the id the element had in the graph it was detached
/// from (`ElementId::NONE` for fresh elements); internal connections are kept
/// in terms of those origin ids so that attaching elsewhere can re-create them.
#[derive(Debug, Clone)]
pub struct DetachedElement {
    pub element: GraphElement,
    pub origin: ElementId,
    pub children: Vec<DetachedElement>,
    /// `(output, input)` pairs between ports inside this subtree.
    pub connections: Vec<(PortRef, PortRef)>,
}

impl DetachedElement {
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        DetachedElement {
            element: GraphElement::new(name, kind),
            origin: ElementId::NONE,
            children: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: DetachedElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.element.comment = comment.into();
        self
    }

    /// Destroys the subtree, children first. A destroyed subtree can never be
    /// attached.
    pub fn destroy(&mut self) {
        for child in &mut self.children {
            child.destroy();
        }
        self.element.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.element.destroyed
    }

    /// Number of elements in the subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(DetachedElement::count).sum::<usize>()
    }
}

impl From<GraphElement> for DetachedElement {
    fn from(element: GraphElement) -> Self {
        DetachedElement {
            element,
            origin: ElementId::NONE,
            children: Vec::new(),
            connections: Vec::new(),
        }
    }
}
