//! Member references: what a node reads, writes or calls.
//!
//! A [`MemberData`] is a persisted, serializable reference to one of:
//!
//! - a literal (`null`, a stored [`Value`], a type),
//! - a structural source (the running instance itself, another node's port),
//! - a graph-native declaration (variable, local variable, property,
//!   indexer, function, function parameter, generic parameter), optionally
//!   followed by a deep chain of reflected items (`position.x`),
//! - a reflected host member chain (`Type.field.method()`), rooted at an
//!   optional instance expression or at a static member.
//!
//! Resolution against the [`TypeRegistry`](crate::reflect::TypeRegistry) is
//! lazy and cached per `MemberData` value until [`MemberData::reset_cache`];
//! clones start with an empty cache. Reads, writes and calls go through a
//! [`MemberContext`] supplied by the executing instance.

mod access;
mod cache;
mod error;
mod resolve;

pub use access::MemberContext;
pub use cache::ResolvedMember;
pub use error::MemberError;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::ElementKind;
use crate::graph::Graph;
use crate::id::{ElementId, PortRef};
use crate::types::{ParameterDef, TypeName};
use crate::value::Value;

use cache::MemberCache;

/// Kind of a reflected host member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReflectedKind {
    Field,
    Property,
    Method,
    Constructor,
    Event,
}

/// One step of a reflected member chain, as persisted.
///
/// Items carry enough signature information (`params`, `ty`) to build
/// ports and display names without consulting the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberItem {
    pub declaring_type: TypeName,
    pub name: String,
    pub kind: ReflectedKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParameterDef>,
    /// Field or property type, method return type, constructed type, or `event`.
    pub ty: TypeName,
    #[serde(default)]
    pub is_static: bool,
}

impl MemberItem {
    fn with(declaring_type: impl Into<TypeName>, name: impl Into<String>, kind: ReflectedKind, ty: TypeName) -> Self {
        MemberItem {
            declaring_type: declaring_type.into(),
            name: name.into(),
            kind,
            params: Vec::new(),
            ty,
            is_static: false,
        }
    }

    pub fn field(declaring_type: impl Into<TypeName>, name: impl Into<String>, ty: TypeName) -> Self {
        Self::with(declaring_type, name, ReflectedKind::Field, ty)
    }

    pub fn property(declaring_type: impl Into<TypeName>, name: impl Into<String>, ty: TypeName) -> Self {
        Self::with(declaring_type, name, ReflectedKind::Property, ty)
    }

    pub fn method(
        declaring_type: impl Into<TypeName>,
        name: impl Into<String>,
        params: Vec<ParameterDef>,
        return_type: TypeName,
    ) -> Self {
        MemberItem {
            params,
            ..Self::with(declaring_type, name, ReflectedKind::Method, return_type)
        }
    }

    pub fn constructor(ty: impl Into<TypeName>, params: Vec<ParameterDef>) -> Self {
        let ty = ty.into();
        MemberItem {
            params,
            is_static: true,
            ..Self::with(ty.clone(), "new", ReflectedKind::Constructor, ty)
        }
    }

    pub fn event(declaring_type: impl Into<TypeName>, name: impl Into<String>) -> Self {
        Self::with(declaring_type, name, ReflectedKind::Event, TypeName::EVENT)
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Parameter types, used to pick the overload.
    pub fn signature(&self) -> Vec<TypeName> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }
}

/// The persisted target of a member reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum MemberTarget {
    #[default]
    None,
    Null,
    /// The running instance itself.
    SelfTarget,
    Value(Value),
    Type(TypeName),
    /// Another node's value output.
    NodePort(PortRef),
    Variable {
        id: ElementId,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deep: Vec<MemberItem>,
    },
    LocalVariable {
        id: ElementId,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deep: Vec<MemberItem>,
    },
    Property {
        id: ElementId,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deep: Vec<MemberItem>,
    },
    Indexer {
        id: ElementId,
    },
    Function {
        id: ElementId,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        generic_args: Vec<TypeName>,
    },
    Parameter {
        function: ElementId,
        index: usize,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deep: Vec<MemberItem>,
    },
    GenericParameter {
        function: ElementId,
        index: usize,
    },
    Reflected {
        kind: ReflectedKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instance: Option<Box<MemberData>>,
        items: Vec<MemberItem>,
    },
}

/// Fieldless discriminant of [`MemberTarget`]; reflected targets report
/// their member kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    None,
    Null,
    SelfTarget,
    Value,
    Type,
    NodePort,
    Variable,
    LocalVariable,
    Property,
    Indexer,
    Function,
    Parameter,
    GenericParameter,
    Field,
    ReflectedProperty,
    Method,
    Constructor,
    Event,
}

/// Broad grouping of target kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFamily {
    Unassigned,
    Literal,
    Structural,
    GraphNative,
    Reflected,
}

impl TargetKind {
    pub fn family(self) -> TargetFamily {
        match self {
            TargetKind::None => TargetFamily::Unassigned,
            TargetKind::Null | TargetKind::Value | TargetKind::Type => TargetFamily::Literal,
            TargetKind::SelfTarget | TargetKind::NodePort => TargetFamily::Structural,
            TargetKind::Variable
            | TargetKind::LocalVariable
            | TargetKind::Property
            | TargetKind::Indexer
            | TargetKind::Function
            | TargetKind::Parameter
            | TargetKind::GenericParameter => TargetFamily::GraphNative,
            TargetKind::Field
            | TargetKind::ReflectedProperty
            | TargetKind::Method
            | TargetKind::Constructor
            | TargetKind::Event => TargetFamily::Reflected,
        }
    }
}

impl From<ReflectedKind> for TargetKind {
    fn from(kind: ReflectedKind) -> Self {
        match kind {
            ReflectedKind::Field => TargetKind::Field,
            ReflectedKind::Property => TargetKind::ReflectedProperty,
            ReflectedKind::Method => TargetKind::Method,
            ReflectedKind::Constructor => TargetKind::Constructor,
            ReflectedKind::Event => TargetKind::Event,
        }
    }
}

/// A persisted member reference with a lazily filled resolution cache.
#[derive(Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberData {
    target: MemberTarget,
    #[serde(skip)]
    cache: MemberCache,
}

impl MemberData {
    pub fn new(target: MemberTarget) -> Self {
        MemberData {
            target,
            cache: MemberCache::default(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn null() -> Self {
        Self::new(MemberTarget::Null)
    }

    pub fn self_target() -> Self {
        Self::new(MemberTarget::SelfTarget)
    }

    /// A literal; reads hand out an independent copy of `value`.
    pub fn create_from_value(value: Value) -> Self {
        Self::new(MemberTarget::Value(value))
    }

    pub fn create_from_type(ty: TypeName) -> Self {
        Self::new(MemberTarget::Type(ty))
    }

    pub fn node_port(port: PortRef) -> Self {
        Self::new(MemberTarget::NodePort(port))
    }

    pub fn variable(id: ElementId) -> Self {
        Self::new(MemberTarget::Variable { id, deep: Vec::new() })
    }

    pub fn local_variable(id: ElementId) -> Self {
        Self::new(MemberTarget::LocalVariable { id, deep: Vec::new() })
    }

    pub fn property(id: ElementId) -> Self {
        Self::new(MemberTarget::Property { id, deep: Vec::new() })
    }

    pub fn indexer(id: ElementId) -> Self {
        Self::new(MemberTarget::Indexer { id })
    }

    pub fn function(id: ElementId) -> Self {
        Self::new(MemberTarget::Function {
            id,
            generic_args: Vec::new(),
        })
    }

    pub fn generic_function(id: ElementId, generic_args: Vec<TypeName>) -> Self {
        Self::new(MemberTarget::Function { id, generic_args })
    }

    pub fn parameter(function: ElementId, index: usize) -> Self {
        Self::new(MemberTarget::Parameter {
            function,
            index,
            deep: Vec::new(),
        })
    }

    pub fn generic_parameter(function: ElementId, index: usize) -> Self {
        Self::new(MemberTarget::GenericParameter { function, index })
    }

    /// A reflected chain. The target kind is the kind of the last item.
    pub fn reflected(items: Vec<MemberItem>) -> Self {
        let kind = items.last().map_or(ReflectedKind::Field, |i| i.kind);
        Self::new(MemberTarget::Reflected {
            kind,
            instance: None,
            items,
        })
    }

    /// Sets the receiver expression of a reflected chain. Ignored for other
    /// target families.
    pub fn with_instance(mut self, instance: MemberData) -> Self {
        self.set_instance(Some(instance));
        self
    }

    /// Appends reflected items to a graph-native variable, property or
    /// parameter target. Ignored for other targets.
    pub fn with_deep(mut self, items: Vec<MemberItem>) -> Self {
        if let Some(deep) = self.deep_mut() {
            deep.extend(items);
        }
        self.reset_cache();
        self
    }

    // -----------------------------------------------------------------------
    // Accessors and setters
    // -----------------------------------------------------------------------

    pub fn target(&self) -> &MemberTarget {
        &self.target
    }

    pub fn set_target(&mut self, target: MemberTarget) {
        self.target = target;
        self.reset_cache();
    }

    pub fn set_instance(&mut self, instance: Option<MemberData>) {
        if let MemberTarget::Reflected { instance: slot, .. } = &mut self.target {
            *slot = instance.map(Box::new);
        }
        self.reset_cache();
    }

    /// Replaces the stored literal, turning the target into a value literal.
    pub fn set_literal(&mut self, value: Value) {
        self.set_target(MemberTarget::Value(value));
    }

    pub fn instance(&self) -> Option<&MemberData> {
        match &self.target {
            MemberTarget::Reflected { instance, .. } => instance.as_deref(),
            _ => None,
        }
    }

    /// Reflected items: the chain of a reflected target or the deep chain of
    /// a graph-native one.
    pub fn items(&self) -> &[MemberItem] {
        match &self.target {
            MemberTarget::Reflected { items, .. } => items,
            MemberTarget::Variable { deep, .. }
            | MemberTarget::LocalVariable { deep, .. }
            | MemberTarget::Property { deep, .. }
            | MemberTarget::Parameter { deep, .. } => deep,
            _ => &[],
        }
    }

    fn deep_mut(&mut self) -> Option<&mut Vec<MemberItem>> {
        match &mut self.target {
            MemberTarget::Variable { deep, .. }
            | MemberTarget::LocalVariable { deep, .. }
            | MemberTarget::Property { deep, .. }
            | MemberTarget::Parameter { deep, .. } => Some(deep),
            _ => None,
        }
    }

    /// Drops every cached resolution; the next access re-resolves.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }

    // -----------------------------------------------------------------------
    // Predicates
    // -----------------------------------------------------------------------

    pub fn kind(&self) -> TargetKind {
        match &self.target {
            MemberTarget::None => TargetKind::None,
            MemberTarget::Null => TargetKind::Null,
            MemberTarget::SelfTarget => TargetKind::SelfTarget,
            MemberTarget::Value(_) => TargetKind::Value,
            MemberTarget::Type(_) => TargetKind::Type,
            MemberTarget::NodePort(_) => TargetKind::NodePort,
            MemberTarget::Variable { .. } => TargetKind::Variable,
            MemberTarget::LocalVariable { .. } => TargetKind::LocalVariable,
            MemberTarget::Property { .. } => TargetKind::Property,
            MemberTarget::Indexer { .. } => TargetKind::Indexer,
            MemberTarget::Function { .. } => TargetKind::Function,
            MemberTarget::Parameter { .. } => TargetKind::Parameter,
            MemberTarget::GenericParameter { .. } => TargetKind::GenericParameter,
            MemberTarget::Reflected { kind, .. } => (*kind).into(),
        }
    }

    pub fn family(&self) -> TargetFamily {
        self.kind().family()
    }

    /// A target kind has been chosen, whether or not it can be resolved.
    pub fn is_targeted(&self) -> bool {
        !matches!(self.target, MemberTarget::None)
    }

    /// The target carries everything needed to resolve it: element ids are
    /// set, reflected chains are non-empty and type names are non-empty.
    pub fn is_assigned(&self) -> bool {
        match &self.target {
            MemberTarget::None => false,
            MemberTarget::Null | MemberTarget::SelfTarget | MemberTarget::Value(_) => true,
            MemberTarget::Type(ty) => !ty.as_str().is_empty(),
            MemberTarget::NodePort(port) => !port.node.is_none(),
            MemberTarget::Variable { id, .. }
            | MemberTarget::LocalVariable { id, .. }
            | MemberTarget::Property { id, .. }
            | MemberTarget::Indexer { id }
            | MemberTarget::Function { id, .. } => !id.is_none(),
            MemberTarget::Parameter { function, .. } | MemberTarget::GenericParameter { function, .. } => {
                !function.is_none()
            }
            MemberTarget::Reflected { items, .. } => !items.is_empty(),
        }
    }

    /// Returns `true` if the chain needs no receiver.
    pub fn is_static(&self) -> bool {
        match &self.target {
            MemberTarget::Reflected { items, .. } => items.first().is_some_and(|i| i.is_static),
            _ => false,
        }
    }

    /// Returns `true` for graph-native targets followed by reflected items.
    pub fn is_deep(&self) -> bool {
        self.family() == TargetFamily::GraphNative && !self.items().is_empty()
    }

    /// Checks internal consistency without resolving anything.
    pub fn validate(&self) -> Result<(), MemberError> {
        if !self.is_targeted() {
            return Err(MemberError::Unassigned);
        }
        let inconsistent = |reason: &str| MemberError::Inconsistent {
            name: self.to_string(),
            reason: reason.to_string(),
        };
        if !self.is_assigned() {
            return Err(inconsistent("target is missing its payload"));
        }
        if let MemberTarget::Reflected { kind, instance, items } = &self.target {
            if items.last().map(|i| i.kind) != Some(*kind) {
                return Err(inconsistent("target kind does not match its last item"));
            }
            if items.iter().skip(1).any(|i| i.kind == ReflectedKind::Constructor) {
                return Err(inconsistent("a constructor can only start a chain"));
            }
            if instance.is_some() && items.first().is_some_and(|i| i.is_static) {
                return Err(inconsistent("static member has an instance"));
            }
            if let Some(instance) = instance {
                instance.validate()?;
            }
        }
        if self.items().iter().any(|i| i.name.is_empty()) {
            return Err(inconsistent("unnamed member item"));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Static shape
    // -----------------------------------------------------------------------

    /// Static type of the value this member yields, without consulting the
    /// registry. `None` for unassigned targets and missing elements.
    pub fn declared_type(&self, graph: &Graph) -> Option<TypeName> {
        if let Some(last) = self.items().last() {
            return Some(last.ty.clone());
        }
        match &self.target {
            MemberTarget::None => None,
            MemberTarget::Null | MemberTarget::SelfTarget => Some(TypeName::OBJECT),
            MemberTarget::Value(v) => Some(v.type_name()),
            MemberTarget::Type(_) | MemberTarget::GenericParameter { .. } => Some(TypeName::TYPE),
            MemberTarget::NodePort(port) => graph.port_type(port),
            MemberTarget::Variable { id, .. } | MemberTarget::LocalVariable { id, .. } => {
                match &graph.get(*id)?.kind {
                    ElementKind::Variable(def) | ElementKind::LocalVariable(def) => Some(def.ty.clone()),
                    _ => None,
                }
            }
            MemberTarget::Property { id, .. } => match &graph.get(*id)?.kind {
                ElementKind::Property(decl) => Some(decl.ty.clone()),
                _ => None,
            },
            MemberTarget::Indexer { id } => match &graph.get(*id)?.kind {
                ElementKind::Indexer(decl) => Some(decl.ty.clone()),
                _ => None,
            },
            MemberTarget::Function { id, generic_args } => {
                let decl = graph.function(*id)?;
                Some(substitute_generic(&decl.return_type, decl, generic_args))
            }
            MemberTarget::Parameter { function, index, .. } => {
                graph.function(*function)?.params.get(*index).map(|p| p.ty.clone())
            }
            MemberTarget::Reflected { .. } => None,
        }
    }

    /// Parameters of the invocable part of this member (function, indexer,
    /// method or constructor); empty otherwise.
    pub fn parameters(&self, graph: &Graph) -> Vec<ParameterDef> {
        if let Some(last) = self.items().last() {
            return match last.kind {
                ReflectedKind::Method | ReflectedKind::Constructor => last.params.clone(),
                _ => Vec::new(),
            };
        }
        match &self.target {
            MemberTarget::Function { id, generic_args } => graph
                .function(*id)
                .map(|decl| {
                    decl.params
                        .iter()
                        .map(|p| ParameterDef {
                            ty: substitute_generic(&p.ty, decl, generic_args),
                            ..p.clone()
                        })
                        .collect()
                })
                .unwrap_or_default(),
            MemberTarget::Indexer { id } => match graph.get(*id).map(|el| &el.kind) {
                Some(ElementKind::Indexer(decl)) => decl.params.clone(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Cached parameter types of [`MemberData::parameters`].
    pub fn parameter_types(&self, graph: &Graph) -> &[TypeName] {
        self.cache
            .parameter_types
            .get_or_init(|| self.parameters(graph).into_iter().map(|p| p.ty).collect())
    }

    /// Type of the `instance` port a node needs for this member, if any.
    pub fn instance_port_type(&self) -> Option<TypeName> {
        match &self.target {
            MemberTarget::Reflected {
                instance: None,
                items,
                ..
            } => items
                .first()
                .filter(|i| !i.is_static && i.kind != ReflectedKind::Constructor)
                .map(|i| i.declaring_type.clone()),
            _ => None,
        }
    }

    /// Human-readable name, resolving graph-native names through `graph`.
    /// Cached until [`MemberData::reset_cache`].
    pub fn display_name(&self, graph: &Graph) -> &str {
        self.cache
            .display_name
            .get_or_init(|| self.render_name(Some(graph)))
    }

    fn render_name(&self, graph: Option<&Graph>) -> String {
        let element_name = |id: ElementId| {
            graph
                .and_then(|g| g.get(id))
                .map_or_else(|| format!("#{id}"), |el| el.name.clone())
        };
        let mut out = match &self.target {
            MemberTarget::None => "(none)".to_string(),
            MemberTarget::Null => "null".to_string(),
            MemberTarget::SelfTarget => "this".to_string(),
            MemberTarget::Value(Value::String(s)) => format!("{s:?}"),
            MemberTarget::Value(v) => v.to_string(),
            MemberTarget::Type(ty) => format!("typeof({ty})"),
            MemberTarget::NodePort(port) => format!("{}.{}", element_name(port.node), port.port),
            MemberTarget::Variable { id, .. }
            | MemberTarget::LocalVariable { id, .. }
            | MemberTarget::Property { id, .. } => element_name(*id),
            MemberTarget::Indexer { id } => format!("{}[]", element_name(*id)),
            MemberTarget::Function { id, generic_args } => {
                if generic_args.is_empty() {
                    format!("{}()", element_name(*id))
                } else {
                    let args: Vec<&str> = generic_args.iter().map(TypeName::as_str).collect();
                    format!("{}<{}>()", element_name(*id), args.join(", "))
                }
            }
            MemberTarget::Parameter { function, index, .. } => graph
                .and_then(|g| g.function(*function))
                .and_then(|f| f.params.get(*index))
                .map_or_else(|| format!("param{index}"), |p| p.name.clone()),
            MemberTarget::GenericParameter { function, index } => graph
                .and_then(|g| g.function(*function))
                .and_then(|f| f.generic_params.get(*index))
                .map_or_else(|| format!("T{index}"), |p| p.name.clone()),
            MemberTarget::Reflected { instance, items, .. } => match (instance, items.first()) {
                (Some(instance), _) => instance.render_name(graph),
                (None, Some(first)) if first.kind == ReflectedKind::Constructor => String::new(),
                (None, Some(first)) => first.declaring_type.to_string(),
                (None, None) => "(empty)".to_string(),
            },
        };
        for item in self.items() {
            match item.kind {
                ReflectedKind::Constructor => out.push_str(&format!("new {}()", item.ty)),
                ReflectedKind::Method => out.push_str(&format!(".{}()", item.name)),
                _ => out.push_str(&format!(".{}", item.name)),
            }
        }
        out
    }
}

/// Replaces a generic parameter name with its bound argument, falling back
/// to the parameter's constraint.
fn substitute_generic(ty: &TypeName, decl: &crate::element::FunctionDecl, args: &[TypeName]) -> TypeName {
    match decl.generic_params.iter().position(|g| g.name == ty.as_str()) {
        Some(i) => args
            .get(i)
            .cloned()
            .unwrap_or_else(|| decl.generic_params[i].constraint.clone()),
        None => ty.clone(),
    }
}

impl Clone for MemberData {
    fn clone(&self) -> Self {
        MemberData::new(self.target.clone())
    }
}

impl PartialEq for MemberData {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl fmt::Debug for MemberData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MemberData").field(&self.target).finish()
    }
}

impl fmt::Display for MemberData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_name(None))
    }
}

impl From<Value> for MemberData {
    fn from(value: Value) -> Self {
        MemberData::create_from_value(value)
    }
}

#[cfg(test)]
mod tests;
