//! Lazy resolution of member references.

use std::rc::Rc;

use crate::convert::is_assignable;
use crate::element::ElementKind;
use crate::graph::Graph;
use crate::id::ElementId;
use crate::reflect::TypeRegistry;
use crate::types::TypeName;

use super::{MemberData, MemberError, MemberItem, MemberTarget, ReflectedKind, ResolvedMember};

impl MemberData {
    /// Resolves the reflected items of this member (the chain of a reflected
    /// target, or the deep chain of a graph-native one).
    ///
    /// Graph-native targets must exist in `graph`, and a deep chain must start
    /// on the root element's declared type. The first successful resolution
    /// of the items is cached until [`MemberData::reset_cache`]; failures are
    /// not cached. With `throw` unset a failure yields `Ok(None)`.
    pub fn get_members(
        &self,
        graph: &Graph,
        registry: &TypeRegistry,
        throw: bool,
    ) -> Result<Option<Rc<[ResolvedMember]>>, MemberError> {
        let resolved = self
            .check_target(graph)
            .and_then(|()| self.check_deep_root(graph, registry))
            .and_then(|()| self.members(registry));
        match resolved {
            Ok(members) => Ok(Some(members)),
            Err(err) if throw => Err(err),
            Err(_) => Ok(None),
        }
    }

    pub(crate) fn members(&self, registry: &TypeRegistry) -> Result<Rc<[ResolvedMember]>, MemberError> {
        if let Some(members) = self.cache.members.get() {
            return Ok(members.clone());
        }
        let resolved = self
            .items()
            .iter()
            .map(|item| resolve_item(item, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.cache.members.get_or_init(|| resolved.into()).clone())
    }

    /// Checks that a graph-native target points at an element of the right
    /// kind in `graph`. Other families always pass.
    pub fn check_target(&self, graph: &Graph) -> Result<(), MemberError> {
        let missing = |id: ElementId| MemberError::MissingElement {
            id,
            name: self.to_string(),
        };
        let kind_of = |id: ElementId| graph.get(id).map(|el| &el.kind);
        match &self.target {
            MemberTarget::Variable { id, .. } => match kind_of(*id) {
                Some(ElementKind::Variable(_)) => Ok(()),
                _ => Err(missing(*id)),
            },
            MemberTarget::LocalVariable { id, .. } => match kind_of(*id) {
                Some(ElementKind::LocalVariable(_)) => Ok(()),
                _ => Err(missing(*id)),
            },
            MemberTarget::Property { id, .. } => match kind_of(*id) {
                Some(ElementKind::Property(_)) => Ok(()),
                _ => Err(missing(*id)),
            },
            MemberTarget::Indexer { id } => match kind_of(*id) {
                Some(ElementKind::Indexer(_)) => Ok(()),
                _ => Err(missing(*id)),
            },
            MemberTarget::Function { id, .. } => graph.function(*id).map(|_| ()).ok_or_else(|| missing(*id)),
            MemberTarget::Parameter { function, index, .. } => graph
                .function(*function)
                .filter(|f| *index < f.params.len())
                .map(|_| ())
                .ok_or_else(|| missing(*function)),
            MemberTarget::GenericParameter { function, index } => graph
                .function(*function)
                .filter(|f| *index < f.generic_params.len())
                .map(|_| ())
                .ok_or_else(|| missing(*function)),
            MemberTarget::NodePort(port) => graph.port(port).map(|_| ()).map_err(|_| missing(port.node)),
            MemberTarget::Reflected { instance: Some(instance), .. } => instance.check_target(graph),
            _ => Ok(()),
        }
    }

    /// Declared type of the graph element a deep chain starts from.
    fn root_type(&self, graph: &Graph) -> Option<TypeName> {
        let kind_of = |id: ElementId| graph.get(id).map(|el| &el.kind);
        match &self.target {
            MemberTarget::Variable { id, .. } | MemberTarget::LocalVariable { id, .. } => match kind_of(*id)? {
                ElementKind::Variable(def) | ElementKind::LocalVariable(def) => Some(def.ty.clone()),
                _ => None,
            },
            MemberTarget::Property { id, .. } => match kind_of(*id)? {
                ElementKind::Property(decl) => Some(decl.ty.clone()),
                _ => None,
            },
            MemberTarget::Parameter { function, index, .. } => {
                graph.function(*function)?.params.get(*index).map(|p| p.ty.clone())
            }
            _ => None,
        }
    }

    /// The first hop of a deep chain must be declared on the root element's
    /// type or one of its bases. An `object` root is checked at run time.
    pub(super) fn check_deep_root(&self, graph: &Graph, registry: &TypeRegistry) -> Result<(), MemberError> {
        let (Some(first), Some(root)) = (self.items().first(), self.root_type(graph)) else {
            return Ok(());
        };
        if root == TypeName::OBJECT || is_assignable(&root, &first.declaring_type, registry) {
            return Ok(());
        }
        Err(MemberError::TypeMismatch {
            name: self.to_string(),
            expected: first.declaring_type.clone(),
            actual: root,
        })
    }

    /// Returns `true` if the member is consistent, its graph element exists
    /// and its reflected items resolve.
    pub fn is_resolvable(&self, graph: &Graph, registry: &TypeRegistry) -> bool {
        self.validate().is_ok()
            && self.get_members(graph, registry, false).is_ok_and(|m| m.is_some())
            && self
                .instance()
                .map_or(true, |instance| instance.is_resolvable(graph, registry))
    }
}

fn resolve_item(item: &MemberItem, registry: &TypeRegistry) -> Result<ResolvedMember, MemberError> {
    let unresolved = || MemberError::Unresolved {
        ty: item.declaring_type.clone(),
        name: item.name.clone(),
    };
    let lineage = registry.lineage(&item.declaring_type);
    let found = match item.kind {
        ReflectedKind::Field => lineage
            .iter()
            .find_map(|d| d.field(&item.name).cloned())
            .map(ResolvedMember::Field),
        ReflectedKind::Property => lineage
            .iter()
            .find_map(|d| d.property(&item.name).cloned())
            .map(ResolvedMember::Property),
        ReflectedKind::Method => {
            let signature = item.signature();
            lineage
                .iter()
                .find_map(|d| d.method(&item.name, &signature).cloned())
                .map(ResolvedMember::Method)
        }
        ReflectedKind::Constructor => {
            let signature = item.signature();
            lineage
                .first()
                .and_then(|d| d.constructor(&signature).cloned())
                .map(|c| ResolvedMember::Constructor(c, item.declaring_type.clone()))
        }
        ReflectedKind::Event => lineage
            .iter()
            .find_map(|d| d.event(&item.name).cloned())
            .map(ResolvedMember::Event),
    };
    found.ok_or_else(unresolved)
}
