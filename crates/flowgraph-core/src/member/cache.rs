//! Lazily filled resolution cache of a member reference.

use std::cell::OnceCell;
use std::rc::Rc;

use crate::reflect::{ConstructorDef, EventDef, FieldDef, MethodDef, PropertyDef};
use crate::types::TypeName;

/// One reflected item resolved against the host registry.
#[derive(Debug, Clone)]
pub enum ResolvedMember {
    Field(Rc<FieldDef>),
    Property(Rc<PropertyDef>),
    Method(Rc<MethodDef>),
    /// Constructor plus the type it constructs.
    Constructor(Rc<ConstructorDef>, TypeName),
    Event(Rc<EventDef>),
}

impl ResolvedMember {
    pub fn is_static(&self) -> bool {
        match self {
            ResolvedMember::Property(p) => p.is_static,
            ResolvedMember::Method(m) => m.is_static,
            ResolvedMember::Constructor(..) => true,
            ResolvedMember::Field(_) | ResolvedMember::Event(_) => false,
        }
    }
}

/// Cached resolution state. Never persisted and never shared between clones.
#[derive(Debug, Default)]
pub(crate) struct MemberCache {
    pub(crate) members: OnceCell<Rc<[ResolvedMember]>>,
    pub(crate) display_name: OnceCell<String>,
    pub(crate) parameter_types: OnceCell<Vec<TypeName>>,
}

impl MemberCache {
    pub(crate) fn clear(&mut self) {
        *self = MemberCache::default();
    }
}
