//! Reading, writing and invoking members through an execution context.

use crate::convert::auto_convert;
use crate::element::ElementKind;
use crate::graph::Graph;
use crate::id::{ElementId, PortRef};
use crate::reflect::{NativeError, TypeRegistry};
use crate::types::TypeName;
use crate::value::{DelegateRef, EventRef, Value};

use super::{
    MemberData, MemberError, MemberItem, MemberTarget, ReflectedKind, ResolvedMember, TargetFamily, TargetKind,
};

/// Services a running instance provides to member access.
///
/// Graph-native targets read and write instance storage through these
/// methods; the implementor owns variable slots, property backing fields,
/// call frames and delegate identity.
pub trait MemberContext {
    fn registry(&self) -> &TypeRegistry;
    fn graph(&self) -> &Graph;

    /// Value of a `SelfTarget` reference.
    fn self_value(&self) -> Value;

    fn variable(&mut self, id: ElementId) -> Result<Value, MemberError>;
    fn set_variable(&mut self, id: ElementId, value: Value) -> Result<(), MemberError>;

    /// Local variable of the innermost active call (or scope).
    fn local_variable(&mut self, id: ElementId) -> Result<Value, MemberError>;
    fn set_local_variable(&mut self, id: ElementId, value: Value) -> Result<(), MemberError>;

    /// Reads a graph property, running its getter function if it has one.
    fn property(&mut self, id: ElementId) -> Result<Value, MemberError>;
    fn set_property(&mut self, id: ElementId, value: Value) -> Result<(), MemberError>;

    /// Calls a graph function synchronously. Ref/out slots of `args` hold the
    /// callee's final parameter values on return.
    fn invoke_function(
        &mut self,
        id: ElementId,
        generic_args: &[TypeName],
        args: &mut [Value],
    ) -> Result<Value, MemberError>;

    /// Argument `index` of the innermost active call of `function`.
    fn parameter(&mut self, function: ElementId, index: usize) -> Result<Value, MemberError>;
    fn set_parameter(&mut self, function: ElementId, index: usize, value: Value) -> Result<(), MemberError>;

    /// Generic argument `index` bound by the innermost active call of `function`.
    fn generic_argument(&mut self, function: ElementId, index: usize) -> Result<TypeName, MemberError>;

    /// Current value of another node's value output.
    fn port_value(&mut self, port: &PortRef) -> Result<Value, MemberError>;

    /// Runs the function behind an event subscriber.
    fn invoke_delegate(&mut self, delegate: &DelegateRef, args: &mut [Value]) -> Result<Value, MemberError>;
}

impl MemberData {
    /// Reads the member's value.
    pub fn get(&self, ctx: &mut dyn MemberContext) -> Result<Value, MemberError> {
        self.get_value(ctx, None, &mut [])
    }

    /// Reads the member's value.
    ///
    /// `instance` overrides the receiver of a reflected chain; `args` are the
    /// arguments of a trailing function, indexer, method or constructor.
    /// Literal values are handed out as independent copies.
    pub fn get_value(
        &self,
        ctx: &mut dyn MemberContext,
        instance: Option<Value>,
        args: &mut [Value],
    ) -> Result<Value, MemberError> {
        match &self.target {
            MemberTarget::None => Err(MemberError::Unassigned),
            MemberTarget::Null => Ok(Value::Null),
            MemberTarget::SelfTarget => Ok(ctx.self_value()),
            MemberTarget::Value(v) => Ok(v.duplicate()),
            MemberTarget::Type(ty) => Ok(Value::Type(ty.clone())),
            MemberTarget::NodePort(port) => ctx.port_value(port),
            MemberTarget::Variable { id, .. } => {
                let base = ctx.variable(*id)?;
                self.read_chain(ctx, base, args)
            }
            MemberTarget::LocalVariable { id, .. } => {
                let base = ctx.local_variable(*id)?;
                self.read_chain(ctx, base, args)
            }
            MemberTarget::Property { id, .. } => {
                let base = ctx.property(*id)?;
                self.read_chain(ctx, base, args)
            }
            MemberTarget::Parameter { function, index, .. } => {
                let base = ctx.parameter(*function, *index)?;
                self.read_chain(ctx, base, args)
            }
            MemberTarget::Indexer { id } => {
                let getter = self.indexer_accessor(ctx.graph(), *id, false)?;
                ctx.invoke_function(getter, &[], args)
            }
            MemberTarget::Function { id, generic_args } => ctx.invoke_function(*id, generic_args, args),
            MemberTarget::GenericParameter { function, index } => {
                Ok(Value::Type(ctx.generic_argument(*function, *index)?))
            }
            MemberTarget::Reflected { instance: expr, .. } => {
                let receiver = self.receiver(ctx, expr.as_deref(), instance)?;
                self.read_chain(ctx, receiver, args)
            }
        }
    }

    /// Writes `value` into the member.
    pub fn set(&self, ctx: &mut dyn MemberContext, value: Value) -> Result<(), MemberError> {
        self.set_value(ctx, value, None, &mut [])
    }

    /// Writes `value` into the member.
    ///
    /// Literals, `self`, types, generic parameters, functions, methods,
    /// constructors and events are not writable. Deep chains write value-type
    /// intermediates back up to the root slot.
    pub fn set_value(
        &self,
        ctx: &mut dyn MemberContext,
        value: Value,
        instance: Option<Value>,
        args: &mut [Value],
    ) -> Result<(), MemberError> {
        let not_writable = || MemberError::NotWritable { name: self.to_string() };
        match &self.target {
            MemberTarget::None => Err(MemberError::Unassigned),
            MemberTarget::Null
            | MemberTarget::SelfTarget
            | MemberTarget::Value(_)
            | MemberTarget::Type(_)
            | MemberTarget::NodePort(_)
            | MemberTarget::Function { .. }
            | MemberTarget::GenericParameter { .. } => Err(not_writable()),
            MemberTarget::Variable { id, deep } => {
                if deep.is_empty() {
                    return ctx.set_variable(*id, value);
                }
                let base = ctx.variable(*id)?;
                let updated = self.write_chain(ctx, base, value)?;
                ctx.set_variable(*id, updated)
            }
            MemberTarget::LocalVariable { id, deep } => {
                if deep.is_empty() {
                    return ctx.set_local_variable(*id, value);
                }
                let base = ctx.local_variable(*id)?;
                let updated = self.write_chain(ctx, base, value)?;
                ctx.set_local_variable(*id, updated)
            }
            MemberTarget::Property { id, deep } => {
                if deep.is_empty() {
                    return ctx.set_property(*id, value);
                }
                let base = ctx.property(*id)?;
                let updated = self.write_chain(ctx, base, value)?;
                ctx.set_property(*id, updated)
            }
            MemberTarget::Parameter { function, index, deep } => {
                if deep.is_empty() {
                    return ctx.set_parameter(*function, *index, value);
                }
                let base = ctx.parameter(*function, *index)?;
                let updated = self.write_chain(ctx, base, value)?;
                ctx.set_parameter(*function, *index, updated)
            }
            MemberTarget::Indexer { id } => {
                let setter = self.indexer_accessor(ctx.graph(), *id, true)?;
                let mut full: Vec<Value> = args.to_vec();
                full.push(value);
                ctx.invoke_function(setter, &[], &mut full).map(|_| ())
            }
            MemberTarget::Reflected { kind, instance: expr, .. } => {
                if !matches!(kind, ReflectedKind::Field | ReflectedKind::Property) {
                    return Err(not_writable());
                }
                let overridden = instance.is_some();
                let receiver = self.receiver(ctx, expr.as_deref(), instance)?;
                let updated = self.write_chain(ctx, receiver, value)?;
                // A struct receiver read from an expression is a copy.
                if !overridden && matches!(updated, Value::Struct(_)) {
                    if let Some(expr) = expr {
                        expr.set(ctx, updated)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Invokes the member. Events are raised on every subscriber with a copy
    /// of `args`; every other kind behaves like [`MemberData::get_value`].
    pub fn invoke(
        &self,
        ctx: &mut dyn MemberContext,
        instance: Option<Value>,
        args: &mut [Value],
    ) -> Result<Value, MemberError> {
        if self.kind() == TargetKind::Event {
            let event = self.event_ref(ctx, instance)?;
            for delegate in event.subscribers() {
                let mut call_args = args.to_vec();
                ctx.invoke_delegate(&delegate, &mut call_args)?;
            }
            return Ok(Value::Null);
        }
        self.get_value(ctx, instance, args)
    }

    /// Subscribes `delegate` to the event this member refers to.
    pub fn add_listener(&self, ctx: &mut dyn MemberContext, delegate: DelegateRef) -> Result<(), MemberError> {
        self.event_ref(ctx, None)?.subscribe(delegate);
        Ok(())
    }

    /// Unsubscribes `delegate`; returns `false` if it was not subscribed.
    pub fn remove_listener(&self, ctx: &mut dyn MemberContext, delegate: &DelegateRef) -> Result<bool, MemberError> {
        Ok(self.event_ref(ctx, None)?.unsubscribe(delegate))
    }

    fn event_ref(&self, ctx: &mut dyn MemberContext, instance: Option<Value>) -> Result<EventRef, MemberError> {
        match self.get_value(ctx, instance, &mut [])? {
            Value::Event(event) => Ok(event),
            other => Err(MemberError::TypeMismatch {
                name: self.to_string(),
                expected: TypeName::EVENT,
                actual: other.type_name(),
            }),
        }
    }

    /// Returns `true` if [`MemberData::get_value`] can succeed statically.
    pub fn can_get_value(&self, graph: &Graph, registry: &TypeRegistry) -> bool {
        if !self.is_targeted() || self.check_target(graph).is_err() || self.check_deep_root(graph, registry).is_err() {
            return false;
        }
        let chain_readable = match (self.items().last(), self.members(registry)) {
            (None, _) => true,
            (Some(_), Err(_)) => false,
            (Some(_), Ok(members)) => match members.last() {
                Some(ResolvedMember::Property(p)) => p.can_read(),
                _ => true,
            },
        };
        if !chain_readable {
            return false;
        }
        match self.element_kind(graph) {
            Some(ElementKind::Property(decl)) => decl.can_read(),
            Some(ElementKind::Indexer(decl)) => decl.getter.is_some(),
            _ => true,
        }
    }

    /// Returns `true` if [`MemberData::set_value`] can succeed statically.
    pub fn can_set_value(&self, graph: &Graph, registry: &TypeRegistry) -> bool {
        if self.check_target(graph).is_err() || self.check_deep_root(graph, registry).is_err() {
            return false;
        }
        let chain_writable = match (self.items().last(), self.members(registry)) {
            (None, _) => true,
            (Some(_), Err(_)) => false,
            (Some(_), Ok(members)) => match members.last() {
                Some(ResolvedMember::Field(_)) => true,
                Some(ResolvedMember::Property(p)) => p.can_write(),
                _ => false,
            },
        };
        match &self.target {
            MemberTarget::Variable { .. } | MemberTarget::LocalVariable { .. } | MemberTarget::Parameter { .. } => {
                chain_writable
            }
            MemberTarget::Property { deep, .. } => {
                let slot = matches!(self.element_kind(graph), Some(ElementKind::Property(decl)) if decl.can_write());
                chain_writable && (slot || !deep.is_empty())
            }
            MemberTarget::Indexer { .. } => {
                matches!(self.element_kind(graph), Some(ElementKind::Indexer(decl)) if decl.setter.is_some())
            }
            MemberTarget::Reflected { .. } => self.family() == TargetFamily::Reflected && chain_writable,
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn element_kind<'g>(&self, graph: &'g Graph) -> Option<&'g ElementKind> {
        let id = match &self.target {
            MemberTarget::Property { id, .. } | MemberTarget::Indexer { id } => *id,
            _ => return None,
        };
        graph.get(id).map(|el| &el.kind)
    }

    fn indexer_accessor(&self, graph: &Graph, id: ElementId, setter: bool) -> Result<ElementId, MemberError> {
        let decl = match graph.get(id).map(|el| &el.kind) {
            Some(ElementKind::Indexer(decl)) => decl,
            _ => {
                return Err(MemberError::MissingElement {
                    id,
                    name: self.to_string(),
                })
            }
        };
        match (setter, decl.getter, decl.setter) {
            (false, Some(getter), _) => Ok(getter),
            (true, _, Some(setter)) => Ok(setter),
            (false, None, _) => Err(MemberError::NotReadable { name: self.to_string() }),
            (true, _, None) => Err(MemberError::NotWritable { name: self.to_string() }),
        }
    }

    /// Receiver of a reflected chain: the override, the instance expression,
    /// or `null` for static chains. A non-null receiver of an instance chain
    /// is auto-converted to the first item's declaring type.
    fn receiver(
        &self,
        ctx: &mut dyn MemberContext,
        expr: Option<&MemberData>,
        instance: Option<Value>,
    ) -> Result<Value, MemberError> {
        let first = self.items().first();
        let needs_instance = first.is_some_and(|i| !i.is_static && i.kind != ReflectedKind::Constructor);
        let value = match (instance, expr) {
            (Some(value), _) => value,
            (None, Some(expr)) => expr.get(ctx)?,
            (None, None) if needs_instance => {
                return Err(MemberError::MissingInstance { name: self.to_string() });
            }
            (None, None) => return Ok(Value::Null),
        };
        match first {
            Some(item) if needs_instance && !value.is_null() => {
                Ok(auto_convert(value, &item.declaring_type, ctx.registry()))
            }
            _ => Ok(value),
        }
    }

    fn read_chain(&self, ctx: &mut dyn MemberContext, base: Value, args: &mut [Value]) -> Result<Value, MemberError> {
        let items = self.items();
        if items.is_empty() {
            return Ok(base);
        }
        let members = self.members(ctx.registry())?;
        let name = self.to_string();
        let last = items.len() - 1;
        let mut current = base;
        for (i, (item, member)) in items.iter().zip(members.iter()).enumerate() {
            current = if i == last {
                read_step(item, member, &current, args, &name)?
            } else {
                read_step(item, member, &current, &mut [], &name)?
            };
        }
        Ok(current)
    }

    fn write_chain(&self, ctx: &mut dyn MemberContext, base: Value, value: Value) -> Result<Value, MemberError> {
        let items = self.items();
        let Some(last) = items.last() else {
            return Ok(value);
        };
        let members = self.members(ctx.registry())?;
        let value = auto_convert(value, &last.ty, ctx.registry());
        write_steps(items, &members, base, value, &self.to_string())
    }
}

fn native(name: &str) -> impl FnOnce(NativeError) -> MemberError + '_ {
    move |source| MemberError::Native {
        name: name.to_string(),
        source,
    }
}

fn check_args(expected: usize, args: &[Value], name: &str) -> Result<(), MemberError> {
    if expected != args.len() {
        return Err(MemberError::ArgumentCount {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn require_receiver(item: &MemberItem, member: &ResolvedMember, current: &Value, name: &str) -> Result<(), MemberError> {
    if current.is_null() && !item.is_static && !member.is_static() {
        return Err(MemberError::MissingInstance { name: name.to_string() });
    }
    Ok(())
}

fn read_step(
    item: &MemberItem,
    member: &ResolvedMember,
    current: &Value,
    args: &mut [Value],
    name: &str,
) -> Result<Value, MemberError> {
    match member {
        ResolvedMember::Field(def) => {
            require_receiver(item, member, current, name)?;
            match current {
                Value::Struct(s) => Ok(s.fields.get(&def.name).cloned().unwrap_or_else(|| Value::default_for(&def.ty))),
                Value::Object(o) => Ok(o.field(&def.name).unwrap_or_else(|| Value::default_for(&def.ty))),
                other => Err(MemberError::TypeMismatch {
                    name: name.to_string(),
                    expected: item.declaring_type.clone(),
                    actual: other.type_name(),
                }),
            }
        }
        ResolvedMember::Property(def) => {
            if !def.is_static {
                require_receiver(item, member, current, name)?;
            }
            if !def.can_read() {
                return Err(MemberError::NotReadable { name: name.to_string() });
            }
            def.read(current).map_err(native(name))
        }
        ResolvedMember::Method(def) => {
            if !def.is_static {
                require_receiver(item, member, current, name)?;
            }
            check_args(def.params.len(), args, name)?;
            let mut receiver = current.clone();
            def.call(&mut receiver, args).map_err(native(name))
        }
        ResolvedMember::Constructor(def, _) => {
            check_args(def.params.len(), args, name)?;
            def.call(args).map_err(native(name))
        }
        ResolvedMember::Event(def) => match current {
            Value::Object(owner) => Ok(Value::Event(EventRef::new(owner.clone(), def.name.clone()))),
            Value::Null => Err(MemberError::MissingInstance { name: name.to_string() }),
            other => Err(MemberError::TypeMismatch {
                name: name.to_string(),
                expected: item.declaring_type.clone(),
                actual: other.type_name(),
            }),
        },
    }
}

fn assign(member: &ResolvedMember, current: &mut Value, value: Value, name: &str) -> Result<(), MemberError> {
    match member {
        ResolvedMember::Field(def) => match current {
            Value::Struct(s) => {
                s.fields.insert(def.name.clone(), value);
                Ok(())
            }
            Value::Object(o) => {
                o.set_field(def.name.clone(), value);
                Ok(())
            }
            Value::Null => Err(MemberError::MissingInstance { name: name.to_string() }),
            other => Err(MemberError::NotWritable {
                name: format!("{name} on {}", other.type_name()),
            }),
        },
        ResolvedMember::Property(def) => {
            if !def.can_write() {
                return Err(MemberError::NotWritable { name: name.to_string() });
            }
            def.write(current, value).map_err(native(name))
        }
        _ => Err(MemberError::NotWritable { name: name.to_string() }),
    }
}

fn write_steps(
    items: &[MemberItem],
    members: &[ResolvedMember],
    mut current: Value,
    value: Value,
    name: &str,
) -> Result<Value, MemberError> {
    let (Some(item), Some(member)) = (items.first(), members.first()) else {
        return Ok(value);
    };
    if items.len() == 1 {
        assign(member, &mut current, value, name)?;
        return Ok(current);
    }
    let child = read_step(item, member, &current, &mut [], name)?;
    let shared = child.is_reference();
    let updated = write_steps(&items[1..], &members[1..], child, value, name)?;
    if !shared {
        assign(member, &mut current, updated, name)?;
    }
    Ok(current)
}
