//! Host type registry: the "reflected" side of member resolution.
//!
//! The host registers [`TypeDescriptor`]s describing its external types:
//! fields, properties, methods, constructors and events, with native closures
//! providing the behaviour. Graphs refer to these members by name, declaring
//! type and parameter signature; [`MemberData`](crate::member::MemberData)
//! resolves such references lazily into the `Rc` handles handed out here.
//!
//! The registry is an explicit value owned by the host and passed to
//! resolution and execution, never a process-wide global.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::types::{ParameterDef, TypeName, BUILTIN_TYPES};
use crate::value::Value;

/// Failure raised by a native member body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        NativeError {
            message: message.into(),
        }
    }
}

pub type NativeResult<T> = Result<T, NativeError>;

/// Reads a property from its receiver (`Value::Null` for static properties).
pub type Getter = Rc<dyn Fn(&Value) -> NativeResult<Value>>;
/// Writes a property on its receiver.
pub type Setter = Rc<dyn Fn(&mut Value, Value) -> NativeResult<()>>;
/// Invokes a method: receiver, then arguments (ref/out slots are written in place).
pub type MethodBody = Rc<dyn Fn(&mut Value, &mut [Value]) -> NativeResult<Value>>;
pub type ConstructorBody = Rc<dyn Fn(&mut [Value]) -> NativeResult<Value>>;
/// Converts a value to another type, `None` if this particular value cannot be.
pub type ConverterFn = Rc<dyn Fn(&Value) -> Option<Value>>;

/// Broad category of a registered type; drives assignment and copy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Primitive,
    /// Reference type: instances are [`Value::Object`].
    Class,
    /// Value type: instances are [`Value::Struct`].
    Struct,
}

// ---------------------------------------------------------------------------
// Member descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeName,
}

pub struct PropertyDef {
    pub name: String,
    pub ty: TypeName,
    pub is_static: bool,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, ty: TypeName) -> Self {
        PropertyDef {
            name: name.into(),
            ty,
            is_static: false,
            getter: None,
            setter: None,
        }
    }

    pub fn getter(mut self, f: impl Fn(&Value) -> NativeResult<Value> + 'static) -> Self {
        self.getter = Some(Rc::new(f));
        self
    }

    pub fn setter(mut self, f: impl Fn(&mut Value, Value) -> NativeResult<()> + 'static) -> Self {
        self.setter = Some(Rc::new(f));
        self
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn can_read(&self) -> bool {
        self.getter.is_some()
    }

    pub fn can_write(&self) -> bool {
        self.setter.is_some()
    }

    pub fn read(&self, receiver: &Value) -> NativeResult<Value> {
        match &self.getter {
            Some(get) => get(receiver),
            None => Err(NativeError::new(format!("property '{}' has no getter", self.name))),
        }
    }

    pub fn write(&self, receiver: &mut Value, value: Value) -> NativeResult<()> {
        match &self.setter {
            Some(set) => set(receiver, value),
            None => Err(NativeError::new(format!("property '{}' has no setter", self.name))),
        }
    }
}

pub struct MethodDef {
    pub name: String,
    pub params: Vec<ParameterDef>,
    pub return_type: TypeName,
    pub is_static: bool,
    body: MethodBody,
}

impl MethodDef {
    pub fn new(
        name: impl Into<String>,
        params: Vec<ParameterDef>,
        return_type: TypeName,
        body: impl Fn(&mut Value, &mut [Value]) -> NativeResult<Value> + 'static,
    ) -> Self {
        MethodDef {
            name: name.into(),
            params,
            return_type,
            is_static: false,
            body: Rc::new(body),
        }
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn call(&self, receiver: &mut Value, args: &mut [Value]) -> NativeResult<Value> {
        (self.body)(receiver, args)
    }

    /// Returns `true` if the parameter types equal `signature` exactly.
    pub fn matches(&self, signature: &[TypeName]) -> bool {
        self.params.len() == signature.len()
            && self.params.iter().zip(signature).all(|(p, t)| p.ty == *t)
    }
}

pub struct ConstructorDef {
    pub params: Vec<ParameterDef>,
    body: ConstructorBody,
}

impl ConstructorDef {
    pub fn new(
        params: Vec<ParameterDef>,
        body: impl Fn(&mut [Value]) -> NativeResult<Value> + 'static,
    ) -> Self {
        ConstructorDef {
            params,
            body: Rc::new(body),
        }
    }

    pub fn call(&self, args: &mut [Value]) -> NativeResult<Value> {
        (self.body)(args)
    }

    pub fn matches(&self, signature: &[TypeName]) -> bool {
        self.params.len() == signature.len()
            && self.params.iter().zip(signature).all(|(p, t)| p.ty == *t)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDef {
    pub name: String,
}

impl fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDef")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("is_static", &self.is_static)
            .field("readable", &self.can_read())
            .field("writable", &self.can_write())
            .finish()
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("is_static", &self.is_static)
            .finish()
    }
}

impl fmt::Debug for ConstructorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDef")
            .field("params", &self.params)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Type descriptors
// ---------------------------------------------------------------------------

/// Everything the registry knows about one external type.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: TypeName,
    pub category: TypeCategory,
    /// Base type for same-family reference conversions and inherited members.
    pub base: Option<TypeName>,
    fields: IndexMap<String, Rc<FieldDef>>,
    properties: IndexMap<String, Rc<PropertyDef>>,
    methods: Vec<Rc<MethodDef>>,
    constructors: Vec<Rc<ConstructorDef>>,
    events: IndexMap<String, Rc<EventDef>>,
}

impl TypeDescriptor {
    fn empty(name: TypeName, category: TypeCategory) -> Self {
        TypeDescriptor {
            name,
            category,
            base: None,
            fields: IndexMap::new(),
            properties: IndexMap::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            events: IndexMap::new(),
        }
    }

    /// Starts a reference-type descriptor.
    pub fn class(name: impl Into<TypeName>) -> Self {
        Self::empty(name.into(), TypeCategory::Class)
    }

    /// Starts a value-type descriptor.
    pub fn structure(name: impl Into<TypeName>) -> Self {
        Self::empty(name.into(), TypeCategory::Struct)
    }

    pub fn primitive(name: TypeName) -> Self {
        Self::empty(name, TypeCategory::Primitive)
    }

    pub fn extends(mut self, base: impl Into<TypeName>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: TypeName) -> Self {
        let name = name.into();
        self.fields
            .insert(name.clone(), Rc::new(FieldDef { name, ty }));
        self
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties
            .insert(property.name.clone(), Rc::new(property));
        self
    }

    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(Rc::new(method));
        self
    }

    pub fn with_constructor(mut self, ctor: ConstructorDef) -> Self {
        self.constructors.push(Rc::new(ctor));
        self
    }

    pub fn with_event(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.events.insert(name.clone(), Rc::new(EventDef { name }));
        self
    }

    pub fn is_reference(&self) -> bool {
        self.category == TypeCategory::Class
    }

    pub fn field(&self, name: &str) -> Option<&Rc<FieldDef>> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Rc<FieldDef>> {
        self.fields.values()
    }

    pub fn property(&self, name: &str) -> Option<&Rc<PropertyDef>> {
        self.properties.get(name)
    }

    pub fn event(&self, name: &str) -> Option<&Rc<EventDef>> {
        self.events.get(name)
    }

    /// Finds the method overload whose parameter types equal `signature`.
    pub fn method(&self, name: &str, signature: &[TypeName]) -> Option<&Rc<MethodDef>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.matches(signature))
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Rc<MethodDef>> {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn constructor(&self, signature: &[TypeName]) -> Option<&Rc<ConstructorDef>> {
        self.constructors.iter().find(|c| c.matches(signature))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registry of host types and value converters.
///
/// Constructed with descriptors for every built-in [`TypeName`]; `string`
/// and `list` carry a few read-only members (`length`, `count`, `get`).
pub struct TypeRegistry {
    types: IndexMap<TypeName, Rc<TypeDescriptor>>,
    converters: HashMap<(TypeName, TypeName), ConverterFn>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            types: IndexMap::new(),
            converters: HashMap::new(),
        };
        for ty in BUILTIN_TYPES {
            let key = ty.as_str().to_string();
            let desc = match key.as_str() {
                "object" | "delegate" | "event" => TypeDescriptor::class(ty),
                "string" => TypeDescriptor::class(ty).with_property(
                    PropertyDef::new("length", TypeName::I32).getter(|recv| match recv {
                        Value::String(s) => Ok(Value::I32(s.chars().count() as i32)),
                        other => Err(NativeError::new(format!("expected string, got {}", other.type_name()))),
                    }),
                ),
                "list" => TypeDescriptor::class(ty)
                    .with_property(PropertyDef::new("count", TypeName::I32).getter(|recv| {
                        match recv {
                            Value::List(items) => Ok(Value::I32(items.len() as i32)),
                            other => Err(NativeError::new(format!("expected list, got {}", other.type_name()))),
                        }
                    }))
                    .with_method(MethodDef::new(
                        "get",
                        vec![ParameterDef::new("index", TypeName::I32)],
                        TypeName::OBJECT,
                        |recv, args| {
                            let index = args.first().and_then(Value::as_i64).unwrap_or(-1);
                            match recv {
                                Value::List(items) => usize::try_from(index)
                                    .ok()
                                    .and_then(|i| items.get(i).cloned())
                                    .ok_or_else(|| NativeError::new(format!("index {index} out of range"))),
                                other => Err(NativeError::new(format!("expected list, got {}", other.type_name()))),
                            }
                        },
                    )),
                _ => TypeDescriptor::primitive(ty),
            };
            registry.types.insert(desc.name.clone(), Rc::new(desc));
        }
        registry
    }

    /// Registers (or replaces) a type, returning the previous descriptor.
    ///
    /// Replacing a descriptor does not touch already-resolved member caches;
    /// holders must call `reset_cache` to observe the new declaration.
    pub fn register(&mut self, desc: TypeDescriptor) -> Option<Rc<TypeDescriptor>> {
        self.types.insert(desc.name.clone(), Rc::new(desc))
    }

    /// Registers a conversion from values of type `from` to type `to`.
    pub fn register_converter(
        &mut self,
        from: TypeName,
        to: TypeName,
        f: impl Fn(&Value) -> Option<Value> + 'static,
    ) {
        self.converters.insert((from, to), Rc::new(f));
    }

    pub fn get(&self, name: &TypeName) -> Option<Rc<TypeDescriptor>> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &TypeName) -> bool {
        self.types.contains_key(name)
    }

    pub fn converter(&self, from: &TypeName, to: &TypeName) -> Option<&ConverterFn> {
        self.converters.get(&(from.clone(), to.clone()))
    }

    /// Iterates `name` and its base chain, most-derived first.
    ///
    /// Stops at the first unregistered base or when a base repeats.
    pub fn lineage(&self, name: &TypeName) -> Vec<Rc<TypeDescriptor>> {
        let mut chain: Vec<Rc<TypeDescriptor>> = Vec::new();
        let mut next = self.get(name);
        while let Some(desc) = next {
            if chain.iter().any(|d| d.name == desc.name) {
                break;
            }
            next = desc.base.as_ref().and_then(|b| self.get(b));
            chain.push(desc);
        }
        chain
    }

    /// Returns `true` if `ty` is `ancestor` or derives from it.
    pub fn is_subtype(&self, ty: &TypeName, ancestor: &TypeName) -> bool {
        ty == ancestor || self.lineage(ty).iter().any(|d| d.name == *ancestor)
    }

    /// Returns `true` if values of `ty` are shared on assignment (and may be null).
    pub fn is_reference_type(&self, ty: &TypeName) -> bool {
        match self.get(ty) {
            Some(desc) => desc.is_reference(),
            None => false,
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("converters", &self.converters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> TypeDescriptor {
        TypeDescriptor::class("Player")
            .extends("Actor")
            .with_field("hp", TypeName::I32)
            .with_method(MethodDef::new(
                "heal",
                vec![ParameterDef::new("amount", TypeName::I32)],
                TypeName::VOID,
                |_, _| Ok(Value::Null),
            ))
            .with_method(MethodDef::new(
                "heal",
                vec![
                    ParameterDef::new("amount", TypeName::I32),
                    ParameterDef::new("scale", TypeName::F32),
                ],
                TypeName::VOID,
                |_, _| Ok(Value::Null),
            ))
    }

    #[test]
    fn builtins_are_registered() {
        let reg = TypeRegistry::new();
        for ty in BUILTIN_TYPES {
            assert!(reg.contains(&ty), "missing builtin {}", ty);
        }
        assert!(reg.is_reference_type(&TypeName::STRING));
        assert!(!reg.is_reference_type(&TypeName::I32));
    }

    #[test]
    fn overloads_resolve_by_signature() {
        let desc = player();
        let one = desc.method("heal", &[TypeName::I32]).unwrap();
        let two = desc.method("heal", &[TypeName::I32, TypeName::F32]).unwrap();
        assert_eq!(one.params.len(), 1);
        assert_eq!(two.params.len(), 2);
        assert!(desc.method("heal", &[TypeName::F32]).is_none());
        assert_eq!(desc.methods_named("heal").count(), 2);
    }

    #[test]
    fn lineage_walks_base_chain() {
        let mut reg = TypeRegistry::new();
        reg.register(TypeDescriptor::class("Actor"));
        reg.register(player());

        let names: Vec<_> = reg
            .lineage(&TypeName::new("Player"))
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, vec![TypeName::new("Player"), TypeName::new("Actor")]);
        assert!(reg.is_subtype(&TypeName::new("Player"), &TypeName::new("Actor")));
        assert!(!reg.is_subtype(&TypeName::new("Actor"), &TypeName::new("Player")));
    }

    #[test]
    fn lineage_tolerates_cycles() {
        let mut reg = TypeRegistry::new();
        reg.register(TypeDescriptor::class("A").extends("B"));
        reg.register(TypeDescriptor::class("B").extends("A"));
        assert_eq!(reg.lineage(&TypeName::new("A")).len(), 2);
    }

    #[test]
    fn register_replaces_and_returns_previous() {
        let mut reg = TypeRegistry::new();
        assert!(reg.register(player()).is_none());
        let old = reg.register(TypeDescriptor::class("Player")).unwrap();
        assert!(old.field("hp").is_some());
        assert!(reg.get(&TypeName::new("Player")).unwrap().field("hp").is_none());
    }

    #[test]
    fn builtin_list_members() {
        let reg = TypeRegistry::new();
        let list = reg.get(&TypeName::LIST).unwrap();
        let mut recv = Value::List(vec![Value::I32(4), Value::I32(5)]);
        let count = list.property("count").unwrap().read(&recv).unwrap();
        assert_eq!(count, Value::I32(2));

        let get = list.method("get", &[TypeName::I32]).unwrap();
        let mut args = [Value::I32(1)];
        assert_eq!(get.call(&mut recv, &mut args).unwrap(), Value::I32(5));
        let mut bad = [Value::I32(7)];
        assert!(get.call(&mut recv, &mut bad).is_err());
    }
}
