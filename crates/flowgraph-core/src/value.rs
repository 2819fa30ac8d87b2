//! Runtime values.
//!
//! [`Value`] is the dynamic counterpart of [`TypeName`]. Primitives, lists and
//! structs have value semantics (cloning copies them); [`ObjectRef`] is a
//! shared, mutable reference type, so cloning an object value aliases it.
//! [`Value::duplicate`] produces a deep copy, which is what literal stores
//! hand out so that a running graph cannot mutate its own stored defaults.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::id::{ElementId, GraphUid};
use crate::types::TypeName;

/// A runtime value flowing through value ports and member accesses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    List(Vec<Value>),
    /// A value-type aggregate; copied on assignment.
    Struct(StructValue),
    /// A reference-type instance; shared on assignment.
    Object(ObjectRef),
    /// A type used as a value (generic arguments, `typeof`).
    Type(TypeName),
    /// A callable bound to a graph function.
    Delegate(DelegateRef),
    /// A handle to an event declared on an object.
    Event(EventRef),
}

impl Value {
    /// Returns the runtime type of this value.
    ///
    /// `Null` reports the universal object type.
    pub fn type_name(&self) -> TypeName {
        match self {
            Value::Null => TypeName::OBJECT,
            Value::Bool(_) => TypeName::BOOL,
            Value::I32(_) => TypeName::I32,
            Value::I64(_) => TypeName::I64,
            Value::F32(_) => TypeName::F32,
            Value::F64(_) => TypeName::F64,
            Value::String(_) => TypeName::STRING,
            Value::List(_) => TypeName::LIST,
            Value::Struct(s) => s.ty.clone(),
            Value::Object(o) => o.type_name(),
            Value::Type(_) => TypeName::TYPE,
            Value::Delegate(_) => TypeName::DELEGATE,
            Value::Event(_) => TypeName::EVENT,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` if assigning this value shares state with the source.
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Delegate(_) | Value::Event(_))
    }

    /// Produces an independent copy, deep-copying object graphs.
    ///
    /// Objects reachable from lists, structs and other objects are duplicated
    /// too. Delegates and events are immutable handles and stay shared.
    pub fn duplicate(&self) -> Value {
        match self {
            Value::Object(o) => Value::Object(o.duplicate()),
            Value::List(items) => Value::List(items.iter().map(Value::duplicate).collect()),
            Value::Struct(s) => Value::Struct(StructValue {
                ty: s.ty.clone(),
                fields: s
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.duplicate()))
                    .collect(),
            }),
            other => other.clone(),
        }
    }

    /// Returns the default value stored for a freshly declared slot of `ty`.
    pub fn default_for(ty: &TypeName) -> Value {
        match ty.as_str() {
            "bool" => Value::Bool(false),
            "i32" => Value::I32(0),
            "i64" => Value::I64(0),
            "f32" => Value::F32(0.0),
            "f64" => Value::F64(0.0),
            "string" => Value::String(String::new()),
            "list" => Value::List(Vec::new()),
            _ => Value::Null,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Widens any integer value to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(i64::from(*v)),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens any numeric value to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I32(v) => Some(f64::from(*v)),
            Value::I64(v) => Some(*v as f64),
            Value::F32(v) => Some(f64::from(*v)),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Structural equality for value types, identity for reference types.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Delegate(a), Value::Delegate(b)) => a.ptr_eq(b),
            (Value::Event(a), Value::Event(b)) => a.owner.ptr_eq(&b.owner) && a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Struct(s) => write!(f, "{} {{..}}", s.ty),
            Value::Object(o) => write!(f, "{} object", o.type_name()),
            Value::Type(t) => write!(f, "typeof({t})"),
            Value::Delegate(d) => write!(f, "delegate({}:{})", d.container(), d.function()),
            Value::Event(e) => write!(f, "event {}", e.name),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// A value-type aggregate with insertion-ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructValue {
    pub ty: TypeName,
    pub fields: IndexMap<String, Value>,
}

impl StructValue {
    pub fn new(ty: TypeName) -> Self {
        StructValue {
            ty,
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Backing storage of a reference-type instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectData {
    pub ty: TypeName,
    pub fields: IndexMap<String, Value>,
    /// Event name -> subscribed delegates, in subscription order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub events: IndexMap<String, Vec<DelegateRef>>,
}

/// A shared, mutable reference to an object.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

impl ObjectRef {
    pub fn new(ty: TypeName) -> Self {
        ObjectRef(Rc::new(RefCell::new(ObjectData {
            ty,
            ..ObjectData::default()
        })))
    }

    pub fn from_data(data: ObjectData) -> Self {
        ObjectRef(Rc::new(RefCell::new(data)))
    }

    pub fn type_name(&self) -> TypeName {
        self.0.borrow().ty.clone()
    }

    pub fn borrow(&self) -> Ref<'_, ObjectData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ObjectData> {
        self.0.borrow_mut()
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.0.borrow().fields.get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().fields.insert(name.into(), value);
    }

    /// Returns `true` if both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Deep-copies the object and everything reachable from its fields.
    pub fn duplicate(&self) -> ObjectRef {
        let data = self.0.borrow();
        ObjectRef::from_data(ObjectData {
            ty: data.ty.clone(),
            fields: data
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.duplicate()))
                .collect(),
            events: data.events.clone(),
        })
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => f
                .debug_struct("Object")
                .field("ty", &data.ty)
                .field("fields", &data.fields)
                .finish(),
            Err(_) => f.write_str("Object(<borrowed>)"),
        }
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = self
            .0
            .try_borrow()
            .map_err(|_| serde::ser::Error::custom("object is mutably borrowed"))?;
        data.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ObjectData::deserialize(deserializer).map(ObjectRef::from_data)
    }
}

// ---------------------------------------------------------------------------
// Delegates and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DelegateTarget {
    container: GraphUid,
    function: ElementId,
}

/// A callable bound to a graph function.
///
/// Equality is identity: subscribing and unsubscribing must use the same
/// delegate object, which the runtime guarantees through its delegate cache.
#[derive(Debug, Clone)]
pub struct DelegateRef(Rc<DelegateTarget>);

impl DelegateRef {
    pub fn new(container: GraphUid, function: ElementId) -> Self {
        DelegateRef(Rc::new(DelegateTarget {
            container,
            function,
        }))
    }

    pub fn container(&self) -> GraphUid {
        self.0.container
    }

    pub fn function(&self) -> ElementId {
        self.0.function
    }

    pub fn ptr_eq(&self, other: &DelegateRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for DelegateRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DelegateRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DelegateTarget::deserialize(deserializer).map(|t| DelegateRef(Rc::new(t)))
    }
}

/// A handle to a named event on a particular object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRef {
    pub owner: ObjectRef,
    pub name: String,
}

impl EventRef {
    pub fn new(owner: ObjectRef, name: impl Into<String>) -> Self {
        EventRef {
            owner,
            name: name.into(),
        }
    }

    /// Adds `delegate` unless that exact delegate is already subscribed.
    pub fn subscribe(&self, delegate: DelegateRef) {
        let mut data = self.owner.borrow_mut();
        let list = data.events.entry(self.name.clone()).or_default();
        if !list.iter().any(|d| d.ptr_eq(&delegate)) {
            list.push(delegate);
        }
    }

    /// Removes `delegate`; returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, delegate: &DelegateRef) -> bool {
        let mut data = self.owner.borrow_mut();
        match data.events.get_mut(&self.name) {
            Some(list) => {
                let before = list.len();
                list.retain(|d| !d.ptr_eq(delegate));
                list.len() != before
            }
            None => false,
        }
    }

    /// Snapshot of the current subscribers, in subscription order.
    pub fn subscribers(&self) -> Vec<DelegateRef> {
        self.owner
            .borrow()
            .events
            .get(&self.name)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_type_names() {
        assert_eq!(Value::I32(1).type_name(), TypeName::I32);
        assert_eq!(Value::Null.type_name(), TypeName::OBJECT);
        let s = StructValue::new(TypeName::new("Vec2"));
        assert_eq!(Value::Struct(s).type_name(), TypeName::new("Vec2"));
        let o = ObjectRef::new(TypeName::new("Player"));
        assert_eq!(Value::Object(o).type_name(), TypeName::new("Player"));
    }

    #[test]
    fn object_clone_aliases_but_duplicate_copies() {
        let obj = ObjectRef::new(TypeName::new("Bag"));
        obj.set_field("count", Value::I32(1));

        let alias = Value::Object(obj.clone());
        let copy = Value::Object(obj.clone()).duplicate();

        obj.set_field("count", Value::I32(2));
        assert_eq!(alias.as_object().unwrap().field("count"), Some(Value::I32(2)));
        assert_eq!(copy.as_object().unwrap().field("count"), Some(Value::I32(1)));
        assert_ne!(alias, copy);
    }

    #[test]
    fn duplicate_reaches_nested_objects() {
        let inner = ObjectRef::new(TypeName::new("Inner"));
        let list = Value::List(vec![Value::Object(inner.clone())]);
        let copy = list.duplicate();
        inner.set_field("x", Value::I32(9));
        match copy {
            Value::List(items) => assert_eq!(items[0].as_object().unwrap().field("x"), None),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn defaults_per_type() {
        assert_eq!(Value::default_for(&TypeName::I32), Value::I32(0));
        assert_eq!(Value::default_for(&TypeName::STRING), Value::String(String::new()));
        assert_eq!(Value::default_for(&TypeName::new("Player")), Value::Null);
    }

    #[test]
    fn event_subscription_is_identity_based() {
        let owner = ObjectRef::new(TypeName::new("Button"));
        let event = EventRef::new(owner, "clicked");
        let d1 = DelegateRef::new(GraphUid(1), ElementId(4));
        let d2 = DelegateRef::new(GraphUid(1), ElementId(4));

        event.subscribe(d1.clone());
        event.subscribe(d1.clone());
        event.subscribe(d2.clone());
        assert_eq!(event.subscribers().len(), 2);

        assert!(event.unsubscribe(&d1));
        assert!(!event.unsubscribe(&d1));
        assert_eq!(event.subscribers().len(), 1);
    }

    #[test]
    fn object_serde_roundtrip() {
        let obj = ObjectRef::new(TypeName::new("Player"));
        obj.set_field("hp", Value::I32(100));
        let json = serde_json::to_string(&Value::Object(obj)).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_object().unwrap().field("hp"), Some(Value::I32(100)));
    }

    #[test]
    fn display_formats_lists() {
        let v = Value::List(vec![Value::I32(1), Value::from("a")]);
        assert_eq!(v.to_string(), "[1, a]");
    }
}
