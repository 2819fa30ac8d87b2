//! Name-based type references.
//!
//! Persisted graphs never hold metadata handles: every type is stored as a
//! [`TypeName`] and resolved lazily against a
//! [`TypeRegistry`](crate::reflect::TypeRegistry) at execution or validation
//! time. Built-in names are provided as associated constants.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A persisted type reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeName(pub Cow<'static, str>);

impl TypeName {
    /// The universal object type. Every value is assignable to it.
    pub const OBJECT: TypeName = TypeName(Cow::Borrowed("object"));
    pub const BOOL: TypeName = TypeName(Cow::Borrowed("bool"));
    pub const I32: TypeName = TypeName(Cow::Borrowed("i32"));
    pub const I64: TypeName = TypeName(Cow::Borrowed("i64"));
    pub const F32: TypeName = TypeName(Cow::Borrowed("f32"));
    pub const F64: TypeName = TypeName(Cow::Borrowed("f64"));
    pub const STRING: TypeName = TypeName(Cow::Borrowed("string"));
    /// The absence of a value (function return type only).
    pub const VOID: TypeName = TypeName(Cow::Borrowed("void"));
    pub const LIST: TypeName = TypeName(Cow::Borrowed("list"));
    /// The type of type values (`Value::Type`).
    pub const TYPE: TypeName = TypeName(Cow::Borrowed("type"));
    pub const DELEGATE: TypeName = TypeName(Cow::Borrowed("delegate"));
    pub const EVENT: TypeName = TypeName(Cow::Borrowed("event"));

    /// Creates a type reference from an owned or static name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        TypeName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the built-in primitive value types.
    pub fn is_primitive(&self) -> bool {
        self.is_numeric() || *self == TypeName::BOOL
    }

    /// Returns `true` for the integer and floating-point built-ins.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_integer(&self) -> bool {
        *self == TypeName::I32 || *self == TypeName::I64
    }

    pub fn is_float(&self) -> bool {
        *self == TypeName::F32 || *self == TypeName::F64
    }

    /// Returns `true` for every type shipped with the registry.
    pub fn is_builtin(&self) -> bool {
        BUILTIN_TYPES.contains(self)
    }
}

/// Every built-in type, in registration order.
pub const BUILTIN_TYPES: [TypeName; 12] = [
    TypeName::OBJECT,
    TypeName::BOOL,
    TypeName::I32,
    TypeName::I64,
    TypeName::F32,
    TypeName::F64,
    TypeName::STRING,
    TypeName::VOID,
    TypeName::LIST,
    TypeName::TYPE,
    TypeName::DELEGATE,
    TypeName::EVENT,
];

impl Default for TypeName {
    fn default() -> Self {
        TypeName::OBJECT
    }
}

impl From<&'static str> for TypeName {
    fn from(s: &'static str) -> Self {
        TypeName(Cow::Borrowed(s))
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        TypeName(Cow::Owned(s))
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a parameter passes its argument.
///
/// `Ref` and `Out` parameters are written back into the caller-supplied
/// argument slice after the call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParamMode {
    #[default]
    In,
    Ref,
    Out,
}

impl ParamMode {
    /// Returns `true` if the callee's final value flows back to the caller.
    pub fn writes_back(self) -> bool {
        matches!(self, ParamMode::Ref | ParamMode::Out)
    }
}

/// A named, typed parameter of a method, constructor, function or indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub ty: TypeName,
    #[serde(default)]
    pub mode: ParamMode,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, ty: TypeName) -> Self {
        ParameterDef {
            name: name.into(),
            ty,
            mode: ParamMode::In,
        }
    }

    pub fn by_ref(name: impl Into<String>, ty: TypeName) -> Self {
        ParameterDef {
            name: name.into(),
            ty,
            mode: ParamMode::Ref,
        }
    }

    pub fn out(name: impl Into<String>, ty: TypeName) -> Self {
        ParameterDef {
            name: name.into(),
            ty,
            mode: ParamMode::Out,
        }
    }
}
