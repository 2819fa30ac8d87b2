pub mod connection;
pub mod convert;
pub mod element;
pub mod error;
pub mod graph;
pub mod id;
pub mod member;
pub mod node;
pub mod port;
pub mod reflect;
pub mod types;
pub mod validate;
pub mod value;

// Re-export commonly used types
pub use connection::ConnectOutcome;
pub use element::{
    ContainerKind, DetachedElement, ElementKind, ElementTag, FunctionDecl, GraphElement, IndexerDecl,
    PropertyDecl, VariableDef,
};
pub use error::CoreError;
pub use graph::Graph;
pub use id::{ConnectionId, ElementId, GraphUid, PortId, PortRef, RuntimeId};
pub use member::{MemberContext, MemberData, MemberError, MemberItem, MemberTarget, ReflectedKind, TargetKind};
pub use node::{JumpKind, NodeData, NodeKind, OperatorKind, WaitSpec};
pub use port::{Connection, Port, PortKind, PortType};
pub use reflect::{TypeDescriptor, TypeRegistry};
pub use types::{ParamMode, ParameterDef, TypeName};
pub use validate::{validate_graph, GraphDiagnostic};
pub use value::{DelegateRef, EventRef, ObjectRef, StructValue, Value};
