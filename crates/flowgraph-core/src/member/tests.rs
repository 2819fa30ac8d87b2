use std::collections::HashMap;
use std::rc::Rc;

use super::*;
use crate::element::{ContainerKind, FunctionDecl, PropertyDecl};
use crate::reflect::{MethodDef, NativeError, PropertyDef, TypeDescriptor, TypeRegistry};
use crate::types::ParameterDef;
use crate::value::{DelegateRef, ObjectRef, StructValue};

/// Minimal storage-backed context: variables and properties live in maps,
/// functions return the sum of their integer arguments.
struct TestContext {
    registry: TypeRegistry,
    graph: Graph,
    slots: HashMap<ElementId, Value>,
    raised: Vec<(ElementId, Vec<Value>)>,
}

impl TestContext {
    fn new(graph: Graph, registry: TypeRegistry) -> Self {
        TestContext {
            registry,
            graph,
            slots: HashMap::new(),
            raised: Vec::new(),
        }
    }
}

impl MemberContext for TestContext {
    fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn graph(&self) -> &Graph {
        &self.graph
    }

    fn self_value(&self) -> Value {
        Value::String("self".into())
    }

    fn variable(&mut self, id: ElementId) -> Result<Value, MemberError> {
        Ok(self.slots.get(&id).cloned().unwrap_or_default())
    }

    fn set_variable(&mut self, id: ElementId, value: Value) -> Result<(), MemberError> {
        self.slots.insert(id, value);
        Ok(())
    }

    fn local_variable(&mut self, id: ElementId) -> Result<Value, MemberError> {
        self.variable(id)
    }

    fn set_local_variable(&mut self, id: ElementId, value: Value) -> Result<(), MemberError> {
        self.set_variable(id, value)
    }

    fn property(&mut self, id: ElementId) -> Result<Value, MemberError> {
        self.variable(id)
    }

    fn set_property(&mut self, id: ElementId, value: Value) -> Result<(), MemberError> {
        self.set_variable(id, value)
    }

    fn invoke_function(
        &mut self,
        _id: ElementId,
        _generic_args: &[TypeName],
        args: &mut [Value],
    ) -> Result<Value, MemberError> {
        Ok(Value::I64(args.iter().filter_map(Value::as_i64).sum()))
    }

    fn parameter(&mut self, _function: ElementId, _index: usize) -> Result<Value, MemberError> {
        Ok(Value::Null)
    }

    fn set_parameter(&mut self, _function: ElementId, _index: usize, _value: Value) -> Result<(), MemberError> {
        Ok(())
    }

    fn generic_argument(&mut self, _function: ElementId, _index: usize) -> Result<TypeName, MemberError> {
        Ok(TypeName::I32)
    }

    fn port_value(&mut self, _port: &PortRef) -> Result<Value, MemberError> {
        Ok(Value::Null)
    }

    fn invoke_delegate(&mut self, delegate: &DelegateRef, args: &mut [Value]) -> Result<Value, MemberError> {
        self.raised.push((delegate.function(), args.to_vec()));
        Ok(Value::Null)
    }
}

fn host_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register(
        TypeDescriptor::structure("Vec2")
            .with_field("x", TypeName::F32)
            .with_field("y", TypeName::F32),
    );
    registry.register(
        TypeDescriptor::class("Actor")
            .with_field("position", TypeName::new("Vec2"))
            .with_event("Hit")
            .with_method(MethodDef::new(
                "Describe",
                Vec::new(),
                TypeName::STRING,
                |recv, _args| Ok(Value::String(format!("actor:{}", recv.type_name()))),
            ))
            .with_property(
                PropertyDef::new("Gravity", TypeName::F64)
                    .getter(|_| Ok(Value::F64(9.8)))
                    .static_(),
            ),
    );
    registry
}

fn vec2(x: f32, y: f32) -> Value {
    Value::Struct(
        StructValue::new(TypeName::new("Vec2"))
            .with_field("x", Value::F32(x))
            .with_field("y", Value::F32(y)),
    )
}

#[test]
fn literal_get_returns_an_independent_copy() {
    let mut ctx = TestContext::new(Graph::new("g"), TypeRegistry::new());
    let list = Value::List(vec![Value::I32(1)]);
    let member = MemberData::create_from_value(list.clone());
    let got = member.get(&mut ctx).unwrap();
    assert_eq!(got, list);

    let object = ObjectRef::new(TypeName::new("Actor"));
    let member = MemberData::create_from_value(Value::Object(object.clone()));
    let Value::Object(copy) = member.get(&mut ctx).unwrap() else {
        panic!("expected an object");
    };
    assert!(!copy.ptr_eq(&object));
}

#[test]
fn unassigned_member_cannot_be_read() {
    let mut ctx = TestContext::new(Graph::new("g"), TypeRegistry::new());
    let member = MemberData::none();
    assert!(!member.is_targeted());
    assert_eq!(member.get(&mut ctx), Err(MemberError::Unassigned));
    assert_eq!(member.validate(), Err(MemberError::Unassigned));
}

#[test]
fn targeted_but_unassigned_is_inconsistent() {
    let member = MemberData::reflected(Vec::new());
    assert!(member.is_targeted());
    assert!(!member.is_assigned());
    assert!(matches!(member.validate(), Err(MemberError::Inconsistent { .. })));
}

#[test]
fn literals_and_self_are_not_writable() {
    let mut ctx = TestContext::new(Graph::new("g"), TypeRegistry::new());
    for member in [
        MemberData::create_from_value(Value::I32(1)),
        MemberData::self_target(),
        MemberData::create_from_type(TypeName::I32),
        MemberData::generic_parameter(ElementId(1), 0),
    ] {
        assert!(matches!(
            member.set(&mut ctx, Value::I32(2)),
            Err(MemberError::NotWritable { .. })
        ));
    }
}

#[test]
fn variable_round_trip_through_context() {
    let mut graph = Graph::new("g");
    let speed = graph.add_variable("speed", TypeName::I32, Value::I32(0)).unwrap();
    let mut ctx = TestContext::new(graph, TypeRegistry::new());
    let member = MemberData::variable(speed);
    member.set(&mut ctx, Value::I32(7)).unwrap();
    assert_eq!(member.get(&mut ctx).unwrap(), Value::I32(7));
    assert_eq!(member.display_name(&ctx.graph), "speed");
    assert_eq!(member.declared_type(&ctx.graph), Some(TypeName::I32));
}

#[test]
fn deep_set_writes_struct_back_to_variable() {
    let mut graph = Graph::new("g");
    let pos = graph
        .add_variable("pos", TypeName::new("Vec2"), vec2(0.0, 0.0))
        .unwrap();
    let mut ctx = TestContext::new(graph, host_registry());
    ctx.slots.insert(pos, vec2(1.0, 2.0));

    let member = MemberData::variable(pos).with_deep(vec![MemberItem::field("Vec2", "x", TypeName::F32)]);
    assert!(member.is_deep());
    member.set(&mut ctx, Value::F32(5.0)).unwrap();
    assert_eq!(ctx.slots[&pos], vec2(5.0, 2.0));
    assert_eq!(member.get(&mut ctx).unwrap(), Value::F32(5.0));
    assert_eq!(member.display_name(&ctx.graph), "pos.x");
}

#[test]
fn deep_set_through_object_field_chain() {
    let mut graph = Graph::new("g");
    let actor = graph.add_variable("actor", TypeName::new("Actor"), Value::Null).unwrap();
    let mut ctx = TestContext::new(graph, host_registry());
    let object = ObjectRef::new(TypeName::new("Actor"));
    object.set_field("position", vec2(0.0, 0.0));
    ctx.slots.insert(actor, Value::Object(object.clone()));

    let member = MemberData::variable(actor).with_deep(vec![
        MemberItem::field("Actor", "position", TypeName::new("Vec2")),
        MemberItem::field("Vec2", "y", TypeName::F32),
    ]);
    member.set(&mut ctx, Value::F64(3.0)).unwrap();
    assert_eq!(object.field("position").unwrap(), vec2(0.0, 3.0));
}

#[test]
fn unresolved_deep_member_fails_set() {
    let mut graph = Graph::new("g");
    let pos = graph.add_variable("pos", TypeName::new("Vec2"), vec2(0.0, 0.0)).unwrap();
    let mut ctx = TestContext::new(graph, host_registry());
    let member = MemberData::variable(pos).with_deep(vec![MemberItem::field("Vec2", "z", TypeName::F32)]);
    assert!(matches!(
        member.set(&mut ctx, Value::F32(1.0)),
        Err(MemberError::Unresolved { .. })
    ));
    assert!(!member.can_set_value(&ctx.graph, &ctx.registry));
}

#[test]
fn reflected_method_needs_instance() {
    let mut ctx = TestContext::new(Graph::new("g"), host_registry());
    let member = MemberData::reflected(vec![MemberItem::method("Actor", "Describe", Vec::new(), TypeName::STRING)]);
    assert_eq!(member.instance_port_type(), Some(TypeName::new("Actor")));
    assert!(matches!(member.get(&mut ctx), Err(MemberError::MissingInstance { .. })));

    let actor = Value::Object(ObjectRef::new(TypeName::new("Actor")));
    let got = member.get_value(&mut ctx, Some(actor), &mut []).unwrap();
    assert_eq!(got, Value::String("actor:Actor".into()));
}

#[test]
fn static_property_reads_without_receiver() {
    let mut ctx = TestContext::new(Graph::new("g"), host_registry());
    let member = MemberData::reflected(vec![MemberItem::property("Actor", "Gravity", TypeName::F64).static_()]);
    assert!(member.is_static());
    assert_eq!(member.get(&mut ctx).unwrap(), Value::F64(9.8));
    assert!(!member.can_set_value(&ctx.graph, &ctx.registry));
    assert_eq!(member.to_string(), "Actor.Gravity");
}

#[test]
fn cache_holds_until_reset() {
    let graph = Graph::new("g");
    let mut registry = host_registry();
    let member = MemberData::reflected(vec![MemberItem::method("Actor", "Describe", Vec::new(), TypeName::STRING)]);
    let first = member.get_members(&graph, &registry, true).unwrap().unwrap();

    registry.register(TypeDescriptor::class("Actor").with_method(MethodDef::new(
        "Describe",
        Vec::new(),
        TypeName::STRING,
        |_, _| Ok(Value::String("replaced".into())),
    )));

    let cached = member.get_members(&graph, &registry, true).unwrap().unwrap();
    assert!(Rc::ptr_eq(&first, &cached));

    let mut member = member;
    member.reset_cache();
    let fresh = member.get_members(&graph, &registry, true).unwrap().unwrap();
    assert!(!Rc::ptr_eq(&first, &fresh));

    let mut ctx = TestContext::new(Graph::new("g"), registry);
    let actor = Value::Object(ObjectRef::new(TypeName::new("Actor")));
    assert_eq!(
        member.get_value(&mut ctx, Some(actor), &mut []).unwrap(),
        Value::String("replaced".into())
    );
}

#[test]
fn get_members_without_throw_swallows_failures() {
    let graph = Graph::new("g");
    let registry = TypeRegistry::new();
    let member = MemberData::reflected(vec![MemberItem::field("Missing", "x", TypeName::I32)]);
    assert!(member.get_members(&graph, &registry, false).unwrap().is_none());
    assert!(member.get_members(&graph, &registry, true).is_err());
}

#[test]
fn event_invoke_raises_subscribers() {
    let mut ctx = TestContext::new(Graph::new("g"), host_registry());
    let actor = ObjectRef::new(TypeName::new("Actor"));
    let event = MemberData::reflected(vec![MemberItem::event("Actor", "Hit")])
        .with_instance(MemberData::create_from_value(Value::Null));
    let bound = MemberData::reflected(vec![MemberItem::event("Actor", "Hit")]);

    let handler = DelegateRef::new(ctx.graph.uid(), ElementId(42));
    let on_actor = bound.get_value(&mut ctx, Some(Value::Object(actor.clone())), &mut []).unwrap();
    let Value::Event(event_ref) = on_actor else {
        panic!("expected an event handle");
    };
    event_ref.subscribe(handler.clone());
    event_ref.subscribe(handler.clone());
    assert_eq!(event_ref.subscribers().len(), 1);

    bound
        .invoke(&mut ctx, Some(Value::Object(actor)), &mut [Value::I32(3)])
        .unwrap();
    assert_eq!(ctx.raised, vec![(ElementId(42), vec![Value::I32(3)])]);

    // A null receiver expression cannot produce an event.
    assert!(event.invoke(&mut ctx, None, &mut []).is_err());
}

#[test]
fn function_ports_follow_generic_arguments() {
    let mut graph = Graph::new("g");
    let f = graph
        .add_function(
            "identity",
            FunctionDecl::new(vec![ParameterDef::new("v", TypeName::new("T"))], TypeName::new("T"))
                .with_generic("T", TypeName::OBJECT),
        )
        .unwrap();
    let bound = MemberData::generic_function(f, vec![TypeName::I32]);
    assert_eq!(bound.declared_type(&graph), Some(TypeName::I32));
    assert_eq!(bound.parameter_types(&graph), &[TypeName::I32]);
    let unbound = MemberData::function(f);
    assert_eq!(unbound.declared_type(&graph), Some(TypeName::OBJECT));
    assert_eq!(bound.to_string(), format!("#{f}<i32>()"));
    assert_eq!(bound.display_name(&graph), "identity<i32>()");
}

#[test]
fn graph_property_accessors_drive_can_set() {
    let mut graph = Graph::new("g");
    let auto = graph
        .add_property("hp", PropertyDecl::auto(TypeName::I32, Value::I32(10)))
        .unwrap();
    let read_only = graph
        .add_property(
            "max",
            PropertyDecl {
                getter: Some(ElementId(999)),
                ..PropertyDecl::auto(TypeName::I32, Value::I32(0))
            },
        )
        .unwrap();
    let registry = TypeRegistry::new();
    assert!(MemberData::property(auto).can_set_value(&graph, &registry));
    assert!(!MemberData::property(read_only).can_set_value(&graph, &registry));
    assert!(MemberData::property(read_only).can_get_value(&graph, &registry));
}

#[test]
fn check_target_rejects_wrong_element_kind() {
    let mut graph = Graph::new("g");
    let main = graph.container(ContainerKind::Main);
    let group = graph.add_group(main, "grp").unwrap();
    assert!(matches!(
        MemberData::variable(group).check_target(&graph),
        Err(MemberError::MissingElement { .. })
    ));
}

#[test]
fn serde_skips_cache_and_keeps_target() {
    let graph = Graph::new("g");
    let registry = host_registry();
    let member = MemberData::reflected(vec![MemberItem::field("Vec2", "x", TypeName::F32)])
        .with_instance(MemberData::create_from_value(vec2(1.0, 2.0)));
    member.get_members(&graph, &registry, true).unwrap();
    let json = serde_json::to_string(&member).unwrap();
    let restored: MemberData = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, member);
    assert!(restored.cache.members.get().is_none());
}

#[test]
fn instance_expression_converts_to_declaring_type() {
    let mut registry = host_registry();
    registry.register(TypeDescriptor::primitive(TypeName::I64).with_method(MethodDef::new(
        "Doubled",
        Vec::new(),
        TypeName::I64,
        |recv, _| match recv {
            Value::I64(v) => Ok(Value::I64(*v * 2)),
            other => Err(NativeError::new(format!("expected i64, got {}", other.type_name()))),
        },
    )));
    let mut ctx = TestContext::new(Graph::new("g"), registry);

    let doubled = MemberData::reflected(vec![MemberItem::method("i64", "Doubled", Vec::new(), TypeName::I64)])
        .with_instance(MemberData::create_from_value(Value::I32(21)));
    assert_eq!(doubled.get(&mut ctx).unwrap(), Value::I64(42));

    let length = MemberData::reflected(vec![MemberItem::property("string", "length", TypeName::I32)]);
    assert_eq!(
        length.get_value(&mut ctx, Some(Value::I32(12345)), &mut []).unwrap(),
        Value::I32(5)
    );

    // Subtypes already conform and reach the member unchanged.
    let describe = MemberData::reflected(vec![MemberItem::method("Actor", "Describe", Vec::new(), TypeName::STRING)]);
    ctx.registry.register(TypeDescriptor::class("Player").extends("Actor"));
    let player = Value::Object(ObjectRef::new(TypeName::new("Player")));
    assert_eq!(
        describe.get_value(&mut ctx, Some(player), &mut []).unwrap(),
        Value::String("actor:Player".into())
    );
}

#[test]
fn get_members_checks_graph_targets() {
    let mut graph = Graph::new("g");
    let pos = graph.add_variable("pos", TypeName::new("Vec2"), vec2(0.0, 0.0)).unwrap();
    let registry = host_registry();
    let member = MemberData::variable(pos).with_deep(vec![MemberItem::field("Vec2", "x", TypeName::F32)]);
    assert_eq!(member.get_members(&graph, &registry, true).unwrap().map(|m| m.len()), Some(1));

    graph.destroy(pos).unwrap();
    assert!(matches!(
        member.get_members(&graph, &registry, true),
        Err(MemberError::MissingElement { id, .. }) if id == pos
    ));
    assert!(member.get_members(&graph, &registry, false).unwrap().is_none());
    assert!(!member.is_resolvable(&graph, &registry));
}

#[test]
fn deep_chain_must_start_on_the_root_type() {
    let mut graph = Graph::new("g");
    let hp = graph.add_variable("hp", TypeName::I32, Value::I32(3)).unwrap();
    let anything = graph.add_variable("anything", TypeName::OBJECT, Value::Null).unwrap();
    let registry = host_registry();

    let wrong = MemberData::variable(hp).with_deep(vec![MemberItem::field("Vec2", "x", TypeName::F32)]);
    assert!(matches!(
        wrong.get_members(&graph, &registry, true),
        Err(MemberError::TypeMismatch { ref expected, .. }) if *expected == TypeName::new("Vec2")
    ));
    assert!(!wrong.can_get_value(&graph, &registry));
    assert!(!wrong.can_set_value(&graph, &registry));

    let untyped = MemberData::variable(anything).with_deep(vec![MemberItem::field("Vec2", "x", TypeName::F32)]);
    assert!(untyped.get_members(&graph, &registry, true).unwrap().is_some());
}
