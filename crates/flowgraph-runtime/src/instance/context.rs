//! Member access against instance storage.
//!
//! Graph-native member targets resolve against the active layer's snapshot.
//! A target whose element is missing, or has another kind, is a resolution
//! fault under [`ResolutionPolicy::Strict`]; under
//! [`ResolutionPolicy::BestEffort`] reads yield `null` and writes are dropped.

use flowgraph_core::convert::{auto_convert, value_conforms};
use flowgraph_core::{
    DelegateRef, ElementId, ElementKind, ElementTag, Graph, MemberContext, MemberError, PortRef, RuntimeId,
    TypeName, TypeRegistry, Value,
};

use super::{has_tag, initial_value, GraphInstance};
use crate::config::ResolutionPolicy;

impl GraphInstance {
    fn unresolved<T: Default>(&self, id: ElementId, what: &str) -> Result<T, MemberError> {
        match self.config.resolution {
            ResolutionPolicy::Strict => Err(MemberError::MissingElement {
                id,
                name: what.to_string(),
            }),
            ResolutionPolicy::BestEffort => {
                tracing::debug!(element = %id, what, "unresolved target ignored");
                Ok(T::default())
            }
        }
    }

    /// Converts `value` to `ty`, failing if the result still does not fit.
    fn coerce(&self, name: &str, value: Value, ty: &TypeName) -> Result<Value, MemberError> {
        let converted = auto_convert(value, ty, &self.registry);
        if value_conforms(&converted, ty, &self.registry) {
            Ok(converted)
        } else {
            Err(MemberError::TypeMismatch {
                name: name.to_string(),
                expected: ty.clone(),
                actual: converted.type_name(),
            })
        }
    }

    /// Innermost active call of `function` in the active layer.
    fn innermost_call(&self, function: ElementId) -> Option<usize> {
        self.calls
            .iter()
            .rposition(|call| call.function == function && call.layer == self.active)
    }

    fn not_executing(graph: &Graph, function: ElementId) -> MemberError {
        let name = graph.get(function).map_or("?", |el| el.name.as_str());
        MemberError::Context {
            message: format!("function '{name}' ({function}) is not executing"),
        }
    }
}

impl MemberContext for GraphInstance {
    fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn graph(&self) -> &Graph {
        &self.layers[self.active].snapshot
    }

    fn self_value(&self) -> Value {
        self.target.clone()
    }

    fn variable(&mut self, id: ElementId) -> Result<Value, MemberError> {
        let graph = self.active_snapshot();
        let Some(ElementKind::Variable(def)) = graph.get(id).map(|el| &el.kind) else {
            return self.unresolved(id, "variable");
        };
        let key = RuntimeId::new(graph.uid(), id);
        Ok(self
            .slots
            .entry(key)
            .or_insert_with(|| initial_value(&def.ty, &def.default))
            .clone())
    }

    fn set_variable(&mut self, id: ElementId, value: Value) -> Result<(), MemberError> {
        let graph = self.active_snapshot();
        let Some(element) = graph.get(id) else {
            return self.unresolved(id, "variable");
        };
        let ElementKind::Variable(def) = &element.kind else {
            return self.unresolved(id, "variable");
        };
        let value = self.coerce(&element.name, value, &def.ty)?;
        self.slots.insert(RuntimeId::new(graph.uid(), id), value);
        Ok(())
    }

    fn local_variable(&mut self, id: ElementId) -> Result<Value, MemberError> {
        let graph = self.active_snapshot();
        let Some(ElementKind::LocalVariable(def)) = graph.get(id).map(|el| &el.kind) else {
            return self.unresolved(id, "local variable");
        };
        let initial = || initial_value(&def.ty, &def.default);
        match graph.owning_function(id) {
            Some(function) => {
                let call = self
                    .innermost_call(function)
                    .ok_or_else(|| Self::not_executing(&graph, function))?;
                Ok(self.calls[call].locals.entry(id).or_insert_with(initial).clone())
            }
            None => Ok(self
                .slots
                .entry(RuntimeId::new(graph.uid(), id))
                .or_insert_with(initial)
                .clone()),
        }
    }

    fn set_local_variable(&mut self, id: ElementId, value: Value) -> Result<(), MemberError> {
        let graph = self.active_snapshot();
        let Some(element) = graph.get(id) else {
            return self.unresolved(id, "local variable");
        };
        let ElementKind::LocalVariable(def) = &element.kind else {
            return self.unresolved(id, "local variable");
        };
        let value = self.coerce(&element.name, value, &def.ty)?;
        match graph.owning_function(id) {
            Some(function) => {
                let call = self
                    .innermost_call(function)
                    .ok_or_else(|| Self::not_executing(&graph, function))?;
                self.calls[call].locals.insert(id, value);
            }
            None => {
                self.slots.insert(RuntimeId::new(graph.uid(), id), value);
            }
        }
        Ok(())
    }

    fn property(&mut self, id: ElementId) -> Result<Value, MemberError> {
        let graph = self.active_snapshot();
        let Some(element) = graph.get(id) else {
            return self.unresolved(id, "property");
        };
        let ElementKind::Property(decl) = &element.kind else {
            return self.unresolved(id, "property");
        };
        if let Some(getter) = decl.getter {
            let value = self.call_graph_function(getter, &[], &mut [])?;
            return Ok(auto_convert(value, &decl.ty, &self.registry));
        }
        if !decl.is_auto() {
            return Err(MemberError::NotReadable {
                name: element.name.clone(),
            });
        }
        Ok(self
            .slots
            .entry(RuntimeId::new(graph.uid(), id))
            .or_insert_with(|| initial_value(&decl.ty, &decl.default))
            .clone())
    }

    fn set_property(&mut self, id: ElementId, value: Value) -> Result<(), MemberError> {
        let graph = self.active_snapshot();
        let Some(element) = graph.get(id) else {
            return self.unresolved(id, "property");
        };
        let ElementKind::Property(decl) = &element.kind else {
            return self.unresolved(id, "property");
        };
        let value = self.coerce(&element.name, value, &decl.ty)?;
        if let Some(setter) = decl.setter {
            self.call_graph_function(setter, &[], &mut [value])?;
            return Ok(());
        }
        if !decl.is_auto() {
            return Err(MemberError::NotWritable {
                name: element.name.clone(),
            });
        }
        self.slots.insert(RuntimeId::new(graph.uid(), id), value);
        Ok(())
    }

    fn invoke_function(
        &mut self,
        id: ElementId,
        generic_args: &[TypeName],
        args: &mut [Value],
    ) -> Result<Value, MemberError> {
        if !has_tag(&self.active_snapshot(), id, ElementTag::Function) {
            return self.unresolved(id, "function");
        }
        Ok(self.call_graph_function(id, generic_args, args)?)
    }

    fn parameter(&mut self, function: ElementId, index: usize) -> Result<Value, MemberError> {
        let graph = self.active_snapshot();
        if !has_tag(&graph, function, ElementTag::Function) {
            return self.unresolved(function, "function");
        }
        let call = self
            .innermost_call(function)
            .ok_or_else(|| Self::not_executing(&graph, function))?;
        self.calls[call]
            .args
            .get(index)
            .cloned()
            .ok_or_else(|| MemberError::Context {
                message: format!("function {function} has no parameter {index}"),
            })
    }

    fn set_parameter(&mut self, function: ElementId, index: usize, value: Value) -> Result<(), MemberError> {
        let graph = self.active_snapshot();
        let Some(param) = graph.function(function).and_then(|decl| decl.params.get(index)) else {
            return self.unresolved(function, "parameter");
        };
        let value = self.coerce(&param.name, value, &param.ty)?;
        let call = self
            .innermost_call(function)
            .ok_or_else(|| Self::not_executing(&graph, function))?;
        if let Some(slot) = self.calls[call].args.get_mut(index) {
            *slot = value;
        }
        Ok(())
    }

    fn generic_argument(&mut self, function: ElementId, index: usize) -> Result<TypeName, MemberError> {
        let graph = self.active_snapshot();
        let Some(decl) = graph.function(function) else {
            return Err(MemberError::MissingElement {
                id: function,
                name: "function".to_string(),
            });
        };
        let bound = self
            .innermost_call(function)
            .and_then(|call| self.calls[call].generic_args.get(index).cloned());
        bound
            .or_else(|| decl.generic_params.get(index).map(|g| g.constraint.clone()))
            .ok_or_else(|| MemberError::Context {
                message: format!("function {function} has no generic parameter {index}"),
            })
    }

    fn port_value(&mut self, port: &PortRef) -> Result<Value, MemberError> {
        let graph = self.active_snapshot();
        Ok(self.port_in(&graph, port)?)
    }

    fn invoke_delegate(&mut self, delegate: &DelegateRef, args: &mut [Value]) -> Result<Value, MemberError> {
        let layer = self.layer_of(delegate.container()).ok_or_else(|| MemberError::Context {
            message: format!("delegate targets graph {} which this instance does not run", delegate.container()),
        })?;
        let previous = std::mem::replace(&mut self.active, layer);
        let result = self.call_graph_function(delegate.function(), &[], args);
        self.active = previous;
        Ok(result?)
    }
}
