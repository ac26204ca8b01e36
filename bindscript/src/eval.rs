//! Evaluation primitives shared by both execution modes.
//!
//! The immediate interpreter and the statement queue both call into these
//! helpers, so member access, assignment, closures and patterns behave the
//! same whichever mode runs a script.

use std::rc::Rc;

use crate::ast::{ArrowFunction, Identifier, Literal, Param, Pattern, UpdateOp};
use crate::builtins;
use crate::context::{BindingLocation, EvaluationContext};
use crate::error::{ScriptError, ScriptResult};
use crate::object::{Closure, Function, PropertyKey, ScriptObject};
use crate::scope::ThreadId;
use crate::value::Value;

/// A resolved assignment target.
#[derive(Debug, Clone)]
pub enum Place {
    /// Identifier; `location` is `None` when the name is bound nowhere.
    Binding {
        name: String,
        location: Option<BindingLocation>,
    },
    /// Property of an object or array.
    Property { object: Value, key: PropertyKey },
}

/// Value of a literal node.
pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::BigInt(n) => Value::BigInt(n.clone()),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// Read an identifier. Unresolved names read as undefined.
pub fn read_identifier(ctx: &EvaluationContext, thread: ThreadId, identifier: &Identifier) -> Value {
    match ctx.resolve(thread, &identifier.name, identifier.global) {
        Some(location) => ctx.read_binding(location, &identifier.name),
        None => Value::Undefined,
    }
}

/// Resolve an identifier as an assignment target.
pub fn identifier_place(ctx: &EvaluationContext, thread: ThreadId, identifier: &Identifier) -> Place {
    Place::Binding {
        name: identifier.name.clone(),
        location: ctx.resolve(thread, &identifier.name, identifier.global),
    }
}

/// Resolve `object[key]` as an assignment target.
pub fn property_place(object: Value, key: PropertyKey) -> ScriptResult<Place> {
    if object.is_nullish() {
        return Err(ScriptError::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            object.to_display_string(),
            key.to_name()
        )));
    }
    Ok(Place::Property { object, key })
}

/// Current value of a place.
pub fn read_place(ctx: &EvaluationContext, place: &Place) -> ScriptResult<Value> {
    match place {
        Place::Binding { name, location } => Ok(location
            .map(|location| ctx.read_binding(location, name))
            .unwrap_or_default()),
        Place::Property { object, key } => get_member(object, key, false),
    }
}

/// Store into a place.
pub fn write_place(ctx: &mut EvaluationContext, place: &Place, value: Value) -> ScriptResult<()> {
    match place {
        Place::Binding { name, location } => match location {
            Some(location) => ctx.write_binding(*location, name, value),
            None => Err(ScriptError::reference(format!("{} is not defined", name))),
        },
        Place::Property { object, key } => set_member(object, key, value, ctx.config().max_array_length),
    }
}

/// Reject a write to a `const` binding before the value is computed.
pub fn ensure_writable(ctx: &EvaluationContext, place: &Place) -> ScriptResult<()> {
    match place {
        Place::Binding {
            name,
            location: Some(location),
        } => ctx.ensure_writable(*location, name),
        _ => Ok(()),
    }
}

/// `delete place`.
pub fn delete_place(ctx: &EvaluationContext, place: &Place) -> ScriptResult<Value> {
    match place {
        Place::Binding { name, location } => {
            if location.map(|l| ctx.is_const(l, name)).unwrap_or(false) {
                return Err(ScriptError::type_error(format!(
                    "Cannot delete constant variable '{}'",
                    name
                )));
            }
            Ok(Value::Boolean(false))
        }
        Place::Property { object, key } => match object {
            Value::Object(obj) => {
                obj.borrow_mut().delete(&key.to_name());
                Ok(Value::Boolean(true))
            }
            Value::Array(elements) => {
                let mut elements = elements.borrow_mut();
                if let Some(slot) = key.as_index().and_then(|i| elements.get_mut(i)) {
                    *slot = Value::Undefined;
                }
                Ok(Value::Boolean(true))
            }
            _ => Ok(Value::Boolean(true)),
        },
    }
}

/// `++`/`--` on a place. Returns the expression's value.
pub fn update_place(ctx: &mut EvaluationContext, place: &Place, op: UpdateOp, prefix: bool) -> ScriptResult<Value> {
    let current = read_place(ctx, place)?;
    let (old, new) = match current {
        Value::BigInt(n) => {
            let next = match op {
                UpdateOp::Increment => &n + 1,
                UpdateOp::Decrement => &n - 1,
            };
            (Value::BigInt(n), Value::BigInt(next))
        }
        Value::Tagged(_) => {
            let one = Value::Number(1.0);
            let binary = match op {
                UpdateOp::Increment => crate::ast::BinaryOp::Add,
                UpdateOp::Decrement => crate::ast::BinaryOp::Sub,
            };
            let next = ctx.operators().apply_binary(binary, &current, &one)?;
            (current, next)
        }
        other => {
            let n = other.to_number();
            let next = match op {
                UpdateOp::Increment => n + 1.0,
                UpdateOp::Decrement => n - 1.0,
            };
            (Value::Number(n), Value::Number(next))
        }
    };
    write_place(ctx, place, new.clone())?;
    Ok(if prefix { new } else { old })
}

/// Whether a logical operator returns its left operand without evaluating the right.
pub fn short_circuits(op: crate::ast::BinaryOp, left: &Value) -> bool {
    use crate::ast::BinaryOp;
    match op {
        BinaryOp::And => !left.to_boolean(),
        BinaryOp::Or => left.to_boolean(),
        BinaryOp::Nullish => !left.is_nullish(),
        _ => false,
    }
}

/// Read `object[key]`. Optional access on a nullish object yields undefined.
pub fn get_member(object: &Value, key: &PropertyKey, optional: bool) -> ScriptResult<Value> {
    match object {
        Value::Undefined | Value::Null => {
            if optional {
                Ok(Value::Undefined)
            } else {
                Err(ScriptError::type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    object.to_display_string(),
                    key.to_name()
                )))
            }
        }
        Value::Object(obj) => Ok(obj.borrow().get(&key.to_name())),
        Value::Array(elements) => match key.as_index() {
            Some(i) => Ok(elements.borrow().get(i).cloned().unwrap_or_default()),
            None => {
                let name = key.to_name();
                if name == "length" {
                    return Ok(Value::from(elements.borrow().len()));
                }
                Ok(builtins::array_method(&name)
                    .map(Value::function)
                    .unwrap_or_default())
            }
        },
        Value::String(s) => match key.as_index() {
            Some(i) => Ok(s
                .chars()
                .nth(i)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default()),
            None => {
                let name = key.to_name();
                if name == "length" {
                    return Ok(Value::from(s.chars().count()));
                }
                Ok(builtins::string_method(&name)
                    .map(Value::function)
                    .unwrap_or_default())
            }
        },
        Value::Function(function) => match key.to_name().as_str() {
            "name" => Ok(Value::from(function.name())),
            _ => Ok(Value::Undefined),
        },
        Value::Tagged(tagged) => get_member(&tagged.payload, key, optional),
        Value::Number(_) | Value::BigInt(_) | Value::Boolean(_) => Ok(builtins::primitive_method(&key.to_name())
            .map(Value::function)
            .unwrap_or_default()),
        Value::Pending(_) => Ok(Value::Undefined),
    }
}

/// Store `object[key] = value`. Arrays never grow past `max_length`.
pub fn set_member(object: &Value, key: &PropertyKey, value: Value, max_length: usize) -> ScriptResult<()> {
    match object {
        Value::Object(obj) => {
            obj.borrow_mut().set(key.to_name(), value);
            Ok(())
        }
        Value::Array(elements) => {
            let mut elements = elements.borrow_mut();
            if let Some(i) = key.as_index() {
                if i >= elements.len() {
                    if i >= max_length {
                        return Err(ScriptError::range("Invalid array length"));
                    }
                    elements.resize(i + 1, Value::Undefined);
                }
                elements[i] = value;
                return Ok(());
            }
            if key.to_name() == "length" {
                let length = value.to_number();
                if length < 0.0 || length.fract() != 0.0 || length > max_length as f64 {
                    return Err(ScriptError::range("Invalid array length"));
                }
                elements.resize(length as usize, Value::Undefined);
                return Ok(());
            }
            Err(ScriptError::type_error(format!(
                "Cannot create property '{}' on array",
                key.to_name()
            )))
        }
        Value::Undefined | Value::Null => Err(ScriptError::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            object.to_display_string(),
            key.to_name()
        ))),
        other => Err(ScriptError::type_error(format!(
            "Cannot create property '{}' on {} '{}'",
            key.to_name(),
            other.type_of(),
            other.to_display_string()
        ))),
    }
}

/// Create a closure over the thread's current scope chain.
pub fn make_closure(ctx: &mut EvaluationContext, thread: ThreadId, function: &Rc<ArrowFunction>) -> ScriptResult<Value> {
    let captured = ctx.thread(thread)?.scope_chain();
    ctx.capture(&captured);
    Ok(Value::function(Function::Closure(Closure {
        function: function.clone(),
        captured,
    })))
}

/// How a pattern introduces its names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// New binding in the innermost block.
    Declare { constant: bool },
    /// New binding in the thread's outermost block (`var`).
    DeclareVar,
    /// Assignment to existing bindings.
    Assign,
}

/// Bind every name of a pattern from `value`.
pub fn bind_pattern(
    ctx: &mut EvaluationContext,
    thread: ThreadId,
    pattern: &Pattern,
    value: Value,
    mode: BindMode,
) -> ScriptResult<()> {
    match pattern {
        Pattern::Identifier(binding) => match mode {
            BindMode::Declare { constant } => ctx.declare(thread, &binding.name, value, constant),
            BindMode::DeclareVar => ctx.declare_var(thread, &binding.name, value),
            BindMode::Assign => ctx.assign(thread, &binding.name, value),
        },
        Pattern::Array(array) => {
            let items = iterate_values(&value)?;
            for (i, element) in array.elements.iter().enumerate() {
                if let Some(element) = element {
                    let item = items.get(i).cloned().unwrap_or_default();
                    bind_pattern(ctx, thread, element, item, mode)?;
                }
            }
            if let Some(rest) = &array.rest {
                let remaining = items.get(array.elements.len()..).unwrap_or(&[]).to_vec();
                let rest_pattern = Pattern::Identifier(rest.clone());
                bind_pattern(ctx, thread, &rest_pattern, Value::array(remaining), mode)?;
            }
            Ok(())
        }
        Pattern::Object(object) => {
            if value.is_nullish() {
                return Err(ScriptError::type_error(format!(
                    "Cannot destructure '{}' as it is {}.",
                    value.to_display_string(),
                    value.to_display_string()
                )));
            }
            for property in &object.properties {
                let item = get_member(&value, &PropertyKey::from(property.key.as_str()), false)?;
                bind_pattern(ctx, thread, &property.value, item, mode)?;
            }
            if let Some(rest) = &object.rest {
                let taken: Vec<&str> = object.properties.iter().map(|p| p.key.as_str()).collect();
                let remaining: ScriptObject = own_entries(&value)
                    .into_iter()
                    .filter(|(k, _)| !taken.contains(&k.as_str()))
                    .collect();
                let rest_pattern = Pattern::Identifier(rest.clone());
                bind_pattern(ctx, thread, &rest_pattern, Value::object(remaining), mode)?;
            }
            Ok(())
        }
    }
}

/// Bind call arguments to parameters in a fresh call block.
pub fn bind_params(ctx: &mut EvaluationContext, thread: ThreadId, params: &[Param], args: Vec<Value>) -> ScriptResult<()> {
    for (i, param) in params.iter().enumerate() {
        let value = if param.rest {
            Value::array(args.get(i..).unwrap_or(&[]).to_vec())
        } else {
            args.get(i).cloned().unwrap_or_default()
        };
        bind_pattern(ctx, thread, &param.pattern, value, BindMode::Declare { constant: false })?;
    }
    Ok(())
}

/// Own enumerable entries of a value (`Object.entries`, spreads, rest patterns).
pub fn own_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(obj) => obj
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Value::Array(elements) => elements
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

/// Keys visited by `for...in`.
pub fn for_in_keys(value: &Value) -> Vec<Value> {
    own_entries(value)
        .into_iter()
        .map(|(k, _)| Value::String(k))
        .collect()
}

/// Values visited by `for...of`, array spreads and array patterns.
pub fn iterate_values(value: &Value) -> ScriptResult<Vec<Value>> {
    match value {
        Value::Array(elements) => Ok(elements.borrow().clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(ScriptError::type_error(format!(
            "{} is not iterable",
            other.to_display_string()
        ))),
    }
}

/// Join template quasis with substitution values.
pub fn build_template(quasis: &[String], values: &[Value]) -> Value {
    let mut result = String::new();
    for (i, quasi) in quasis.iter().enumerate() {
        result.push_str(quasi);
        if let Some(value) = values.get(i) {
            result.push_str(&value.to_display_string());
        }
    }
    Value::String(result)
}

/// Copy the properties of a spread source into an object literal.
pub fn spread_into(target: &mut ScriptObject, source: &Value) {
    for (key, value) in own_entries(source) {
        target.set(key, value);
    }
}

/// Flatten call arguments or array elements, expanding spread entries.
pub fn flatten_spreads(values: Vec<Value>, spreads: &[bool]) -> ScriptResult<Vec<Value>> {
    if !spreads.iter().any(|s| *s) {
        return Ok(values);
    }
    let mut result = Vec::with_capacity(values.len());
    for (value, spread) in values.into_iter().zip(spreads.iter()) {
        if *spread {
            result.extend(iterate_values(&value)?);
        } else {
            result.push(value);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn pattern_of(source: &str) -> Pattern {
        let expr = parse_expression(&format!("{} = v", source)).unwrap();
        match &expr.kind {
            crate::ast::ExprKind::Destructure(d) => (*d.pattern).clone(),
            crate::ast::ExprKind::Assignment(a) => {
                let id = a.target.as_identifier().unwrap();
                Pattern::Identifier(crate::ast::BindingName {
                    name: id.name.clone(),
                    span: a.target.span,
                })
            }
            _ => panic!("expected pattern"),
        }
    }

    #[test]
    fn test_member_access_errors() {
        let err = get_member(&Value::Undefined, &PropertyKey::from("x"), false).unwrap_err();
        assert_eq!(err.message(), "Cannot read properties of undefined (reading 'x')");
        assert!(get_member(&Value::Null, &PropertyKey::from("x"), true).unwrap().is_undefined());
    }

    #[test]
    fn test_array_and_string_members() {
        let array = Value::array(vec![Value::from(1), Value::from(2)]);
        assert_eq!(get_member(&array, &PropertyKey::from("length"), false).unwrap().to_number(), 2.0);
        assert_eq!(get_member(&array, &PropertyKey::Index(1), false).unwrap().to_number(), 2.0);
        assert!(get_member(&array, &PropertyKey::from("push"), false).unwrap().is_function());

        set_member(&array, &PropertyKey::Index(3), Value::from(4), 16).unwrap();
        assert_eq!(array.to_display_string(), "1,2,,4");

        let err = set_member(&array, &PropertyKey::Index(16), Value::from(0), 16).unwrap_err();
        assert_eq!(err.name(), "RangeError");
        let err = set_member(&array, &PropertyKey::from("length"), Value::from(17), 16).unwrap_err();
        assert_eq!(err.message(), "Invalid array length");
        assert_eq!(get_member(&array, &PropertyKey::from("length"), false).unwrap().to_number(), 4.0);

        let s = Value::from("héllo");
        assert_eq!(get_member(&s, &PropertyKey::from("length"), false).unwrap().to_number(), 5.0);
        assert_eq!(get_member(&s, &PropertyKey::Index(1), false).unwrap().to_display_string(), "é");
    }

    #[test]
    fn test_destructuring_declaration() {
        let mut ctx = EvaluationContext::default();
        let thread = ctx.create_thread();
        let mut inner = ScriptObject::new();
        inner.set("d", Value::from(4));
        let mut obj = ScriptObject::new();
        obj.set("a", Value::array(vec![Value::from(1), Value::from(2), Value::from(3)]));
        obj.set("c", Value::object(inner));
        obj.set("e", Value::from(5));

        let pattern = pattern_of("({ a: [x, , ...ys], c: { d }, ...others })");
        bind_pattern(&mut ctx, thread, &pattern, Value::object(obj), BindMode::Declare { constant: true }).unwrap();

        assert_eq!(ctx.lookup(thread, "x").to_number(), 1.0);
        assert_eq!(ctx.lookup(thread, "ys").to_display_string(), "3");
        assert_eq!(ctx.lookup(thread, "d").to_number(), 4.0);
        let Value::Object(others) = ctx.lookup(thread, "others") else {
            panic!("expected object");
        };
        assert_eq!(others.borrow().keys(), vec!["e"]);
        assert!(ctx.assign(thread, "x", Value::Null).is_err());
    }

    #[test]
    fn test_destructuring_nullish_fails() {
        let mut ctx = EvaluationContext::default();
        let thread = ctx.create_thread();
        let pattern = pattern_of("({ a })");
        let err = bind_pattern(&mut ctx, thread, &pattern, Value::Null, BindMode::Declare { constant: false }).unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));
    }

    #[test]
    fn test_update_place_returns_old_value_for_postfix() {
        let mut ctx = EvaluationContext::default();
        let thread = ctx.create_thread();
        ctx.declare(thread, "i", Value::from("5"), false).unwrap();
        let place = Place::Binding {
            name: "i".into(),
            location: ctx.resolve(thread, "i", false),
        };
        let old = update_place(&mut ctx, &place, UpdateOp::Increment, false).unwrap();
        assert_eq!(old.to_number(), 5.0);
        assert_eq!(ctx.lookup(thread, "i").to_number(), 6.0);
    }

    #[test]
    fn test_unresolved_place_write_is_reference_error() {
        let mut ctx = EvaluationContext::default();
        let place = Place::Binding {
            name: "ghost".into(),
            location: None,
        };
        assert!(read_place(&ctx, &place).unwrap().is_undefined());
        assert!(matches!(
            write_place(&mut ctx, &place, Value::Null),
            Err(ScriptError::Reference(_))
        ));
    }
}
