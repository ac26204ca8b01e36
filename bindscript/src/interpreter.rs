//! Immediate expression evaluator.
//!
//! Walks an expression tree recursively on the host stack. Used for
//! binding expressions, for the statement queue in synchronous mode and
//! for callbacks invoked from host functions. Block-bodied closures run
//! their body through a synchronous `StatementProcessor`.

use crate::ast::{
    ArrowBody, AssignmentExpr, AssignmentOp, BinaryExpr, Expr, ExprKind, ExprRef, InvocationExpr,
    ObjectProperty, PropertyName, UnaryExpr, UnaryOp,
};
use crate::context::EvaluationContext;
use crate::error::{ScriptError, ScriptResult};
use crate::eval::{
    bind_params, bind_pattern, build_template, delete_place, ensure_writable, get_member,
    identifier_place, iterate_values, literal_value, make_closure, property_place,
    read_identifier, read_place, short_circuits, spread_into, update_place, write_place, BindMode, Place,
};
use crate::object::{Closure, Function, PropertyKey, ScriptObject};
use crate::processor::{ProcessorMode, StatementProcessor};
use crate::scope::ThreadId;
use crate::value::Value;

/// Handle passed to host functions.
pub struct NativeCall<'a> {
    pub ctx: &'a mut EvaluationContext,
    /// Thread the call was made from.
    pub thread: ThreadId,
    /// Receiver (`this`) of a method call, undefined for plain calls.
    pub this: Value,
}

impl NativeCall<'_> {
    /// Call a script or host function synchronously.
    pub fn call(&mut self, function: &Value, args: Vec<Value>) -> ScriptResult<Value> {
        Interpreter::new(self.ctx, self.thread).call_function(function, Value::Undefined, args)
    }
}

/// Recursive evaluator bound to one thread.
pub struct Interpreter<'a> {
    ctx: &'a mut EvaluationContext,
    thread: ThreadId,
}

impl<'a> Interpreter<'a> {
    /// Create an evaluator for `thread`.
    pub fn new(ctx: &'a mut EvaluationContext, thread: ThreadId) -> Self {
        Interpreter { ctx, thread }
    }

    /// Evaluate an expression.
    pub fn evaluate(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Identifier(identifier) => Ok(read_identifier(self.ctx, self.thread, identifier)),
            ExprKind::Template(template) => {
                let values = template
                    .expressions
                    .iter()
                    .map(|e| self.evaluate(e))
                    .collect::<ScriptResult<Vec<_>>>()?;
                Ok(build_template(&template.quasis, &values))
            }
            ExprKind::Unary(unary) => self.evaluate_unary(unary),
            ExprKind::Binary(binary) => self.evaluate_binary(binary),
            ExprKind::Assignment(assignment) => self.evaluate_assignment(assignment),
            ExprKind::Update(update) => {
                let message = if update.prefix {
                    "Invalid left-hand side expression in prefix operation"
                } else {
                    "Invalid left-hand side expression in postfix operation"
                };
                let place = self.evaluate_place(&update.argument, message)?;
                update_place(self.ctx, &place, update.operator, update.prefix)
            }
            ExprKind::Sequence(expressions) => {
                let mut last = Value::Undefined;
                for e in expressions {
                    last = self.evaluate(e)?;
                }
                Ok(last)
            }
            ExprKind::Conditional(conditional) => {
                if self.evaluate(&conditional.test)?.to_boolean() {
                    self.evaluate(&conditional.consequent)
                } else {
                    self.evaluate(&conditional.alternate)
                }
            }
            ExprKind::Invocation(call) => self.evaluate_call(call),
            ExprKind::Member(member) => {
                let object = self.evaluate(&member.object)?;
                get_member(&object, &PropertyKey::from(member.property.as_str()), member.optional)
            }
            ExprKind::CalculatedMember(member) => {
                let object = self.evaluate(&member.object)?;
                if member.optional && object.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let key = self.evaluate(&member.property)?.to_property_key();
                get_member(&object, &key, member.optional)
            }
            ExprKind::Array(elements) => Ok(Value::array(self.evaluate_list(elements)?)),
            ExprKind::Object(properties) => self.evaluate_object(properties),
            ExprKind::Spread(_) => Err(ScriptError::syntax("Unexpected token '...'", expr.span)),
            ExprKind::Arrow(function) => make_closure(self.ctx, self.thread, function),
            ExprKind::Destructure(destructure) => {
                let value = self.evaluate(&destructure.value)?;
                bind_pattern(self.ctx, self.thread, &destructure.pattern, value.clone(), BindMode::Assign)?;
                Ok(value)
            }
        }
    }

    fn evaluate_unary(&mut self, unary: &UnaryExpr) -> ScriptResult<Value> {
        match unary.operator {
            UnaryOp::Delete => {
                let place = self.evaluate_place(&unary.argument, "Invalid delete target")?;
                delete_place(self.ctx, &place)
            }
            op => {
                let operand = self.evaluate(&unary.argument)?;
                self.ctx.operators().apply_unary(op, &operand)
            }
        }
    }

    fn evaluate_binary(&mut self, binary: &BinaryExpr) -> ScriptResult<Value> {
        let left = self.evaluate(&binary.left)?;
        if binary.operator.is_logical() {
            if short_circuits(binary.operator, &left) {
                return Ok(left);
            }
            return self.evaluate(&binary.right);
        }
        let right = self.evaluate(&binary.right)?;
        self.ctx.operators().apply_binary(binary.operator, &left, &right)
    }

    fn evaluate_assignment(&mut self, assignment: &AssignmentExpr) -> ScriptResult<Value> {
        let place = self.evaluate_place(&assignment.target, "Invalid left-hand side in assignment")?;
        if !assignment.operator.is_logical() {
            ensure_writable(self.ctx, &place)?;
        }
        let value = match assignment.operator {
            AssignmentOp::Assign => self.evaluate(&assignment.value)?,
            op => {
                let current = read_place(self.ctx, &place)?;
                let binary = op
                    .binary()
                    .ok_or_else(|| ScriptError::internal("compound assignment without operator"))?;
                if op.is_logical() {
                    if short_circuits(binary, &current) {
                        return Ok(current);
                    }
                    self.evaluate(&assignment.value)?
                } else {
                    let right = self.evaluate(&assignment.value)?;
                    self.ctx.operators().apply_binary(binary, &current, &right)?
                }
            }
        };
        write_place(self.ctx, &place, value.clone())?;
        Ok(value)
    }

    /// Resolve an assignment target; anything but an identifier or member
    /// access fails with `message`.
    fn evaluate_place(&mut self, expr: &Expr, message: &str) -> ScriptResult<Place> {
        match &expr.kind {
            ExprKind::Identifier(identifier) => Ok(identifier_place(self.ctx, self.thread, identifier)),
            ExprKind::Member(member) => {
                let object = self.evaluate(&member.object)?;
                property_place(object, PropertyKey::from(member.property.as_str()))
            }
            ExprKind::CalculatedMember(member) => {
                let object = self.evaluate(&member.object)?;
                let key = self.evaluate(&member.property)?.to_property_key();
                property_place(object, key)
            }
            _ => Err(ScriptError::syntax(message, expr.span)),
        }
    }

    fn evaluate_call(&mut self, call: &InvocationExpr) -> ScriptResult<Value> {
        let (callee, this) = match &call.callee.kind {
            ExprKind::Member(member) => {
                let object = self.evaluate(&member.object)?;
                let key = PropertyKey::from(member.property.as_str());
                (get_member(&object, &key, member.optional)?, object)
            }
            ExprKind::CalculatedMember(member) => {
                let object = self.evaluate(&member.object)?;
                if member.optional && object.is_nullish() {
                    (Value::Undefined, object)
                } else {
                    let key = self.evaluate(&member.property)?.to_property_key();
                    (get_member(&object, &key, member.optional)?, object)
                }
            }
            _ => (self.evaluate(&call.callee)?, Value::Undefined),
        };

        if call.optional && callee.is_nullish() {
            return Ok(Value::Undefined);
        }
        if !callee.is_function() {
            return Err(ScriptError::type_error(format!(
                "{} is not a function",
                call.callee.source()
            )));
        }

        let args = self.evaluate_list(&call.arguments)?;
        self.call_function(&callee, this, args)
    }

    /// Evaluate array elements or call arguments, expanding spreads.
    fn evaluate_list(&mut self, elements: &[ExprRef]) -> ScriptResult<Vec<Value>> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            match &element.kind {
                ExprKind::Spread(inner) => {
                    let spread = self.evaluate(inner)?;
                    values.extend(iterate_values(&spread)?);
                }
                _ => values.push(self.evaluate(element)?),
            }
        }
        Ok(values)
    }

    fn evaluate_object(&mut self, properties: &[ObjectProperty]) -> ScriptResult<Value> {
        let mut object = ScriptObject::new();
        for property in properties {
            match property {
                ObjectProperty::Property { key, value } => {
                    let key = match key {
                        PropertyName::Static(name) => name.clone(),
                        PropertyName::Computed(e) => self.evaluate(e)?.to_property_key().to_name(),
                    };
                    let value = self.evaluate(value)?;
                    object.set(key, value);
                }
                ObjectProperty::Spread(e) => {
                    let source = self.evaluate(e)?;
                    spread_into(&mut object, &source);
                }
            }
        }
        Ok(Value::object(object))
    }

    /// Call a function value with a receiver and arguments.
    pub fn call_function(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> ScriptResult<Value> {
        let function = callee.as_function().ok_or_else(|| {
            ScriptError::type_error(format!("{} is not a function", callee.to_display_string()))
        })?;

        match function.as_ref() {
            Function::Native(native) => {
                if self.ctx.config().is_banned(&native.name) {
                    log::warn!("[Script] blocked call to banned function '{}'", native.name);
                    return Err(ScriptError::not_allowed(&native.name));
                }
                let func = native.func.clone();
                let mut call = NativeCall {
                    ctx: &mut *self.ctx,
                    thread: self.thread,
                    this,
                };
                func(&mut call, &args)
            }
            Function::Closure(closure) => {
                self.ctx.enter_call()?;
                let thread = self.ctx.create_call_thread(self.thread, closure.captured.clone());
                let result = run_closure_body(self.ctx, thread, callee, closure, args);
                self.ctx.release_thread(thread);
                self.ctx.exit_call();
                result
            }
        }
    }
}

/// Bind a call's parameters on `thread` and run the body to completion.
fn run_closure_body(
    ctx: &mut EvaluationContext,
    thread: ThreadId,
    callee: &Value,
    closure: &Closure,
    args: Vec<Value>,
) -> ScriptResult<Value> {
    bind_call_frame(ctx, thread, callee, closure, args)?;
    match &closure.function.body {
        ArrowBody::Expression(body) => Interpreter::new(ctx, thread).evaluate(body),
        ArrowBody::Block(body) => {
            let mut processor = StatementProcessor::new(ProcessorMode::Sync, thread, body.clone());
            processor.run(ctx)?;
            Ok(processor.return_value(ctx))
        }
    }
}

/// Open the call block: the function's own name, then its parameters.
pub(crate) fn bind_call_frame(
    ctx: &mut EvaluationContext,
    thread: ThreadId,
    callee: &Value,
    closure: &Closure,
    args: Vec<Value>,
) -> ScriptResult<()> {
    ctx.push_block(thread)?;
    if let Some(name) = &closure.function.name {
        ctx.declare(thread, name, callee.clone(), false)?;
    }
    bind_params(ctx, thread, &closure.function.params, args)
}

/// Evaluate a single expression on a thread.
pub fn evaluate(ctx: &mut EvaluationContext, thread: ThreadId, expr: &Expr) -> ScriptResult<Value> {
    Interpreter::new(ctx, thread).evaluate(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn eval_in(ctx: &mut EvaluationContext, thread: ThreadId, source: &str) -> ScriptResult<Value> {
        let expr = parse_expression(source)?;
        evaluate(ctx, thread, &expr)
    }

    fn eval(source: &str) -> ScriptResult<Value> {
        let mut ctx = EvaluationContext::with_builtins(Default::default());
        let thread = ctx.create_thread();
        eval_in(&mut ctx, thread, source)
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(eval("1 + 2 * 3").unwrap().to_number(), 7.0);
        assert_eq!(eval("'a' + 1 + 2").unwrap().to_display_string(), "a12");
        assert_eq!(eval("`x=${1 + 1}!`").unwrap().to_display_string(), "x=2!");
        assert_eq!(eval("typeof (() => 1)").unwrap().to_display_string(), "function");
        assert_eq!(eval("typeof missing").unwrap().to_display_string(), "undefined");
    }

    #[test]
    fn test_logical_short_circuit() {
        let mut ctx = EvaluationContext::with_builtins(Default::default());
        let thread = ctx.create_thread();
        ctx.declare(thread, "calls", Value::from(0), false).unwrap();
        eval_in(&mut ctx, thread, "false && (calls = calls + 1)").unwrap();
        eval_in(&mut ctx, thread, "1 ?? (calls = calls + 1)").unwrap();
        assert_eq!(ctx.lookup(thread, "calls").to_number(), 0.0);
        eval_in(&mut ctx, thread, "null ?? (calls = calls + 1)").unwrap();
        assert_eq!(ctx.lookup(thread, "calls").to_number(), 1.0);
    }

    #[test]
    fn test_logical_assignment() {
        let mut ctx = EvaluationContext::default();
        let thread = ctx.create_thread();
        ctx.declare(thread, "a", Value::from(5), false).unwrap();
        ctx.declare(thread, "b", Value::Null, false).unwrap();
        assert_eq!(eval_in(&mut ctx, thread, "a ??= 7").unwrap().to_number(), 5.0);
        assert_eq!(eval_in(&mut ctx, thread, "b ??= 7").unwrap().to_number(), 7.0);
        assert_eq!(ctx.lookup(thread, "b").to_number(), 7.0);
        assert_eq!(eval_in(&mut ctx, thread, "a &&= 0").unwrap().to_number(), 0.0);
        assert_eq!(eval_in(&mut ctx, thread, "a ||= 9").unwrap().to_number(), 9.0);
    }

    #[test]
    fn test_assignment_requires_place() {
        let err = eval("1 = 2").unwrap_err();
        assert_eq!(err.message(), "Invalid left-hand side in assignment");
        assert!(eval("(1)++").is_err());
        assert!(eval("delete 1").is_err());
    }

    #[test]
    fn test_assignment_to_unknown_global_fails() {
        assert!(matches!(eval("nope = 1"), Err(ScriptError::Reference(_))));
    }

    #[test]
    fn test_member_calls_use_receiver() {
        assert_eq!(eval("[1, 2, 3].map(x => x * 2).join('-')").unwrap().to_display_string(), "2-4-6");
        assert_eq!(eval("'Hello'.toUpperCase()").unwrap().to_display_string(), "HELLO");
        assert_eq!(eval("({ f: (a, ...rest) => rest.length }).f(1, 2, 3)").unwrap().to_number(), 2.0);
    }

    #[test]
    fn test_optional_chains() {
        assert!(eval("null?.a.b.c").unwrap().is_undefined());
        assert!(eval("undefined?.[1]").unwrap().is_undefined());
        assert!(eval("({}).missing?.()").unwrap().is_undefined());
        assert!(eval("({}).missing()").is_err());
        assert!(eval("null.a").is_err());
    }

    #[test]
    fn test_not_a_function_message() {
        let err = eval("Math.nope(1)").unwrap_err();
        assert_eq!(err.message(), "Math.nope is not a function");
    }

    #[test]
    fn test_spreads() {
        assert_eq!(eval("[0, ...[1, 2], ...'ab'].length").unwrap().to_number(), 5.0);
        assert_eq!(eval("Object.keys({ a: 1, ...{ b: 2 }, ...null }).join()").unwrap().to_display_string(), "a,b");
        assert_eq!(eval("Math.max(...[3, 9, 4])").unwrap().to_number(), 9.0);
    }

    #[test]
    fn test_closure_with_block_body() {
        assert_eq!(
            eval("((n) => { let total = 0; for (let i = 1; i <= n; i++) { total += i } return total })(4)")
                .unwrap()
                .to_number(),
            10.0
        );
    }

    #[test]
    fn test_named_function_expression_recursion() {
        assert_eq!(
            eval("(function fact(n) { return n <= 1 ? 1 : n * fact(n - 1) })(5)")
                .unwrap()
                .to_number(),
            120.0
        );
    }

    #[test]
    fn test_call_depth_limit() {
        let config = crate::config::EngineConfig {
            max_call_depth: 8,
            ..Default::default()
        };
        let mut ctx = EvaluationContext::new(config);
        let thread = ctx.create_thread();
        let err = eval_in(&mut ctx, thread, "(function f(n) { return f(n + 1) })(0)").unwrap_err();
        assert!(matches!(err, ScriptError::Range(_)));
    }

    #[test]
    fn test_banned_function() {
        let err = eval("setTimeout(() => 1, 10)").unwrap_err();
        assert!(matches!(err, ScriptError::NotAllowed(_)));
        assert!(err.message().contains("setTimeout"));
    }

    #[test]
    fn test_native_callbacks() {
        let mut ctx = EvaluationContext::default();
        ctx.define_native("twice", |call, args| {
            let f = args.first().cloned().unwrap_or_default();
            let once = call.call(&f, vec![Value::from(1)])?;
            call.call(&f, vec![once])
        });
        let thread = ctx.create_thread();
        assert_eq!(eval_in(&mut ctx, thread, "twice(x => x + 10)").unwrap().to_number(), 21.0);
    }

    #[test]
    fn test_destructuring_assignment_swaps() {
        let mut ctx = EvaluationContext::default();
        let thread = ctx.create_thread();
        ctx.declare(thread, "a", Value::from(1), false).unwrap();
        ctx.declare(thread, "b", Value::from(2), false).unwrap();
        eval_in(&mut ctx, thread, "[a, b] = [b, a]").unwrap();
        assert_eq!(ctx.lookup(thread, "a").to_number(), 2.0);
        assert_eq!(ctx.lookup(thread, "b").to_number(), 1.0);
    }

    #[test]
    fn test_tagged_values_delegate_operators() {
        use crate::operators::OperatorCalculator;
        use std::rc::Rc;

        struct Meters;
        impl OperatorCalculator for Meters {
            fn add(&self, left: &Value, right: &Value) -> Option<ScriptResult<Value>> {
                let l = match left {
                    Value::Tagged(t) => t.payload.to_number(),
                    other => other.to_number(),
                };
                let r = match right {
                    Value::Tagged(t) => t.payload.to_number(),
                    other => other.to_number(),
                };
                Some(Ok(Value::tagged("meters", Value::from(l + r))))
            }
        }

        let mut ctx = EvaluationContext::default();
        ctx.register_calculator("meters", Rc::new(Meters));
        ctx.define_global("d", Value::tagged("meters", Value::from(3)));
        let thread = ctx.create_thread();
        let result = eval_in(&mut ctx, thread, "d + 4").unwrap();
        assert_eq!(result.tag(), Some("meters"));
        assert_eq!(eval_in(&mut ctx, thread, "(d + 4) + d").unwrap().to_display_string(), "10");
    }
}
