//! Fixed-point expression simplification.
//!
//! One pass simplifies children first and rebuilds a node only when a
//! child changed, so an unchanged tree comes back as the same `Rc`.
//! [`simplify`] repeats passes until that happens.

use std::rc::Rc;

use crate::ast::{
    ArrowBody, ArrowFunction, BinaryOp, ExprKind, ExprRef, Literal, ObjectProperty, PropertyName,
    UnaryOp,
};
use crate::eval::literal_value;
use crate::operators::{binary_op, unary_op};
use crate::value::Value;

/// Simplify until a pass leaves the expression untouched.
pub fn simplify(expr: &ExprRef) -> ExprRef {
    let mut current = expr.clone();
    let mut passes = 0usize;
    loop {
        let next = simplify_once(&current);
        if Rc::ptr_eq(&next, &current) {
            log::trace!("[Simplify] fixed point after {} passes", passes);
            return current;
        }
        passes += 1;
        current = next;
    }
}

/// One bottom-up pass. Returns `expr` itself when nothing applies.
pub fn simplify_once(expr: &ExprRef) -> ExprRef {
    let rebuilt = simplify_children(expr);
    let node = rebuilt.as_ref().unwrap_or(expr);
    match rewrite(node) {
        Some(rewritten) => rewritten,
        None => node.clone(),
    }
}

// ============================================================================
// Children
// ============================================================================

fn changed(old: &ExprRef, new: &ExprRef) -> bool {
    !Rc::ptr_eq(old, new)
}

/// Simplify a list; `None` if every element is unchanged.
fn simplify_list(items: &[ExprRef]) -> Option<Vec<ExprRef>> {
    let simplified: Vec<ExprRef> = items.iter().map(simplify_once).collect();
    let any = items.iter().zip(&simplified).any(|(old, new)| changed(old, new));
    any.then_some(simplified)
}

/// Rebuild `expr` with simplified children, or `None` if none changed.
fn simplify_children(expr: &ExprRef) -> Option<ExprRef> {
    let kind = match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Update(_) => return None,
        ExprKind::Template(template) => {
            let mut template = template.clone();
            template.expressions = simplify_list(&template.expressions)?;
            ExprKind::Template(template)
        }
        ExprKind::Unary(unary) => {
            let argument = simplify_once(&unary.argument);
            if !changed(&unary.argument, &argument) {
                return None;
            }
            let mut unary = unary.clone();
            unary.argument = argument;
            ExprKind::Unary(unary)
        }
        ExprKind::Binary(binary) => {
            let left = simplify_once(&binary.left);
            let right = simplify_once(&binary.right);
            if !changed(&binary.left, &left) && !changed(&binary.right, &right) {
                return None;
            }
            let mut binary = binary.clone();
            binary.left = left;
            binary.right = right;
            ExprKind::Binary(binary)
        }
        ExprKind::Assignment(assignment) => {
            let target = simplify_once(&assignment.target);
            let value = simplify_once(&assignment.value);
            if !changed(&assignment.target, &target) && !changed(&assignment.value, &value) {
                return None;
            }
            let mut assignment = assignment.clone();
            assignment.target = target;
            assignment.value = value;
            ExprKind::Assignment(assignment)
        }
        ExprKind::Sequence(items) => ExprKind::Sequence(simplify_list(items)?),
        ExprKind::Array(items) => ExprKind::Array(simplify_list(items)?),
        ExprKind::Conditional(conditional) => {
            let parts = [&conditional.test, &conditional.consequent, &conditional.alternate];
            let [test, consequent, alternate] = parts.map(simplify_once);
            if !changed(parts[0], &test) && !changed(parts[1], &consequent) && !changed(parts[2], &alternate) {
                return None;
            }
            let mut conditional = conditional.clone();
            conditional.test = test;
            conditional.consequent = consequent;
            conditional.alternate = alternate;
            ExprKind::Conditional(conditional)
        }
        ExprKind::Invocation(call) => {
            let callee = simplify_once(&call.callee);
            let arguments = simplify_list(&call.arguments);
            if !changed(&call.callee, &callee) && arguments.is_none() {
                return None;
            }
            let mut call = call.clone();
            call.callee = callee;
            if let Some(arguments) = arguments {
                call.arguments = arguments;
            }
            ExprKind::Invocation(call)
        }
        ExprKind::Member(member) => {
            let object = simplify_once(&member.object);
            if !changed(&member.object, &object) {
                return None;
            }
            let mut member = member.clone();
            member.object = object;
            ExprKind::Member(member)
        }
        ExprKind::CalculatedMember(member) => {
            let object = simplify_once(&member.object);
            let property = simplify_once(&member.property);
            if !changed(&member.object, &object) && !changed(&member.property, &property) {
                return None;
            }
            let mut member = member.clone();
            member.object = object;
            member.property = property;
            ExprKind::CalculatedMember(member)
        }
        ExprKind::Object(properties) => {
            let mut any = false;
            let simplified: Vec<ObjectProperty> = properties
                .iter()
                .map(|property| match property {
                    ObjectProperty::Property { key, value } => {
                        let key = match key {
                            PropertyName::Computed(key) => {
                                let new = simplify_once(key);
                                any |= changed(key, &new);
                                PropertyName::Computed(new)
                            }
                            PropertyName::Static(name) => PropertyName::Static(name.clone()),
                        };
                        let new = simplify_once(value);
                        any |= changed(value, &new);
                        ObjectProperty::Property { key, value: new }
                    }
                    ObjectProperty::Spread(value) => {
                        let new = simplify_once(value);
                        any |= changed(value, &new);
                        ObjectProperty::Spread(new)
                    }
                })
                .collect();
            if !any {
                return None;
            }
            ExprKind::Object(simplified)
        }
        ExprKind::Spread(argument) => {
            let new = simplify_once(argument);
            if !changed(argument, &new) {
                return None;
            }
            ExprKind::Spread(new)
        }
        ExprKind::Arrow(function) => {
            // Block bodies are statements and stay as written.
            let ArrowBody::Expression(body) = &function.body else {
                return None;
            };
            let new = simplify_once(body);
            if !changed(body, &new) {
                return None;
            }
            ExprKind::Arrow(Rc::new(ArrowFunction {
                name: function.name.clone(),
                params: function.params.clone(),
                body: ArrowBody::Expression(new),
            }))
        }
        ExprKind::Destructure(destructure) => {
            let value = simplify_once(&destructure.value);
            if !changed(&destructure.value, &value) {
                return None;
            }
            let mut destructure = destructure.clone();
            destructure.value = value;
            ExprKind::Destructure(destructure)
        }
    };
    Some(expr.with_kind(kind))
}

// ============================================================================
// Rewrites
// ============================================================================

/// Literal for a folded value. Only finite numbers fold.
fn to_literal(value: Value) -> Option<Literal> {
    Some(match value {
        Value::Undefined => Literal::Undefined,
        Value::Null => Literal::Null,
        Value::Boolean(b) => Literal::Boolean(b),
        Value::Number(n) if n.is_finite() => Literal::Number(n),
        Value::BigInt(n) => Literal::BigInt(n),
        Value::String(s) => Literal::String(s),
        _ => return None,
    })
}

fn is_number(expr: &ExprRef, n: f64) -> bool {
    matches!(expr.as_literal(), Some(Literal::Number(value)) if *value == n)
}

fn rewrite(expr: &ExprRef) -> Option<ExprRef> {
    match &expr.kind {
        ExprKind::Unary(unary) => {
            if unary.operator == UnaryOp::Delete {
                return None;
            }
            let operand = literal_value(unary.argument.as_literal()?);
            let folded = unary_op(unary.operator, &operand).ok()?;
            Some(expr.with_kind(ExprKind::Literal(to_literal(folded)?)))
        }
        ExprKind::Binary(binary) => {
            let left = binary.left.as_literal().map(literal_value);
            let right = binary.right.as_literal().map(literal_value);

            if binary.operator.is_logical() {
                let left = left?;
                let take_left = match binary.operator {
                    BinaryOp::And => !left.to_boolean(),
                    BinaryOp::Or => left.to_boolean(),
                    _ => !left.is_nullish(),
                };
                return Some(if take_left { binary.left.clone() } else { binary.right.clone() });
            }

            if let (Some(left), Some(right)) = (&left, &right) {
                let folded = binary_op(binary.operator, left, right).ok()?;
                return Some(expr.with_kind(ExprKind::Literal(to_literal(folded)?)));
            }

            let (l, r) = (&binary.left, &binary.right);
            match binary.operator {
                BinaryOp::Add if is_number(r, 0.0) => Some(l.clone()),
                BinaryOp::Add if is_number(l, 0.0) => Some(r.clone()),
                BinaryOp::Sub if is_number(r, 0.0) => Some(l.clone()),
                BinaryOp::Mul if is_number(r, 1.0) => Some(l.clone()),
                BinaryOp::Mul if is_number(l, 1.0) => Some(r.clone()),
                BinaryOp::Mul if is_number(r, 0.0) => Some(r.clone()),
                BinaryOp::Mul if is_number(l, 0.0) => Some(l.clone()),
                BinaryOp::Div if is_number(r, 1.0) => Some(l.clone()),
                _ => None,
            }
        }
        ExprKind::Conditional(conditional) => {
            let test = literal_value(conditional.test.as_literal()?);
            Some(if test.to_boolean() {
                conditional.consequent.clone()
            } else {
                conditional.alternate.clone()
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn simplified(source: &str) -> ExprRef {
        simplify(&parse_expression(source).unwrap())
    }

    fn literal(source: &str) -> Literal {
        simplified(source).as_literal().cloned().unwrap()
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(literal("1 + 2 * 3"), Literal::Number(7.0));
        assert_eq!(literal("-(-4)"), Literal::Number(4.0));
        assert_eq!(literal("'a' + 1"), Literal::String("a1".into()));
        assert_eq!(literal("!(1 < 2)"), Literal::Boolean(false));
        assert_eq!(literal("typeof 'x'"), Literal::String("string".into()));
        assert_eq!(literal("2n ** 10n"), Literal::BigInt(1024.into()));
        assert_eq!(literal("true ? 1 : x"), Literal::Number(1.0));
    }

    #[test]
    fn test_short_circuit() {
        assert_eq!(literal("false && x"), Literal::Boolean(false));
        assert_eq!(simplified("true && x").source(), "x");
        assert_eq!(simplified("null ?? y").source(), "y");
        assert_eq!(literal("0 || 5"), Literal::Number(5.0));
    }

    #[test]
    fn test_identities() {
        assert_eq!(simplified("x + 0").source(), "x");
        assert_eq!(simplified("0 + x").source(), "x");
        assert_eq!(simplified("x - 0").source(), "x");
        assert_eq!(simplified("1 * (x / 1)").source(), "x");
        assert_eq!(literal("x * 0"), Literal::Number(0.0));
        assert_eq!(simplified("x * (2 - 1) + (3 - 3)").source(), "x");
    }

    #[test]
    fn test_failed_folds_keep_node() {
        let expr = parse_expression("1 / 0").unwrap();
        assert!(Rc::ptr_eq(&simplify(&expr), &expr));
        let expr = parse_expression("1n + 1").unwrap();
        assert!(Rc::ptr_eq(&simplify(&expr), &expr));
        let expr = parse_expression("'a' in 'abc'").unwrap();
        assert!(Rc::ptr_eq(&simplify(&expr), &expr));
    }

    #[test]
    fn test_oversized_bigint_folds_keep_node() {
        for source in ["1n << 200000000000n", "3n ** 4000000000n", "(2n ** 2000000n) * 1n"] {
            let expr = parse_expression(source).unwrap();
            let ExprKind::Binary(_) = &simplify(&expr).kind else {
                panic!("{} folded", source);
            };
        }
        let expr = parse_expression("1n << 200000000000n").unwrap();
        assert!(Rc::ptr_eq(&simplify(&expr), &expr));
        assert_eq!(literal("(-1n) ** 9000000001n"), Literal::BigInt((-1).into()));
        assert_eq!(literal("5n >> 90000000000000000000n"), Literal::BigInt(0.into()));
    }

    #[test]
    fn test_unchanged_tree_is_shared() {
        let expr = parse_expression("f(a, b.c[d])").unwrap();
        assert!(Rc::ptr_eq(&simplify(&expr), &expr));
        let once = simplified("g(1 + 1, [x * 1])");
        assert!(Rc::ptr_eq(&simplify(&once), &once));
        assert_eq!(
            once.source(),
            "g(1 + 1, [x * 1])",
            "rebuilt nodes keep the original source"
        );
    }

    #[test]
    fn test_arrow_bodies() {
        let expr = simplified("(v) => v * 1 + 0");
        let ExprKind::Arrow(function) = &expr.kind else {
            panic!("expected arrow");
        };
        let ArrowBody::Expression(body) = &function.body else {
            panic!("expected expression body");
        };
        assert_eq!(body.source(), "v");
    }
}
