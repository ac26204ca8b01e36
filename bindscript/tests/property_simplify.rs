//! Property: simplification reaches a fixed point and preserves values
//!
//! For any expression E, `simplify(simplify(E))` is the same node as
//! `simplify(E)`. For closed expressions (no identifiers) the simplified
//! tree evaluates to the same value as the original.

use std::rc::Rc;

use bindscript::{evaluate_expression, parse_expression, simplify, EngineConfig, EvaluationContext, Value};
use proptest::prelude::*;

fn leaf(with_identifiers: bool) -> BoxedStrategy<String> {
    let literals = prop_oneof![
        (0u32..20).prop_map(|n| n.to_string()),
        Just("0".to_string()),
        Just("1".to_string()),
        Just("true".to_string()),
        Just("null".to_string()),
    ];
    if with_identifiers {
        prop_oneof![literals, Just("x".to_string()), Just("y".to_string()), Just("'s'".to_string())].boxed()
    } else {
        literals.boxed()
    }
}

/// Closed expressions stay within finite arithmetic so every node folds.
fn expression(with_identifiers: bool) -> impl Strategy<Value = String> {
    let mut ops = vec!["+", "-", "*", "<", "===", "&&", "||", "??"];
    if with_identifiers {
        ops.extend(["/", "%"]);
    }
    leaf(with_identifiers).prop_recursive(4, 24, 2, move |inner| {
        prop_oneof![
            (inner.clone(), prop::sample::select(ops.clone()), inner.clone())
                .prop_map(|(l, op, r)| format!("({} {} {})", l, op, r)),
            (prop::sample::select(vec!["-", "!", "~"]), inner.clone()).prop_map(|(op, e)| format!("{}({})", op, e)),
            (inner.clone(), inner.clone(), inner).prop_map(|(t, a, b)| format!("({} ? {} : {})", t, a, b)),
        ]
    })
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A second simplification hands back the very same node.
    #[test]
    fn simplify_is_idempotent(source in expression(true)) {
        let expr = parse_expression(&source).unwrap();
        let once = simplify(&expr);
        let twice = simplify(&once);
        prop_assert!(Rc::ptr_eq(&once, &twice), "not a fixed point: {}", source);
    }

    /// Folding closed expressions never changes their value.
    #[test]
    fn simplify_preserves_closed_values(source in expression(false)) {
        let expr = parse_expression(&source).unwrap();
        let simplified = simplify(&expr);

        let mut ctx = EvaluationContext::new(EngineConfig::default());
        let thread = ctx.create_thread();
        let original = evaluate_expression(&mut ctx, thread, &source);
        let folded = bindscript::interpreter::evaluate(&mut ctx, thread, &simplified);

        match (original, folded) {
            (Ok(a), Ok(b)) => prop_assert!(same_value(&a, &b), "{} gave {:?} but folded to {:?}", source, a, b),
            (Err(_), Err(_)) => {}
            (a, b) => prop_assert!(false, "{} diverged: {:?} vs {:?}", source, a, b),
        }
    }

    /// Anything the simplifier leaves alone is returned untouched.
    #[test]
    fn unchanged_source_keeps_identity(name in "[a-w][a-z]{0,5}") {
        let source = format!("{}.items[{}.index]", name, name);
        let expr = parse_expression(&source).unwrap();
        prop_assert!(Rc::ptr_eq(&simplify(&expr), &expr));
    }
}
