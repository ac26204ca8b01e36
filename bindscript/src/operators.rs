//! Operator semantics and the operator-overload registry.
//!
//! Native semantics follow the usual dynamic-language coercions. Before a
//! native operator runs, tagged domain values get a chance to handle the
//! operation through a calculator registered for their tag.

use std::cmp::Ordering;
use std::rc::Rc;

use hashbrown::HashMap;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::{ScriptError, ScriptResult};
use crate::value::{to_int32, Value};

/// Overloads for a domain value type. Every method defaults to "not
/// handled", in which case native semantics apply.
pub trait OperatorCalculator {
    fn add(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn subtract(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn multiply(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn divide(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn remainder(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn power(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn equals(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn less_than(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn less_equal(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn greater_than(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn greater_equal(&self, _left: &Value, _right: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn negate(&self, _operand: &Value) -> Option<ScriptResult<Value>> {
        None
    }
    fn unary_plus(&self, _operand: &Value) -> Option<ScriptResult<Value>> {
        None
    }
}

/// Calculators keyed by type tag.
#[derive(Default, Clone)]
pub struct OperatorRegistry {
    calculators: HashMap<String, Rc<dyn OperatorCalculator>>,
}

impl OperatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the calculator for a tag, replacing any previous one.
    pub fn register(&mut self, tag: &str, calculator: Rc<dyn OperatorCalculator>) {
        self.calculators.insert(tag.to_string(), calculator);
    }

    /// Look up a calculator.
    pub fn get(&self, tag: &str) -> Option<&Rc<dyn OperatorCalculator>> {
        self.calculators.get(tag)
    }

    /// Try the left operand's calculator, then the right operand's.
    pub fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Option<ScriptResult<Value>> {
        if self.calculators.is_empty() {
            return None;
        }
        for tag in [left.tag(), right.tag()].into_iter().flatten() {
            let Some(calculator) = self.get(tag) else {
                continue;
            };
            let handled = match op {
                BinaryOp::Add => calculator.add(left, right),
                BinaryOp::Sub => calculator.subtract(left, right),
                BinaryOp::Mul => calculator.multiply(left, right),
                BinaryOp::Div => calculator.divide(left, right),
                BinaryOp::Mod => calculator.remainder(left, right),
                BinaryOp::Exp => calculator.power(left, right),
                BinaryOp::Equal | BinaryOp::StrictEqual => calculator.equals(left, right),
                BinaryOp::NotEqual | BinaryOp::StrictNotEqual => calculator
                    .equals(left, right)
                    .map(|r| r.map(|v| Value::Boolean(!v.to_boolean()))),
                BinaryOp::LessThan => calculator.less_than(left, right),
                BinaryOp::LessEqual => calculator.less_equal(left, right),
                BinaryOp::GreaterThan => calculator.greater_than(left, right),
                BinaryOp::GreaterEqual => calculator.greater_equal(left, right),
                _ => None,
            };
            if handled.is_some() {
                return handled;
            }
        }
        None
    }

    /// Try the operand's calculator for a unary operator.
    pub fn unary(&self, op: UnaryOp, operand: &Value) -> Option<ScriptResult<Value>> {
        let calculator = self.get(operand.tag()?)?;
        match op {
            UnaryOp::Minus => calculator.negate(operand),
            UnaryOp::Plus => calculator.unary_plus(operand),
            _ => None,
        }
    }

    /// Apply a binary operator, overloads first.
    pub fn apply_binary(&self, op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
        match self.binary(op, left, right) {
            Some(result) => result,
            None => binary_op(op, left, right),
        }
    }

    /// Apply a unary operator, overloads first.
    pub fn apply_unary(&self, op: UnaryOp, operand: &Value) -> ScriptResult<Value> {
        match self.unary(op, operand) {
            Some(result) => result,
            None => unary_op(op, operand),
        }
    }
}

// ── Native semantics ─────────────────────────────────────────────────

/// Objects and arrays become strings; tagged values their payload.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Pending(_) => {
            Value::String(value.to_display_string())
        }
        Value::Tagged(tagged) => to_primitive(&tagged.payload),
        other => other.clone(),
    }
}

fn mixed_bigint() -> ScriptError {
    ScriptError::type_error("Cannot mix BigInt and other types, use explicit conversions")
}

/// Apply a binary operator with native semantics. Logical operators pick
/// an operand; evaluators short-circuit them before reaching this point.
pub fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    match op {
        BinaryOp::And => Ok(if left.to_boolean() { right.clone() } else { left.clone() }),
        BinaryOp::Or => Ok(if left.to_boolean() { left.clone() } else { right.clone() }),
        BinaryOp::Nullish => Ok(if left.is_nullish() { right.clone() } else { left.clone() }),
        BinaryOp::Equal => Ok(Value::Boolean(left.loose_equals(right))),
        BinaryOp::NotEqual => Ok(Value::Boolean(!left.loose_equals(right))),
        BinaryOp::StrictEqual => Ok(Value::Boolean(left.strict_equals(right))),
        BinaryOp::StrictNotEqual => Ok(Value::Boolean(!left.strict_equals(right))),
        BinaryOp::In => has_property(left, right),
        BinaryOp::LessThan => compare(left, right, |o| o == Ordering::Less),
        BinaryOp::LessEqual => compare(left, right, |o| o != Ordering::Greater),
        BinaryOp::GreaterThan => compare(left, right, |o| o == Ordering::Greater),
        BinaryOp::GreaterEqual => compare(left, right, |o| o != Ordering::Less),
        BinaryOp::Add => add(left, right),
        _ => {
            let (left, right) = (to_primitive(left), to_primitive(right));
            match (&left, &right) {
                (Value::BigInt(a), Value::BigInt(b)) => bigint_op(op, a, b),
                (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(mixed_bigint()),
                _ => Ok(Value::Number(number_op(op, left.to_number(), right.to_number()))),
            }
        }
    }
}

fn add(left: &Value, right: &Value) -> ScriptResult<Value> {
    let (left, right) = (to_primitive(left), to_primitive(right));
    match (&left, &right) {
        (Value::String(a), _) => Ok(Value::String(format!("{}{}", a, right.to_display_string()))),
        (_, Value::String(b)) => Ok(Value::String(format!("{}{}", left.to_display_string(), b))),
        (Value::BigInt(a), Value::BigInt(b)) => Ok(Value::BigInt(a + b)),
        (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(mixed_bigint()),
        _ => Ok(Value::Number(left.to_number() + right.to_number())),
    }
}

fn number_op(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        BinaryOp::Exp => {
            if b.is_nan() || (libm::fabs(a) == 1.0 && b.is_infinite()) {
                f64::NAN
            } else {
                libm::pow(a, b)
            }
        }
        BinaryOp::BitAnd => (to_int32(a) & to_int32(b)) as f64,
        BinaryOp::BitOr => (to_int32(a) | to_int32(b)) as f64,
        BinaryOp::BitXor => (to_int32(a) ^ to_int32(b)) as f64,
        BinaryOp::LeftShift => to_int32(a).wrapping_shl(to_int32(b) as u32 & 31) as f64,
        BinaryOp::RightShift => (to_int32(a) >> (to_int32(b) as u32 & 31)) as f64,
        BinaryOp::UnsignedRightShift => ((to_int32(a) as u32) >> (to_int32(b) as u32 & 31)) as f64,
        _ => f64::NAN,
    }
}

/// Largest BigInt result, in bits, that `**` and `<<` may produce.
const MAX_BIGINT_BITS: u64 = 1 << 20;

fn bigint_too_large() -> ScriptError {
    ScriptError::range("Maximum BigInt size exceeded")
}

fn bigint_op(op: BinaryOp, a: &BigInt, b: &BigInt) -> ScriptResult<Value> {
    let result = match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b.is_zero() => {
            return Err(ScriptError::range("Division by zero"));
        }
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        BinaryOp::Exp => {
            if b < &BigInt::zero() {
                return Err(ScriptError::range("Exponent must be non-negative"));
            }
            if a.bits() <= 1 {
                // 0, 1 and -1 only depend on the exponent's parity.
                let reduced = if b.is_zero() {
                    0
                } else if (b % 2u32).is_zero() {
                    2
                } else {
                    1
                };
                a.pow(reduced)
            } else {
                let exponent = b
                    .to_u32()
                    .filter(|e| a.bits().saturating_mul(u64::from(*e)) <= MAX_BIGINT_BITS)
                    .ok_or_else(bigint_too_large)?;
                a.pow(exponent)
            }
        }
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::LeftShift | BinaryOp::RightShift => {
            let amount = b.to_i64().unwrap_or(if b < &BigInt::zero() { i64::MIN } else { i64::MAX });
            let left = (op == BinaryOp::LeftShift) == (amount >= 0);
            let amount = amount.unsigned_abs();
            if a.is_zero() {
                BigInt::zero()
            } else if left {
                if a.bits().saturating_add(amount) > MAX_BIGINT_BITS {
                    return Err(bigint_too_large());
                }
                a << amount as usize
            } else {
                a >> amount.min(a.bits() + 1) as usize
            }
        }
        BinaryOp::UnsignedRightShift => {
            return Err(ScriptError::type_error(
                "BigInts have no unsigned right shift, use >> instead",
            ));
        }
        _ => return Err(ScriptError::internal(format!("not an arithmetic operator: {}", op.as_str()))),
    };
    Ok(Value::BigInt(result))
}

fn compare(left: &Value, right: &Value, accept: fn(Ordering) -> bool) -> ScriptResult<Value> {
    let (left, right) = (to_primitive(left), to_primitive(right));
    let ordering = match (&left, &right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
        (Value::BigInt(a), other) => a.to_f64().and_then(|a| a.partial_cmp(&other.to_number())),
        (other, Value::BigInt(b)) => b
            .to_f64()
            .and_then(|b| other.to_number().partial_cmp(&b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    Ok(Value::Boolean(ordering.map(accept).unwrap_or(false)))
}

fn has_property(key: &Value, target: &Value) -> ScriptResult<Value> {
    let found = match target {
        Value::Object(obj) => obj.borrow().has(&key.to_property_key().to_name()),
        Value::Array(elements) => {
            let key = key.to_property_key();
            match key.as_index() {
                Some(i) => i < elements.borrow().len(),
                None => key.to_name() == "length",
            }
        }
        _ => {
            return Err(ScriptError::type_error(format!(
                "Cannot use 'in' operator to search for '{}' in {}",
                key.to_display_string(),
                target.to_display_string()
            )));
        }
    };
    Ok(Value::Boolean(found))
}

/// Apply `-`, `+`, `!` or `~` with native semantics.
pub fn unary_op(op: UnaryOp, operand: &Value) -> ScriptResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Boolean(!operand.to_boolean())),
        UnaryOp::Typeof => Ok(Value::string(operand.type_of())),
        UnaryOp::Minus => match to_primitive(operand) {
            Value::BigInt(n) => Ok(Value::BigInt(-n)),
            other => Ok(Value::Number(-other.to_number())),
        },
        UnaryOp::Plus => match to_primitive(operand) {
            Value::BigInt(_) => Err(ScriptError::type_error(
                "Cannot convert a BigInt value to a number",
            )),
            other => Ok(Value::Number(other.to_number())),
        },
        UnaryOp::BitNot => match to_primitive(operand) {
            Value::BigInt(n) => Ok(Value::BigInt(!n)),
            other => Ok(Value::Number(!other.to_i32() as f64)),
        },
        UnaryOp::Delete => Ok(Value::Boolean(true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ScriptObject;

    fn num(value: ScriptResult<Value>) -> f64 {
        value.unwrap().to_number()
    }

    #[test]
    fn test_addition_coercions() {
        let r = binary_op(BinaryOp::Add, &Value::from("a"), &Value::from(1)).unwrap();
        assert_eq!(r.to_display_string(), "a1");
        let r = binary_op(BinaryOp::Add, &Value::array(vec![Value::from(1), Value::from(2)]), &Value::from(3)).unwrap();
        assert_eq!(r.to_display_string(), "1,23");
        assert_eq!(num(binary_op(BinaryOp::Add, &Value::from(true), &Value::Null)), 1.0);
    }

    #[test]
    fn test_bigint_arithmetic() {
        let a = Value::BigInt(BigInt::from(7));
        let b = Value::BigInt(BigInt::from(2));
        assert_eq!(binary_op(BinaryOp::Div, &a, &b).unwrap().to_display_string(), "3");
        assert_eq!(binary_op(BinaryOp::Exp, &a, &b).unwrap().to_display_string(), "49");
        assert_eq!(binary_op(BinaryOp::LeftShift, &a, &b).unwrap().to_display_string(), "28");
        assert!(matches!(
            binary_op(BinaryOp::Div, &a, &Value::BigInt(BigInt::zero())),
            Err(ScriptError::Range(_))
        ));
        assert!(matches!(
            binary_op(BinaryOp::Mul, &a, &Value::from(2)),
            Err(ScriptError::Type(_))
        ));
        assert!(matches!(
            binary_op(BinaryOp::UnsignedRightShift, &a, &b),
            Err(ScriptError::Type(_))
        ));
    }

    #[test]
    fn test_bigint_size_limit() {
        let big = |n: i64| Value::BigInt(BigInt::from(n));
        let err = binary_op(BinaryOp::LeftShift, &big(1), &big(200_000_000_000)).unwrap_err();
        assert_eq!(err.message(), "Maximum BigInt size exceeded");
        assert!(matches!(binary_op(BinaryOp::Exp, &big(3), &big(4_000_000_000)), Err(ScriptError::Range(_))));
        assert!(matches!(binary_op(BinaryOp::Exp, &big(2), &big(2_000_000)), Err(ScriptError::Range(_))));
        assert_eq!(binary_op(BinaryOp::Exp, &big(-1), &big(5_000_000_001)).unwrap().to_display_string(), "-1");
        assert_eq!(binary_op(BinaryOp::LeftShift, &big(0), &big(1 << 40)).unwrap().to_display_string(), "0");
        assert_eq!(binary_op(BinaryOp::RightShift, &big(-5), &big(1 << 40)).unwrap().to_display_string(), "-1");
        assert_eq!(binary_op(BinaryOp::LeftShift, &big(1), &big(64)).unwrap().to_display_string(), "18446744073709551616");
    }

    #[test]
    fn test_bitwise_and_shifts() {
        assert_eq!(num(binary_op(BinaryOp::BitOr, &Value::from(5), &Value::from(2))), 7.0);
        assert_eq!(num(binary_op(BinaryOp::LeftShift, &Value::from(1), &Value::from(33))), 2.0);
        assert_eq!(
            num(binary_op(BinaryOp::UnsignedRightShift, &Value::from(-1), &Value::from(0))),
            4294967295.0
        );
        assert_eq!(num(unary_op(UnaryOp::BitNot, &Value::from(5))), -6.0);
    }

    #[test]
    fn test_comparisons() {
        assert!(binary_op(BinaryOp::LessThan, &Value::from("a"), &Value::from("b")).unwrap().to_boolean());
        assert!(binary_op(BinaryOp::LessThan, &Value::from("10"), &Value::from(9)).unwrap().to_boolean() == false);
        assert!(!binary_op(BinaryOp::LessEqual, &Value::Number(f64::NAN), &Value::from(1)).unwrap().to_boolean());
        assert!(binary_op(BinaryOp::GreaterThan, &Value::BigInt(BigInt::from(3)), &Value::from(2.5)).unwrap().to_boolean());
    }

    #[test]
    fn test_in_operator() {
        let mut obj = ScriptObject::new();
        obj.set("a", Value::Null);
        let obj = Value::object(obj);
        assert!(binary_op(BinaryOp::In, &Value::from("a"), &obj).unwrap().to_boolean());
        let array = Value::array(vec![Value::Null]);
        assert!(binary_op(BinaryOp::In, &Value::from(0), &array).unwrap().to_boolean());
        assert!(!binary_op(BinaryOp::In, &Value::from(1), &array).unwrap().to_boolean());
        assert!(binary_op(BinaryOp::In, &Value::from("a"), &Value::from("abc")).is_err());
    }

    #[test]
    fn test_power_edge_cases() {
        assert!(num(binary_op(BinaryOp::Exp, &Value::from(1), &Value::Number(f64::NAN))).is_nan());
        assert_eq!(num(binary_op(BinaryOp::Exp, &Value::from(2), &Value::from(10))), 1024.0);
    }

    struct Money;

    impl OperatorCalculator for Money {
        fn add(&self, left: &Value, right: &Value) -> Option<ScriptResult<Value>> {
            let amount = |v: &Value| match v {
                Value::Tagged(t) => t.payload.to_number(),
                other => other.to_number(),
            };
            Some(Ok(Value::tagged("money", Value::from(amount(left) + amount(right)))))
        }
    }

    #[test]
    fn test_registry_dispatch() {
        let mut registry = OperatorRegistry::new();
        registry.register("money", Rc::new(Money));
        let five = Value::tagged("money", Value::from(5));

        let sum = registry.apply_binary(BinaryOp::Add, &Value::from(1), &five).unwrap();
        assert_eq!(sum.tag(), Some("money"));
        assert_eq!(sum.to_number(), 6.0);

        // No subtract overload: native semantics on the payload.
        let diff = registry.apply_binary(BinaryOp::Sub, &five, &Value::from(1)).unwrap();
        assert_eq!(diff.to_number(), 4.0);
    }
}
