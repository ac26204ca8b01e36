//! Built-in globals and the methods of arrays, strings and numbers.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::EvaluationContext;
use crate::error::{ScriptError, ScriptResult};
use crate::eval::own_entries;
use crate::interpreter::NativeCall;
use crate::object::{Function, ScriptObject};
use crate::token::Span;
use crate::value::{number_to_string, Value};

/// Seed the global container.
pub fn install(ctx: &mut EvaluationContext) {
    ctx.define_global("NaN", Value::Number(f64::NAN));
    ctx.define_global("Infinity", Value::Number(f64::INFINITY));

    ctx.define_native("isNaN", is_nan);
    ctx.define_native("isFinite", is_finite);
    ctx.define_native("parseInt", parse_int);
    ctx.define_native("parseFloat", parse_float);
    ctx.define_native("String", string_constructor);
    ctx.define_native("Number", number_constructor);
    ctx.define_native("Boolean", boolean_constructor);

    ctx.define_global("Math", namespace(&[
        ("abs", math_abs),
        ("floor", math_floor),
        ("ceil", math_ceil),
        ("round", math_round),
        ("trunc", math_trunc),
        ("sign", math_sign),
        ("sqrt", math_sqrt),
        ("pow", math_pow),
        ("min", math_min),
        ("max", math_max),
    ]));
    if let Value::Object(math) = ctx.global().borrow().get("Math") {
        math.borrow_mut().set("PI", Value::Number(std::f64::consts::PI));
        math.borrow_mut().set("E", Value::Number(std::f64::consts::E));
    }

    ctx.define_global("Object", namespace(&[
        ("keys", object_keys),
        ("values", object_values),
        ("entries", object_entries),
        ("assign", object_assign),
    ]));
    ctx.define_global("Array", namespace(&[("isArray", array_is_array)]));
    ctx.define_global("JSON", namespace(&[
        ("stringify", json_stringify),
        ("parse", json_parse),
    ]));
    ctx.define_global("console", namespace(&[("log", console_log)]));

    // Rejected at call time by the engine configuration.
    for timer in ["setTimeout", "setInterval", "setImmediate", "requestAnimationFrame"] {
        ctx.define_native(timer, |_call, _args| Ok(Value::Undefined));
    }
}

type NativeImpl = fn(&mut NativeCall<'_>, &[Value]) -> ScriptResult<Value>;

fn namespace(members: &[(&str, NativeImpl)]) -> Value {
    let object: ScriptObject = members
        .iter()
        .map(|(name, func)| (*name, Value::function(Function::native(name, *func))))
        .collect();
    Value::object(object)
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn number_arg(args: &[Value], index: usize) -> f64 {
    args.get(index).map(Value::to_number).unwrap_or(f64::NAN)
}

// Global functions

fn is_nan(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Boolean(number_arg(args, 0).is_nan()))
}

fn is_finite(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Boolean(number_arg(args, 0).is_finite()))
}

fn parse_int(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let string = arg(args, 0).to_display_string();
    let mut radix = match args.get(1) {
        Some(r) if !r.is_undefined() => r.to_i32(),
        _ => 0,
    };
    if radix != 0 && !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }

    let mut rest = string.trim();
    let mut negative = false;
    if let Some(stripped) = rest.strip_prefix('-') {
        negative = true;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }
    if (radix == 0 || radix == 16) && (rest.starts_with("0x") || rest.starts_with("0X")) {
        rest = &rest[2..];
        radix = 16;
    }
    let radix = if radix == 0 { 10 } else { radix as u32 };

    let mut result = 0.0f64;
    let mut has_digits = false;
    for c in rest.chars() {
        match c.to_digit(radix) {
            Some(digit) => {
                has_digits = true;
                result = result * radix as f64 + digit as f64;
            }
            None => break,
        }
    }
    if !has_digits {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(if negative { -result } else { result }))
}

fn parse_float(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let string = arg(args, 0).to_display_string();
    let s = string.trim_start();
    let unsigned = s.trim_start_matches(['+', '-']);
    if unsigned.starts_with("Infinity") {
        let negative = s.starts_with('-');
        return Ok(Value::Number(if negative { f64::NEG_INFINITY } else { f64::INFINITY }));
    }

    // Longest prefix that parses as a decimal literal.
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return Ok(Value::Number(f64::NAN));
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    Ok(Value::Number(s[..end].parse::<f64>().unwrap_or(f64::NAN)))
}

fn string_constructor(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(match args.first() {
        Some(value) => Value::String(value.to_display_string()),
        None => Value::string(""),
    })
}

fn number_constructor(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)))
}

fn boolean_constructor(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Boolean(args.first().map(Value::to_boolean).unwrap_or(false)))
}

fn console_log(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let parts: Vec<String> = args.iter().map(Value::to_display_string).collect();
    log::info!("[Console] {}", parts.join(" "));
    Ok(Value::Undefined)
}

// Math

fn math_abs(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Number(libm::fabs(number_arg(args, 0))))
}

fn math_floor(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Number(libm::floor(number_arg(args, 0))))
}

fn math_ceil(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Number(libm::ceil(number_arg(args, 0))))
}

/// Halves round towards +Infinity.
fn math_round(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let n = number_arg(args, 0);
    if !n.is_finite() {
        return Ok(Value::Number(n));
    }
    Ok(Value::Number(libm::floor(n + 0.5)))
}

fn math_trunc(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Number(libm::trunc(number_arg(args, 0))))
}

fn math_sign(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let n = number_arg(args, 0);
    Ok(Value::Number(if n.is_nan() || n == 0.0 { n } else { n.signum() }))
}

fn math_sqrt(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Number(libm::sqrt(number_arg(args, 0))))
}

fn math_pow(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Number(libm::pow(number_arg(args, 0), number_arg(args, 1))))
}

fn math_min(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let mut min = f64::INFINITY;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        min = min.min(n);
    }
    Ok(Value::Number(min))
}

fn math_max(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let mut max = f64::NEG_INFINITY;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        max = max.max(n);
    }
    Ok(Value::Number(max))
}

// Object and Array

fn object_keys(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let keys = own_entries(&arg(args, 0))
        .into_iter()
        .map(|(k, _)| Value::String(k))
        .collect();
    Ok(Value::array(keys))
}

fn object_values(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let values = own_entries(&arg(args, 0)).into_iter().map(|(_, v)| v).collect();
    Ok(Value::array(values))
}

fn object_entries(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let entries = own_entries(&arg(args, 0))
        .into_iter()
        .map(|(k, v)| Value::array(vec![Value::String(k), v]))
        .collect();
    Ok(Value::array(entries))
}

fn object_assign(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let target = arg(args, 0);
    let Value::Object(object) = &target else {
        return Err(ScriptError::type_error("Object.assign target must be an object"));
    };
    for source in args.iter().skip(1) {
        for (key, value) in own_entries(source) {
            object.borrow_mut().set(key, value);
        }
    }
    Ok(target)
}

fn array_is_array(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::Boolean(matches!(args.first(), Some(Value::Array(_)))))
}

// JSON

fn json_stringify(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let value = arg(args, 0);
    if value.is_undefined() || value.is_function() {
        return Ok(Value::Undefined);
    }
    let pretty = args.get(2).map(|v| v.to_number() > 0.0).unwrap_or(false);
    let text = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    text.map(Value::String)
        .map_err(|e| ScriptError::type_error(format!("Converting to JSON failed: {}", e)))
}

fn json_parse(_call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let text = arg(args, 0).to_display_string();
    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| ScriptError::syntax(format!("Unexpected token in JSON: {}", e), Span::default()))?;
    Ok(Value::from_json(&json))
}

// Array methods

/// Array method by name; the array is the call's receiver.
pub fn array_method(name: &str) -> Option<Function> {
    let func: NativeImpl = match name {
        "push" => array_push,
        "pop" => array_pop,
        "includes" => array_includes,
        "indexOf" => array_index_of,
        "join" => array_join,
        "slice" => array_slice,
        "map" => array_map,
        "filter" => array_filter,
        "forEach" => array_for_each,
        "find" => array_find,
        "some" => array_some,
        "every" => array_every,
        _ => return None,
    };
    Some(Function::native(name, func))
}

fn this_array(call: &NativeCall<'_>) -> ScriptResult<Rc<RefCell<Vec<Value>>>> {
    match &call.this {
        Value::Array(elements) => Ok(elements.clone()),
        other => Err(ScriptError::type_error(format!(
            "{} is not an array",
            other.to_display_string()
        ))),
    }
}

/// Resolve a relative `slice` bound against `len`.
fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value {
        Some(v) if !v.is_undefined() => {
            let n = libm::trunc(v.to_number());
            if n.is_nan() {
                0
            } else if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                n.min(len as f64) as usize
            }
        }
        _ => default,
    }
}

fn array_push(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let elements = this_array(call)?;
    let mut elements = elements.borrow_mut();
    elements.extend(args.iter().cloned());
    Ok(Value::from(elements.len()))
}

fn array_pop(call: &mut NativeCall<'_>, _args: &[Value]) -> ScriptResult<Value> {
    let elements = this_array(call)?;
    let popped = elements.borrow_mut().pop();
    Ok(popped.unwrap_or_default())
}

fn array_includes(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let needle = arg(args, 0);
    let elements = this_array(call)?;
    let found = elements.borrow().iter().any(|v| {
        v.strict_equals(&needle)
            || matches!((v, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
    });
    Ok(Value::Boolean(found))
}

fn array_index_of(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let needle = arg(args, 0);
    let elements = this_array(call)?;
    let index = elements.borrow().iter().position(|v| v.strict_equals(&needle));
    Ok(index.map(Value::from).unwrap_or(Value::Number(-1.0)))
}

fn array_join(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let separator = match args.first() {
        Some(v) if !v.is_undefined() => v.to_display_string(),
        _ => ",".to_string(),
    };
    let elements = this_array(call)?;
    let parts: Vec<String> = elements
        .borrow()
        .iter()
        .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
        .collect();
    Ok(Value::String(parts.join(&separator)))
}

fn array_slice(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let elements = this_array(call)?;
    let elements = elements.borrow();
    let len = elements.len();
    let start = relative_index(args.first(), len, 0);
    let end = relative_index(args.get(1), len, len);
    Ok(Value::array(elements.get(start..end.max(start)).unwrap_or(&[]).to_vec()))
}

/// Run `callback(item, index, array)` over a copy of the receiver.
fn each_with_callback(
    call: &mut NativeCall<'_>,
    args: &[Value],
    mut visit: impl FnMut(usize, &Value, Value) -> bool,
) -> ScriptResult<()> {
    let array = call.this.clone();
    let items = this_array(call)?.borrow().clone();
    let callback = arg(args, 0);
    if !callback.is_function() {
        return Err(ScriptError::type_error(format!(
            "{} is not a function",
            callback.to_display_string()
        )));
    }
    for (i, item) in items.iter().enumerate() {
        let result = call.call(&callback, vec![item.clone(), Value::from(i), array.clone()])?;
        if !visit(i, item, result) {
            break;
        }
    }
    Ok(())
}

fn array_map(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let mut mapped = Vec::new();
    each_with_callback(call, args, |_, _, result| {
        mapped.push(result);
        true
    })?;
    Ok(Value::array(mapped))
}

fn array_filter(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let mut kept = Vec::new();
    each_with_callback(call, args, |_, item, result| {
        if result.to_boolean() {
            kept.push(item.clone());
        }
        true
    })?;
    Ok(Value::array(kept))
}

fn array_for_each(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    each_with_callback(call, args, |_, _, _| true)?;
    Ok(Value::Undefined)
}

fn array_find(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let mut found = Value::Undefined;
    each_with_callback(call, args, |_, item, result| {
        if result.to_boolean() {
            found = item.clone();
            return false;
        }
        true
    })?;
    Ok(found)
}

fn array_some(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let mut any = false;
    each_with_callback(call, args, |_, _, result| {
        any = result.to_boolean();
        !any
    })?;
    Ok(Value::Boolean(any))
}

fn array_every(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let mut all = true;
    each_with_callback(call, args, |_, _, result| {
        all = result.to_boolean();
        all
    })?;
    Ok(Value::Boolean(all))
}

// String methods

/// String method by name; the string is the call's receiver.
pub fn string_method(name: &str) -> Option<Function> {
    let func: NativeImpl = match name {
        "toUpperCase" => string_to_upper_case,
        "toLowerCase" => string_to_lower_case,
        "trim" => string_trim,
        "includes" => string_includes,
        "startsWith" => string_starts_with,
        "endsWith" => string_ends_with,
        "indexOf" => string_index_of,
        "split" => string_split,
        "slice" => string_slice,
        "toString" => string_to_string,
        _ => return None,
    };
    Some(Function::native(name, func))
}

fn this_string(call: &NativeCall<'_>) -> String {
    call.this.to_display_string()
}

fn string_to_upper_case(call: &mut NativeCall<'_>, _args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::String(this_string(call).to_uppercase()))
}

fn string_to_lower_case(call: &mut NativeCall<'_>, _args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::String(this_string(call).to_lowercase()))
}

fn string_trim(call: &mut NativeCall<'_>, _args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::string(this_string(call).trim()))
}

fn string_includes(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let needle = arg(args, 0).to_display_string();
    Ok(Value::Boolean(this_string(call).contains(&needle)))
}

fn string_starts_with(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let needle = arg(args, 0).to_display_string();
    Ok(Value::Boolean(this_string(call).starts_with(&needle)))
}

fn string_ends_with(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let needle = arg(args, 0).to_display_string();
    Ok(Value::Boolean(this_string(call).ends_with(&needle)))
}

/// Character index of the first occurrence, or -1.
fn string_index_of(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let haystack = this_string(call);
    let needle = arg(args, 0).to_display_string();
    Ok(match haystack.find(&needle) {
        Some(byte) => Value::from(haystack[..byte].chars().count()),
        None => Value::Number(-1.0),
    })
}

fn string_split(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let s = this_string(call);
    let parts: Vec<Value> = match args.first() {
        None | Some(Value::Undefined) => vec![Value::String(s)],
        Some(separator) => {
            let separator = separator.to_display_string();
            if separator.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(separator.as_str()).map(Value::string).collect()
            }
        }
    };
    Ok(Value::array(parts))
}

fn string_slice(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let chars: Vec<char> = this_string(call).chars().collect();
    let len = chars.len();
    let start = relative_index(args.first(), len, 0);
    let end = relative_index(args.get(1), len, len);
    let slice: String = chars.get(start..end.max(start)).unwrap_or(&[]).iter().collect();
    Ok(Value::String(slice))
}

fn string_to_string(call: &mut NativeCall<'_>, _args: &[Value]) -> ScriptResult<Value> {
    Ok(Value::String(this_string(call)))
}

// Number methods

/// Method of a number, BigInt or boolean receiver.
pub fn primitive_method(name: &str) -> Option<Function> {
    let func: NativeImpl = match name {
        "toString" => primitive_to_string,
        "toFixed" => number_to_fixed,
        _ => return None,
    };
    Some(Function::native(name, func))
}

fn primitive_to_string(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let radix = match args.first() {
        Some(r) if !r.is_undefined() => r.to_i32(),
        _ => 10,
    };
    if !(2..=36).contains(&radix) {
        return Err(ScriptError::range("toString() radix must be between 2 and 36"));
    }
    match &call.this {
        Value::BigInt(n) if radix != 10 => Ok(Value::String(n.to_str_radix(radix as u32))),
        Value::Number(n) if radix != 10 && n.fract() == 0.0 && n.is_finite() => {
            let digits = num_bigint::BigInt::from(*n as i64).to_str_radix(radix as u32);
            Ok(Value::String(digits))
        }
        other => Ok(Value::String(other.to_display_string())),
    }
}

fn number_to_fixed(call: &mut NativeCall<'_>, args: &[Value]) -> ScriptResult<Value> {
    let digits = args.first().map(Value::to_i32).unwrap_or(0);
    if !(0..=100).contains(&digits) {
        return Err(ScriptError::range("toFixed() digits argument must be between 0 and 100"));
    }
    let n = call.this.to_number();
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(Value::String(number_to_string(n)));
    }
    Ok(Value::String(format!("{:.*}", digits as usize, n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::evaluate;
    use crate::parser::parse_expression;

    fn eval(source: &str) -> Value {
        let mut ctx = EvaluationContext::with_builtins(Default::default());
        let thread = ctx.create_thread();
        evaluate(&mut ctx, thread, &parse_expression(source).unwrap()).unwrap()
    }

    fn eval_str(source: &str) -> String {
        eval(source).to_display_string()
    }

    #[test]
    fn test_global_functions() {
        assert_eq!(eval("parseInt('42px')").to_number(), 42.0);
        assert_eq!(eval("parseInt('0x1F')").to_number(), 31.0);
        assert_eq!(eval("parseInt('-101', 2)").to_number(), -5.0);
        assert!(eval("parseInt('px')").to_number().is_nan());
        assert_eq!(eval("parseFloat('3.5e2kg')").to_number(), 350.0);
        assert!(eval("isNaN('abc')").to_boolean());
        assert!(!eval("isFinite(1 / 0)").to_boolean());
        assert_eq!(eval_str("String(12) + Number('3')"), "123");
        assert!(!eval("Boolean('')").to_boolean());
    }

    #[test]
    fn test_math() {
        assert_eq!(eval("Math.round(-2.5)").to_number(), -2.0);
        assert_eq!(eval("Math.round(2.5)").to_number(), 3.0);
        assert_eq!(eval("Math.max()").to_number(), f64::NEG_INFINITY);
        assert_eq!(eval("Math.min(4, 2, 8)").to_number(), 2.0);
        assert_eq!(eval("Math.sign(-3)").to_number(), -1.0);
        assert_eq!(eval("Math.trunc(-4.7)").to_number(), -4.0);
        assert!(eval("Math.PI > 3.14").to_boolean());
    }

    #[test]
    fn test_object_helpers() {
        assert_eq!(eval_str("Object.values({ a: 1, b: 2 })"), "1,2");
        assert_eq!(eval_str("Object.entries({ a: 1 })[0]"), "a,1");
        assert_eq!(eval_str("Object.assign({ a: 1 }, { b: 2 }, { a: 3 }).a"), "3");
        assert!(eval("Array.isArray([])").to_boolean());
    }

    #[test]
    fn test_json() {
        assert_eq!(eval_str("JSON.stringify({ a: [1, 'x', null], b: true })"), r#"{"a":[1,"x",null],"b":true}"#);
        assert_eq!(eval_str("JSON.parse('{\"n\": [1, 2]}').n.length"), "2");
        assert!(eval("JSON.stringify(undefined)").is_undefined());
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(eval_str("[3, 1, 2].filter(x => x > 1)"), "3,2");
        assert_eq!(eval_str("[1, 2, 3].find(x => x > 1)"), "2");
        assert!(eval("[1, 2, 3].some(x => x > 2)").to_boolean());
        assert!(!eval("[1, 2, 3].every(x => x > 2)").to_boolean());
        assert_eq!(eval_str("[1, 2, 3, 4].slice(1, -1)"), "2,3");
        assert!(eval("[1, NaN].includes(NaN)").to_boolean());
        assert_eq!(eval("['a', 'b'].indexOf('b')").to_number(), 1.0);
        assert_eq!(eval("((a) => { a.push(4, 5); return a.length })([1])").to_number(), 3.0);
        assert_eq!(eval_str("[1, 2].map((x, i) => x * i)"), "0,2");
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(eval_str("'  Hi  '.trim().toLowerCase()"), "hi");
        assert_eq!(eval_str("'a,b,c'.split(',')[2]"), "c");
        assert_eq!(eval_str("'hello'.slice(-3)"), "llo");
        assert_eq!(eval("'héllo'.indexOf('l')").to_number(), 2.0);
        assert!(eval("'binding'.startsWith('bind')").to_boolean());
    }

    #[test]
    fn test_number_methods() {
        assert_eq!(eval_str("(3.14159).toFixed(2)"), "3.14");
        assert_eq!(eval_str("(255).toString(16)"), "ff");
        assert_eq!(eval_str("(10n).toString(2)"), "1010");
    }
}
