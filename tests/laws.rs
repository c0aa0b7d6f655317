//! Property-style laws over the value and arithmetic primitives.

use quickcheck_macros::quickcheck;
use smew::prelude::*;
use smew::vm::operations;
use smew::vm::value::{number_to_int32, normalize_nan, CANONICAL_NAN_BITS};

#[quickcheck]
fn to_int32_is_idempotent(x: f64) -> bool {
    let once = number_to_int32(x);
    number_to_int32(once as f64) == once
}

#[quickcheck]
fn normalized_doubles_are_canonical(x: f64) -> bool {
    let n = normalize_nan(x);
    !n.is_nan() || n.to_bits() == CANONICAL_NAN_BITS
}

#[quickcheck]
fn add_zero_is_identity(a: f64) -> bool {
    if !a.is_finite() {
        return true;
    }
    let mut rt = Runtime::new(RuntimeParams::default());
    let v = operations::add(&mut rt, &JsValue::number(a), &JsValue::number(0.0)).unwrap();
    v.get_number() == a || (a == 0.0 && v.get_number() == 0.0)
}

#[quickcheck]
fn sub_self_is_zero(a: f64) -> bool {
    if !a.is_finite() {
        return true;
    }
    let mut rt = Runtime::new(RuntimeParams::default());
    let v = operations::arith_binary(
        &mut rt,
        Opcode::Sub,
        &JsValue::number(a),
        &JsValue::number(a),
    )
    .unwrap();
    v.get_number() == 0.0
}

#[quickcheck]
fn mul_one_is_identity(a: f64) -> bool {
    if !a.is_finite() {
        return true;
    }
    let mut rt = Runtime::new(RuntimeParams::default());
    let v = operations::arith_binary(
        &mut rt,
        Opcode::Mul,
        &JsValue::number(a),
        &JsValue::number(1.0),
    )
    .unwrap();
    v.get_number() == a
}

#[quickcheck]
fn strict_equals_is_reflexive_except_nan(a: f64) -> bool {
    let v = JsValue::number(a);
    v.strict_equals(&v.clone()) == !a.is_nan()
}

#[quickcheck]
fn double_logical_not_is_to_boolean(a: f64) -> bool {
    let v = JsValue::number(a);
    let once = operations::logical_not(&v);
    let twice = operations::logical_not(&once);
    twice.get_bool() == v.to_boolean()
}
