/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Arithmetic, bitwise, equality and relational primitives.
//!
//! These implement E5 §11.5–§11.9 with the executor-facing shape: operands
//! arrive as owned values (coercion side effects cannot invalidate them)
//! and every numeric result is canonical-NaN normalized.

use super::object::JsHint;
use super::value::{normalize_nan, JsValue};
use super::{Control, Runtime};
use crate::bytecode::opcodes::{ExtraOp, Opcode};
use std::rc::Rc;

pub const COMPARE_FLAG_EVAL_LEFT_FIRST: u32 = 1 << 0;
pub const COMPARE_FLAG_NEGATE: u32 = 1 << 1;

/// ECMAScript modulus ('%') matches C `fmod`, not IEEE remainder
/// (E5 §11.5.3); Rust's `%` on doubles is exactly fmod.
#[inline]
pub fn compute_mod(d1: f64, d2: f64) -> f64 {
    d1 % d2
}

/// Addition with string/buffer concatenation (E5 §11.6.1).
pub fn add(rt: &mut Runtime, x: &JsValue, y: &JsValue) -> Control<JsValue> {
    if let (JsValue::Number(a), JsValue::Number(b)) = (x, y) {
        return Ok(JsValue::number(a + b));
    }

    let px = x.to_primitive(rt, JsHint::None)?;
    let py = y.to_primitive(rt, JsHint::None)?;

    if px.is_string() || px.is_buffer() || py.is_string() || py.is_buffer() {
        let sx = px.to_string(rt)?;
        let sy = py.to_string(rt)?;
        let s = rt.concat_strings(&sx, &sy)?;
        Ok(JsValue::string(s))
    } else {
        let a = px.to_number(rt)?;
        let b = py.to_number(rt)?;
        Ok(JsValue::number(a + b))
    }
}

/// SUB/MUL/DIV/MOD; number-only semantics.
pub fn arith_binary(rt: &mut Runtime, op: Opcode, x: &JsValue, y: &JsValue) -> Control<JsValue> {
    let (a, b) = if let (JsValue::Number(a), JsValue::Number(b)) = (x, y) {
        (*a, *b)
    } else {
        let a = x.to_number(rt)?;
        let b = y.to_number(rt)?;
        (a, b)
    };
    let d = match op {
        Opcode::Sub => a - b,
        Opcode::Mul => a * b,
        Opcode::Div => a / b,
        Opcode::Mod => compute_mod(a, b),
        _ => return Err(rt.internal_error("invalid arithmetic opcode")),
    };
    Ok(JsValue::number(d))
}

/// BAND/BOR/BXOR/BASL/BASR/BLSR with ToInt32/ToUint32 coercions and
/// 5-bit shift-count masking (E5 §11.7, §11.10).
pub fn bitwise_binary(rt: &mut Runtime, op: Opcode, x: &JsValue, y: &JsValue) -> Control<JsValue> {
    let i1 = x.to_int32(rt)?;
    let i2 = y.to_int32(rt)?;

    let val = match op {
        Opcode::BAnd => (i1 & i2) as f64,
        Opcode::BOr => (i1 | i2) as f64,
        Opcode::BXor => (i1 ^ i2) as f64,
        Opcode::BAsl => {
            // signed shift; result wraps to 32 bits, e.g. 4294967295 << 1 is -2
            let u2 = i2 as u32;
            (i1 << (u2 & 0x1f)) as f64
        }
        Opcode::BAsr => {
            let u2 = i2 as u32;
            (i1 >> (u2 & 0x1f)) as f64
        }
        Opcode::BLsr => {
            let u1 = i1 as u32;
            let u2 = i2 as u32;
            (u1 >> (u2 & 0x1f)) as f64
        }
        _ => return Err(rt.internal_error("invalid bitwise opcode")),
    };
    Ok(JsValue::number(val))
}

/// UNM/UNP/INC/DEC.
pub fn arith_unary(rt: &mut Runtime, op: ExtraOp, x: &JsValue) -> Control<JsValue> {
    let d = if let JsValue::Number(d) = x {
        *d
    } else {
        x.to_number(rt)?
    };
    let d = match op {
        ExtraOp::UnM => -d,
        ExtraOp::UnP => d,
        ExtraOp::Inc => d + 1.0,
        ExtraOp::Dec => d - 1.0,
        _ => return Err(rt.internal_error("invalid unary opcode")),
    };
    Ok(JsValue::number(d))
}

/// E5 §11.4.8.
pub fn bitwise_not(rt: &mut Runtime, x: &JsValue) -> Control<JsValue> {
    let i = x.to_int32(rt)?;
    Ok(JsValue::number(!i as f64))
}

/// E5 §11.4.9; ToBoolean never has side effects.
pub fn logical_not(x: &JsValue) -> JsValue {
    JsValue::bool(!x.to_boolean())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Undefined,
    Null,
    Bool,
    Number,
    Str,
    Object,
    Buffer,
    Pointer,
    LightFunc,
}

fn kind(v: &JsValue) -> Kind {
    match v {
        JsValue::Undefined => Kind::Undefined,
        JsValue::Null => Kind::Null,
        JsValue::Bool(_) => Kind::Bool,
        JsValue::Number(_) => Kind::Number,
        JsValue::Str(_) => Kind::Str,
        JsValue::Object(_) => Kind::Object,
        JsValue::Buffer(_) => Kind::Buffer,
        JsValue::Pointer(_) => Kind::Pointer,
        JsValue::LightFunc(_) => Kind::LightFunc,
    }
}

/// Abstract equality, E5 §11.9.3.  Buffers compare by content and coerce
/// like their string image against other types.
pub fn equals(rt: &mut Runtime, x: &JsValue, y: &JsValue) -> Control<bool> {
    let mut lhs = x.clone();
    let mut rhs = y.clone();
    loop {
        match (kind(&lhs), kind(&rhs)) {
            (Kind::Number, Kind::Number) => {
                return Ok(lhs.get_number() == rhs.get_number());
            }
            (Kind::Undefined, Kind::Undefined)
            | (Kind::Undefined, Kind::Null)
            | (Kind::Null, Kind::Undefined)
            | (Kind::Null, Kind::Null) => return Ok(true),
            (Kind::Str, Kind::Str) => {
                return Ok(lhs.get_string().sym() == rhs.get_string().sym());
            }
            (Kind::Buffer, Kind::Buffer) => {
                return match (&lhs, &rhs) {
                    (JsValue::Buffer(a), JsValue::Buffer(b)) => Ok(*a.borrow() == *b.borrow()),
                    _ => Ok(false),
                };
            }
            (Kind::Object, Kind::Object) => {
                return Ok(Rc::ptr_eq(&lhs.get_object(), &rhs.get_object()));
            }
            (Kind::Pointer, Kind::Pointer) | (Kind::LightFunc, Kind::LightFunc) => {
                return Ok(lhs.strict_equals(&rhs));
            }

            (Kind::Bool, _) => {
                let n = lhs.to_number(rt)?;
                lhs = JsValue::number(n);
            }
            (_, Kind::Bool) => {
                let n = rhs.to_number(rt)?;
                rhs = JsValue::number(n);
            }

            (Kind::Number, Kind::Str) => {
                let n = rhs.to_number(rt)?;
                rhs = JsValue::number(n);
            }
            (Kind::Str, Kind::Number) => {
                let n = lhs.to_number(rt)?;
                lhs = JsValue::number(n);
            }

            (Kind::Buffer, Kind::Str) | (Kind::Buffer, Kind::Number) => {
                let s = lhs.to_string(rt)?;
                lhs = JsValue::string(s);
            }
            (Kind::Str, Kind::Buffer) | (Kind::Number, Kind::Buffer) => {
                let s = rhs.to_string(rt)?;
                rhs = JsValue::string(s);
            }

            (Kind::Number, Kind::Object) | (Kind::Str, Kind::Object) => {
                rhs = rhs.to_primitive(rt, JsHint::None)?;
            }
            (Kind::Object, Kind::Number) | (Kind::Object, Kind::Str) => {
                lhs = lhs.to_primitive(rt, JsHint::None)?;
            }

            _ => return Ok(false),
        }
    }
}

fn number_compare(x: f64, y: f64) -> Option<bool> {
    if x.is_nan() || y.is_nan() {
        None
    } else {
        Some(x < y)
    }
}

/// Relational comparison helper computing `px < py` with flag-controlled
/// evaluation order and negation (E5 §11.8.5).  `>`/`<`/`>=`/`<=` all
/// reduce to this one primitive so coercion side effects keep their
/// source order.
pub fn compare(rt: &mut Runtime, px: &JsValue, py: &JsValue, flags: u32) -> Control<bool> {
    let tri = compare_tri(rt, px, py, flags & COMPARE_FLAG_EVAL_LEFT_FIRST != 0)?;
    Ok(match tri {
        // incomparable (NaN): false regardless of negation
        None => false,
        Some(v) => {
            if flags & COMPARE_FLAG_NEGATE != 0 {
                !v
            } else {
                v
            }
        }
    })
}

fn compare_tri(
    rt: &mut Runtime,
    lhs: &JsValue,
    rhs: &JsValue,
    left_first: bool,
) -> Control<Option<bool>> {
    if let (JsValue::Number(a), JsValue::Number(b)) = (lhs, rhs) {
        return Ok(number_compare(*a, *b));
    }

    let (px, py) = if left_first {
        let px = lhs.to_primitive(rt, JsHint::Number)?;
        let py = rhs.to_primitive(rt, JsHint::Number)?;
        (px, py)
    } else {
        let py = rhs.to_primitive(rt, JsHint::Number)?;
        let px = lhs.to_primitive(rt, JsHint::Number)?;
        (px, py)
    };

    if let (JsValue::Str(a), JsValue::Str(b)) = (&px, &py) {
        return Ok(Some(a.as_str() < b.as_str()));
    }

    let nx = px.to_number(rt)?;
    let ny = py.to_number(rt)?;
    Ok(number_compare(nx, ny))
}

/// `typeof`; never throws.
pub fn typeof_value(rt: &mut Runtime, v: &JsValue) -> JsValue {
    let s = rt.intern(v.type_of());
    JsValue::string(s)
}
