/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tagged values.
//!
//! [`JsValue`] is the uniform slot type held in registers, constant pools
//! and property tables.  Heap-backed variants (`Str`, `Object`, `Buffer`)
//! are reference counted through `Rc`; scalar variants are plain data.
//!
//! Invariant: every stored double is bit-identical to its
//! [`normalize_nan`] image, i.e. all NaNs collapse to one canonical
//! pattern.  Construct numbers through [`JsValue::number`] and the
//! invariant holds by construction.

use super::function::NativeFn;
use super::object::{self, JsHint, ObjRef};
use super::string::JsString;
use super::{Control, Runtime};
use std::cell::RefCell;
use std::rc::Rc;

/// The canonical NaN bit pattern shared by every NaN stored in a value slot.
pub const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

/// Collapse all NaN payloads to the canonical pattern.
#[inline]
pub fn normalize_nan(x: f64) -> f64 {
    if x.is_nan() {
        f64::from_bits(CANONICAL_NAN_BITS)
    } else {
        x
    }
}

/// Host pointer value ("pointer" type tag).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RawPtr(pub *const ());

impl RawPtr {
    pub fn null() -> RawPtr {
        RawPtr(std::ptr::null())
    }
}

/// A non-heap callable: identity is the function pointer plus flag bits.
#[derive(Clone, Copy)]
pub struct LightFunc {
    pub func: NativeFn,
    pub flags: u16,
}

impl PartialEq for LightFunc {
    fn eq(&self, other: &Self) -> bool {
        self.func as usize == other.func as usize && self.flags == other.flags
    }
}

impl std::fmt::Debug for LightFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LightFunc({:p}, {:#x})", self.func as *const (), self.flags)
    }
}

pub type BufRef = Rc<RefCell<Vec<u8>>>;

#[derive(Clone)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    /// Always canonical-NaN normalized.
    Number(f64),
    Str(Rc<JsString>),
    Object(ObjRef),
    Buffer(BufRef),
    Pointer(RawPtr),
    LightFunc(LightFunc),
}

impl Default for JsValue {
    fn default() -> Self {
        JsValue::Undefined
    }
}

impl JsValue {
    #[inline]
    pub fn undefined() -> JsValue {
        JsValue::Undefined
    }

    #[inline]
    pub fn null() -> JsValue {
        JsValue::Null
    }

    #[inline]
    pub fn bool(b: bool) -> JsValue {
        JsValue::Bool(b)
    }

    #[inline]
    pub fn number(x: f64) -> JsValue {
        JsValue::Number(normalize_nan(x))
    }

    #[inline]
    pub fn int(x: i32) -> JsValue {
        JsValue::Number(x as f64)
    }

    #[inline]
    pub fn object(o: ObjRef) -> JsValue {
        JsValue::Object(o)
    }

    #[inline]
    pub fn string(s: Rc<JsString>) -> JsValue {
        JsValue::Str(s)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, JsValue::Null)
    }

    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, JsValue::Bool(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, JsValue::Number(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, JsValue::Str(_))
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, JsValue::Object(_))
    }

    #[inline]
    pub fn is_buffer(&self) -> bool {
        matches!(self, JsValue::Buffer(_))
    }

    #[inline]
    pub fn is_lightfunc(&self) -> bool {
        matches!(self, JsValue::LightFunc(_))
    }

    #[inline]
    pub fn get_bool(&self) -> bool {
        match self {
            JsValue::Bool(b) => *b,
            _ => panic!("get_bool on non-boolean"),
        }
    }

    #[inline]
    pub fn get_number(&self) -> f64 {
        match self {
            JsValue::Number(x) => *x,
            _ => panic!("get_number on non-number"),
        }
    }

    #[inline]
    pub fn get_string(&self) -> Rc<JsString> {
        match self {
            JsValue::Str(s) => s.clone(),
            _ => panic!("get_string on non-string"),
        }
    }

    #[inline]
    pub fn get_object(&self) -> ObjRef {
        match self {
            JsValue::Object(o) => o.clone(),
            _ => panic!("get_object on non-object"),
        }
    }

    pub fn is_callable(&self) -> bool {
        match self {
            JsValue::LightFunc(_) => true,
            JsValue::Object(o) => o.borrow().is_callable(),
            _ => false,
        }
    }

    /// `typeof` string; light functions and callable objects report
    /// "function", plain objects and null report "object".
    pub fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object",
            JsValue::Bool(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::Str(_) => "string",
            JsValue::Buffer(_) => "buffer",
            JsValue::Pointer(_) => "pointer",
            JsValue::LightFunc(_) => "function",
            JsValue::Object(o) => {
                if o.borrow().is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// ToBoolean has no side effects for any input type.
    pub fn to_boolean(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Bool(b) => *b,
            JsValue::Number(x) => *x != 0.0 && !x.is_nan(),
            JsValue::Str(s) => !s.is_empty(),
            JsValue::Buffer(b) => !b.borrow().is_empty(),
            JsValue::Pointer(p) => !p.0.is_null(),
            JsValue::LightFunc(_) | JsValue::Object(_) => true,
        }
    }

    pub fn to_number(&self, rt: &mut Runtime) -> Control<f64> {
        match self {
            JsValue::Number(x) => Ok(*x),
            JsValue::Undefined => Ok(normalize_nan(f64::NAN)),
            JsValue::Null => Ok(0.0),
            JsValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            JsValue::Str(s) => Ok(string_to_number(s.as_str())),
            JsValue::Buffer(b) => {
                let text = String::from_utf8_lossy(&b.borrow()).into_owned();
                Ok(string_to_number(&text))
            }
            JsValue::Pointer(p) => Ok(if p.0.is_null() { 0.0 } else { 1.0 }),
            JsValue::LightFunc(_) => Ok(normalize_nan(f64::NAN)),
            JsValue::Object(_) => {
                let prim = self.to_primitive(rt, JsHint::Number)?;
                prim.to_number(rt)
            }
        }
    }

    pub fn to_int32(&self, rt: &mut Runtime) -> Control<i32> {
        Ok(number_to_int32(self.to_number(rt)?))
    }

    pub fn to_uint32(&self, rt: &mut Runtime) -> Control<u32> {
        Ok(number_to_uint32(self.to_number(rt)?))
    }

    pub fn to_primitive(&self, rt: &mut Runtime, hint: JsHint) -> Control<JsValue> {
        match self {
            JsValue::Object(o) => object::to_primitive(rt, &o.clone(), hint),
            _ => Ok(self.clone()),
        }
    }

    pub fn to_string(&self, rt: &mut Runtime) -> Control<Rc<JsString>> {
        match self {
            JsValue::Str(s) => Ok(s.clone()),
            JsValue::Undefined => Ok(rt.intern("undefined")),
            JsValue::Null => Ok(rt.intern("null")),
            JsValue::Bool(b) => Ok(rt.intern(if *b { "true" } else { "false" })),
            JsValue::Number(x) => {
                let text = number_to_string(*x);
                Ok(rt.intern(&text))
            }
            JsValue::Buffer(b) => {
                let text = String::from_utf8_lossy(&b.borrow()).into_owned();
                rt.intern_checked(&text)
            }
            JsValue::Pointer(p) => {
                let text = format!("pointer:{:p}", p.0);
                Ok(rt.intern(&text))
            }
            JsValue::LightFunc(_) => Ok(rt.intern("function lightfunc() { [native code] }")),
            JsValue::Object(_) => {
                let prim = self.to_primitive(rt, JsHint::String)?;
                prim.to_string(rt)
            }
        }
    }

    pub fn to_object(&self, rt: &mut Runtime) -> Control<ObjRef> {
        object::to_object(rt, self)
    }

    /// ES5 strict equality (§11.9.6).  Heap values compare by identity,
    /// which for interned strings is content equality.
    pub fn strict_equals(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Number(a), JsValue::Number(b)) => a == b,
            (JsValue::Undefined, JsValue::Undefined) => true,
            (JsValue::Null, JsValue::Null) => true,
            (JsValue::Bool(a), JsValue::Bool(b)) => a == b,
            (JsValue::Str(a), JsValue::Str(b)) => a.sym() == b.sym(),
            (JsValue::Object(a), JsValue::Object(b)) => Rc::ptr_eq(a, b),
            (JsValue::Buffer(a), JsValue::Buffer(b)) => Rc::ptr_eq(a, b),
            (JsValue::Pointer(a), JsValue::Pointer(b)) => a == b,
            (JsValue::LightFunc(a), JsValue::LightFunc(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Debug for JsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Bool(b) => write!(f, "{}", b),
            JsValue::Number(x) => write!(f, "{}", x),
            JsValue::Str(s) => write!(f, "{:?}", s.as_str()),
            JsValue::Object(o) => write!(f, "[object {:?}]", o.borrow().class),
            JsValue::Buffer(b) => write!(f, "[buffer {} bytes]", b.borrow().len()),
            JsValue::Pointer(p) => write!(f, "pointer:{:p}", p.0),
            JsValue::LightFunc(lf) => write!(f, "{:?}", lf),
        }
    }
}

/// ES5 §9.5 ToInt32 on an already-coerced number.
pub fn number_to_int32(x: f64) -> i32 {
    if !x.is_finite() || x == 0.0 {
        return 0;
    }
    let x = x.trunc();
    let m = x.rem_euclid(4294967296.0);
    if m >= 2147483648.0 {
        (m - 4294967296.0) as i32
    } else {
        m as i32
    }
}

/// ES5 §9.6 ToUint32 on an already-coerced number.
pub fn number_to_uint32(x: f64) -> u32 {
    if !x.is_finite() || x == 0.0 {
        return 0;
    }
    x.trunc().rem_euclid(4294967296.0) as u32
}

/// ES5 §9.8.1 ToString for numbers.
pub fn number_to_string(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let mut buffer = ryu_js::Buffer::new();
    buffer.format(x).to_string()
}

/// ES5 §9.3.1 ToNumber for strings: whitespace-trimmed decimal or hex
/// literal, `Infinity`, empty string is zero, anything else NaN.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_matches(|c: char| {
        c.is_whitespace() || c == '\u{feff}' || c == '\u{2028}' || c == '\u{2029}'
    });
    if t.is_empty() {
        return 0.0;
    }

    let (neg, rest) = match t.as_bytes()[0] {
        b'+' => (false, &t[1..]),
        b'-' => (true, &t[1..]),
        _ => (false, t),
    };
    if rest == "Infinity" {
        return if neg { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    if !neg && (rest.starts_with("0x") || rest.starts_with("0X")) {
        let digits = &rest[2..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return normalize_nan(f64::NAN);
        }
        let mut acc = 0.0f64;
        for b in digits.bytes() {
            let d = (b as char).to_digit(16).unwrap() as f64;
            acc = acc * 16.0 + d;
        }
        return acc;
    }

    // Reject forms Rust accepts but ECMAScript does not ("inf", "nan",
    // underscores); the remaining charset is safe to hand to the float
    // parser.
    let ok = rest
        .bytes()
        .all(|b| b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || b == b'+' || b == b'-');
    if !ok {
        return normalize_nan(f64::NAN);
    }
    match rest.parse::<f64>() {
        Ok(v) => {
            if neg {
                -v
            } else {
                v
            }
        }
        Err(_) => normalize_nan(f64::NAN),
    }
}
