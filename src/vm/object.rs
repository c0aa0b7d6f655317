/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Object model.
//!
//! Reference-counted records with a class tag, prototype link, an
//! insertion-ordered named property table and a `VecMap` element part.
//! The executor only relies on the operations exported here: get / put /
//! delete, literal initialization, `instanceof`, `in`, `typeof` support,
//! `to_primitive`, length updates and for-in enumerators.
//!
//! Accessor invocation re-enters the executor through the call API, so any
//! `RefCell` borrow is dropped before control can reach script code.

use super::function::JsFunction;
use super::interpreter::call::{call_value, CallFlags};
use super::string::JsString;
use super::symbol_table::{symbol_table, Internable, SymbolId};
use super::thread::ThreadId;
use super::value::JsValue;
use super::{Control, Runtime};
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use vec_map::VecMap;

pub type ObjRef = Rc<RefCell<JsObject>>;

pub const ATTR_WRITABLE: u8 = 1 << 0;
pub const ATTR_ENUMERABLE: u8 = 1 << 1;
pub const ATTR_CONFIGURABLE: u8 = 1 << 2;
pub const ATTR_WEC: u8 = ATTR_WRITABLE | ATTR_ENUMERABLE | ATTR_CONFIGURABLE;

/// ToPrimitive hint.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JsHint {
    None,
    Number,
    String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Class {
    Object,
    Array,
    Function,
    Error,
    Global,
    Number,
    String,
    Boolean,
    Thread,
    Enumerator,
}

/// A property key: array index or interned name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PropKey {
    Index(u32),
    Name(SymbolId),
}

#[derive(Clone)]
pub enum PropSlot {
    Data { value: JsValue, attrs: u8 },
    Accessor { get: JsValue, set: JsValue, attrs: u8 },
}

impl PropSlot {
    pub fn attrs(&self) -> u8 {
        match self {
            PropSlot::Data { attrs, .. } => *attrs,
            PropSlot::Accessor { attrs, .. } => *attrs,
        }
    }

    pub fn is_enumerable(&self) -> bool {
        self.attrs() & ATTR_ENUMERABLE != 0
    }

    pub fn is_configurable(&self) -> bool {
        self.attrs() & ATTR_CONFIGURABLE != 0
    }
}

pub struct Enumerator {
    keys: Vec<JsValue>,
    index: usize,
}

pub enum ObjectData {
    Ordinary,
    Array { length: u32 },
    Function(JsFunction),
    Thread(ThreadId),
    Enumerator(Enumerator),
    NumberObj(f64),
    BoolObj(bool),
    StringObj(Rc<JsString>),
}

pub struct JsObject {
    pub class: Class,
    pub extensible: bool,
    pub prototype: Option<ObjRef>,
    props: Vec<(SymbolId, PropSlot)>,
    elems: VecMap<PropSlot>,
    pub data: ObjectData,
}

static SYM_LENGTH: Lazy<SymbolId> = Lazy::new(|| "length".intern());
static SYM_PROTOTYPE: Lazy<SymbolId> = Lazy::new(|| "prototype".intern());

impl JsObject {
    pub fn new(class: Class, prototype: Option<ObjRef>) -> JsObject {
        JsObject {
            class,
            extensible: true,
            prototype,
            props: Vec::new(),
            elems: VecMap::new(),
            data: ObjectData::Ordinary,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.data, ObjectData::Function(_))
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        match self.data {
            ObjectData::Thread(id) => Some(id),
            _ => None,
        }
    }

    /// Own-property lookup including virtual slots (array/string-wrapper
    /// lengths).  String wrapper character slots are handled by the callers
    /// that can intern.
    fn lookup_own(&self, key: PropKey) -> Option<PropSlot> {
        match key {
            PropKey::Index(i) => self.elems.get(i as usize).cloned(),
            PropKey::Name(sym) => {
                if sym == *SYM_LENGTH {
                    match &self.data {
                        ObjectData::Array { length } => {
                            return Some(PropSlot::Data {
                                value: JsValue::number(*length as f64),
                                attrs: ATTR_WRITABLE,
                            });
                        }
                        ObjectData::StringObj(s) => {
                            return Some(PropSlot::Data {
                                value: JsValue::number(s.char_len() as f64),
                                attrs: 0,
                            });
                        }
                        _ => {}
                    }
                }
                self.props
                    .iter()
                    .find(|(k, _)| *k == sym)
                    .map(|(_, slot)| slot.clone())
            }
        }
    }

    fn insert_own(&mut self, key: PropKey, slot: PropSlot) {
        match key {
            PropKey::Index(i) => {
                self.elems.insert(i as usize, slot);
                if let ObjectData::Array { length } = &mut self.data {
                    if i >= *length {
                        *length = i + 1;
                    }
                }
            }
            PropKey::Name(sym) => {
                if let Some(entry) = self.props.iter_mut().find(|(k, _)| *k == sym) {
                    entry.1 = slot;
                } else {
                    self.props.push((sym, slot));
                }
            }
        }
    }

    fn remove_own(&mut self, key: PropKey) {
        match key {
            PropKey::Index(i) => {
                self.elems.remove(i as usize);
            }
            PropKey::Name(sym) => {
                self.props.retain(|(k, _)| *k != sym);
            }
        }
    }

    fn has_virtual(&self, key: PropKey) -> bool {
        match (&self.data, key) {
            (ObjectData::Array { .. }, PropKey::Name(sym)) => sym == *SYM_LENGTH,
            (ObjectData::StringObj(_), PropKey::Name(sym)) => sym == *SYM_LENGTH,
            (ObjectData::StringObj(s), PropKey::Index(i)) => i < s.char_len(),
            _ => false,
        }
    }
}

pub fn new_object(rt: &mut Runtime) -> ObjRef {
    Rc::new(RefCell::new(JsObject::new(
        Class::Object,
        Some(rt.object_proto.clone()),
    )))
}

pub fn new_array(rt: &mut Runtime) -> ObjRef {
    let mut obj = JsObject::new(Class::Array, Some(rt.array_proto.clone()));
    obj.data = ObjectData::Array { length: 0 };
    Rc::new(RefCell::new(obj))
}

/// Key coercion: exact array indices stay numeric, everything else is
/// interned by its string image.
pub fn to_prop_key(rt: &mut Runtime, v: &JsValue) -> Control<PropKey> {
    if let JsValue::Number(x) = v {
        if x.fract() == 0.0 && *x >= 0.0 && *x < 4294967295.0 {
            return Ok(PropKey::Index(*x as u32));
        }
    }
    let s = v.to_string(rt)?;
    Ok(string_prop_key(s.as_str()))
}

fn string_prop_key(s: &str) -> PropKey {
    if !s.is_empty() && s.len() <= 10 && s.bytes().all(|b| b.is_ascii_digit()) {
        // canonical indices only: no leading zeros
        if s == "0" || !s.starts_with('0') {
            if let Ok(i) = s.parse::<u64>() {
                if i < 4294967295 {
                    return PropKey::Index(i as u32);
                }
            }
        }
    }
    PropKey::Name(s.intern())
}

pub fn key_description(key: PropKey) -> String {
    match key {
        PropKey::Index(i) => i.to_string(),
        PropKey::Name(sym) => symbol_table().description(sym).to_string(),
    }
}

/// `get(obj, key)`: walks the prototype chain, invoking getters against
/// the original receiver.
pub fn get(rt: &mut Runtime, obj: &ObjRef, key: PropKey) -> Control<JsValue> {
    let receiver = JsValue::object(obj.clone());
    get_with_receiver(rt, obj, key, &receiver)
}

fn get_with_receiver(
    rt: &mut Runtime,
    obj: &ObjRef,
    key: PropKey,
    receiver: &JsValue,
) -> Control<JsValue> {
    let mut cur = obj.clone();
    loop {
        // string wrapper character slots need the interner
        if let PropKey::Index(i) = key {
            let ch = match &cur.borrow().data {
                ObjectData::StringObj(s) => s.as_str().chars().nth(i as usize).map(|c| c.to_string()),
                _ => None,
            };
            if let Some(ch) = ch {
                let s = rt.intern(&ch);
                return Ok(JsValue::string(s));
            }
        }

        let found = cur.borrow().lookup_own(key);
        if let Some(slot) = found {
            return match slot {
                PropSlot::Data { value, .. } => Ok(value),
                PropSlot::Accessor { get, .. } => {
                    if get.is_callable() {
                        call_value(rt, &get, receiver.clone(), &[], CallFlags::empty())
                    } else {
                        Ok(JsValue::undefined())
                    }
                }
            };
        }

        let next = cur.borrow().prototype.clone();
        match next {
            Some(p) => cur = p,
            None => return Ok(JsValue::undefined()),
        }
    }
}

pub fn get_by_name(rt: &mut Runtime, obj: &ObjRef, name: &str) -> Control<JsValue> {
    let key = string_prop_key(name);
    get(rt, obj, key)
}

enum PutAction {
    WriteOwn,
    CallSetter(JsValue),
    CreateOwn,
    Reject(&'static str),
    SetArrayLength,
}

/// `put(obj, key, value, strict)`: ES5 [[Put]] semantics; returns whether
/// the write took effect (strict mode turns rejections into TypeErrors).
pub fn put(rt: &mut Runtime, obj: &ObjRef, key: PropKey, value: JsValue, strict: bool) -> Control<bool> {
    let action = decide_put(obj, key);
    match action {
        PutAction::SetArrayLength => {
            let n = value.to_number(rt)?;
            let len = super::value::number_to_uint32(n);
            if len as f64 != n {
                return Err(rt.throw_range_error("invalid array length"));
            }
            length_set(rt, obj, len);
            Ok(true)
        }
        PutAction::WriteOwn => {
            let mut ob = obj.borrow_mut();
            match key {
                PropKey::Index(i) => {
                    if let Some(PropSlot::Data { value: v, .. }) = ob.elems.get_mut(i as usize) {
                        *v = value;
                    }
                }
                PropKey::Name(sym) => {
                    if let Some((_, PropSlot::Data { value: v, .. })) =
                        ob.props.iter_mut().find(|(k, _)| *k == sym)
                    {
                        *v = value;
                    }
                }
            }
            Ok(true)
        }
        PutAction::CallSetter(setter) => {
            let this = JsValue::object(obj.clone());
            call_value(rt, &setter, this, &[value], CallFlags::empty())?;
            Ok(true)
        }
        PutAction::CreateOwn => {
            obj.borrow_mut().insert_own(
                key,
                PropSlot::Data {
                    value,
                    attrs: ATTR_WEC,
                },
            );
            Ok(true)
        }
        PutAction::Reject(msg) => {
            if strict {
                Err(rt.throw_type_error(msg))
            } else {
                Ok(false)
            }
        }
    }
}

fn decide_put(obj: &ObjRef, key: PropKey) -> PutAction {
    {
        let ob = obj.borrow();
        if let (ObjectData::Array { .. }, PropKey::Name(sym)) = (&ob.data, key) {
            if sym == *SYM_LENGTH {
                return PutAction::SetArrayLength;
            }
        }
        if let ObjectData::StringObj(_) = &ob.data {
            if ob.has_virtual(key) {
                return PutAction::Reject("property not writable");
            }
        }
        if let Some(slot) = ob.lookup_own(key) {
            return match slot {
                PropSlot::Data { attrs, .. } => {
                    if attrs & ATTR_WRITABLE != 0 {
                        PutAction::WriteOwn
                    } else {
                        PutAction::Reject("property not writable")
                    }
                }
                PropSlot::Accessor { set, .. } => {
                    if set.is_callable() {
                        PutAction::CallSetter(set)
                    } else {
                        PutAction::Reject("setter undefined")
                    }
                }
            };
        }
    }

    // inherited properties can still capture or block the write
    let mut cur = obj.borrow().prototype.clone();
    while let Some(p) = cur {
        let found = p.borrow().lookup_own(key);
        if let Some(slot) = found {
            return match slot {
                PropSlot::Accessor { set, .. } => {
                    if set.is_callable() {
                        PutAction::CallSetter(set)
                    } else {
                        PutAction::Reject("setter undefined")
                    }
                }
                PropSlot::Data { attrs, .. } => {
                    if attrs & ATTR_WRITABLE != 0 {
                        PutAction::CreateOwn
                    } else {
                        PutAction::Reject("property not writable")
                    }
                }
            };
        }
        cur = p.borrow().prototype.clone();
    }

    if obj.borrow().extensible {
        PutAction::CreateOwn
    } else {
        PutAction::Reject("object not extensible")
    }
}

/// `delete(obj, key, strict)`.
pub fn delete(rt: &mut Runtime, obj: &ObjRef, key: PropKey, strict: bool) -> Control<bool> {
    let deleted = {
        let mut ob = obj.borrow_mut();
        if ob.has_virtual(key) {
            false
        } else {
            match ob.lookup_own(key) {
                None => true,
                Some(slot) => {
                    if slot.is_configurable() {
                        ob.remove_own(key);
                        true
                    } else {
                        false
                    }
                }
            }
        }
    };
    if !deleted && strict {
        return Err(rt.throw_type_error("property not configurable"));
    }
    Ok(deleted)
}

/// Define an own data property with writable/enumerable/configurable
/// attributes, bypassing setters (object/array literal initializers).
pub fn define_own_wec(obj: &ObjRef, key: PropKey, value: JsValue) {
    obj.borrow_mut().insert_own(
        key,
        PropSlot::Data {
            value,
            attrs: ATTR_WEC,
        },
    );
}

pub fn define_own(obj: &ObjRef, key: PropKey, value: JsValue, attrs: u8) {
    obj.borrow_mut().insert_own(key, PropSlot::Data { value, attrs });
}

/// Install a getter or setter for an object-literal accessor slot,
/// merging with a previously installed half.
pub fn define_accessor(obj: &ObjRef, key: PropKey, func: JsValue, is_set: bool) {
    let mut ob = obj.borrow_mut();
    let existing = ob.lookup_own(key);
    let (mut get, mut set) = match existing {
        Some(PropSlot::Accessor { get, set, .. }) => (get, set),
        _ => (JsValue::undefined(), JsValue::undefined()),
    };
    if is_set {
        set = func;
    } else {
        get = func;
    }
    ob.insert_own(
        key,
        PropSlot::Accessor {
            get,
            set,
            attrs: ATTR_ENUMERABLE | ATTR_CONFIGURABLE,
        },
    );
}

/// `in`-style lookup along the prototype chain; no side effects.
pub fn has_property(obj: &ObjRef, key: PropKey) -> bool {
    let mut cur = obj.clone();
    loop {
        {
            let ob = cur.borrow();
            if ob.has_virtual(key) || ob.lookup_own(key).is_some() {
                return true;
            }
        }
        let next = cur.borrow().prototype.clone();
        match next {
            Some(p) => cur = p,
            None => return false,
        }
    }
}

const PROTO_CHAIN_SANITY: u32 = 10_000;

/// ES5 §11.8.6 `instanceof`.
pub fn instanceof(rt: &mut Runtime, x: &JsValue, target: &JsValue) -> Control<bool> {
    let tobj = match target {
        JsValue::Object(o) if o.borrow().is_callable() => o.clone(),
        _ => return Err(rt.throw_type_error("invalid instanceof rval")),
    };
    let final_target = super::function::find_nonbound_target(rt, &JsValue::object(tobj))?;
    let fobj = match &final_target {
        JsValue::Object(o) => o.clone(),
        _ => return Err(rt.throw_type_error("invalid instanceof rval")),
    };
    let proto = get(rt, &fobj, PropKey::Name(*SYM_PROTOTYPE))?;
    let proto = match proto {
        JsValue::Object(o) => o,
        _ => return Err(rt.throw_type_error("instanceof rval prototype is not an object")),
    };

    let mut cur = match x {
        JsValue::Object(o) => o.borrow().prototype.clone(),
        _ => return Ok(false),
    };
    let mut sanity = PROTO_CHAIN_SANITY;
    while let Some(p) = cur {
        if Rc::ptr_eq(&p, &proto) {
            return Ok(true);
        }
        cur = p.borrow().prototype.clone();
        sanity -= 1;
        if sanity == 0 {
            return Err(rt.internal_error("prototype chain sanity exceeded"));
        }
    }
    Ok(false)
}

/// ES5 §11.8.7 `in`.
pub fn in_operator(rt: &mut Runtime, key: &JsValue, target: &JsValue) -> Control<bool> {
    let obj = match target {
        JsValue::Object(o) => o.clone(),
        _ => return Err(rt.throw_type_error("invalid 'in' rval")),
    };
    let key = to_prop_key(rt, key)?;
    Ok(has_property(&obj, key))
}

/// ES5 §8.12.8 DefaultValue.
pub fn to_primitive(rt: &mut Runtime, obj: &ObjRef, hint: JsHint) -> Control<JsValue> {
    let order: [&str; 2] = if hint == JsHint::String {
        ["toString", "valueOf"]
    } else {
        ["valueOf", "toString"]
    };
    // unwrap primitive wrappers directly; their prototypes are bare in
    // this minimal realm
    match &obj.borrow().data {
        ObjectData::NumberObj(x) => return Ok(JsValue::number(*x)),
        ObjectData::BoolObj(b) => return Ok(JsValue::bool(*b)),
        ObjectData::StringObj(s) => return Ok(JsValue::string(s.clone())),
        _ => {}
    }
    for name in order.iter() {
        let m = get_by_name(rt, obj, name)?;
        if m.is_callable() {
            let r = call_value(rt, &m, JsValue::object(obj.clone()), &[], CallFlags::empty())?;
            if !r.is_object() {
                return Ok(r);
            }
        }
    }
    Err(rt.throw_type_error("cannot coerce object to primitive"))
}

/// ToObject: wraps primitives, rejects null/undefined.
pub fn to_object(rt: &mut Runtime, v: &JsValue) -> Control<ObjRef> {
    match v {
        JsValue::Object(o) => Ok(o.clone()),
        JsValue::Undefined | JsValue::Null => {
            Err(rt.throw_type_error("cannot coerce undefined or null to object"))
        }
        JsValue::Number(x) => {
            let mut obj = JsObject::new(Class::Number, Some(rt.object_proto.clone()));
            obj.data = ObjectData::NumberObj(*x);
            Ok(Rc::new(RefCell::new(obj)))
        }
        JsValue::Bool(b) => {
            let mut obj = JsObject::new(Class::Boolean, Some(rt.object_proto.clone()));
            obj.data = ObjectData::BoolObj(*b);
            Ok(Rc::new(RefCell::new(obj)))
        }
        JsValue::Str(s) => {
            let mut obj = JsObject::new(Class::String, Some(rt.object_proto.clone()));
            obj.data = ObjectData::StringObj(s.clone());
            Ok(Rc::new(RefCell::new(obj)))
        }
        JsValue::LightFunc(lf) => {
            let f = lf.func;
            Ok(super::function::new_native_function(rt, f, "lightfunc", 0))
        }
        JsValue::Buffer(_) | JsValue::Pointer(_) => Ok(new_object(rt)),
    }
}

/// Property read with an arbitrary base value (`GETPROP`): primitives get
/// their virtual properties without materializing a wrapper.
pub fn get_value_prop(rt: &mut Runtime, base: &JsValue, key_v: &JsValue) -> Control<JsValue> {
    if base.is_nullish() {
        let _ = key_v;
        return Err(rt.throw_type_error(&format!("cannot read property of {:?}", base)));
    }
    let key = to_prop_key(rt, key_v)?;
    match base {
        JsValue::Object(o) => {
            let o = o.clone();
            get_with_receiver(rt, &o, key, base)
        }
        JsValue::Str(s) => match key {
            PropKey::Name(sym) if sym == *SYM_LENGTH => Ok(JsValue::number(s.char_len() as f64)),
            PropKey::Index(i) => match s.as_str().chars().nth(i as usize) {
                Some(c) => {
                    let cs = c.to_string();
                    Ok(JsValue::string(rt.intern(&cs)))
                }
                None => Ok(JsValue::undefined()),
            },
            _ => Ok(JsValue::undefined()),
        },
        JsValue::Buffer(b) => match key {
            PropKey::Name(sym) if sym == *SYM_LENGTH => {
                Ok(JsValue::number(b.borrow().len() as f64))
            }
            PropKey::Index(i) => match b.borrow().get(i as usize) {
                Some(byte) => Ok(JsValue::number(*byte as f64)),
                None => Ok(JsValue::undefined()),
            },
            _ => Ok(JsValue::undefined()),
        },
        _ => Ok(JsValue::undefined()),
    }
}

/// Property write with an arbitrary base value (`PUTPROP`).
pub fn put_value_prop(
    rt: &mut Runtime,
    base: &JsValue,
    key_v: &JsValue,
    value: JsValue,
    strict: bool,
) -> Control<()> {
    if base.is_nullish() {
        return Err(rt.throw_type_error("cannot write property of undefined or null"));
    }
    let key = to_prop_key(rt, key_v)?;
    match base {
        JsValue::Object(o) => {
            let o = o.clone();
            put(rt, &o, key, value, strict)?;
            Ok(())
        }
        JsValue::Buffer(b) => {
            if let PropKey::Index(i) = key {
                let byte = value.to_number(rt)? as i64 as u8;
                let b = b.clone();
                let mut buf = b.borrow_mut();
                if (i as usize) < buf.len() {
                    buf[i as usize] = byte;
                    return Ok(());
                }
            }
            if strict {
                return Err(rt.throw_type_error("property not writable"));
            }
            Ok(())
        }
        _ => {
            // primitive base: writes are dropped (non-strict) or rejected
            if strict {
                return Err(rt.throw_type_error("cannot write property of primitive value"));
            }
            Ok(())
        }
    }
}

/// Property delete with an arbitrary base value (`DELPROP`).
pub fn delete_value_prop(
    rt: &mut Runtime,
    base: &JsValue,
    key_v: &JsValue,
    strict: bool,
) -> Control<bool> {
    if base.is_nullish() {
        return Err(rt.throw_type_error("cannot delete property of undefined or null"));
    }
    let key = to_prop_key(rt, key_v)?;
    match base {
        JsValue::Object(o) => {
            let o = o.clone();
            delete(rt, &o, key, strict)
        }
        _ => Ok(true),
    }
}

/// `length_set`: array lengths shrink the element part; other classes get
/// a plain data property.
pub fn length_set(rt: &mut Runtime, obj: &ObjRef, len: u32) {
    let _ = rt;
    let is_array = matches!(obj.borrow().data, ObjectData::Array { .. });
    if is_array {
        let mut ob = obj.borrow_mut();
        let o = &mut *ob;
        let old = match &o.data {
            ObjectData::Array { length } => *length,
            _ => 0,
        };
        if len < old {
            let doomed: Vec<usize> = o.elems.keys().filter(|&k| k >= len as usize).collect();
            for k in doomed {
                o.elems.remove(k);
            }
        }
        if let ObjectData::Array { length } = &mut o.data {
            *length = len;
        }
    } else {
        define_own(
            obj,
            PropKey::Name(*SYM_LENGTH),
            JsValue::number(len as f64),
            ATTR_WRITABLE,
        );
    }
}

/// Build a for-in enumerator: index keys ascending, then named keys in
/// insertion order, walking the prototype chain with shadowing.
pub fn enumerator_create(rt: &mut Runtime, obj: &ObjRef) -> ObjRef {
    let mut keys: Vec<JsValue> = Vec::new();
    let mut seen: HashSet<PropKey> = HashSet::new();
    let mut cur = Some(obj.clone());
    while let Some(o) = cur {
        let (indices, names, string_chars) = {
            let ob = o.borrow();
            let mut indices: Vec<u32> = ob
                .elems
                .iter()
                .filter(|(_, slot)| slot.is_enumerable())
                .map(|(k, _)| k as u32)
                .collect();
            indices.sort_unstable();
            let names: Vec<SymbolId> = ob
                .props
                .iter()
                .filter(|(_, slot)| slot.is_enumerable())
                .map(|(k, _)| *k)
                .collect();
            let string_chars = match &ob.data {
                ObjectData::StringObj(s) => s.char_len(),
                _ => 0,
            };
            (indices, names, string_chars)
        };
        for i in 0..string_chars {
            if seen.insert(PropKey::Index(i)) {
                keys.push(JsValue::string(rt.intern(&i.to_string())));
            }
        }
        for i in indices {
            if seen.insert(PropKey::Index(i)) {
                keys.push(JsValue::string(rt.intern(&i.to_string())));
            }
        }
        for sym in names {
            if seen.insert(PropKey::Name(sym)) {
                keys.push(JsValue::string(rt.string_from_sym(sym)));
            }
        }
        cur = o.borrow().prototype.clone();
    }

    let mut e = JsObject::new(Class::Enumerator, None);
    e.data = ObjectData::Enumerator(Enumerator { keys, index: 0 });
    Rc::new(RefCell::new(e))
}

/// Advance the enumerator; `None` when exhausted.
pub fn enumerator_next(enum_obj: &ObjRef) -> Option<JsValue> {
    let mut ob = enum_obj.borrow_mut();
    match &mut ob.data {
        ObjectData::Enumerator(e) => {
            if e.index < e.keys.len() {
                let key = e.keys[e.index].clone();
                e.index += 1;
                Some(key)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Error-class test used to set the unwind state's `iserror` flag.
pub fn is_error(v: &JsValue) -> bool {
    match v {
        JsValue::Object(o) => o.borrow().class == Class::Error,
        _ => false,
    }
}
