/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Callable representations.
//!
//! Function objects carry one of three payloads: a compiled closure (code
//! template plus captured scope), a native function pointer, or a bound
//! wrapper around another callable.  Light functions are not objects at
//! all; they live directly in the value tag (see
//! [`crate::vm::value::LightFunc`]).

use super::code_block::CodeBlock;
use super::environment::EnvRef;
use super::object::{self, Class, JsObject, ObjectData, ObjRef, PropKey, ATTR_CONFIGURABLE};
use super::symbol_table::Internable;
use super::value::JsValue;
use super::{Control, Runtime};
use std::rc::Rc;

/// Native function signature.  Arguments are read from the activation
/// window through [`Runtime::native_arg`].
pub type NativeFn = fn(&mut Runtime) -> Control<JsValue>;

/// Bound-function chain walk limit; doubles as a cycle detector.
pub const BOUND_CHAIN_SANITY: u32 = 10_000;

pub enum JsFunction {
    /// A realized closure over a compiled template.
    Vm {
        code: Rc<CodeBlock>,
        scope: Option<EnvRef>,
    },
    /// Host function.
    Native { func: NativeFn, name: &'static str },
    /// Callable wrapping another callable with a pre-bound `this` and
    /// leading arguments.
    Bound {
        target: JsValue,
        this: JsValue,
        args: Vec<JsValue>,
    },
}

impl JsFunction {
    pub fn is_bound(&self) -> bool {
        matches!(self, JsFunction::Bound { .. })
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, JsFunction::Vm { .. })
    }
}

/// Realize a closure from an inner-function template, capturing the
/// activation's current environments.
pub fn push_closure(rt: &mut Runtime, code: Rc<CodeBlock>, scope: Option<EnvRef>) -> ObjRef {
    let f = new_function_object(
        rt,
        JsFunction::Vm {
            code: code.clone(),
            scope,
        },
    );

    // Fresh .prototype object so the closure works as a constructor.
    let proto = object::new_object(rt);
    object::define_own(
        &proto,
        PropKey::Name("constructor".intern()),
        JsValue::object(f.clone()),
        ATTR_CONFIGURABLE,
    );
    object::define_own(
        &f,
        PropKey::Name("prototype".intern()),
        JsValue::object(proto),
        0,
    );
    let name = rt.intern(&code.name);
    object::define_own(
        &f,
        PropKey::Name("name".intern()),
        JsValue::string(name),
        ATTR_CONFIGURABLE,
    );
    object::define_own(
        &f,
        PropKey::Name("length".intern()),
        JsValue::number(code.nargs as f64),
        ATTR_CONFIGURABLE,
    );
    f
}

pub fn new_native_function(rt: &mut Runtime, func: NativeFn, name: &'static str, len: u32) -> ObjRef {
    let f = new_function_object(rt, JsFunction::Native { func, name });
    let n = rt.intern(name);
    object::define_own(
        &f,
        PropKey::Name("name".intern()),
        JsValue::string(n),
        ATTR_CONFIGURABLE,
    );
    object::define_own(
        &f,
        PropKey::Name("length".intern()),
        JsValue::number(len as f64),
        ATTR_CONFIGURABLE,
    );
    f
}

pub fn new_bound_function(
    rt: &mut Runtime,
    target: JsValue,
    this: JsValue,
    args: Vec<JsValue>,
) -> ObjRef {
    new_function_object(rt, JsFunction::Bound { target, this, args })
}

fn new_function_object(rt: &mut Runtime, data: JsFunction) -> ObjRef {
    let mut obj = JsObject::new(Class::Function, Some(rt.function_proto.clone()));
    obj.data = ObjectData::Function(data);
    ObjRef::new(std::cell::RefCell::new(obj))
}

/// Follow a bound-function chain to the final non-bound target.  The walk
/// is bounded so a cyclic chain raises InternalError instead of looping.
pub fn find_nonbound_target(rt: &mut Runtime, func: &JsValue) -> Control<JsValue> {
    let mut cur = func.clone();
    let mut sanity = BOUND_CHAIN_SANITY;
    loop {
        let next = match &cur {
            JsValue::Object(o) => {
                let ob = o.borrow();
                match &ob.data {
                    ObjectData::Function(JsFunction::Bound { target, .. }) => Some(target.clone()),
                    _ => None,
                }
            }
            _ => None,
        };
        match next {
            Some(t) => {
                cur = t;
                sanity -= 1;
                if sanity == 0 {
                    return Err(rt.internal_error("function call bound chain sanity exceeded"));
                }
            }
            None => return Ok(cur),
        }
    }
}
