/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Minimal realm.
//!
//! Only what the executor contract needs: the global object, the `eval`
//! identity marker, the coroutine builtins (`Thread.create/resume/yield`)
//! and `Function.prototype.bind`.  The full standard library belongs to
//! the embedding.

use super::function;
use super::interpreter::frame::ACT_FLAG_DIRECT_EVAL;
use super::object::{self, PropKey, ATTR_CONFIGURABLE, ATTR_WRITABLE};
use super::symbol_table::Internable;
use super::thread::ThreadState;
use super::value::JsValue;
use super::{Control, LjKind, Runtime, Unwind};
use tracing::debug;

pub(crate) fn init_realm(rt: &mut Runtime) {
    let global = rt.global.clone();

    object::define_own(
        &global,
        PropKey::Name("undefined".intern()),
        JsValue::undefined(),
        0,
    );
    object::define_own(
        &global,
        PropKey::Name("NaN".intern()),
        JsValue::number(f64::NAN),
        0,
    );
    object::define_own(
        &global,
        PropKey::Name("Infinity".intern()),
        JsValue::number(f64::INFINITY),
        0,
    );
    object::define_own(
        &global,
        PropKey::Name("global".intern()),
        JsValue::object(global.clone()),
        ATTR_WRITABLE | ATTR_CONFIGURABLE,
    );

    let eval = function::new_native_function(rt, eval_native, "eval", 1);
    rt.eval_fn = JsValue::object(eval.clone());
    object::define_own(
        &global,
        PropKey::Name("eval".intern()),
        rt.eval_fn.clone(),
        ATTR_WRITABLE | ATTR_CONFIGURABLE,
    );

    let bind = function::new_native_function(rt, bind_native, "bind", 1);
    let function_proto = rt.function_proto.clone();
    object::define_own(
        &function_proto,
        PropKey::Name("bind".intern()),
        JsValue::object(bind),
        ATTR_WRITABLE | ATTR_CONFIGURABLE,
    );

    let thread_ns = object::new_object(rt);
    let create = function::new_native_function(rt, thread_create_native, "create", 1);
    let resume = function::new_native_function(rt, thread_resume_native, "resume", 3);
    let yield_ = function::new_native_function(rt, thread_yield_native, "yield", 2);
    rt.resume_fn = JsValue::object(resume.clone());
    rt.yield_fn = JsValue::object(yield_.clone());
    object::define_own(
        &thread_ns,
        PropKey::Name("create".intern()),
        JsValue::object(create),
        ATTR_WRITABLE | ATTR_CONFIGURABLE,
    );
    object::define_own(
        &thread_ns,
        PropKey::Name("resume".intern()),
        JsValue::object(resume),
        ATTR_WRITABLE | ATTR_CONFIGURABLE,
    );
    object::define_own(
        &thread_ns,
        PropKey::Name("yield".intern()),
        JsValue::object(yield_),
        ATTR_WRITABLE | ATTR_CONFIGURABLE,
    );
    object::define_own(
        &global,
        PropKey::Name("Thread".intern()),
        JsValue::object(thread_ns),
        ATTR_WRITABLE | ATTR_CONFIGURABLE,
    );
}

/// `eval`: recognized by identity for direct-eval detection.  Compiling
/// source text is out of scope, so strings raise SyntaxError; any other
/// argument is returned unchanged (E5 §15.1.2.1 step 1).
fn eval_native(rt: &mut Runtime) -> Control<JsValue> {
    let direct = rt.thr().current_act().flags & ACT_FLAG_DIRECT_EVAL != 0;
    debug!(direct, "eval invoked");
    let arg = rt.native_arg(0);
    if arg.is_string() {
        return Err(rt.throw_syntax_error("eval of source text is not supported"));
    }
    Ok(arg)
}

/// `Function.prototype.bind(thisArg, ...args)`.
fn bind_native(rt: &mut Runtime) -> Control<JsValue> {
    let target = rt.native_this();
    if !target.is_callable() {
        return Err(rt.throw_type_error("bind target not callable"));
    }
    let bound_this = rt.native_arg(0);
    let nargs = rt.native_nargs();
    let mut args = Vec::new();
    for i in 1..nargs {
        args.push(rt.native_arg(i));
    }
    let f = function::new_bound_function(rt, target, bound_this, args);
    Ok(JsValue::object(f))
}

/// `Thread.create(fn)`: spawn an inactive coroutine over a compiled
/// function.
fn thread_create_native(rt: &mut Runtime) -> Control<JsValue> {
    let func = rt.native_arg(0);
    match rt.spawn_thread(&func) {
        Ok(v) => Ok(v),
        Err(_) => Err(rt.throw_type_error("coroutine body must be a compiled function")),
    }
}

/// Shape check shared by resume and yield: the builtin must have been
/// invoked from a compiled frame so the handler has a return slot to
/// deliver into.
fn check_coroutine_context(rt: &mut Runtime, what: &str) -> Control<()> {
    let t = rt.thr();
    if t.preventcount > 0 {
        return Err(rt.throw_type_error(&format!("{} not allowed in this context", what)));
    }
    let t = rt.thr();
    let len = t.callstack.len();
    if len < 2 || !t.callstack[len - 2].is_compiled() {
        return Err(rt.throw_type_error(&format!("{} requires a calling script function", what)));
    }
    Ok(())
}

/// `Thread.resume(thr, value, iserror)`: transfer control into `thr`,
/// delivering `value` normally or injecting it as a throw at the
/// suspension point.
fn thread_resume_native(rt: &mut Runtime) -> Control<JsValue> {
    check_coroutine_context(rt, "resume")?;

    let target = rt.native_arg(0);
    let state = match &target {
        JsValue::Object(o) => o.borrow().thread_id().map(|id| rt.thread_state(id)),
        _ => None,
    };
    let state = match state {
        Some(s) => s,
        None => return Err(rt.throw_type_error("resume target not a thread")),
    };
    match state {
        ThreadState::Inactive | ThreadState::Yielded => {}
        other => {
            return Err(rt.throw_type_error(&format!("cannot resume a {:?} thread", other)));
        }
    }

    let value = rt.native_arg(1);
    let iserror = rt.native_arg(2).to_boolean();
    rt.lj.kind = LjKind::Resume;
    rt.lj.value1 = value;
    rt.lj.value2 = target;
    rt.lj.iserror = iserror;
    Err(Unwind)
}

/// `Thread.yield(value, iserror)`: suspend the current coroutine and hand
/// `value` back to the resumer.
fn thread_yield_native(rt: &mut Runtime) -> Control<JsValue> {
    check_coroutine_context(rt, "yield")?;
    if rt.thr().resumer.is_none() {
        return Err(rt.throw_type_error("yield from a thread without resumer"));
    }

    let value = rt.native_arg(0);
    let iserror = rt.native_arg(1).to_boolean();
    rt.lj.kind = LjKind::Yield;
    rt.lj.value1 = value;
    rt.lj.value2 = JsValue::undefined();
    rt.lj.iserror = iserror;
    Err(Unwind)
}

/// Compact non-heap callable for hosts that want tag-level functions.
pub fn new_lightfunc(func: super::function::NativeFn, flags: u16) -> JsValue {
    JsValue::LightFunc(super::value::LightFunc { func, flags })
}
