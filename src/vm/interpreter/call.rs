/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Call setup.
//!
//! Two regimes exist.  Compiled-to-compiled calls go through
//! [`ecma_call_setup`]: a new (or, for tailcalls, the reused) activation is
//! configured in place and the dispatch loop restarts, so script-to-script
//! calls never grow the host stack.  Native targets and re-entrant calls
//! from collaborators (accessors, `to_primitive`, constructors) run
//! through [`native_call`]/[`call_value`], which do recurse.
//!
//! A call window occupies valstack slots `[w, w+2+nargs)`: callee at `w`,
//! `this` at `w+1`, arguments after.  The callee's register file starts at
//! `w+2`, and the caller's `idx_retval` points back at `w`.

use crate::vm::code_block::CodeBlock;
use crate::vm::function::{JsFunction, NativeFn, BOUND_CHAIN_SANITY};
use crate::vm::interpreter::execute_bytecode;
use crate::vm::interpreter::frame::{Activation, ACT_FLAG_CONSTRUCT, ACT_FLAG_DIRECT_EVAL};
use crate::vm::object::{self, ObjectData};
use crate::vm::thread::ThreadId;
use crate::vm::value::JsValue;
use crate::vm::{Control, Runtime};
use std::rc::Rc;
use tracing::trace;

#[derive(Clone, Copy, Default)]
pub struct CallFlags {
    pub tailcall: bool,
    pub is_resume: bool,
    pub construct: bool,
    pub direct_eval: bool,
}

impl CallFlags {
    pub fn empty() -> CallFlags {
        CallFlags::default()
    }
}

pub(crate) enum FinalTarget {
    Compiled(Rc<CodeBlock>),
    Native(NativeFn),
}

/// Rewrite the call window in place, following the bound-function chain:
/// each layer replaces the callee and `this` and prepends its bound
/// arguments.  Returns the adjusted argument count.
///
/// Precondition: valstack top is exactly `w + 2 + nargs`.
pub(crate) fn flatten_bound_chain(
    rt: &mut Runtime,
    tid: ThreadId,
    w: usize,
    mut nargs: usize,
) -> Control<usize> {
    let mut sanity = BOUND_CHAIN_SANITY;
    loop {
        let bound = {
            let t = rt.thread(tid);
            match t.valstack.at(w) {
                JsValue::Object(o) => {
                    let ob = o.borrow();
                    match &ob.data {
                        ObjectData::Function(JsFunction::Bound { target, this, args }) => {
                            Some((target.clone(), this.clone(), args.clone()))
                        }
                        _ => None,
                    }
                }
                _ => None,
            }
        };
        let (target, this, args) = match bound {
            Some(b) => b,
            None => return Ok(nargs),
        };

        let t = rt.thread_mut(tid);
        t.valstack.set(w, target);
        t.valstack.set(w + 1, this);
        let n = args.len();
        if n > 0 {
            let old_len = t.valstack.len();
            debug_assert_eq!(old_len, w + 2 + nargs);
            t.valstack.set_len_abs(old_len + n);
            for i in (0..nargs).rev() {
                let v = t.valstack.get(w + 2 + i);
                t.valstack.set(w + 2 + i + n, v);
            }
            for (i, a) in args.iter().enumerate() {
                t.valstack.set(w + 2 + i, a.clone());
            }
            nargs += n;
        }

        sanity -= 1;
        if sanity == 0 {
            return Err(rt.internal_error("function call bound chain sanity exceeded"));
        }
    }
}

/// Classify the (already flattened) callee at the window base.
pub(crate) fn resolve_target(rt: &mut Runtime, tid: ThreadId, w: usize) -> Control<FinalTarget> {
    let func = rt.thread(tid).valstack.get(w);
    match &func {
        JsValue::LightFunc(lf) => Ok(FinalTarget::Native(lf.func)),
        JsValue::Object(o) => {
            let ob = o.borrow();
            match &ob.data {
                ObjectData::Function(JsFunction::Vm { code, .. }) => {
                    Ok(FinalTarget::Compiled(code.clone()))
                }
                ObjectData::Function(JsFunction::Native { func, .. }) => {
                    Ok(FinalTarget::Native(*func))
                }
                _ => Err(rt.throw_type_error("call target not callable")),
            }
        }
        _ => Err(rt.throw_type_error("call target not an object")),
    }
}

/// Non-strict callees see `this` coerced: nullish becomes the global
/// object, primitives are wrapped (E5 §10.4.3).
fn coerce_this_binding(
    rt: &mut Runtime,
    tid: ThreadId,
    w: usize,
    code: &CodeBlock,
) -> Control<()> {
    if code.strict {
        return Ok(());
    }
    let this = rt.thread(tid).valstack.get(w + 1);
    let coerced = match &this {
        JsValue::Undefined | JsValue::Null => JsValue::object(rt.global.clone()),
        JsValue::Object(_) | JsValue::LightFunc(_) => return Ok(()),
        other => JsValue::object(object::to_object(rt, other)?),
    };
    rt.thread_mut(tid).valstack.set(w + 1, coerced);
    Ok(())
}

/// Transition into a compiled function without host recursion.
///
/// Ordinary setup pushes a fresh activation above the caller; a tailcall
/// collapses the current frame instead, re-homing the window at the
/// frame's own base so the call depth stays constant.  Also used with
/// `is_resume` for a coroutine's initial activation (empty call stack).
pub(crate) fn ecma_call_setup(
    rt: &mut Runtime,
    tid: ThreadId,
    w: usize,
    nargs: usize,
    code: Rc<CodeBlock>,
    flags: CallFlags,
) -> Control<()> {
    coerce_this_binding(rt, tid, w, &code)?;
    let nregs = code.nregs as usize;

    let can_tailcall = flags.tailcall && {
        let t = rt.thread(tid);
        !t.callstack.is_empty() && t.current_act().is_compiled() && {
            let top_idx = t.current_act_index() as u32;
            // a frame that still owns catchers is not collapsed
            !t.catchstack.iter().any(|c| c.callstack_index == top_idx)
        }
    };

    if can_tailcall {
        let dst = rt.thread(tid).current_act().idx_bottom as usize - 2;
        trace!(w, dst, nargs, "tailcall frame collapse");
        let t = rt.thread_mut(tid);
        debug_assert!(dst <= w);
        for i in 0..(2 + nargs) {
            let v = t.valstack.get(w + i);
            t.valstack.set(dst + i, v);
        }
        t.valstack.set_len_abs(dst + 2 + nargs);

        let func = t.valstack.get(dst);
        let act = t.current_act_mut();
        act.func = func;
        act.code = Some(code);
        act.pc = 0;
        act.lex_env = None;
        act.var_env = None;
        act.flags = 0;
        act.nargs = nargs as u32;
        // idx_bottom and idx_retval stay: the collapsed frame answers to
        // the original caller

        let bottom = dst + 2;
        t.valstack.set_bottom(bottom);
        t.valstack.set_len_abs(bottom + nregs);
        return Ok(());
    }

    let depth_ok = rt.thread(tid).callstack.len() < rt.params.callstack_limit;
    if !depth_ok {
        return Err(rt.throw_range_error("callstack limit"));
    }
    let slots_ok = rt.thread(tid).require_frame_slots(w + 2, nregs);
    if !slots_ok {
        return Err(rt.throw_range_error("valstack limit"));
    }

    let t = rt.thread_mut(tid);
    if let Some(caller) = t.callstack.last_mut() {
        caller.idx_retval = w as u32;
    }
    let func = t.valstack.get(w);
    let mut act_flags = 0;
    if flags.construct {
        act_flags |= ACT_FLAG_CONSTRUCT;
    }
    t.callstack.push(Activation {
        func,
        code: Some(code),
        pc: 0,
        idx_bottom: (w + 2) as u32,
        idx_retval: 0,
        nargs: nargs as u32,
        lex_env: None,
        var_env: None,
        flags: act_flags,
    });

    let bottom = w + 2;
    t.valstack.set_len_abs(bottom + nargs);
    t.valstack.set_bottom(bottom);
    t.valstack.set_len_abs(bottom + nregs);
    let _ = flags.is_resume;
    Ok(())
}

/// Invoke a native target.  The native activation stays on the call stack
/// while the function runs so resume/yield and throw unwinding see the
/// expected stack shape; on normal return it is popped and the window
/// dropped, leaving the return value to the caller.
pub(crate) fn native_call(
    rt: &mut Runtime,
    tid: ThreadId,
    w: usize,
    nargs: usize,
    nfn: NativeFn,
    flags: CallFlags,
) -> Control<JsValue> {
    {
        let t = rt.thread_mut(tid);
        if let Some(caller) = t.callstack.last_mut() {
            caller.idx_retval = w as u32;
        }
        let func = t.valstack.get(w);
        let mut act_flags = 0;
        if flags.direct_eval {
            act_flags |= ACT_FLAG_DIRECT_EVAL;
        }
        if flags.construct {
            act_flags |= ACT_FLAG_CONSTRUCT;
        }
        t.callstack.push(Activation {
            func,
            code: None,
            pc: 0,
            idx_bottom: (w + 2) as u32,
            idx_retval: 0,
            nargs: nargs as u32,
            lex_env: None,
            var_env: None,
            flags: act_flags,
        });
        t.valstack.set_bottom(w + 2);
    }

    let v = nfn(rt)?;

    let t = rt.thread_mut(tid);
    t.callstack.pop();
    let caller_bottom = t.callstack.last().map(|a| a.idx_bottom as usize).unwrap_or(0);
    t.valstack.set_len_abs(w);
    t.valstack.set_bottom(caller_bottom);
    Ok(v)
}

/// Re-entrant call used by collaborators (property accessors,
/// `to_primitive`, constructors).  Yield and resume are blocked for the
/// duration: a coroutine switch below a host frame would tear the
/// execution nesting.
pub(crate) fn call_value(
    rt: &mut Runtime,
    func: &JsValue,
    this: JsValue,
    args: &[JsValue],
    flags: CallFlags,
) -> Control<JsValue> {
    rt.thr_mut().preventcount += 1;
    let r = do_call(rt, func, this, args, flags);
    rt.thr_mut().preventcount -= 1;
    r
}

/// Entry-level call from the host (`Runtime::run`); coroutine operations
/// are permitted below it.
pub(crate) fn host_call(
    rt: &mut Runtime,
    func: &JsValue,
    this: JsValue,
    args: &[JsValue],
    flags: CallFlags,
) -> Control<JsValue> {
    do_call(rt, func, this, args, flags)
}

fn do_call(
    rt: &mut Runtime,
    func: &JsValue,
    this: JsValue,
    args: &[JsValue],
    flags: CallFlags,
) -> Control<JsValue> {
    let tid = rt.cur;
    let (saved_bottom, w, saved_cs_len, saved_cat_len) = {
        let t = rt.thread(tid);
        (
            t.valstack.bottom(),
            t.valstack.len(),
            t.callstack.len(),
            t.catchstack.len(),
        )
    };
    let slots_ok = rt.thread(tid).valstack.check_limit(w + 2 + args.len());
    if !slots_ok {
        return Err(rt.throw_range_error("valstack limit"));
    }
    {
        let t = rt.thread_mut(tid);
        t.valstack.push(func.clone());
        t.valstack.push(this);
        for a in args {
            t.valstack.push(a.clone());
        }
    }

    let nargs = flatten_bound_chain(rt, tid, w, args.len())?;
    let v = match resolve_target(rt, tid, w)? {
        FinalTarget::Native(nfn) => native_call(rt, tid, w, nargs, nfn, flags)?,
        FinalTarget::Compiled(code) => {
            let mut f = flags;
            f.tailcall = false;
            ecma_call_setup(rt, tid, w, nargs, code, f)?;
            let v = execute_bytecode(rt)?;
            let t = rt.thread_mut(tid);
            t.catchstack_unwind(saved_cat_len);
            t.callstack_unwind(saved_cs_len);
            v
        }
    };

    let t = rt.thread_mut(tid);
    t.valstack.set_len_abs(w);
    t.valstack.set_bottom(saved_bottom);
    Ok(v)
}

/// Constructor invocation (`NEW`): allocate the instance from the
/// target's `prototype`, call with the instance as `this`, keep the
/// instance unless the constructor returned an object (E5 §13.2.2).
pub(crate) fn construct_call(
    rt: &mut Runtime,
    ctor: &JsValue,
    args: &[JsValue],
) -> Control<JsValue> {
    if !ctor.is_callable() {
        return Err(rt.throw_type_error("constructor call target not callable"));
    }
    let final_target = crate::vm::function::find_nonbound_target(rt, ctor)?;
    let proto = match &final_target {
        JsValue::Object(o) => {
            let o = o.clone();
            object::get_by_name(rt, &o, "prototype")?
        }
        _ => JsValue::Undefined,
    };
    let instance = match proto {
        JsValue::Object(p) => {
            let obj = crate::vm::object::JsObject::new(crate::vm::object::Class::Object, Some(p));
            Rc::new(std::cell::RefCell::new(obj))
        }
        _ => object::new_object(rt),
    };

    let mut flags = CallFlags::empty();
    flags.construct = true;
    let this = JsValue::object(instance.clone());
    let r = call_value(rt, ctor, this, args, flags)?;
    if r.is_object() {
        Ok(r)
    } else {
        Ok(JsValue::object(instance))
    }
}
