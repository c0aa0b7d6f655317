/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Bytecode dispatch loop and trampoline.
//!
//! [`execute_bytecode`] runs the current thread until the entry-level
//! activation returns (value on top of the value stack) or an uncaught
//! throw crosses the entry level.  Script-to-script calls, tailcalls and
//! coroutine switches are handled in-process by restarting the dispatch
//! loop; only native targets and collaborator re-entry recurse on the
//! host stack.
//!
//! Pointer discipline: registers, activations and catchers are addressed
//! by index only.  The current code block is pinned by an `Rc` clone, so
//! the bytecode and constant pool stay valid across any side effect.

pub mod call;
pub mod frame;
pub mod stack;
pub mod unwind;

use self::call::{CallFlags, FinalTarget};
use self::frame::{
    Catcher, CatcherKind, CAT_FLAG_CATCH_BINDING_ENABLED, CAT_FLAG_CATCH_ENABLED,
    CAT_FLAG_FINALLY_ENABLED, CAT_FLAG_LEXENV_ACTIVE,
};
use super::code_block::CodeBlock;
use super::environment::{self, EnvRef};
use super::error::augment_error_throw;
use super::function::{self, JsFunction};
use super::object::{self, ObjectData};
use super::operations::{self, COMPARE_FLAG_EVAL_LEFT_FIRST, COMPARE_FLAG_NEGATE};
use super::string::JsString;
use super::symbol_table::SymbolId;
use super::thread::ThreadId;
use super::value::JsValue;
use super::{Control, LjKind, Runtime, Unwind};
use crate::bytecode::opcodes::{ExtraOp, Opcode};
use crate::bytecode::{
    dec_a, dec_abc, dec_b, dec_bc, dec_c, dec_op, Operand, CALL_FLAG_EVALCALL, CALL_FLAG_TAILCALL,
    DECLVAR_FLAG_FUNC_DECL, DECLVAR_FLAG_UNDEF_VALUE, JUMP_BIAS, LDINTX_SHIFT, LDINT_BIAS,
    PROPDESC_MASK, RETURN_FLAG_HAVE_RETVAL, TRYCATCH_FLAG_CATCH_BINDING, TRYCATCH_FLAG_HAVE_CATCH,
    TRYCATCH_FLAG_HAVE_FINALLY, TRYCATCH_FLAG_WITH_BINDING,
};
use std::convert::Infallible;
use std::rc::Rc;
use tracing::trace;

/// Run the executor for the current thread.  Preconditions: at least one
/// compiled activation on the call stack, value stack sized to `nregs`.
/// On success the entry activation's return value has been popped off the
/// stack; `Err(Unwind)` means an uncaught throw with the unwind state
/// still armed.
pub(crate) fn execute_bytecode(rt: &mut Runtime) -> Control<JsValue> {
    let entry_thread = rt.cur;
    let entry_depth = rt.thread(entry_thread).callstack.len();
    debug_assert!(entry_depth >= 1);
    debug_assert!(rt.thread(entry_thread).current_act().is_compiled());

    loop {
        match dispatch(rt) {
            Ok(never) => match never {},
            Err(Unwind) => {}
        }
        match unwind::handle_unwind(rt, entry_thread, entry_depth)? {
            unwind::Flow::Restart => continue,
            unwind::Flow::Finished => {
                let v = rt.thr_mut().valstack.pop();
                return Ok(v);
            }
        }
    }
}

/* register / constant access helpers; all return owned values so no
 * borrow survives into a side-effecting call */

#[inline]
fn creg(rt: &Runtime, tid: ThreadId, r: u32) -> JsValue {
    rt.thread(tid).valstack.reg(r)
}

#[inline]
fn wreg(rt: &mut Runtime, tid: ThreadId, r: u32, v: JsValue) {
    rt.thread_mut(tid).valstack.set_reg(r, v);
}

fn rc(rt: &mut Runtime, tid: ThreadId, code: &CodeBlock, x: u32) -> Control<JsValue> {
    match Operand::decode(x) {
        Operand::Reg(r) => Ok(creg(rt, tid, r)),
        Operand::Const(i) => match code.consts.get(i as usize) {
            Some(v) => Ok(v.clone()),
            None => Err(rt.internal_error("constant index out of bounds")),
        },
    }
}

fn cstr(rt: &mut Runtime, code: &CodeBlock, idx: u32) -> Control<Rc<JsString>> {
    match code.consts.get(idx as usize) {
        Some(JsValue::Str(s)) => Ok(s.clone()),
        _ => Err(rt.internal_error("constant is not a string")),
    }
}

fn rc_str(rt: &mut Runtime, tid: ThreadId, code: &CodeBlock, x: u32) -> Control<Rc<JsString>> {
    match rc(rt, tid, code, x)? {
        JsValue::Str(s) => Ok(s),
        _ => Err(rt.internal_error("name operand is not a string")),
    }
}

fn indirect(rt: &mut Runtime, tid: ThreadId, r: u32) -> Control<u32> {
    match creg(rt, tid, r) {
        JsValue::Number(n) => Ok(n as u32),
        _ => Err(rt.internal_error("indirect operand is not a number")),
    }
}

/// Delayed environment realization: a frame gets its declarative record
/// (parented on the closure's captured scope, ultimately the global
/// environment) only when something needs it.
pub(crate) fn init_activation_environments(rt: &mut Runtime, tid: ThreadId, act_idx: usize) {
    if rt.thread(tid).callstack[act_idx].lex_env.is_some() {
        return;
    }
    let scope = function_scope_of(rt, tid, act_idx);
    let parent = scope.or_else(|| Some(rt.global_env.clone()));
    let env = environment::new_declarative_env(parent);
    let act = &mut rt.thread_mut(tid).callstack[act_idx];
    act.lex_env = Some(env.clone());
    act.var_env = Some(env);
}

fn function_scope_of(rt: &Runtime, tid: ThreadId, act_idx: usize) -> Option<EnvRef> {
    match &rt.thread(tid).callstack[act_idx].func {
        JsValue::Object(o) => match &o.borrow().data {
            ObjectData::Function(JsFunction::Vm { scope, .. }) => scope.clone(),
            _ => None,
        },
        _ => None,
    }
}

/// Lexical environment for name lookups; does not force realization.
fn effective_lex_env(rt: &Runtime, tid: ThreadId, act_idx: usize) -> Option<EnvRef> {
    if let Some(e) = &rt.thread(tid).callstack[act_idx].lex_env {
        return Some(e.clone());
    }
    function_scope_of(rt, tid, act_idx).or_else(|| Some(rt.global_env.clone()))
}

fn executor_interrupt(rt: &mut Runtime) -> Control<()> {
    let init = rt.interrupt_init;
    rt.thr_mut().interrupt_counter = init - 1;
    if let Some(mut hook) = rt.interrupt_hook.take() {
        let r = hook(rt);
        rt.interrupt_hook = Some(hook);
        r?;
    }
    Ok(())
}

#[inline]
fn getvar_by_sym(
    rt: &mut Runtime,
    tid: ThreadId,
    act_idx: usize,
    name: SymbolId,
    throw: bool,
) -> Control<Option<(JsValue, JsValue)>> {
    let env = effective_lex_env(rt, tid, act_idx);
    environment::getvar(rt, env, name, throw)
}

fn dispatch(rt: &mut Runtime) -> Control<Infallible> {
    'restart: loop {
        let tid = rt.cur;
        let code: Rc<CodeBlock> = {
            let act = rt.thread(tid).current_act();
            match &act.code {
                Some(c) => c.clone(),
                None => return Err(rt.internal_error("executing a non-compiled activation")),
            }
        };
        let nregs = code.nregs as usize;
        let strict = code.strict;
        debug_assert_eq!(rt.lj.kind, LjKind::None);

        loop {
            debug_assert_eq!(rt.thread(tid).valstack.top(), nregs);

            let ctr = rt.thread(tid).interrupt_counter;
            if ctr > 0 {
                rt.thread_mut(tid).interrupt_counter = ctr - 1;
            } else {
                executor_interrupt(rt)?;
            }

            let pc = {
                let act = rt.thread_mut(tid).current_act_mut();
                let pc = act.pc;
                act.pc = pc + 1;
                pc
            };
            let ins = match code.code.get(pc as usize) {
                Some(&i) => i,
                None => return Err(rt.internal_error("bytecode pc out of bounds")),
            };
            let op = Opcode::from_raw(dec_op(ins));
            trace!(pc, ?op, "dispatch");

            match op {
                Opcode::LdReg => {
                    let v = creg(rt, tid, dec_bc(ins));
                    wreg(rt, tid, dec_a(ins), v);
                }

                Opcode::StReg => {
                    let v = creg(rt, tid, dec_a(ins));
                    wreg(rt, tid, dec_bc(ins), v);
                }

                Opcode::LdConst => {
                    let idx = dec_bc(ins);
                    let v = match code.consts.get(idx as usize) {
                        Some(v) => v.clone(),
                        None => return Err(rt.internal_error("constant index out of bounds")),
                    };
                    wreg(rt, tid, dec_a(ins), v);
                }

                Opcode::LdInt => {
                    let v = dec_bc(ins) as i64 - LDINT_BIAS as i64;
                    wreg(rt, tid, dec_a(ins), JsValue::number(v as f64));
                }

                Opcode::LdIntX => {
                    let a = dec_a(ins);
                    let cur = match creg(rt, tid, a) {
                        JsValue::Number(n) => n,
                        _ => return Err(rt.internal_error("LDINTX target not a number")),
                    };
                    let v = cur * (1u64 << LDINTX_SHIFT) as f64 + dec_bc(ins) as f64;
                    wreg(rt, tid, a, JsValue::number(v));
                }

                Opcode::MPutObj | Opcode::MPutObjI => {
                    let target = creg(rt, tid, dec_a(ins));
                    let obj = match &target {
                        JsValue::Object(o) => o.clone(),
                        _ => return Err(rt.internal_error("MPUTOBJ target not an object")),
                    };
                    let mut idx = dec_b(ins);
                    if op == Opcode::MPutObjI {
                        idx = indirect(rt, tid, idx)?;
                    }
                    let count = dec_c(ins);
                    if idx as usize + (count as usize) * 2 > nregs {
                        return Err(rt.internal_error("MPUTOBJ out of bounds"));
                    }
                    for i in 0..count {
                        let key_v = creg(rt, tid, idx + i * 2);
                        if !key_v.is_string() {
                            return Err(rt.internal_error("MPUTOBJ key not a string"));
                        }
                        let value = creg(rt, tid, idx + i * 2 + 1);
                        let key = object::to_prop_key(rt, &key_v)?;
                        object::define_own_wec(&obj, key, value);
                    }
                }

                Opcode::MPutArr | Opcode::MPutArrI => {
                    let target = creg(rt, tid, dec_a(ins));
                    let obj = match &target {
                        JsValue::Object(o) => o.clone(),
                        _ => return Err(rt.internal_error("MPUTARR target not an object")),
                    };
                    let mut idx = dec_b(ins);
                    if op == Opcode::MPutArrI {
                        idx = indirect(rt, tid, idx)?;
                    }
                    let count = dec_c(ins);
                    if idx as usize + count as usize + 1 > nregs {
                        return Err(rt.internal_error("MPUTARR out of bounds"));
                    }
                    let mut arr_idx = match creg(rt, tid, idx) {
                        JsValue::Number(n) => n as u32,
                        _ => return Err(rt.internal_error("MPUTARR start index not a number")),
                    };
                    for i in 0..count {
                        let value = creg(rt, tid, idx + 1 + i);
                        object::define_own_wec(&obj, object::PropKey::Index(arr_idx), value);
                        arr_idx += 1;
                    }
                    object::length_set(rt, &obj, arr_idx);
                }

                Opcode::New | Opcode::NewI => {
                    let mut b = dec_b(ins);
                    if op == Opcode::NewI {
                        b = indirect(rt, tid, b)?;
                    }
                    let c = dec_c(ins);
                    let ctor = creg(rt, tid, b);
                    let mut args = Vec::with_capacity(c as usize);
                    for i in 0..c {
                        args.push(creg(rt, tid, b + 1 + i));
                    }
                    let v = call::construct_call(rt, &ctor, &args)?;
                    wreg(rt, tid, b, v);
                }

                Opcode::CsReg | Opcode::CsRegI => {
                    let mut a = dec_a(ins);
                    if op == Opcode::CsRegI {
                        a = indirect(rt, tid, a)?;
                    }
                    let v = creg(rt, tid, dec_b(ins));
                    wreg(rt, tid, a, v);
                    wreg(rt, tid, a + 1, JsValue::undefined());
                }

                Opcode::GetVar => {
                    let name = cstr(rt, &code, dec_bc(ins))?;
                    let act_idx = rt.thread(tid).current_act_index();
                    let (v, _this) = getvar_by_sym(rt, tid, act_idx, name.sym(), true)?
                        .expect("throwing getvar returned none");
                    wreg(rt, tid, dec_a(ins), v);
                }

                Opcode::PutVar => {
                    let name = cstr(rt, &code, dec_bc(ins))?;
                    let v = creg(rt, tid, dec_a(ins));
                    let act_idx = rt.thread(tid).current_act_index();
                    let env = effective_lex_env(rt, tid, act_idx);
                    environment::putvar(rt, env, name.sym(), v, strict)?;
                }

                Opcode::DeclVar => {
                    let a = dec_a(ins);
                    let name = rc_str(rt, tid, &code, dec_b(ins))?;
                    let value = if a & DECLVAR_FLAG_UNDEF_VALUE != 0 {
                        JsValue::undefined()
                    } else {
                        rc(rt, tid, &code, dec_c(ins))?
                    };
                    let attrs = (a & PROPDESC_MASK) as u8;
                    let is_func_decl = a & DECLVAR_FLAG_FUNC_DECL != 0;

                    let act_idx = rt.thread(tid).current_act_index();
                    init_activation_environments(rt, tid, act_idx);
                    let var_env = rt.thread(tid).callstack[act_idx]
                        .var_env
                        .clone()
                        .expect("delayed env init failed");
                    let existed = environment::declvar(
                        rt,
                        &var_env,
                        name.sym(),
                        value.clone(),
                        attrs,
                        is_func_decl,
                    )?;
                    if existed {
                        let env = effective_lex_env(rt, tid, act_idx);
                        environment::putvar(rt, env, name.sym(), value, strict)?;
                    }
                }

                Opcode::DelVar => {
                    let name = rc_str(rt, tid, &code, dec_b(ins))?;
                    let act_idx = rt.thread(tid).current_act_index();
                    let env = effective_lex_env(rt, tid, act_idx);
                    let rc_del = environment::delvar(rt, env, name.sym())?;
                    wreg(rt, tid, dec_a(ins), JsValue::bool(rc_del));
                }

                Opcode::CsVar | Opcode::CsVarI => {
                    let name = rc_str(rt, tid, &code, dec_b(ins))?;
                    let act_idx = rt.thread(tid).current_act_index();
                    let (v, this) = getvar_by_sym(rt, tid, act_idx, name.sym(), true)?
                        .expect("throwing getvar returned none");
                    let mut a = dec_a(ins);
                    if op == Opcode::CsVarI {
                        a = indirect(rt, tid, a)?;
                    }
                    wreg(rt, tid, a, v);
                    wreg(rt, tid, a + 1, this);
                }

                Opcode::Closure => {
                    let idx = dec_bc(ins) as usize;
                    let template = match code.inner.get(idx) {
                        Some(t) => t.clone(),
                        None => return Err(rt.internal_error("CLOSURE template out of bounds")),
                    };
                    let act_idx = rt.thread(tid).current_act_index();
                    init_activation_environments(rt, tid, act_idx);
                    let scope = rt.thread(tid).callstack[act_idx].lex_env.clone();
                    let f = function::push_closure(rt, template, scope);
                    wreg(rt, tid, dec_a(ins), JsValue::object(f));
                }

                Opcode::GetProp => {
                    let obj = rc(rt, tid, &code, dec_b(ins))?;
                    let key = rc(rt, tid, &code, dec_c(ins))?;
                    let v = object::get_value_prop(rt, &obj, &key)?;
                    wreg(rt, tid, dec_a(ins), v);
                }

                Opcode::PutProp => {
                    let obj = creg(rt, tid, dec_a(ins));
                    let key = rc(rt, tid, &code, dec_b(ins))?;
                    let val = rc(rt, tid, &code, dec_c(ins))?;
                    object::put_value_prop(rt, &obj, &key, val, strict)?;
                }

                Opcode::DelProp => {
                    let obj = creg(rt, tid, dec_b(ins));
                    let key = rc(rt, tid, &code, dec_c(ins))?;
                    let deleted = object::delete_value_prop(rt, &obj, &key, strict)?;
                    wreg(rt, tid, dec_a(ins), JsValue::bool(deleted));
                }

                Opcode::CsProp | Opcode::CsPropI => {
                    let obj = creg(rt, tid, dec_b(ins));
                    let key = rc(rt, tid, &code, dec_c(ins))?;
                    let v = object::get_value_prop(rt, &obj, &key)?;
                    let mut a = dec_a(ins);
                    if op == Opcode::CsPropI {
                        a = indirect(rt, tid, a)?;
                    }
                    wreg(rt, tid, a, v);
                    wreg(rt, tid, a + 1, obj);
                }

                Opcode::Add => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let v = operations::add(rt, &x, &y)?;
                    wreg(rt, tid, dec_a(ins), v);
                }

                Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let v = operations::arith_binary(rt, op, &x, &y)?;
                    wreg(rt, tid, dec_a(ins), v);
                }

                Opcode::BAnd
                | Opcode::BOr
                | Opcode::BXor
                | Opcode::BAsl
                | Opcode::BAsr
                | Opcode::BLsr => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let v = operations::bitwise_binary(rt, op, &x, &y)?;
                    wreg(rt, tid, dec_a(ins), v);
                }

                Opcode::BNot => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let v = operations::bitwise_not(rt, &x)?;
                    wreg(rt, tid, dec_a(ins), v);
                }

                Opcode::LNot => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let v = operations::logical_not(&x);
                    wreg(rt, tid, dec_a(ins), v);
                }

                Opcode::Eq | Opcode::Neq => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let mut r = operations::equals(rt, &x, &y)?;
                    if op == Opcode::Neq {
                        r = !r;
                    }
                    wreg(rt, tid, dec_a(ins), JsValue::bool(r));
                }

                Opcode::SEq | Opcode::SNeq => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let mut r = x.strict_equals(&y);
                    if op == Opcode::SNeq {
                        r = !r;
                    }
                    wreg(rt, tid, dec_a(ins), JsValue::bool(r));
                }

                /* Relational ops share one primitive; flag choices keep
                 * the source-order coercion side effects (x > y is y < x
                 * with swapped evaluation order, etc). */
                Opcode::Gt => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let r = operations::compare(rt, &y, &x, 0)?;
                    wreg(rt, tid, dec_a(ins), JsValue::bool(r));
                }
                Opcode::Ge => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let r = operations::compare(
                        rt,
                        &x,
                        &y,
                        COMPARE_FLAG_EVAL_LEFT_FIRST | COMPARE_FLAG_NEGATE,
                    )?;
                    wreg(rt, tid, dec_a(ins), JsValue::bool(r));
                }
                Opcode::Lt => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let r = operations::compare(rt, &x, &y, COMPARE_FLAG_EVAL_LEFT_FIRST)?;
                    wreg(rt, tid, dec_a(ins), JsValue::bool(r));
                }
                Opcode::Le => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let r = operations::compare(rt, &y, &x, COMPARE_FLAG_NEGATE)?;
                    wreg(rt, tid, dec_a(ins), JsValue::bool(r));
                }

                Opcode::If => {
                    let a = dec_a(ins);
                    let v = rc(rt, tid, &code, dec_b(ins))?;
                    if v.to_boolean() == (a != 0) {
                        rt.thread_mut(tid).current_act_mut().pc += 1;
                    }
                }

                Opcode::InstOf => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let r = object::instanceof(rt, &x, &y)?;
                    wreg(rt, tid, dec_a(ins), JsValue::bool(r));
                }

                Opcode::In => {
                    let x = rc(rt, tid, &code, dec_b(ins))?;
                    let y = rc(rt, tid, &code, dec_c(ins))?;
                    let r = object::in_operator(rt, &x, &y)?;
                    wreg(rt, tid, dec_a(ins), JsValue::bool(r));
                }

                Opcode::Jump => {
                    let act = rt.thread_mut(tid).current_act_mut();
                    let new_pc = act.pc as i64 + dec_abc(ins) as i64 - JUMP_BIAS as i64;
                    if new_pc < 0 {
                        return Err(rt.internal_error("jump out of bounds"));
                    }
                    rt.thread_mut(tid).current_act_mut().pc = new_pc as u32;
                }

                Opcode::Return => {
                    let a = dec_a(ins);
                    let v = if a & RETURN_FLAG_HAVE_RETVAL != 0 {
                        rc(rt, tid, &code, dec_b(ins))?
                    } else {
                        JsValue::undefined()
                    };
                    // fast return is reserved; always the slow path
                    rt.lj.kind = LjKind::Return;
                    rt.lj.value1 = v;
                    rt.lj.value2 = JsValue::undefined();
                    rt.lj.iserror = false;
                    return Err(Unwind);
                }

                Opcode::Break | Opcode::Continue => {
                    let abc = dec_abc(ins);
                    rt.lj.kind = if op == Opcode::Break {
                        LjKind::Break
                    } else {
                        LjKind::Continue
                    };
                    rt.lj.value1 = JsValue::number(abc as f64);
                    rt.lj.value2 = JsValue::undefined();
                    rt.lj.iserror = false;
                    return Err(Unwind);
                }

                Opcode::Call | Opcode::CallI => {
                    let a = dec_a(ins);
                    let mut b = dec_b(ins);
                    if op == Opcode::CallI {
                        b = indirect(rt, tid, b)?;
                    }
                    let c = dec_c(ins) as usize;
                    let flag_tailcall = a & CALL_FLAG_TAILCALL != 0;
                    let flag_evalcall = a & CALL_FLAG_EVALCALL != 0;

                    let bottom = rt.thread(tid).valstack.bottom();
                    let w = bottom + b as usize;
                    rt.thread_mut(tid).valstack.set_len_abs(w + 2 + c);

                    let func = rt.thread(tid).valstack.get(w);

                    // light functions delegate to the host call handler and
                    // are never tailcalled
                    if let JsValue::LightFunc(lf) = &func {
                        let nfn = lf.func;
                        let v = call::native_call(rt, tid, w, c, nfn, CallFlags::empty())?;
                        let t = rt.thread_mut(tid);
                        t.valstack.set_len_abs(bottom + nregs);
                        t.valstack.set(w, v);
                        continue;
                    }

                    if !func.is_object() {
                        return Err(rt.throw_type_error("call target not an object"));
                    }

                    // direct eval: immediate (pre-bound) target is the
                    // built-in eval and the call site used the identifier
                    let direct_eval = flag_evalcall && func.strict_equals(&rt.eval_fn);

                    let nargs = call::flatten_bound_chain(rt, tid, w, c)?;
                    match call::resolve_target(rt, tid, w)? {
                        FinalTarget::Compiled(target_code) => {
                            let mut flags = CallFlags::empty();
                            flags.tailcall = flag_tailcall;
                            call::ecma_call_setup(rt, tid, w, nargs, target_code, flags)?;
                            continue 'restart;
                        }
                        FinalTarget::Native(nfn) => {
                            let mut flags = CallFlags::empty();
                            flags.direct_eval = direct_eval;
                            let v = call::native_call(rt, tid, w, nargs, nfn, flags)?;
                            let t = rt.thread_mut(tid);
                            t.valstack.set_len_abs(bottom + nregs);
                            t.valstack.set(w, v);
                        }
                    }
                }

                Opcode::Label => {
                    let abc = dec_abc(ins);
                    let t = rt.thread_mut(tid);
                    let act_idx = t.current_act_index();
                    let pc_base = t.callstack[act_idx].pc;
                    t.catchstack.push(Catcher {
                        kind: CatcherKind::Label(abc),
                        flags: 0,
                        callstack_index: act_idx as u32,
                        pc_base,
                        idx_base: 0,
                        varname: None,
                    });
                    t.callstack[act_idx].pc = pc_base + 2;
                }

                Opcode::EndLabel => {
                    let t = rt.thread_mut(tid);
                    debug_assert!(matches!(
                        t.catchstack.last().map(|c| c.kind),
                        Some(CatcherKind::Label(id)) if id == dec_abc(ins)
                    ));
                    let top = t.catchstack.len() - 1;
                    t.catchstack_unwind(top);
                }

                Opcode::TryCatch => {
                    let a = dec_a(ins);
                    let b = dec_b(ins);
                    let c = dec_c(ins);
                    let act_idx = rt.thread(tid).current_act_index();

                    let mut flags = 0u8;
                    let mut varname = None;

                    if a & TRYCATCH_FLAG_WITH_BINDING != 0 {
                        init_activation_environments(rt, tid, act_idx);
                        let target_v = rc(rt, tid, &code, c)?;
                        let target = object::to_object(rt, &target_v)?;
                        let parent = rt.thread(tid).callstack[act_idx].lex_env.clone();
                        let env = environment::new_object_env(target, true, parent);
                        rt.thread_mut(tid).callstack[act_idx].lex_env = Some(env);
                        flags |= CAT_FLAG_LEXENV_ACTIVE;
                    }
                    if a & TRYCATCH_FLAG_HAVE_CATCH != 0 {
                        flags |= CAT_FLAG_CATCH_ENABLED;
                    }
                    if a & TRYCATCH_FLAG_HAVE_FINALLY != 0 {
                        flags |= CAT_FLAG_FINALLY_ENABLED;
                    }
                    if a & TRYCATCH_FLAG_CATCH_BINDING != 0 {
                        flags |= CAT_FLAG_CATCH_BINDING_ENABLED;
                        varname = Some(cstr(rt, &code, c)?);
                    }

                    let t = rt.thread_mut(tid);
                    let pc_base = t.callstack[act_idx].pc;
                    let idx_base = t.valstack.bottom() + b as usize;
                    t.catchstack.push(Catcher {
                        kind: CatcherKind::Tcf,
                        flags,
                        callstack_index: act_idx as u32,
                        pc_base,
                        idx_base: idx_base as u32,
                        varname,
                    });
                    t.callstack[act_idx].pc = pc_base + 2;
                }

                Opcode::Extra => {
                    dispatch_extra(rt, tid, &code, ins)?;
                }

                Opcode::Invalid => {
                    return Err(rt.internal_error("INVALID opcode"));
                }
            }
        }
    }
}

fn dispatch_extra(rt: &mut Runtime, tid: ThreadId, code: &Rc<CodeBlock>, ins: u32) -> Control<()> {
    let extraop = ExtraOp::from_raw(dec_a(ins));
    match extraop {
        ExtraOp::Nop => {}

        ExtraOp::LdThis => {
            // the this binding sits just under the frame bottom
            let t = rt.thread(tid);
            let bottom = t.valstack.bottom();
            let this = t.valstack.get(bottom - 1);
            wreg(rt, tid, dec_b(ins), this);
        }

        ExtraOp::LdUndef => {
            wreg(rt, tid, dec_bc(ins), JsValue::undefined());
        }

        ExtraOp::LdNull => {
            wreg(rt, tid, dec_bc(ins), JsValue::null());
        }

        ExtraOp::LdTrue => {
            wreg(rt, tid, dec_bc(ins), JsValue::bool(true));
        }

        ExtraOp::LdFalse => {
            wreg(rt, tid, dec_bc(ins), JsValue::bool(false));
        }

        ExtraOp::NewObj => {
            let obj = object::new_object(rt);
            wreg(rt, tid, dec_b(ins), JsValue::object(obj));
        }

        ExtraOp::NewArr => {
            let arr = object::new_array(rt);
            wreg(rt, tid, dec_b(ins), JsValue::object(arr));
        }

        ExtraOp::SetALen => {
            let target = creg(rt, tid, dec_b(ins));
            let obj = match &target {
                JsValue::Object(o) => o.clone(),
                _ => return Err(rt.internal_error("SETALEN target not an object")),
            };
            let len = match creg(rt, tid, dec_c(ins)) {
                JsValue::Number(n) => n as u32,
                _ => return Err(rt.internal_error("SETALEN length not a number")),
            };
            object::length_set(rt, &obj, len);
        }

        ExtraOp::TypeOf => {
            let v = rc(rt, tid, code, dec_c(ins))?;
            let s = operations::typeof_value(rt, &v);
            wreg(rt, tid, dec_b(ins), s);
        }

        ExtraOp::TypeOfId => {
            // unresolvable identifiers answer "undefined" without throwing
            let name = rc_str(rt, tid, code, dec_c(ins))?;
            let act_idx = rt.thread(tid).current_act_index();
            let looked = getvar_by_sym(rt, tid, act_idx, name.sym(), false)?;
            let s = match looked {
                Some((v, _this)) => operations::typeof_value(rt, &v),
                None => JsValue::string(rt.intern("undefined")),
            };
            wreg(rt, tid, dec_b(ins), s);
        }

        ExtraOp::ToNum => {
            let v = creg(rt, tid, dec_c(ins));
            let n = v.to_number(rt)?;
            wreg(rt, tid, dec_b(ins), JsValue::number(n));
        }

        ExtraOp::InitEnum => {
            // null/undefined enumerates as an empty loop (E5 §12.6.4)
            let target = creg(rt, tid, dec_c(ins));
            let v = if target.is_nullish() {
                JsValue::null()
            } else {
                let obj = object::to_object(rt, &target)?;
                JsValue::object(object::enumerator_create(rt, &obj))
            };
            wreg(rt, tid, dec_b(ins), v);
        }

        ExtraOp::NextEnum => {
            let e = creg(rt, tid, dec_c(ins));
            match &e {
                JsValue::Object(enum_obj) => {
                    match object::enumerator_next(enum_obj) {
                        Some(key) => {
                            wreg(rt, tid, dec_b(ins), key);
                            // skip the loop-exit jump slot
                            rt.thread_mut(tid).current_act_mut().pc += 1;
                        }
                        None => {
                            wreg(rt, tid, dec_b(ins), JsValue::undefined());
                        }
                    }
                }
                JsValue::Null => {
                    // empty enumerator: fall through to the jump slot
                }
                _ => return Err(rt.internal_error("NEXTENUM source not an enumerator")),
            }
        }

        ExtraOp::InitSet | ExtraOp::InitSetI | ExtraOp::InitGet | ExtraOp::InitGetI => {
            let is_set = matches!(extraop, ExtraOp::InitSet | ExtraOp::InitSetI);
            let b = dec_b(ins);
            let mut c = dec_c(ins);
            if matches!(extraop, ExtraOp::InitSetI | ExtraOp::InitGetI) {
                c = indirect(rt, tid, c)?;
            }
            let target = creg(rt, tid, b);
            let obj = match &target {
                JsValue::Object(o) => o.clone(),
                _ => return Err(rt.internal_error("INITGET/INITSET target not an object")),
            };
            let key_v = creg(rt, tid, c);
            let func = creg(rt, tid, c + 1);
            let key = object::to_prop_key(rt, &key_v)?;
            object::define_accessor(&obj, key, func, is_set);
        }

        ExtraOp::EndTry => {
            let t = rt.thread_mut(tid);
            let act_idx = t.current_act_index();
            let ci = t.catchstack.len() - 1;
            debug_assert!(t.catchstack[ci].is_tcf());
            debug_assert_eq!(t.catchstack[ci].callstack_index as usize, act_idx);

            t.catchstack[ci].flags &= !CAT_FLAG_CATCH_ENABLED;
            let pc_base = t.catchstack[ci].pc_base;
            if t.catchstack[ci].finally_enabled() {
                // normal completion carried into the finally block
                let idx_base = t.catchstack[ci].idx_base as usize;
                t.valstack.set(idx_base, JsValue::undefined());
                t.valstack
                    .set(idx_base + 1, JsValue::number(LjKind::Normal as u8 as f64));
                t.catchstack[ci].flags &= !CAT_FLAG_FINALLY_ENABLED;
            } else {
                t.catchstack_unwind(ci);
            }
            t.callstack[act_idx].pc = pc_base + 1;
        }

        ExtraOp::EndCatch => {
            let t = rt.thread_mut(tid);
            let act_idx = t.current_act_index();
            let ci = t.catchstack.len() - 1;
            debug_assert!(t.catchstack[ci].is_tcf());
            debug_assert!(!t.catchstack[ci].catch_enabled());

            if t.catchstack[ci].lexenv_active() {
                // pop the catch-variable environment
                let parent = t.callstack[act_idx]
                    .lex_env
                    .as_ref()
                    .and_then(|env| env.borrow().parent.clone());
                t.callstack[act_idx].lex_env = parent;
                t.catchstack[ci].flags &= !CAT_FLAG_LEXENV_ACTIVE;
            }

            let pc_base = t.catchstack[ci].pc_base;
            if t.catchstack[ci].finally_enabled() {
                let idx_base = t.catchstack[ci].idx_base as usize;
                t.valstack.set(idx_base, JsValue::undefined());
                t.valstack
                    .set(idx_base + 1, JsValue::number(LjKind::Normal as u8 as f64));
                t.catchstack[ci].flags &= !CAT_FLAG_FINALLY_ENABLED;
            } else {
                t.catchstack_unwind(ci);
            }
            t.callstack[act_idx].pc = pc_base + 1;
        }

        ExtraOp::EndFin => {
            let (idx_base, ci) = {
                let t = rt.thread(tid);
                let ci = t.catchstack.len() - 1;
                debug_assert!(t.catchstack[ci].is_tcf());
                debug_assert!(!t.catchstack[ci].finally_enabled());
                (t.catchstack[ci].idx_base as usize, ci)
            };
            let completion = rt.thread(tid).valstack.get(idx_base + 1);
            let cont_type = match &completion {
                JsValue::Number(n) => LjKind::from_number(*n),
                _ => None,
            };
            let cont_type = match cont_type {
                Some(k) => k,
                None => return Err(rt.internal_error("ENDFIN completion type invalid")),
            };

            if cont_type == LjKind::Normal {
                // fall through past the ENDFIN
                let t = rt.thread_mut(tid);
                t.catchstack_unwind(ci);
            } else {
                // re-raise the captured abrupt completion; the catcher is
                // dismantled by whichever unwind path it lands in
                let value = rt.thread(tid).valstack.get(idx_base);
                let iserror = cont_type == LjKind::Throw && object::is_error(&value);
                rt.lj.kind = cont_type;
                rt.lj.value1 = value;
                rt.lj.value2 = JsValue::undefined();
                rt.lj.iserror = iserror;
                return Err(Unwind);
            }
        }

        ExtraOp::Throw => {
            let value = creg(rt, tid, dec_b(ins));
            augment_error_throw(rt, &value);
            return Err(rt.throw_value(value));
        }

        ExtraOp::InvLhs => {
            return Err(rt.throw_reference_error("invalid lvalue"));
        }

        ExtraOp::UnM | ExtraOp::UnP | ExtraOp::Inc | ExtraOp::Dec => {
            let x = rc(rt, tid, code, dec_c(ins))?;
            let v = operations::arith_unary(rt, extraop, &x)?;
            wreg(rt, tid, dec_b(ins), v);
        }

        ExtraOp::InvalidExtra => {
            return Err(rt.internal_error("invalid extra opcode"));
        }
    }
    Ok(())
}
