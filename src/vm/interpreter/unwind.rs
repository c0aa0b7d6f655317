/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The unwind handler.
//!
//! Every non-local transfer (throw, slow return, break/continue, yield,
//! resume) is reified in the runtime's unwind state and funnelled through
//! [`handle_unwind`], which translates it into stack surgery plus a
//! resumption PC, possibly switching the active thread.  The handler
//! itself must not ordinarily fail; failures propagate outward through
//! `?` so recovery can never loop on itself.

use crate::vm::environment::{self, Binding};
use crate::vm::interpreter::call::{self, CallFlags};
use crate::vm::interpreter::frame::{
    CAT_FLAG_CATCH_ENABLED, CAT_FLAG_FINALLY_ENABLED, CAT_FLAG_LEXENV_ACTIVE,
};
use crate::vm::interpreter::init_activation_environments;
use crate::vm::thread::{ThreadId, ThreadState};
use crate::vm::value::JsValue;
use crate::vm::{Control, LjKind, Runtime, Unwind};
use tracing::debug;

/// Handler outcome; the rethrow case is expressed as `Err(Unwind)` with
/// the unwind state left intact for the outer recovery context.
pub(crate) enum Flow {
    Restart,
    Finished,
}

pub(crate) fn handle_unwind(
    rt: &mut Runtime,
    entry_thread: ThreadId,
    entry_depth: usize,
) -> Control<Flow> {
    loop {
        debug!(kind = ?rt.lj.kind, iserror = rt.lj.iserror, thread = rt.cur.0, "handling unwind");
        match rt.lj.kind {
            LjKind::Resume => {
                // value1 is the resume value, value2 the resumee thread
                let resumee_val = rt.lj.value2.clone();
                let resumee = match &resumee_val {
                    JsValue::Object(o) => o.borrow().thread_id(),
                    _ => None,
                };
                let resumee = match resumee {
                    Some(id) => id,
                    None => return Err(rt.internal_error("resume target not a thread")),
                };
                let cur = rt.cur;

                // a RESUME event originates from the resume builtin, whose
                // native activation sits on top of an expecting caller
                debug_assert!({
                    let t = rt.thread(cur);
                    let top = t.current_act();
                    top.code.is_none() && top.func.strict_equals(&rt.resume_fn)
                });

                if rt.lj.iserror {
                    // throw the error inside the resumee instead
                    rt.thread_mut(resumee).resumer = Some(cur);
                    rt.thread_mut(resumee).state = ThreadState::Running;
                    rt.thread_mut(cur).state = ThreadState::Resumed;
                    rt.cur = resumee;
                    rt.lj.kind = LjKind::Throw;
                    continue;
                }

                let value = rt.lj.value1.clone();
                if rt.thread(resumee).state == ThreadState::Yielded {
                    // resumee suspended inside yield(): deliver the value
                    // as yield's return value
                    let act_idx = rt.thread(resumee).callstack.len() - 2;
                    let t = rt.thread_mut(resumee);
                    let slot = t.callstack[act_idx].idx_retval as usize;
                    t.valstack.set(slot, value);
                    t.callstack_unwind(act_idx + 1);
                    t.reconfig_valstack(act_idx, 1);
                } else {
                    // initial resume: [func] becomes [func this arg]
                    debug_assert_eq!(rt.thread(resumee).state, ThreadState::Inactive);
                    {
                        let t = rt.thread_mut(resumee);
                        debug_assert_eq!(t.valstack.len(), 1);
                        t.valstack.push(JsValue::Undefined);
                        t.valstack.push(value);
                    }
                    let nargs = call::flatten_bound_chain(rt, resumee, 0, 1)?;
                    let code = match call::resolve_target(rt, resumee, 0)? {
                        call::FinalTarget::Compiled(code) => code,
                        call::FinalTarget::Native(_) => {
                            return Err(rt.internal_error("coroutine body is not compiled"));
                        }
                    };
                    let mut flags = CallFlags::empty();
                    flags.is_resume = true;
                    call::ecma_call_setup(rt, resumee, 0, nargs, code, flags)?;
                }

                rt.thread_mut(resumee).resumer = Some(cur);
                rt.thread_mut(resumee).state = ThreadState::Running;
                rt.thread_mut(cur).state = ThreadState::Resumed;
                rt.cur = resumee;
                rt.wipe_lj();
                return Ok(Flow::Restart);
            }

            LjKind::Yield => {
                let cur = rt.cur;
                debug_assert_ne!(cur, entry_thread, "yield from the entry thread");
                debug_assert!({
                    let t = rt.thread(cur);
                    let top = t.current_act();
                    top.code.is_none() && top.func.strict_equals(&rt.yield_fn)
                });
                let resumer = match rt.thread(cur).resumer {
                    Some(r) => r,
                    None => return Err(rt.internal_error("yield without resumer")),
                };

                if rt.lj.iserror {
                    rt.thread_mut(cur).state = ThreadState::Yielded;
                    rt.thread_mut(cur).resumer = None;
                    rt.thread_mut(resumer).state = ThreadState::Running;
                    rt.cur = resumer;
                    rt.lj.kind = LjKind::Throw;
                    continue;
                }

                let act_idx = rt.thread(resumer).callstack.len() - 2;
                deliver_to_resumer(rt, resumer, act_idx);
                rt.thread_mut(cur).state = ThreadState::Yielded;
                rt.thread_mut(cur).resumer = None;
                rt.thread_mut(resumer).state = ThreadState::Running;
                rt.cur = resumer;
                rt.wipe_lj();
                return Ok(Flow::Restart);
            }

            LjKind::Return => {
                let tid = rt.cur;
                let act_idx = rt.thread(tid).callstack.len() - 1;

                // a finally in the returning function captures first
                let (finally, frame_cat_base) = scan_frame_catchers(rt, tid, act_idx);
                if let Some(ci) = finally {
                    handle_catch_or_finally(rt, ci, true)?;
                    rt.wipe_lj();
                    return Ok(Flow::Restart);
                }

                if tid == entry_thread && rt.thread(tid).callstack.len() == entry_depth {
                    // return at entry level: leave the value on top
                    let v = rt.lj.value1.clone();
                    rt.thread_mut(tid).valstack.push(v);
                    rt.wipe_lj();
                    return Ok(Flow::Finished);
                }

                if rt.thread(tid).callstack.len() >= 2 {
                    // slow return into the calling compiled frame
                    let v = rt.lj.value1.clone();
                    let t = rt.thread_mut(tid);
                    let caller_idx = t.callstack.len() - 2;
                    debug_assert!(t.callstack[caller_idx].is_compiled());
                    let slot = t.callstack[caller_idx].idx_retval as usize;
                    t.valstack.set(slot, v);
                    t.catchstack_unwind(frame_cat_base);
                    let new_top = t.callstack.len() - 1;
                    t.callstack_unwind(new_top);
                    t.reconfig_valstack(caller_idx, 1);
                    rt.wipe_lj();
                    return Ok(Flow::Restart);
                }

                // no caller: the thread finishes, the return value goes to
                // the resumer like a yield
                let resumer = match rt.thread(tid).resumer {
                    Some(r) => r,
                    None => return Err(rt.internal_error("return from a thread without resumer")),
                };
                let act_idx = rt.thread(resumer).callstack.len() - 2;
                deliver_to_resumer(rt, resumer, act_idx);
                rt.thread_mut(tid).terminate();
                rt.thread_mut(resumer).state = ThreadState::Running;
                rt.cur = resumer;
                rt.wipe_lj();
                return Ok(Flow::Restart);
            }

            LjKind::Break | LjKind::Continue => {
                let is_continue = rt.lj.kind == LjKind::Continue;
                let label = rt.lj.value1.get_number() as u32;
                let tid = rt.cur;
                let act_idx = rt.thread(tid).callstack.len() - 1;

                enum Hit {
                    Finally(usize),
                    Label(usize),
                }
                let hit = {
                    let t = rt.thread(tid);
                    let mut i = t.catchstack.len();
                    let mut hit = None;
                    while i > 0 {
                        let cat = &t.catchstack[i - 1];
                        if cat.callstack_index as usize != act_idx {
                            break;
                        }
                        if cat.is_tcf() && cat.finally_enabled() {
                            hit = Some(Hit::Finally(i - 1));
                            break;
                        }
                        if cat.label() == Some(label) {
                            hit = Some(Hit::Label(i - 1));
                            break;
                        }
                        i -= 1;
                    }
                    hit
                };

                match hit {
                    Some(Hit::Finally(ci)) => {
                        handle_catch_or_finally(rt, ci, true)?;
                    }
                    Some(Hit::Label(ci)) => {
                        // +0 = break, +1 = continue; keep the label catcher
                        let t = rt.thread_mut(tid);
                        let pc_base = t.catchstack[ci].pc_base;
                        t.callstack[act_idx].pc = pc_base + if is_continue { 1 } else { 0 };
                        t.catchstack_unwind(ci + 1);
                    }
                    None => {
                        // the compiler guarantees a matching label exists
                        return Err(rt.internal_error("break/continue not caught by anything"));
                    }
                }
                rt.wipe_lj();
                return Ok(Flow::Restart);
            }

            LjKind::Throw => {
                let tid = rt.cur;
                let entry_cs_index = entry_depth - 1;

                let action = {
                    let t = rt.thread(tid);
                    let mut i = t.catchstack.len();
                    let mut action = None;
                    while i > 0 {
                        let cat = &t.catchstack[i - 1];
                        if tid == entry_thread && (cat.callstack_index as usize) < entry_cs_index {
                            break;
                        }
                        if cat.is_tcf() && cat.catch_enabled() {
                            action = Some((i - 1, false));
                            break;
                        }
                        if cat.is_tcf() && cat.finally_enabled() {
                            action = Some((i - 1, true));
                            break;
                        }
                        i -= 1;
                    }
                    action
                };

                if let Some((ci, is_finally)) = action {
                    handle_catch_or_finally(rt, ci, is_finally)?;
                    rt.wipe_lj();
                    return Ok(Flow::Restart);
                }

                if tid == entry_thread {
                    // rethrow to the outer recovery context with the
                    // unwind state intact
                    debug!("throw propagated to entry level, rethrowing");
                    return Err(Unwind);
                }

                // uncaught in a resumed thread: terminate it and surface
                // the same throw in the resumer
                let resumer = match rt.thread(tid).resumer {
                    Some(r) => r,
                    None => return Err(rt.internal_error("uncaught error in unresumed thread")),
                };
                debug!(thread = tid.0, "uncaught error, yielding throw to resumer");
                rt.thread_mut(tid).terminate();
                rt.thread_mut(resumer).state = ThreadState::Running;
                rt.cur = resumer;
                continue;
            }

            LjKind::None | LjKind::Normal => {
                return Err(rt.internal_error("invalid longjmp type in executor"));
            }
        }
    }
}

/// Write the pending unwind value into the resume-call return slot of
/// `resumer` and re-establish its frame (shared by yield and by a
/// thread-terminating return).
fn deliver_to_resumer(rt: &mut Runtime, resumer: ThreadId, act_idx: usize) {
    let value = rt.lj.value1.clone();
    let t = rt.thread_mut(resumer);
    debug_assert!(t.callstack[act_idx].is_compiled());
    let slot = t.callstack[act_idx].idx_retval as usize;
    t.valstack.set(slot, value);
    t.callstack_unwind(act_idx + 1);
    t.reconfig_valstack(act_idx, 1);
}

/// Scan the top frame's catchers for an enabled finally.  Returns the
/// finally's index (if any) and the catch-stack index just below this
/// frame's catchers.
fn scan_frame_catchers(rt: &Runtime, tid: ThreadId, act_idx: usize) -> (Option<usize>, usize) {
    let t = rt.thread(tid);
    let mut i = t.catchstack.len();
    while i > 0 {
        let cat = &t.catchstack[i - 1];
        if cat.callstack_index as usize != act_idx {
            break;
        }
        if cat.is_tcf() && cat.finally_enabled() {
            return (Some(i - 1), i);
        }
        i -= 1;
    }
    (None, i)
}

/// Enter a catch or finally block of catcher `cat_idx` on the current
/// thread: record the completion in the catcher's two reserved slots,
/// unwind everything above it, re-establish the frame, aim the PC at the
/// right jump slot and (for catch) realize the catch-variable binding.
pub(crate) fn handle_catch_or_finally(
    rt: &mut Runtime,
    cat_idx: usize,
    is_finally: bool,
) -> Control<()> {
    let tid = rt.cur;
    debug!(cat_idx, is_finally, "entering catch/finally");

    let (idx_base, pc_base, cs_index, catch_binding, varname) = {
        let cat = &rt.thread(tid).catchstack[cat_idx];
        (
            cat.idx_base as usize,
            cat.pc_base,
            cat.callstack_index as usize,
            cat.catch_binding_enabled(),
            cat.varname.clone(),
        )
    };

    let caught = rt.lj.value1.clone();
    let completion = JsValue::number(rt.lj.kind as u8 as f64);
    {
        let t = rt.thread_mut(tid);
        t.valstack.set(idx_base, caught.clone());
        t.valstack.set(idx_base + 1, completion);

        // the target catcher itself is kept, even for finally
        t.catchstack_unwind(cat_idx + 1);
        t.callstack_unwind(cs_index + 1);

        debug_assert_eq!(t.callstack.len() - 1, cs_index);
        let (idx_bottom, nregs) = {
            let act = &t.callstack[cs_index];
            (
                act.idx_bottom as usize,
                act.code.as_ref().expect("catcher owner not compiled").nregs as usize,
            )
        };
        t.valstack.set_bottom(idx_bottom);
        t.valstack.set_len_abs(idx_bottom + nregs);

        t.callstack[cs_index].pc = pc_base + if is_finally { 1 } else { 0 };
    }

    if !is_finally && catch_binding {
        // E5 §12.14 step 4: fresh declarative environment with one
        // mutable, non-deletable binding for the catch variable
        init_activation_environments(rt, tid, cs_index);
        let parent = rt.thread(tid).callstack[cs_index].lex_env.clone();
        let new_env = environment::new_declarative_env(parent);
        let name = varname.expect("catch binding without varname");
        if let environment::EnvKind::Decl(map) = &mut new_env.borrow_mut().kind {
            map.insert(
                name.sym(),
                Binding {
                    value: caught,
                    mutable: true,
                    deletable: false,
                },
            );
        }
        rt.thread_mut(tid).callstack[cs_index].lex_env = Some(new_env);
        rt.thread_mut(tid).catchstack[cat_idx].flags |= CAT_FLAG_LEXENV_ACTIVE;
    }

    let cat = &mut rt.thread_mut(tid).catchstack[cat_idx];
    if is_finally {
        cat.flags &= !CAT_FLAG_FINALLY_ENABLED;
    } else {
        cat.flags &= !CAT_FLAG_CATCH_ENABLED;
    }
    Ok(())
}
