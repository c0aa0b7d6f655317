/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Coroutine threads.
//!
//! A thread owns three parallel stacks: tagged values, activations and
//! catchers.  At most one thread runs at a time; switches happen only in
//! the unwind handler.

use super::interpreter::frame::{Activation, Catcher};
use super::interpreter::stack::{ValueStack, VALSTACK_INTERNAL_EXTRA};
use super::RuntimeParams;
use tracing::debug;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ThreadId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadState {
    /// Freshly created; value stack holds only the initial function.
    Inactive,
    /// Currently executing.
    Running,
    /// Suspended in `resume`, waiting for the resumee to come back.
    Resumed,
    /// Suspended in `yield`, resumable.
    Yielded,
    /// Finished or failed; never resumable again.
    Terminated,
}

pub struct Thread {
    pub id: ThreadId,
    pub state: ThreadState,
    /// Back-pointer to the resuming thread; set while RUNNING via a
    /// resume chain, cleared on yield/termination.
    pub resumer: Option<ThreadId>,
    pub valstack: ValueStack,
    pub callstack: Vec<Activation>,
    pub catchstack: Vec<Catcher>,
    /// Countdown mirror for the executor interrupt mechanism.
    pub interrupt_counter: i64,
    /// Non-zero while a native (recursive) call is in progress below the
    /// current frames; blocks yield/resume across such frames.
    pub preventcount: u32,
}

impl Thread {
    pub fn new(id: ThreadId, params: &RuntimeParams) -> Thread {
        Thread {
            id,
            state: ThreadState::Inactive,
            resumer: None,
            valstack: ValueStack::new(params.valstack_limit),
            callstack: Vec::new(),
            catchstack: Vec::new(),
            interrupt_counter: params.interrupt_interval - 1,
            preventcount: 0,
        }
    }

    #[inline]
    pub fn current_act_index(&self) -> usize {
        debug_assert!(!self.callstack.is_empty());
        self.callstack.len() - 1
    }

    #[inline]
    pub fn current_act(&self) -> &Activation {
        self.callstack.last().expect("empty call stack")
    }

    #[inline]
    pub fn current_act_mut(&mut self) -> &mut Activation {
        self.callstack.last_mut().expect("empty call stack")
    }

    /// Re-establish the value stack around `act_idx` after a return or a
    /// catch/finally entry: frame base moves to the activation's bottom,
    /// the top is clamped so `idx_retval + retval_count` is the new top,
    /// then extended back out to `nregs`.
    pub fn reconfig_valstack(&mut self, act_idx: usize, retval_count: usize) {
        let (idx_bottom, idx_retval, nregs) = {
            let act = &self.callstack[act_idx];
            let nregs = act
                .code
                .as_ref()
                .expect("reconfig over a non-compiled activation")
                .nregs;
            (act.idx_bottom as usize, act.idx_retval as usize, nregs as usize)
        };
        self.valstack.set_bottom(idx_bottom);
        self.valstack.set_len_abs(idx_retval + retval_count);
        self.valstack.set_len_abs(idx_bottom + nregs);
    }

    /// Pop catchers down to `new_top`.  Catchers with an active lexical
    /// environment (catch binding or `with`) restore the owning
    /// activation's lexical environment on the way out.
    pub fn catchstack_unwind(&mut self, new_top: usize) {
        while self.catchstack.len() > new_top {
            let cat = self.catchstack.pop().expect("catchstack underflow");
            if cat.lexenv_active() {
                let act = &mut self.callstack[cat.callstack_index as usize];
                let parent = act
                    .lex_env
                    .as_ref()
                    .and_then(|env| env.borrow().parent.clone());
                act.lex_env = parent;
            }
        }
    }

    /// Pop activations down to `new_top`; callers must already have
    /// unwound every catcher that referenced them.
    pub fn callstack_unwind(&mut self, new_top: usize) {
        debug_assert!(self
            .catchstack
            .iter()
            .all(|c| (c.callstack_index as usize) < new_top));
        self.callstack.truncate(new_top);
    }

    /// Terminate the thread and release its stacks.
    pub fn terminate(&mut self) {
        debug!(thread = self.id.0, "thread terminated");
        self.catchstack_unwind(0);
        self.callstack_unwind(0);
        self.valstack.set_bottom(0);
        self.valstack.set_len_abs(0);
        self.resumer = None;
        self.state = ThreadState::Terminated;
    }

    /// Grow the reservation for a frame of `nregs` registers starting at
    /// `bottom`; false when the configured limit would be exceeded.
    pub fn require_frame_slots(&self, bottom: usize, nregs: usize) -> bool {
        self.valstack
            .check_limit(bottom + nregs + VALSTACK_INTERNAL_EXTRA)
    }
}
