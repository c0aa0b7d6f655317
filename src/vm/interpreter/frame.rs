/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Activation and catcher records.
//!
//! One [`Activation`] per invoked function (compiled or native); the
//! catch stack holds [`Catcher`] entries for try/catch/finally and
//! labelled statements.  Records reference valstack slots by absolute
//! index and the owning activation by call-stack index, never by pointer.

use crate::vm::code_block::CodeBlock;
use crate::vm::environment::EnvRef;
use crate::vm::string::JsString;
use crate::vm::value::JsValue;
use std::rc::Rc;

pub const ACT_FLAG_DIRECT_EVAL: u8 = 1 << 0;
pub const ACT_FLAG_CONSTRUCT: u8 = 1 << 1;

pub struct Activation {
    /// The function being executed; also reachable at `idx_bottom - 2`.
    pub func: JsValue,
    /// Compiled code, `None` for native activations.
    pub code: Option<Rc<CodeBlock>>,
    /// Word offset into the bytecode; pre-incremented at fetch.
    pub pc: u32,
    /// Absolute valstack index of register 0.
    pub idx_bottom: u32,
    /// Absolute valstack slot where a pending callee's return value
    /// lands; owned by this (caller) activation.
    pub idx_retval: u32,
    /// Native argument count; unused for compiled activations.
    pub nargs: u32,
    pub lex_env: Option<EnvRef>,
    pub var_env: Option<EnvRef>,
    pub flags: u8,
}

impl Activation {
    pub fn is_compiled(&self) -> bool {
        self.code.is_some()
    }
}

pub const CAT_FLAG_CATCH_ENABLED: u8 = 1 << 0;
pub const CAT_FLAG_FINALLY_ENABLED: u8 = 1 << 1;
pub const CAT_FLAG_CATCH_BINDING_ENABLED: u8 = 1 << 2;
pub const CAT_FLAG_LEXENV_ACTIVE: u8 = 1 << 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CatcherKind {
    /// try/catch/finally frame; owns the two completion slots at
    /// `idx_base` and `idx_base + 1`.
    Tcf,
    /// Labelled statement frame carrying the label id.
    Label(u32),
}

pub struct Catcher {
    pub kind: CatcherKind,
    pub flags: u8,
    /// Index of the owning activation on the call stack.
    pub callstack_index: u32,
    /// First of the two jump slots: catch/break at +0, finally/continue
    /// at +1.
    pub pc_base: u32,
    /// Absolute valstack index of the caught-value slot (TCF only).
    pub idx_base: u32,
    /// Catch binding variable name, when CATCH_BINDING_ENABLED.
    pub varname: Option<Rc<JsString>>,
}

impl Catcher {
    #[inline]
    pub fn is_tcf(&self) -> bool {
        matches!(self.kind, CatcherKind::Tcf)
    }

    #[inline]
    pub fn label(&self) -> Option<u32> {
        match self.kind {
            CatcherKind::Label(id) => Some(id),
            CatcherKind::Tcf => None,
        }
    }

    #[inline]
    pub fn catch_enabled(&self) -> bool {
        self.flags & CAT_FLAG_CATCH_ENABLED != 0
    }

    #[inline]
    pub fn finally_enabled(&self) -> bool {
        self.flags & CAT_FLAG_FINALLY_ENABLED != 0
    }

    #[inline]
    pub fn catch_binding_enabled(&self) -> bool {
        self.flags & CAT_FLAG_CATCH_BINDING_ENABLED != 0
    }

    #[inline]
    pub fn lexenv_active(&self) -> bool {
        self.flags & CAT_FLAG_LEXENV_ACTIVE != 0
    }
}
