/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Runtime: the heap-level container owning every thread, the shared
//! unwind state, the interner and the minimal realm.

pub mod builtins;
pub mod code_block;
pub mod environment;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod object;
pub mod operations;
pub mod string;
pub mod symbol_table;
pub mod thread;
pub mod value;

use environment::EnvRef;
use error::InterpreterError;
use interpreter::call::CallFlags;
use object::{Class, JsObject, ObjRef};
use string::JsString;
use symbol_table::{symbol_table, SymbolId};
use thread::{Thread, ThreadId, ThreadState};
use value::JsValue;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Marker carried through `Result` while an unwind event sits in the
/// runtime's [`UnwindState`]; the dispatch trampoline consumes it.
#[derive(Debug)]
pub struct Unwind;

pub type Control<T> = Result<T, Unwind>;

/// Unwind event kinds.  The numeric values are stored into try/finally
/// completion slots as plain numbers, so they are part of the bytecode
/// contract.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum LjKind {
    None = 0,
    Throw = 1,
    Yield = 2,
    Resume = 3,
    Break = 4,
    Continue = 5,
    Return = 6,
    Normal = 7,
}

impl LjKind {
    pub fn from_number(x: f64) -> Option<LjKind> {
        match x as u8 {
            0 => Some(LjKind::None),
            1 => Some(LjKind::Throw),
            2 => Some(LjKind::Yield),
            3 => Some(LjKind::Resume),
            4 => Some(LjKind::Break),
            5 => Some(LjKind::Continue),
            6 => Some(LjKind::Return),
            7 => Some(LjKind::Normal),
            _ => None,
        }
    }
}

/// The single channel carrying non-local transfers: throw, slow return,
/// break/continue, yield and resume.
pub struct UnwindState {
    pub kind: LjKind,
    pub value1: JsValue,
    pub value2: JsValue,
    pub iserror: bool,
}

impl UnwindState {
    fn new() -> UnwindState {
        UnwindState {
            kind: LjKind::None,
            value1: JsValue::Undefined,
            value2: JsValue::Undefined,
            iserror: false,
        }
    }
}

pub type InterruptHook = Box<dyn FnMut(&mut Runtime) -> Control<()>>;

/// Tunables; the defaults match a small embedded profile.
pub struct RuntimeParams {
    /// Maximum value-stack slots per thread.
    pub valstack_limit: usize,
    /// Maximum activations per thread.
    pub callstack_limit: usize,
    /// Maximum byte length of any single string.
    pub string_byte_limit: usize,
    /// Instructions executed between interrupt-hook invocations.
    pub interrupt_interval: i64,
    /// Include detail in InternalError messages.
    pub verbose_internal_errors: bool,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self {
            valstack_limit: 1_000_000,
            callstack_limit: 10_000,
            string_byte_limit: 256 * 1024 * 1024,
            interrupt_interval: 65_536,
            verbose_internal_errors: true,
        }
    }
}

pub struct Runtime {
    pub(crate) threads: Vec<Thread>,
    /// Currently running thread.
    pub(crate) cur: ThreadId,
    /// Shared unwind event channel.
    pub(crate) lj: UnwindState,
    pub(crate) params: RuntimeParams,
    pub(crate) interrupt_init: i64,
    pub(crate) interrupt_hook: Option<InterruptHook>,
    /// Canonical string values per interner symbol.
    strings: HashMap<SymbolId, Rc<JsString>>,

    pub(crate) object_proto: ObjRef,
    pub(crate) function_proto: ObjRef,
    pub(crate) array_proto: ObjRef,
    pub(crate) error_proto: ObjRef,
    pub(crate) global: ObjRef,
    pub(crate) global_env: EnvRef,

    /// Built-in `eval`, recognized by identity for direct-eval detection.
    pub(crate) eval_fn: JsValue,
    pub(crate) resume_fn: JsValue,
    pub(crate) yield_fn: JsValue,
}

impl Runtime {
    pub fn new(params: RuntimeParams) -> Runtime {
        let object_proto = Rc::new(RefCell::new(JsObject::new(Class::Object, None)));
        let function_proto = Rc::new(RefCell::new(JsObject::new(
            Class::Object,
            Some(object_proto.clone()),
        )));
        let array_proto = Rc::new(RefCell::new(JsObject::new(
            Class::Object,
            Some(object_proto.clone()),
        )));
        let error_proto = Rc::new(RefCell::new(JsObject::new(
            Class::Object,
            Some(object_proto.clone()),
        )));
        let global = Rc::new(RefCell::new(JsObject::new(
            Class::Global,
            Some(object_proto.clone()),
        )));
        let global_env = environment::new_object_env(global.clone(), false, None);

        let mut rt = Runtime {
            threads: Vec::new(),
            cur: ThreadId(0),
            lj: UnwindState::new(),
            params,
            interrupt_init: 0,
            interrupt_hook: None,
            strings: HashMap::new(),
            object_proto,
            function_proto,
            array_proto,
            error_proto,
            global,
            global_env,
            eval_fn: JsValue::Undefined,
            resume_fn: JsValue::Undefined,
            yield_fn: JsValue::Undefined,
        };
        rt.interrupt_init = rt.params.interrupt_interval;

        let mut main = Thread::new(ThreadId(0), &rt.params);
        main.state = ThreadState::Running;
        rt.threads.push(main);

        builtins::init_realm(&mut rt);
        rt
    }

    #[inline]
    pub(crate) fn thread(&self, id: ThreadId) -> &Thread {
        &self.threads[id.0 as usize]
    }

    #[inline]
    pub(crate) fn thread_mut(&mut self, id: ThreadId) -> &mut Thread {
        &mut self.threads[id.0 as usize]
    }

    #[inline]
    pub(crate) fn thr(&self) -> &Thread {
        self.thread(self.cur)
    }

    #[inline]
    pub(crate) fn thr_mut(&mut self) -> &mut Thread {
        let cur = self.cur;
        self.thread_mut(cur)
    }

    pub fn current_thread(&self) -> ThreadId {
        self.cur
    }

    pub fn thread_state(&self, id: ThreadId) -> ThreadState {
        self.thread(id).state
    }

    /// Intern `s` and return the canonical string value.
    pub fn intern(&mut self, s: &str) -> Rc<JsString> {
        let sym = symbol_table().intern(s);
        self.string_from_sym(sym)
    }

    /// Interning with the byte-length cap applied; used wherever script
    /// activity can produce arbitrarily long text.
    pub fn intern_checked(&mut self, s: &str) -> Control<Rc<JsString>> {
        if s.len() > self.params.string_byte_limit {
            return Err(self.throw_range_error("string too long"));
        }
        Ok(self.intern(s))
    }

    pub fn string_from_sym(&mut self, sym: SymbolId) -> Rc<JsString> {
        if let Some(s) = self.strings.get(&sym) {
            return s.clone();
        }
        let s = JsString::from_symbol(sym);
        self.strings.insert(sym, s.clone());
        s
    }

    /// Concatenation checks the length cap before interning.
    pub fn concat_strings(
        &mut self,
        a: &Rc<JsString>,
        b: &Rc<JsString>,
    ) -> Control<Rc<JsString>> {
        let total = a.byte_len() + b.byte_len();
        if total > self.params.string_byte_limit {
            return Err(self.throw_range_error("concat result too long"));
        }
        let mut s = String::with_capacity(total);
        s.push_str(a.as_str());
        s.push_str(b.as_str());
        Ok(self.intern(&s))
    }

    pub fn global_object(&self) -> ObjRef {
        self.global.clone()
    }

    pub fn global_env(&self) -> EnvRef {
        self.global_env.clone()
    }

    /// Realize a function object over compiled code, closing over the
    /// global environment.
    pub fn new_function(&mut self, code: Rc<code_block::CodeBlock>) -> JsValue {
        let env = self.global_env.clone();
        JsValue::object(function::push_closure(self, code, Some(env)))
    }

    /// Spawn a coroutine thread whose initial function is `func`; the
    /// body must be compiled (the initial resume enters it in-process).
    pub fn spawn_thread(&mut self, func: &JsValue) -> Result<JsValue, InterpreterError> {
        let compiled = match func {
            JsValue::Object(o) => matches!(
                o.borrow().data,
                object::ObjectData::Function(function::JsFunction::Vm { .. })
            ),
            _ => false,
        };
        if !compiled {
            return Err(InterpreterError::NotCallable);
        }
        let id = ThreadId(self.threads.len() as u32);
        let mut t = Thread::new(id, &self.params);
        t.valstack.push(func.clone());
        self.threads.push(t);

        let mut obj = JsObject::new(Class::Thread, Some(self.object_proto.clone()));
        obj.data = object::ObjectData::Thread(id);
        debug!(thread = id.0, "thread spawned");
        Ok(JsValue::object(Rc::new(RefCell::new(obj))))
    }

    /// Install the executor interrupt hook.  The hook runs every
    /// `interrupt_interval` instructions and may throw (step limits),
    /// adjust the counter (single-stepping) or return normally.
    pub fn set_interrupt_hook(&mut self, hook: InterruptHook) {
        self.interrupt_hook = Some(hook);
    }

    /// Re-arm the countdown so the hook runs after `count` further
    /// instructions; `count == 1` means exactly one more instruction.
    pub fn set_interrupt_interval(&mut self, count: i64) {
        self.interrupt_init = count;
        self.thr_mut().interrupt_counter = count - 1;
    }

    /* native call frame access */

    pub fn native_nargs(&self) -> u32 {
        self.thr().current_act().nargs
    }

    pub fn native_arg(&self, i: u32) -> JsValue {
        let t = self.thr();
        let act = t.current_act();
        if i < act.nargs {
            t.valstack.get(act.idx_bottom as usize + i as usize)
        } else {
            JsValue::Undefined
        }
    }

    pub fn native_this(&self) -> JsValue {
        let t = self.thr();
        let act = t.current_act();
        t.valstack.get(act.idx_bottom as usize - 1)
    }

    pub(crate) fn wipe_lj(&mut self) {
        self.lj.kind = LjKind::None;
        self.lj.value1 = JsValue::Undefined;
        self.lj.value2 = JsValue::Undefined;
        self.lj.iserror = false;
    }

    /// Host entry point: call `func` on the current thread and run the
    /// executor until the entry activation returns or throws out.
    pub fn run(&mut self, func: &JsValue, args: &[JsValue]) -> Result<JsValue, InterpreterError> {
        self.run_with_this(func, JsValue::Undefined, args)
    }

    pub fn run_with_this(
        &mut self,
        func: &JsValue,
        this: JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, InterpreterError> {
        if !func.is_callable() {
            return Err(InterpreterError::NotCallable);
        }
        if self.thr().state != ThreadState::Running {
            return Err(InterpreterError::NotRunnable);
        }
        let entry_cs = self.thr().callstack.len();
        let entry_cat = self.thr().catchstack.len();
        let entry_vs = self.thr().valstack.len();
        let entry_bottom = self.thr().valstack.bottom();
        match interpreter::call::host_call(self, func, this, args, CallFlags::empty()) {
            Ok(v) => Ok(v),
            Err(Unwind) => {
                debug_assert_eq!(self.lj.kind, LjKind::Throw);
                let v = std::mem::replace(&mut self.lj.value1, JsValue::Undefined);
                self.wipe_lj();
                // unwind everything the failed entry call left behind
                let t = self.thr_mut();
                t.catchstack_unwind(entry_cat);
                t.callstack_unwind(entry_cs);
                t.valstack.set_len_abs(entry_vs);
                t.valstack.set_bottom(entry_bottom);
                Err(InterpreterError::Uncaught(v))
            }
        }
    }
}
