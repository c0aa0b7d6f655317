/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Error objects and host-facing errors.
//!
//! Script-visible errors are ordinary objects of class `Error` carrying
//! `name` and `message`; the kind taxonomy (TypeError, RangeError,
//! ReferenceError, SyntaxError, InternalError) lives in the `name`
//! property.  The `Runtime::throw_*` helpers construct one, arm the
//! unwind state and hand back the [`Unwind`] token for `?` propagation.

use super::object::{self, Class, JsObject, ObjRef, PropKey, ATTR_WRITABLE};
use super::symbol_table::Internable;
use super::value::JsValue;
use super::{LjKind, Runtime, Unwind};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Host-facing error conditions that are not script-visible throws.
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// A script error reached the entry level uncaught.
    #[error("uncaught script error: {0:?}")]
    Uncaught(JsValue),
    /// `run` was handed a value that is not callable.
    #[error("call target is not callable")]
    NotCallable,
    /// The current thread is not in a runnable state.
    #[error("thread is not runnable")]
    NotRunnable,
}

pub fn new_error_object(rt: &mut Runtime, name: &str, message: &str) -> ObjRef {
    let mut obj = JsObject::new(Class::Error, Some(rt.error_proto.clone()));
    obj.data = object::ObjectData::Ordinary;
    let obj = Rc::new(RefCell::new(obj));
    let n = rt.intern(name);
    object::define_own(
        &obj,
        PropKey::Name("name".intern()),
        JsValue::string(n),
        ATTR_WRITABLE | object::ATTR_CONFIGURABLE,
    );
    if !message.is_empty() {
        let m = rt.intern(message);
        object::define_own(
            &obj,
            PropKey::Name("message".intern()),
            JsValue::string(m),
            ATTR_WRITABLE | object::ATTR_CONFIGURABLE,
        );
    }
    obj
}

/// Hook point for error augmentation at throw time.  Errors are augmented
/// when created, not when thrown, so re-throwing stays lossless; this only
/// reports the event.
pub fn augment_error_throw(rt: &mut Runtime, value: &JsValue) {
    let _ = rt;
    tracing::debug!(value = ?value, "throwing");
}

impl Runtime {
    pub fn new_error(&mut self, name: &str, message: &str) -> JsValue {
        JsValue::object(new_error_object(self, name, message))
    }

    pub fn new_type_error(&mut self, message: &str) -> JsValue {
        self.new_error("TypeError", message)
    }

    pub fn new_range_error(&mut self, message: &str) -> JsValue {
        self.new_error("RangeError", message)
    }

    pub fn new_reference_error(&mut self, message: &str) -> JsValue {
        self.new_error("ReferenceError", message)
    }

    pub fn new_syntax_error(&mut self, message: &str) -> JsValue {
        self.new_error("SyntaxError", message)
    }

    /// Arm the unwind state with a THROW carrying `value`.
    pub fn throw_value(&mut self, value: JsValue) -> Unwind {
        let iserror = object::is_error(&value);
        self.lj.kind = LjKind::Throw;
        self.lj.value1 = value;
        self.lj.value2 = JsValue::undefined();
        self.lj.iserror = iserror;
        Unwind
    }

    pub fn throw_type_error(&mut self, message: &str) -> Unwind {
        let v = self.new_type_error(message);
        self.throw_value(v)
    }

    pub fn throw_range_error(&mut self, message: &str) -> Unwind {
        let v = self.new_range_error(message);
        self.throw_value(v)
    }

    pub fn throw_reference_error(&mut self, message: &str) -> Unwind {
        let v = self.new_reference_error(message);
        self.throw_value(v)
    }

    pub fn throw_syntax_error(&mut self, message: &str) -> Unwind {
        let v = self.new_syntax_error(message);
        self.throw_value(v)
    }

    /// Invariant violations, malformed bytecode, exhausted sanity
    /// counters.  Message detail is controlled by
    /// `RuntimeParams::verbose_internal_errors`.
    pub fn internal_error(&mut self, message: &str) -> Unwind {
        let msg = if self.params.verbose_internal_errors {
            message
        } else {
            "internal error"
        };
        let v = self.new_error("InternalError", msg);
        self.throw_value(v)
    }
}
