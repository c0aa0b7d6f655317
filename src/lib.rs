/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Embeddable ECMAScript 5.1 interpreter core.
//!
//! The crate implements the bytecode execution subsystem of a small
//! scripting engine: a register-based dispatch loop, the activation and
//! catcher stack model behind function calls, try/catch/finally, labelled
//! break/continue and coroutine resume/yield, and the arithmetic and
//! coercion primitives the dispatcher relies on.  Parsing and compiling
//! source text to bytecode is out of scope; hosts assemble [`CodeBlock`]s
//! with [`bytecode::builder::CodeBlockBuilder`] or load them from their own
//! front end.
//!
//! ```
//! use smew::prelude::*;
//!
//! let mut rt = Runtime::new(RuntimeParams::default());
//! let mut b = CodeBlockBuilder::new("answer", 0, 2);
//! b.emit_a_bc(Opcode::LdInt, 0, LDINT_BIAS + 7);
//! b.emit_a_bc(Opcode::LdInt, 1, LDINT_BIAS + 35);
//! b.emit(Opcode::Add, 0, 0, 1);
//! b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
//! let code = b.build();
//! let f = rt.new_function(code);
//! let v = rt.run(&f, &[]).unwrap();
//! assert_eq!(v.get_number(), 42.0);
//! ```

pub mod bytecode;
pub mod vm;

pub use vm::code_block::CodeBlock;
pub use vm::value::JsValue;
pub use vm::Runtime;

pub mod prelude {
    pub use crate::bytecode::builder::CodeBlockBuilder;
    pub use crate::bytecode::opcodes::{ExtraOp, Opcode};
    pub use crate::bytecode::{
        CALL_FLAG_EVALCALL, CALL_FLAG_TAILCALL, DECLVAR_FLAG_FUNC_DECL, DECLVAR_FLAG_UNDEF_VALUE,
        JUMP_BIAS, LDINT_BIAS, PROPDESC_C, PROPDESC_E, PROPDESC_W, REG_LIMIT,
        RETURN_FLAG_HAVE_RETVAL, TRYCATCH_FLAG_CATCH_BINDING, TRYCATCH_FLAG_HAVE_CATCH,
        TRYCATCH_FLAG_HAVE_FINALLY, TRYCATCH_FLAG_WITH_BINDING,
    };
    pub use crate::vm::code_block::CodeBlock;
    pub use crate::vm::error::InterpreterError;
    pub use crate::vm::thread::ThreadState;
    pub use crate::vm::value::JsValue;
    pub use crate::vm::{Runtime, RuntimeParams};
}
