/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Compiled function records.

use crate::bytecode::opcodes::{ExtraOp, Opcode};
use crate::bytecode::{self, Ins};
use crate::vm::value::JsValue;
use std::fmt::Write;
use std::rc::Rc;

/// A type representing single function bytecode.
///
/// Immutable once built; executors hold an `Rc` clone so the bytecode and
/// constant pool stay valid across arbitrary side effects.
pub struct CodeBlock {
    /// Function name (diagnostics only).
    pub name: String,
    /// Bytecode.
    pub code: Vec<Ins>,
    /// Constant pool.
    pub consts: Vec<JsValue>,
    /// Inner function templates, realized by `CLOSURE`.
    pub inner: Vec<Rc<CodeBlock>>,
    /// Register count; the frame always holds exactly this many slots.
    pub nregs: u32,
    /// Declared parameter count.
    pub nargs: u32,
    /// Strict mode flag.
    pub strict: bool,
}

impl CodeBlock {
    /// Disassemble to `output`, one instruction per line.
    pub fn display_to<T: Write>(&self, output: &mut T) -> std::fmt::Result {
        writeln!(
            output,
            "function {:?} nargs={} nregs={} strict={}",
            self.name, self.nargs, self.nregs, self.strict
        )?;
        for (pc, &ins) in self.code.iter().enumerate() {
            let op = Opcode::from_raw(bytecode::dec_op(ins));
            write!(output, "{:04}: ", pc)?;
            match op {
                Opcode::Jump => {
                    let abc = bytecode::dec_abc(ins) as i64 - bytecode::JUMP_BIAS as i64;
                    writeln!(output, "jump {:+}", abc)?;
                }
                Opcode::LdInt => {
                    let v = bytecode::dec_bc(ins) as i64 - bytecode::LDINT_BIAS as i64;
                    writeln!(output, "ldint r{}, {}", bytecode::dec_a(ins), v)?;
                }
                Opcode::Extra => {
                    let ex = ExtraOp::from_raw(bytecode::dec_a(ins));
                    writeln!(
                        output,
                        "extra {:?} b={} c={}",
                        ex,
                        bytecode::dec_b(ins),
                        bytecode::dec_c(ins)
                    )?;
                }
                _ => {
                    writeln!(
                        output,
                        "{:?} a={} b={} c={}",
                        op,
                        bytecode::dec_a(ins),
                        bytecode::dec_b(ins),
                        bytecode::dec_c(ins)
                    )?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CodeBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CodeBlock({:?}, {} ins, {} consts)",
            self.name,
            self.code.len(),
            self.consts.len()
        )
    }
}
