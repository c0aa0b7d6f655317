/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Programmatic bytecode assembler.
//!
//! The compiler front end is an external collaborator; hosts and tests use
//! this builder to produce [`CodeBlock`]s directly.  Jump targets can be
//! patched after the fact, reg/const operands are returned from
//! [`CodeBlockBuilder::konst`] already biased past the register range.

use super::opcodes::{ExtraOp, Opcode};
use super::{enc_a_bc, enc_abc, enc_abc_joint, Ins, JUMP_BIAS, REG_LIMIT};
use crate::vm::code_block::CodeBlock;
use crate::vm::value::JsValue;
use crate::vm::Runtime;
use std::rc::Rc;

pub struct CodeBlockBuilder {
    name: String,
    code: Vec<Ins>,
    consts: Vec<JsValue>,
    inner: Vec<Rc<CodeBlock>>,
    nargs: u32,
    nregs: u32,
    strict: bool,
}

impl CodeBlockBuilder {
    pub fn new(name: &str, nargs: u32, nregs: u32) -> Self {
        assert!(nargs <= nregs, "parameters live in registers");
        Self {
            name: name.to_string(),
            code: Vec::new(),
            consts: Vec::new(),
            inner: Vec::new(),
            nargs,
            nregs,
            strict: false,
        }
    }

    pub fn strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    /// Current bytecode offset.
    pub fn here(&self) -> u32 {
        self.code.len() as u32
    }

    /// Add a constant and return its reg/const operand encoding.
    pub fn konst(&mut self, v: JsValue) -> u32 {
        let idx = self.consts.len() as u32;
        self.consts.push(v);
        REG_LIMIT + idx
    }

    /// Intern `s` through the runtime and add it as a string constant.
    pub fn konst_str(&mut self, rt: &mut Runtime, s: &str) -> u32 {
        let v = JsValue::string(rt.intern(s));
        self.konst(v)
    }

    pub fn konst_number(&mut self, x: f64) -> u32 {
        self.konst(JsValue::number(x))
    }

    /// Register an inner function template; returns the index used by
    /// `CLOSURE`.
    pub fn inner_function(&mut self, code: Rc<CodeBlock>) -> u32 {
        let idx = self.inner.len() as u32;
        self.inner.push(code);
        idx
    }

    pub fn emit(&mut self, op: Opcode, a: u32, b: u32, c: u32) -> u32 {
        let pc = self.here();
        self.code.push(enc_abc(op as u32, a, b, c));
        pc
    }

    pub fn emit_a_bc(&mut self, op: Opcode, a: u32, bc: u32) -> u32 {
        let pc = self.here();
        self.code.push(enc_a_bc(op as u32, a, bc));
        pc
    }

    pub fn emit_extra(&mut self, ex: ExtraOp, b: u32, c: u32) -> u32 {
        self.emit(Opcode::Extra, ex as u32, b, c)
    }

    pub fn emit_extra_bc(&mut self, ex: ExtraOp, bc: u32) -> u32 {
        let pc = self.here();
        self.code
            .push(enc_a_bc(Opcode::Extra as u32, ex as u32, bc));
        pc
    }

    /// Emit a labelled-statement open; the two jump slots must follow.
    pub fn emit_label(&mut self, id: u32) -> u32 {
        let pc = self.here();
        self.code.push(enc_abc_joint(Opcode::Label as u32, id));
        pc
    }

    pub fn emit_endlabel(&mut self, id: u32) -> u32 {
        let pc = self.here();
        self.code.push(enc_abc_joint(Opcode::EndLabel as u32, id));
        pc
    }

    pub fn emit_break(&mut self, id: u32) -> u32 {
        let pc = self.here();
        self.code.push(enc_abc_joint(Opcode::Break as u32, id));
        pc
    }

    pub fn emit_continue(&mut self, id: u32) -> u32 {
        let pc = self.here();
        self.code.push(enc_abc_joint(Opcode::Continue as u32, id));
        pc
    }

    /// Emit a jump to a known target.
    pub fn emit_jump_to(&mut self, target: u32) -> u32 {
        let pc = self.here();
        let abc = (JUMP_BIAS as i64 + target as i64 - (pc as i64 + 1)) as u32;
        self.code.push(enc_abc_joint(Opcode::Jump as u32, abc));
        pc
    }

    /// Emit a forward jump with a placeholder offset; resolve it later with
    /// [`CodeBlockBuilder::patch_jump`].
    pub fn emit_jump(&mut self) -> u32 {
        let pc = self.here();
        self.code.push(enc_abc_joint(Opcode::Jump as u32, JUMP_BIAS));
        pc
    }

    pub fn patch_jump(&mut self, at: u32, target: u32) {
        let abc = (JUMP_BIAS as i64 + target as i64 - (at as i64 + 1)) as u32;
        self.code[at as usize] = enc_abc_joint(Opcode::Jump as u32, abc);
    }

    pub fn build(self) -> Rc<CodeBlock> {
        Rc::new(CodeBlock {
            name: self.name,
            code: self.code,
            consts: self.consts,
            inner: self.inner,
            nregs: self.nregs,
            nargs: self.nargs,
            strict: self.strict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{dec_abc, dec_op};

    #[test]
    fn jump_encoding_round_trip() {
        let mut b = CodeBlockBuilder::new("t", 0, 1);
        b.emit(Opcode::LdInt, 0, 0, 0);
        let j = b.emit_jump();
        b.emit(Opcode::LdInt, 0, 0, 0);
        let target = b.here();
        b.patch_jump(j, target);
        let code = b.build();

        let ins = code.code[j as usize];
        assert_eq!(dec_op(ins), Opcode::Jump as u32);
        // pc after fetch is j+1; adding the biased offset lands on target
        let rel = dec_abc(ins) as i64 - JUMP_BIAS as i64;
        assert_eq!(j as i64 + 1 + rel, target as i64);
    }
}
