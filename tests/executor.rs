//! End-to-end executor scenarios over hand-assembled bytecode.

use smew::prelude::*;
use smew::vm::object::{self, PropKey};
use smew::vm::symbol_table::Internable;
use smew::vm::value::JsValue;
use std::cell::Cell;
use std::rc::Rc;

fn rt() -> Runtime {
    Runtime::new(RuntimeParams::default())
}

#[test]
fn add_two_integers() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 2);
    b.emit_a_bc(Opcode::LdInt, 0, LDINT_BIAS + 7);
    b.emit_a_bc(Opcode::LdInt, 1, LDINT_BIAS + 35);
    b.emit(Opcode::Add, 0, 0, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 42.0);
}

#[test]
fn add_concatenates_constants() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 1);
    let ka = b.konst_str(&mut rt, "ab");
    let kb = b.konst_str(&mut rt, "cd");
    b.emit(Opcode::Add, 0, ka, kb);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_string().as_str(), "abcd");
}

#[test]
fn ldconst_and_registers() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 3);
    let k = b.konst_str(&mut rt, "hello") - REG_LIMIT;
    b.emit_a_bc(Opcode::LdConst, 0, k);
    b.emit_a_bc(Opcode::LdReg, 1, 0);
    b.emit_a_bc(Opcode::StReg, 1, 2);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_string().as_str(), "hello");
}

#[test]
fn ldintx_builds_wide_integers() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 1);
    // 5 * 2^18 + 1234
    b.emit_a_bc(Opcode::LdInt, 0, LDINT_BIAS + 5);
    b.emit_a_bc(Opcode::LdIntX, 0, 1234);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 5.0 * 262144.0 + 1234.0);
}

#[test]
fn arguments_arrive_in_registers() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("sub", 2, 4);
    b.emit(Opcode::Sub, 0, 0, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let f = rt.new_function(b.build());

    let v = rt
        .run(&f, &[JsValue::number(50.0), JsValue::number(8.0)])
        .unwrap();
    assert_eq!(v.get_number(), 42.0);
}

#[test]
fn compiled_to_compiled_call() {
    let mut rt = rt();

    // callee(a, b) -> a * b
    let mut callee = CodeBlockBuilder::new("mul", 2, 4);
    callee.emit(Opcode::Mul, 0, 0, 1);
    callee.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let callee = callee.build();

    // main: f = closure; f(6, 7)
    let mut b = CodeBlockBuilder::new("main", 0, 8);
    let tpl = b.inner_function(callee);
    b.emit_a_bc(Opcode::Closure, 0, tpl);
    // window at r2: callee, this, args
    b.emit_a_bc(Opcode::LdReg, 2, 0);
    b.emit_extra_bc(ExtraOp::LdUndef, 3);
    b.emit_a_bc(Opcode::LdInt, 4, LDINT_BIAS + 6);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS + 7);
    b.emit(Opcode::Call, 0, 2, 2);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 42.0);
}

#[test]
fn tailcall_chain_runs_in_constant_depth() {
    let mut rt = rt();

    // f(n): if (n == 0) return 42; return f(n - 1)  [tailcall]
    let mut b = CodeBlockBuilder::new("f", 1, 8);
    let k0 = b.konst_number(0.0);
    let k1 = b.konst_number(1.0);
    let fname = b.konst_str(&mut rt, "f") - REG_LIMIT;
    b.emit(Opcode::Eq, 1, 0, k0); // r1 = n == 0
    b.emit(Opcode::If, 1, 1, 0); // true -> skip jump
    let to_tail = b.emit_jump();
    b.emit_a_bc(Opcode::LdInt, 2, LDINT_BIAS + 42);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let tail = b.here();
    b.patch_jump(to_tail, tail);
    b.emit_a_bc(Opcode::GetVar, 2, fname);
    b.emit_extra_bc(ExtraOp::LdUndef, 3);
    b.emit(Opcode::Sub, 4, 0, k1);
    b.emit(Opcode::Call, CALL_FLAG_TAILCALL, 2, 1);
    b.emit(Opcode::Return, 0, 0, 0);
    let f = rt.new_function(b.build());

    // reachable by name for the self call
    let global = rt.global_object();
    object::define_own(&global, PropKey::Name("f".intern()), f.clone(), 7);

    // way beyond the call-stack limit; passes only by frame collapse
    let v = rt.run(&f, &[JsValue::number(100_000.0)]).unwrap();
    assert_eq!(v.get_number(), 42.0);
}

#[test]
fn deep_non_tail_recursion_hits_callstack_limit() {
    let mut params = RuntimeParams::default();
    params.callstack_limit = 64;
    let mut rt = Runtime::new(params);

    // f(n): if (n == 0) return 0; return f(n - 1)  [no tailcall flag]
    let mut b = CodeBlockBuilder::new("f", 1, 8);
    let k0 = b.konst_number(0.0);
    let k1 = b.konst_number(1.0);
    let fname = b.konst_str(&mut rt, "f") - REG_LIMIT;
    b.emit(Opcode::Eq, 1, 0, k0);
    b.emit(Opcode::If, 1, 1, 0);
    let to_rec = b.emit_jump();
    b.emit_a_bc(Opcode::LdInt, 2, LDINT_BIAS);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let rec = b.here();
    b.patch_jump(to_rec, rec);
    b.emit_a_bc(Opcode::GetVar, 2, fname);
    b.emit_extra_bc(ExtraOp::LdUndef, 3);
    b.emit(Opcode::Sub, 4, 0, k1);
    b.emit(Opcode::Call, 0, 2, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let global = rt.global_object();
    object::define_own(&global, PropKey::Name("f".intern()), f.clone(), 7);

    let err = rt.run(&f, &[JsValue::number(1000.0)]).unwrap_err();
    match err {
        InterpreterError::Uncaught(v) => {
            let name = object::get_by_name(&mut rt, &v.get_object(), "name").unwrap();
            assert_eq!(name.get_string().as_str(), "RangeError");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn lightfunc_call_delegates_to_host() {
    fn plus_one(rt: &mut Runtime) -> smew::vm::Control<JsValue> {
        let n = rt.native_arg(0).to_number(rt)?;
        Ok(JsValue::number(n + 1.0))
    }

    let mut rt = rt();
    let lf = smew::vm::builtins::new_lightfunc(plus_one, 0);
    let global = rt.global_object();
    object::define_own(&global, PropKey::Name("inc".intern()), lf, 7);

    let mut b = CodeBlockBuilder::new("main", 0, 8);
    let name = b.konst_str(&mut rt, "inc") - REG_LIMIT;
    b.emit_a_bc(Opcode::GetVar, 2, name);
    b.emit_extra_bc(ExtraOp::LdUndef, 3);
    b.emit_a_bc(Opcode::LdInt, 4, LDINT_BIAS + 41);
    b.emit(Opcode::Call, 0, 2, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 42.0);
    assert_eq!(rt.run(&f, &[]).unwrap().get_number(), 42.0);
}

#[test]
fn eval_identity_returns_non_string_argument() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 8);
    let name = b.konst_str(&mut rt, "eval") - REG_LIMIT;
    b.emit_a_bc(Opcode::GetVar, 2, name);
    b.emit_extra_bc(ExtraOp::LdUndef, 3);
    b.emit_a_bc(Opcode::LdInt, 4, LDINT_BIAS + 5);
    b.emit(Opcode::Call, CALL_FLAG_EVALCALL, 2, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 5.0);
}

#[test]
fn eval_of_source_text_raises_syntax_error() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 8);
    let name = b.konst_str(&mut rt, "eval") - REG_LIMIT;
    let src = b.konst_str(&mut rt, "1 + 1") - REG_LIMIT;
    b.emit_a_bc(Opcode::GetVar, 2, name);
    b.emit_extra_bc(ExtraOp::LdUndef, 3);
    b.emit_a_bc(Opcode::LdConst, 4, src);
    b.emit(Opcode::Call, CALL_FLAG_EVALCALL, 2, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let err = rt.run(&f, &[]).unwrap_err();
    match err {
        InterpreterError::Uncaught(v) => {
            let name = object::get_by_name(&mut rt, &v.get_object(), "name").unwrap();
            assert_eq!(name.get_string().as_str(), "SyntaxError");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn object_literal_and_property_ops() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 10);
    let kx = b.konst_str(&mut rt, "x");
    let k2 = b.konst_number(2.0);

    b.emit_extra(ExtraOp::NewObj, 0, 0); // r0 = {}
    // keys/values in r2..: MPUTOBJ
    b.emit_a_bc(Opcode::LdConst, 2, kx - REG_LIMIT);
    b.emit_a_bc(Opcode::LdInt, 3, LDINT_BIAS + 40);
    b.emit(Opcode::MPutObj, 0, 2, 1);
    // r1 = o.x + 2
    b.emit(Opcode::GetProp, 1, 0, kx);
    b.emit(Opcode::Add, 1, 1, k2);
    // o.x = r1; return o.x
    b.emit(Opcode::PutProp, 0, kx, 1);
    b.emit(Opcode::GetProp, 4, 0, kx);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 4, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 42.0);
}

#[test]
fn array_literal_and_length() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 10);
    let klen = b.konst_str(&mut rt, "length");

    b.emit_extra(ExtraOp::NewArr, 0, 0);
    // start index + 3 values at r2..
    b.emit_a_bc(Opcode::LdInt, 2, LDINT_BIAS); // start = 0
    b.emit_a_bc(Opcode::LdInt, 3, LDINT_BIAS + 10);
    b.emit_a_bc(Opcode::LdInt, 4, LDINT_BIAS + 20);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS + 30);
    b.emit(Opcode::MPutArr, 0, 2, 3);
    // r1 = a.length; r6 = a[1]
    b.emit(Opcode::GetProp, 1, 0, klen);
    b.emit_a_bc(Opcode::LdInt, 7, LDINT_BIAS + 1);
    b.emit(Opcode::GetProp, 6, 0, 7);
    b.emit(Opcode::Add, 1, 1, 6);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 1, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 23.0); // 3 + 20
}

#[test]
fn for_in_enumerates_insertion_order() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 10);
    let ka = b.konst_str(&mut rt, "a");
    let kb = b.konst_str(&mut rt, "b");
    let kempty = b.konst_str(&mut rt, "");

    // o = {a: 1, b: 2}; acc = ""; for (k in o) acc += k; return acc
    b.emit_extra(ExtraOp::NewObj, 0, 0);
    b.emit_a_bc(Opcode::LdConst, 2, ka - REG_LIMIT);
    b.emit_a_bc(Opcode::LdInt, 3, LDINT_BIAS + 1);
    b.emit_a_bc(Opcode::LdConst, 4, kb - REG_LIMIT);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS + 2);
    b.emit(Opcode::MPutObj, 0, 2, 2);
    b.emit_a_bc(Opcode::LdConst, 1, kempty - REG_LIMIT); // acc
    b.emit_extra(ExtraOp::InitEnum, 6, 0); // r6 = enum(o)
    let loop_top = b.here();
    b.emit_extra(ExtraOp::NextEnum, 7, 6); // r7 = key or fall through
    let exit_jump = b.emit_jump(); // executed when exhausted
    b.emit(Opcode::Add, 1, 1, 7);
    b.emit_jump_to(loop_top);
    let done = b.here();
    b.patch_jump(exit_jump, done);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 1, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_string().as_str(), "ab");
}

#[test]
fn typeof_and_typeofid() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 8);
    let missing = b.konst_str(&mut rt, "no_such_global");
    let sep = b.konst_str(&mut rt, ":");
    let knum = b.konst_number(1.5);

    b.emit_extra(ExtraOp::TypeOf, 0, knum); // "number"
    b.emit_extra(ExtraOp::TypeOfId, 1, missing); // "undefined", silent
    b.emit(Opcode::Add, 0, 0, sep);
    b.emit(Opcode::Add, 0, 0, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_string().as_str(), "number:undefined");
}

#[test]
fn instanceof_non_callable_rhs_is_type_error() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 4);
    b.emit_extra(ExtraOp::NewObj, 0, 0);
    b.emit_extra(ExtraOp::NewObj, 1, 0);
    b.emit(Opcode::InstOf, 2, 0, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let err = rt.run(&f, &[]).unwrap_err();
    match err {
        InterpreterError::Uncaught(v) => {
            let name = object::get_by_name(&mut rt, &v.get_object(), "name").unwrap();
            assert_eq!(name.get_string().as_str(), "TypeError");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn new_constructs_instances() {
    let mut rt = rt();

    // function C(v) { this.v = v }  (returns undefined)
    let mut ctor = CodeBlockBuilder::new("C", 1, 4);
    let kv = ctor.konst_str(&mut rt, "v");
    ctor.emit_extra(ExtraOp::LdThis, 1, 0);
    ctor.emit(Opcode::PutProp, 1, kv, 0);
    ctor.emit(Opcode::Return, 0, 0, 0);
    let ctor = ctor.build();

    let mut b = CodeBlockBuilder::new("main", 0, 10);
    let kv = b.konst_str(&mut rt, "v");
    let tpl = b.inner_function(ctor);
    b.emit_a_bc(Opcode::Closure, 0, tpl);
    // NEW window at r2: ctor, args
    b.emit_a_bc(Opcode::LdReg, 2, 0);
    b.emit_a_bc(Opcode::LdInt, 3, LDINT_BIAS + 42);
    b.emit(Opcode::New, 0, 2, 1); // r2 = instance
    b.emit(Opcode::GetProp, 4, 2, kv);
    // instanceof check: r5 = instance instanceof C
    b.emit_a_bc(Opcode::LdReg, 5, 2);
    b.emit(Opcode::InstOf, 5, 5, 0);
    b.emit(Opcode::If, 1, 5, 0);
    b.emit_a_bc(Opcode::LdInt, 4, LDINT_BIAS); // not reached when instanceof holds
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 4, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 42.0);
}

#[test]
fn bound_function_chain_prepends_arguments() {
    let mut rt = rt();

    // f(a, b, c) -> a * 100 + b * 10 + c
    let mut fb = CodeBlockBuilder::new("f", 3, 8);
    let k100 = fb.konst_number(100.0);
    let k10 = fb.konst_number(10.0);
    fb.emit(Opcode::Mul, 0, 0, k100);
    fb.emit(Opcode::Mul, 1, 1, k10);
    fb.emit(Opcode::Add, 0, 0, 1);
    fb.emit(Opcode::Add, 0, 0, 2);
    fb.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let fcode = fb.build();

    // g = f.bind(null, 1).bind(null, 2); g(3) == 123
    let mut b = CodeBlockBuilder::new("main", 0, 12);
    let kbind = b.konst_str(&mut rt, "bind");
    let tpl = b.inner_function(fcode);
    b.emit_a_bc(Opcode::Closure, 0, tpl);
    // r2 = f.bind, r3 = f (this), arg r4 = null, r5 = 1
    b.emit(Opcode::CsProp, 2, 0, kbind);
    b.emit_extra_bc(ExtraOp::LdNull, 4);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS + 1);
    b.emit(Opcode::Call, 0, 2, 2); // r2 = bound1
    b.emit_a_bc(Opcode::LdReg, 1, 2);
    b.emit(Opcode::CsProp, 2, 1, kbind);
    b.emit_extra_bc(ExtraOp::LdNull, 4);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS + 2);
    b.emit(Opcode::Call, 0, 2, 2); // r2 = bound2
    // call bound2(3)
    b.emit_extra_bc(ExtraOp::LdUndef, 3);
    b.emit_a_bc(Opcode::LdInt, 4, LDINT_BIAS + 3);
    b.emit(Opcode::Call, 0, 2, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 123.0);
}

#[test]
fn interrupt_hook_enforces_step_limit() {
    let mut rt = rt();
    rt.set_interrupt_interval(100);

    let fired = Rc::new(Cell::new(0u32));
    let fired2 = fired.clone();
    rt.set_interrupt_hook(Box::new(move |rt| {
        fired2.set(fired2.get() + 1);
        if fired2.get() > 10 {
            return Err(rt.throw_range_error("execution step limit"));
        }
        Ok(())
    }));

    // infinite loop: JUMP back to itself
    let mut b = CodeBlockBuilder::new("spin", 0, 1);
    let top = b.here();
    b.emit_jump_to(top);
    let f = rt.new_function(b.build());

    let err = rt.run(&f, &[]).unwrap_err();
    match err {
        InterpreterError::Uncaught(v) => {
            let name = object::get_by_name(&mut rt, &v.get_object(), "name").unwrap();
            assert_eq!(name.get_string().as_str(), "RangeError");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(fired.get() > 10);
}

#[test]
fn string_concat_overflow_raises_range_error() {
    let mut params = RuntimeParams::default();
    params.string_byte_limit = 16;
    let mut rt = Runtime::new(params);

    let mut b = CodeBlockBuilder::new("main", 0, 2);
    let ka = b.konst_str(&mut rt, "0123456789");
    let kb = b.konst_str(&mut rt, "abcdefghij");
    b.emit(Opcode::Add, 0, ka, kb);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let f = rt.new_function(b.build());

    let err = rt.run(&f, &[]).unwrap_err();
    match err {
        InterpreterError::Uncaught(v) => {
            let name = object::get_by_name(&mut rt, &v.get_object(), "name").unwrap();
            assert_eq!(name.get_string().as_str(), "RangeError");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn global_variables_via_getvar_putvar() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 4);
    let kx = b.konst_str(&mut rt, "counter") - REG_LIMIT;
    // sloppy-mode implicit global: counter = 41; counter = counter + 1
    b.emit_a_bc(Opcode::LdInt, 0, LDINT_BIAS + 41);
    b.emit_a_bc(Opcode::PutVar, 0, kx);
    b.emit_a_bc(Opcode::GetVar, 1, kx);
    b.emit_extra(ExtraOp::Inc, 1, 1);
    b.emit_a_bc(Opcode::PutVar, 1, kx);
    b.emit_a_bc(Opcode::GetVar, 2, kx);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 42.0);

    // visible on the global object afterwards
    let g = rt.global_object();
    let c = object::get_by_name(&mut rt, &g, "counter").unwrap();
    assert_eq!(c.get_number(), 42.0);
}
