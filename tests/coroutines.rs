//! Coroutine resume/yield hand-off, termination and cancellation.

use smew::prelude::*;
use smew::vm::object;

fn rt() -> Runtime {
    Runtime::new(RuntimeParams::default())
}

fn error_name(rt: &mut Runtime, err: InterpreterError) -> String {
    match err {
        InterpreterError::Uncaught(v) => {
            if v.is_string() {
                return format!("value:{}", v.get_string().as_str());
            }
            let name = object::get_by_name(rt, &v.get_object(), "name").unwrap();
            name.get_string().as_str().to_string()
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

/// Body: r2 = yield(20); return r2 + 10
fn coroutine_body(rt: &mut Runtime) -> std::rc::Rc<CodeBlock> {
    let mut b = CodeBlockBuilder::new("co", 1, 8);
    let kthread = b.konst_str(rt, "Thread") - REG_LIMIT;
    let kyield = b.konst_str(rt, "yield");
    let k10 = b.konst_number(10.0);
    b.emit_a_bc(Opcode::GetVar, 1, kthread);
    b.emit(Opcode::CsProp, 2, 1, kyield);
    b.emit_a_bc(Opcode::LdInt, 4, LDINT_BIAS + 20);
    b.emit(Opcode::Call, 0, 2, 1); // r2 = yield(20)
    b.emit(Opcode::Add, 0, 2, k10);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    b.build()
}

#[test]
fn resume_yield_round_trip() {
    let mut rt = rt();
    let co = coroutine_body(&mut rt);

    // main: B = Thread.create(co); resume(B, 10) + resume(B, 30)
    let mut b = CodeBlockBuilder::new("main", 0, 12);
    let kthread = b.konst_str(&mut rt, "Thread") - REG_LIMIT;
    let kcreate = b.konst_str(&mut rt, "create");
    let kresume = b.konst_str(&mut rt, "resume");
    let tpl = b.inner_function(co);

    b.emit_a_bc(Opcode::Closure, 0, tpl);
    b.emit_a_bc(Opcode::GetVar, 1, kthread);
    b.emit(Opcode::CsProp, 2, 1, kcreate);
    b.emit_a_bc(Opcode::LdReg, 4, 0);
    b.emit(Opcode::Call, 0, 2, 1); // r2 = B
    b.emit_a_bc(Opcode::LdReg, 9, 2);

    // first resume delivers the initial argument; expect the yield value
    b.emit(Opcode::CsProp, 2, 1, kresume);
    b.emit_a_bc(Opcode::LdReg, 4, 9);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS + 10);
    b.emit(Opcode::Call, 0, 2, 2); // r2 = 20
    b.emit_a_bc(Opcode::LdReg, 8, 2);

    // second resume answers the yield; the body returns 30 + 10
    b.emit(Opcode::CsProp, 2, 1, kresume);
    b.emit_a_bc(Opcode::LdReg, 4, 9);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS + 30);
    b.emit(Opcode::Call, 0, 2, 2); // r2 = 40
    b.emit(Opcode::Add, 8, 8, 2);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 8, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 60.0); // 20 + 40
}

#[test]
fn resuming_a_terminated_thread_raises() {
    let mut rt = rt();

    // body returns immediately
    let mut co = CodeBlockBuilder::new("co", 1, 4);
    co.emit_a_bc(Opcode::LdInt, 1, LDINT_BIAS + 40);
    co.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 1, 0);
    let co = co.build();

    let mut b = CodeBlockBuilder::new("main", 0, 12);
    let kthread = b.konst_str(&mut rt, "Thread") - REG_LIMIT;
    let kcreate = b.konst_str(&mut rt, "create");
    let kresume = b.konst_str(&mut rt, "resume");
    let tpl = b.inner_function(co);

    b.emit_a_bc(Opcode::Closure, 0, tpl);
    b.emit_a_bc(Opcode::GetVar, 1, kthread);
    b.emit(Opcode::CsProp, 2, 1, kcreate);
    b.emit_a_bc(Opcode::LdReg, 4, 0);
    b.emit(Opcode::Call, 0, 2, 1);
    b.emit_a_bc(Opcode::LdReg, 9, 2);

    // first resume completes the thread (returns 40)
    b.emit(Opcode::CsProp, 2, 1, kresume);
    b.emit_a_bc(Opcode::LdReg, 4, 9);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS);
    b.emit(Opcode::Call, 0, 2, 2);

    // second resume must fail: the thread is TERMINATED
    b.emit(Opcode::CsProp, 2, 1, kresume);
    b.emit_a_bc(Opcode::LdReg, 4, 9);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS);
    b.emit(Opcode::Call, 0, 2, 2);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let err = rt.run(&f, &[]).unwrap_err();
    assert_eq!(error_name(&mut rt, err), "TypeError");
}

#[test]
fn thread_return_value_reaches_resumer() {
    let mut rt = rt();

    let mut co = CodeBlockBuilder::new("co", 1, 4);
    co.emit_a_bc(Opcode::LdInt, 1, LDINT_BIAS + 40);
    co.emit(Opcode::Add, 1, 1, 0); // initial value + 40
    co.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 1, 0);
    let co = co.build();

    let mut b = CodeBlockBuilder::new("main", 0, 12);
    let kthread = b.konst_str(&mut rt, "Thread") - REG_LIMIT;
    let kcreate = b.konst_str(&mut rt, "create");
    let kresume = b.konst_str(&mut rt, "resume");
    let tpl = b.inner_function(co);

    b.emit_a_bc(Opcode::Closure, 0, tpl);
    b.emit_a_bc(Opcode::GetVar, 1, kthread);
    b.emit(Opcode::CsProp, 2, 1, kcreate);
    b.emit_a_bc(Opcode::LdReg, 4, 0);
    b.emit(Opcode::Call, 0, 2, 1);
    b.emit_a_bc(Opcode::LdReg, 9, 2);

    b.emit(Opcode::CsProp, 2, 1, kresume);
    b.emit_a_bc(Opcode::LdReg, 4, 9);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS + 2);
    b.emit(Opcode::Call, 0, 2, 2); // r2 = 42
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_number(), 42.0);
}

#[test]
fn cancellation_injects_throw_at_suspension_point() {
    let mut rt = rt();
    let co = coroutine_body(&mut rt);

    let mut b = CodeBlockBuilder::new("main", 0, 12);
    let kthread = b.konst_str(&mut rt, "Thread") - REG_LIMIT;
    let kcreate = b.konst_str(&mut rt, "create");
    let kresume = b.konst_str(&mut rt, "resume");
    let kstop = b.konst_str(&mut rt, "stop") - REG_LIMIT;
    let tpl = b.inner_function(co);

    b.emit_a_bc(Opcode::Closure, 0, tpl);
    b.emit_a_bc(Opcode::GetVar, 1, kthread);
    b.emit(Opcode::CsProp, 2, 1, kcreate);
    b.emit_a_bc(Opcode::LdReg, 4, 0);
    b.emit(Opcode::Call, 0, 2, 1);
    b.emit_a_bc(Opcode::LdReg, 9, 2);

    // park the coroutine at its yield
    b.emit(Opcode::CsProp, 2, 1, kresume);
    b.emit_a_bc(Opcode::LdReg, 4, 9);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS);
    b.emit(Opcode::Call, 0, 2, 2);

    // resume(B, "stop", true): the value is thrown at the yield; the body
    // has no catcher, so the error surfaces right here
    b.emit(Opcode::CsProp, 2, 1, kresume);
    b.emit_a_bc(Opcode::LdReg, 4, 9);
    b.emit_a_bc(Opcode::LdConst, 5, kstop);
    b.emit_extra_bc(ExtraOp::LdTrue, 6);
    b.emit(Opcode::Call, 0, 2, 3);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let err = rt.run(&f, &[]).unwrap_err();
    assert_eq!(error_name(&mut rt, err), "value:stop");
}

#[test]
fn coroutine_catches_injected_error() {
    let mut rt = rt();

    // co: try { yield(1) } catch (e) { return e }
    let mut b = CodeBlockBuilder::new("co", 1, 10);
    let kthread = b.konst_str(&mut rt, "Thread") - REG_LIMIT;
    let kyield = b.konst_str(&mut rt, "yield");
    let e_idx = b.konst_str(&mut rt, "e") - REG_LIMIT;
    b.emit(
        Opcode::TryCatch,
        TRYCATCH_FLAG_HAVE_CATCH | TRYCATCH_FLAG_CATCH_BINDING,
        2,
        e_idx,
    );
    let t_catch = b.emit_jump();
    let t_end = b.emit_jump();
    b.emit_a_bc(Opcode::GetVar, 5, kthread);
    b.emit(Opcode::CsProp, 6, 5, kyield);
    b.emit_a_bc(Opcode::LdInt, 8, LDINT_BIAS + 1);
    b.emit(Opcode::Call, 0, 6, 1);
    b.emit_extra(ExtraOp::EndTry, 0, 0);
    let catch_body = b.here();
    b.patch_jump(t_catch, catch_body);
    b.emit_a_bc(Opcode::GetVar, 0, e_idx);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let after = b.here();
    b.patch_jump(t_end, after);
    b.emit(Opcode::Return, 0, 0, 0);
    let co = b.build();

    let mut b = CodeBlockBuilder::new("main", 0, 12);
    let kthread = b.konst_str(&mut rt, "Thread") - REG_LIMIT;
    let kcreate = b.konst_str(&mut rt, "create");
    let kresume = b.konst_str(&mut rt, "resume");
    let kboom = b.konst_str(&mut rt, "boom") - REG_LIMIT;
    let tpl = b.inner_function(co);

    b.emit_a_bc(Opcode::Closure, 0, tpl);
    b.emit_a_bc(Opcode::GetVar, 1, kthread);
    b.emit(Opcode::CsProp, 2, 1, kcreate);
    b.emit_a_bc(Opcode::LdReg, 4, 0);
    b.emit(Opcode::Call, 0, 2, 1);
    b.emit_a_bc(Opcode::LdReg, 9, 2);

    b.emit(Opcode::CsProp, 2, 1, kresume);
    b.emit_a_bc(Opcode::LdReg, 4, 9);
    b.emit_a_bc(Opcode::LdInt, 5, LDINT_BIAS);
    b.emit(Opcode::Call, 0, 2, 2); // parks at yield, r2 = 1

    b.emit(Opcode::CsProp, 2, 1, kresume);
    b.emit_a_bc(Opcode::LdReg, 4, 9);
    b.emit_a_bc(Opcode::LdConst, 5, kboom);
    b.emit_extra_bc(ExtraOp::LdTrue, 6);
    b.emit(Opcode::Call, 0, 2, 3); // r2 = "boom" (caught and returned)
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let v = rt.run(&f, &[]).unwrap();
    assert_eq!(v.get_string().as_str(), "boom");
}

#[test]
fn yield_without_resumer_is_a_type_error() {
    let mut rt = rt();
    let mut b = CodeBlockBuilder::new("main", 0, 8);
    let kthread = b.konst_str(&mut rt, "Thread") - REG_LIMIT;
    let kyield = b.konst_str(&mut rt, "yield");
    b.emit_a_bc(Opcode::GetVar, 1, kthread);
    b.emit(Opcode::CsProp, 2, 1, kyield);
    b.emit_a_bc(Opcode::LdInt, 4, LDINT_BIAS + 1);
    b.emit(Opcode::Call, 0, 2, 1);
    b.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 2, 0);
    let f = rt.new_function(b.build());

    let err = rt.run(&f, &[]).unwrap_err();
    assert_eq!(error_name(&mut rt, err), "TypeError");
}

#[test]
fn host_spawn_and_state_inspection() {
    let mut rt = rt();
    let mut co = CodeBlockBuilder::new("co", 1, 4);
    co.emit(Opcode::Return, RETURN_FLAG_HAVE_RETVAL, 0, 0);
    let body = rt.new_function(co.build());

    let thr = rt.spawn_thread(&body).unwrap();
    let id = thr.get_object().borrow().thread_id().unwrap();
    assert_eq!(rt.thread_state(id), ThreadState::Inactive);

    // a non-compiled body is rejected
    assert!(rt.spawn_thread(&JsValue::number(1.0)).is_err());
}
