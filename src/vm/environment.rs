/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Environment records.
//!
//! Declarative records hold name-keyed bindings, object records wrap a
//! binding object (`with` statements, the global scope).  Activations
//! realize their records lazily: a frame carries no environment until a
//! closure, a catch binding, a `with` binding or a by-name variable access
//! forces one.

use super::object::{self, ObjRef, PropKey};
use super::symbol_table::SymbolId;
use super::value::JsValue;
use super::{Control, Runtime};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type EnvRef = Rc<RefCell<EnvRecord>>;

pub struct Binding {
    pub value: JsValue,
    pub mutable: bool,
    pub deletable: bool,
}

pub enum EnvKind {
    Decl(HashMap<SymbolId, Binding>),
    Object { target: ObjRef, provide_this: bool },
}

pub struct EnvRecord {
    pub parent: Option<EnvRef>,
    pub kind: EnvKind,
}

pub fn new_declarative_env(parent: Option<EnvRef>) -> EnvRef {
    Rc::new(RefCell::new(EnvRecord {
        parent,
        kind: EnvKind::Decl(HashMap::new()),
    }))
}

pub fn new_object_env(target: ObjRef, provide_this: bool, parent: Option<EnvRef>) -> EnvRef {
    Rc::new(RefCell::new(EnvRecord {
        parent,
        kind: EnvKind::Object {
            target,
            provide_this,
        },
    }))
}

enum Step {
    FoundDecl(JsValue),
    CheckObject { target: ObjRef, provide_this: bool },
    NotHere,
}

/// Resolve `name` along the chain.  Returns value and `this` binding
/// (non-undefined only for `with` object records).
pub fn getvar(
    rt: &mut Runtime,
    env: Option<EnvRef>,
    name: SymbolId,
    throw: bool,
) -> Control<Option<(JsValue, JsValue)>> {
    let mut env = env;
    while let Some(e) = env {
        let (step, parent) = {
            let er = e.borrow();
            let step = match &er.kind {
                EnvKind::Decl(map) => match map.get(&name) {
                    Some(b) => Step::FoundDecl(b.value.clone()),
                    None => Step::NotHere,
                },
                EnvKind::Object {
                    target,
                    provide_this,
                } => Step::CheckObject {
                    target: target.clone(),
                    provide_this: *provide_this,
                },
            };
            (step, er.parent.clone())
        };
        match step {
            Step::FoundDecl(v) => return Ok(Some((v, JsValue::undefined()))),
            Step::CheckObject {
                target,
                provide_this,
            } => {
                let key = PropKey::Name(name);
                if object::has_property(&target, key) {
                    let v = object::get(rt, &target, key)?;
                    let this = if provide_this {
                        JsValue::object(target)
                    } else {
                        JsValue::undefined()
                    };
                    return Ok(Some((v, this)));
                }
            }
            Step::NotHere => {}
        }
        env = parent;
    }

    if throw {
        Err(rt.throw_reference_error(&format!("identifier '{}' undefined", name)))
    } else {
        Ok(None)
    }
}

/// Write `name` along the chain.  Unresolvable names create a global
/// property in sloppy mode and raise ReferenceError in strict mode.
pub fn putvar(
    rt: &mut Runtime,
    env: Option<EnvRef>,
    name: SymbolId,
    value: JsValue,
    strict: bool,
) -> Control<()> {
    let mut env = env;
    while let Some(e) = env {
        enum PutStep {
            WroteDecl,
            Immutable,
            Object(ObjRef),
            NotHere,
        }
        let (step, parent) = {
            let mut er = e.borrow_mut();
            let step = match &mut er.kind {
                EnvKind::Decl(map) => match map.get_mut(&name) {
                    Some(b) => {
                        if b.mutable {
                            b.value = value.clone();
                            PutStep::WroteDecl
                        } else {
                            PutStep::Immutable
                        }
                    }
                    None => PutStep::NotHere,
                },
                EnvKind::Object { target, .. } => PutStep::Object(target.clone()),
            };
            (step, er.parent.clone())
        };
        match step {
            PutStep::WroteDecl => return Ok(()),
            PutStep::Immutable => {
                if strict {
                    return Err(rt.throw_type_error(&format!(
                        "cannot assign to immutable binding '{}'",
                        name
                    )));
                }
                return Ok(());
            }
            PutStep::Object(target) => {
                let key = PropKey::Name(name);
                if object::has_property(&target, key) {
                    object::put(rt, &target, key, value, strict)?;
                    return Ok(());
                }
            }
            PutStep::NotHere => {}
        }
        env = parent;
    }

    if strict {
        return Err(rt.throw_reference_error(&format!("identifier '{}' undefined", name)));
    }
    // implicit global creation
    let global = rt.global.clone();
    object::put(rt, &global, PropKey::Name(name), value, false)?;
    Ok(())
}

/// Declare a binding in the variable environment.  Returns true when the
/// binding already existed and the caller must update its value instead
/// (function re-declaration).
pub fn declvar(
    rt: &mut Runtime,
    env: &EnvRef,
    name: SymbolId,
    value: JsValue,
    prop_attrs: u8,
    is_func_decl: bool,
) -> Control<bool> {
    let _ = rt;
    let obj_target = match &env.borrow().kind {
        EnvKind::Object { target, .. } => Some(target.clone()),
        EnvKind::Decl(_) => None,
    };

    if let Some(target) = obj_target {
        let key = PropKey::Name(name);
        if object::has_property(&target, key) {
            return Ok(true);
        }
        object::define_own(&target, key, value, prop_attrs);
        return Ok(false);
    }

    let mut er = env.borrow_mut();
    if let EnvKind::Decl(map) = &mut er.kind {
        if map.contains_key(&name) {
            return Ok(is_func_decl);
        }
        map.insert(
            name,
            Binding {
                value,
                mutable: prop_attrs & object::ATTR_WRITABLE != 0,
                deletable: prop_attrs & object::ATTR_CONFIGURABLE != 0,
            },
        );
    }
    Ok(false)
}

/// Delete a binding by name; boolean result per the `delete` operator.
pub fn delvar(rt: &mut Runtime, env: Option<EnvRef>, name: SymbolId) -> Control<bool> {
    let mut env = env;
    while let Some(e) = env {
        enum DelStep {
            Deleted(bool),
            Object(ObjRef),
            NotHere,
        }
        let (step, parent) = {
            let mut er = e.borrow_mut();
            let step = match &mut er.kind {
                EnvKind::Decl(map) => match map.get(&name) {
                    Some(b) => {
                        if b.deletable {
                            map.remove(&name);
                            DelStep::Deleted(true)
                        } else {
                            DelStep::Deleted(false)
                        }
                    }
                    None => DelStep::NotHere,
                },
                EnvKind::Object { target, .. } => DelStep::Object(target.clone()),
            };
            (step, er.parent.clone())
        };
        match step {
            DelStep::Deleted(ok) => return Ok(ok),
            DelStep::Object(target) => {
                let key = PropKey::Name(name);
                if object::has_property(&target, key) {
                    return object::delete(rt, &target, key, false);
                }
            }
            DelStep::NotHere => {}
        }
        env = parent;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::symbol_table::Internable;

    #[test]
    fn decl_chain_lookup_and_shadowing() {
        let mut rt = Runtime::new(Default::default());
        let outer = new_declarative_env(None);
        let inner = new_declarative_env(Some(outer.clone()));
        let x = "x".intern();
        declvar(&mut rt, &outer, x, JsValue::int(1), object::ATTR_WRITABLE, false).unwrap();

        let (v, _) = getvar(&mut rt, Some(inner.clone()), x, true).unwrap().unwrap();
        assert_eq!(v.get_number(), 1.0);

        declvar(&mut rt, &inner, x, JsValue::int(2), object::ATTR_WRITABLE, false).unwrap();
        let (v, _) = getvar(&mut rt, Some(inner.clone()), x, true).unwrap().unwrap();
        assert_eq!(v.get_number(), 2.0);

        putvar(&mut rt, Some(inner.clone()), x, JsValue::int(3), true).unwrap();
        let (v, _) = getvar(&mut rt, Some(inner), x, true).unwrap().unwrap();
        assert_eq!(v.get_number(), 3.0);

        // outer binding untouched
        let (v, _) = getvar(&mut rt, Some(outer), x, true).unwrap().unwrap();
        assert_eq!(v.get_number(), 1.0);
    }

    #[test]
    fn immutable_binding_write() {
        let mut rt = Runtime::new(Default::default());
        let env = new_declarative_env(None);
        let k = "k".intern();
        declvar(&mut rt, &env, k, JsValue::int(7), 0, false).unwrap();
        // sloppy write is silently ignored
        putvar(&mut rt, Some(env.clone()), k, JsValue::int(8), false).unwrap();
        let (v, _) = getvar(&mut rt, Some(env.clone()), k, true).unwrap().unwrap();
        assert_eq!(v.get_number(), 7.0);
        // strict write raises
        assert!(putvar(&mut rt, Some(env), k, JsValue::int(8), true).is_err());
    }
}
