/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Immutable interned string values.
//!
//! A [`JsString`] is canonical per runtime: two values with equal byte
//! content are the same `Rc` object, so identity comparison is content
//! comparison.  Byte and character lengths are precomputed.

use super::symbol_table::{symbol_table, SymbolId};
use std::rc::Rc;

pub struct JsString {
    sym: SymbolId,
    str: &'static str,
    char_len: u32,
}

impl JsString {
    /// Used by the runtime's canonicalization table only; everyone else
    /// goes through `Runtime::intern`.
    pub(crate) fn from_symbol(sym: SymbolId) -> Rc<JsString> {
        let str = symbol_table().description(sym);
        Rc::new(JsString {
            sym,
            str,
            char_len: str.chars().count() as u32,
        })
    }

    #[inline]
    pub fn sym(&self) -> SymbolId {
        self.sym
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.str
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.str.len()
    }

    #[inline]
    pub fn char_len(&self) -> u32 {
        self.char_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.str.is_empty()
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        self.sym == other.sym
    }
}

impl Eq for JsString {}

impl std::fmt::Display for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.str)
    }
}

impl std::fmt::Debug for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.str)
    }
}
