/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Process-global string interner.
//!
//! Byte content maps to a stable [`SymbolId`]; the id doubles as the
//! property-table key and as the identity half of [`crate::vm::string::JsString`].
//! Interned text is leaked and lives for the process, which keeps lookups
//! allocation-free.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct SymbolTable {
    symbols: DashMap<&'static str, u32>,
    ids: DashMap<u32, &'static str>,
    key: AtomicU32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: DashMap::new(),
            ids: DashMap::new(),
            key: AtomicU32::new(0),
        }
    }

    pub fn description(&self, symbol: SymbolId) -> &'static str {
        *self.ids.get(&symbol.0).expect("symbol id not interned")
    }

    pub fn intern(&self, val: impl AsRef<str>) -> SymbolId {
        let string = val.as_ref();
        if let Some(key) = self.symbols.get(string) {
            return SymbolId(*key.value());
        }

        let string: &'static str = Box::leak(string.to_string().into_boxed_str());
        let make_new_key = || self.key.fetch_add(1, Ordering::Relaxed);
        let key = *self.symbols.entry(string).or_insert_with(make_new_key).value();
        self.ids.insert(key, string);
        SymbolId(key)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct SymbolId(pub(crate) u32);

static SYMBOL_TABLE: Lazy<SymbolTable> = Lazy::new(SymbolTable::new);

pub fn symbol_table() -> &'static SymbolTable {
    &SYMBOL_TABLE
}

pub trait Internable {
    fn intern(&self) -> SymbolId;
}

impl Internable for str {
    fn intern(&self) -> SymbolId {
        symbol_table().intern(self)
    }
}

impl Internable for String {
    fn intern(&self) -> SymbolId {
        symbol_table().intern(self)
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", symbol_table().description(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_content_same_id() {
        let a = "resume".intern();
        let b = String::from("resume").intern();
        assert_eq!(a, b);
        assert_ne!(a, "yield".intern());
        assert_eq!(symbol_table().description(a), "resume");
    }
}
