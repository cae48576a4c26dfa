//! String interning.
//!
//! All identifiers the compiler manipulates (source names, generated
//! `$v<N>` value names, mangled method names) are interned once in a
//! process-global table and handled as 4-byte [`Symbol`]s afterwards.
//! Equality and hashing are integer operations; the string itself is
//! recovered with [`Symbol::as_str`].

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// An interned string identifier.
///
/// Two symbols are equal iff they were interned from equal strings.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    index: u32,
}

impl Symbol {
    /// Intern a string, returning its symbol.
    ///
    /// Thread-safe; repeated interning of the same string returns the
    /// same symbol.
    pub fn intern(string: &str) -> Self {
        global_table().lock().unwrap().intern(string)
    }

    /// Get the string value associated with this symbol.
    pub fn as_str(self) -> &'static str {
        global_table()
            .lock()
            .unwrap()
            .get(self)
            .expect("symbol index out of bounds")
    }

    /// Get the raw index value.
    pub fn as_u32(self) -> u32 {
        self.index
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn global_table() -> &'static Mutex<StringTable> {
    static TABLE: OnceLock<Mutex<StringTable>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(StringTable::new()))
}

/// Global string table backing [`Symbol`].
///
/// Strings are leaked to obtain the `'static` lifetime; the set of unique
/// identifiers in a compilation is bounded, so the table never shrinks.
struct StringTable {
    index: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

impl StringTable {
    fn new() -> Self {
        Self {
            index: FxHashMap::default(),
            strings: Vec::new(),
        }
    }

    fn intern(&mut self, string: &str) -> Symbol {
        if let Some(&index) = self.index.get(string) {
            return Symbol { index };
        }
        let interned: &'static str = Box::leak(string.to_string().into_boxed_str());
        let index = self.strings.len() as u32;
        self.strings.push(interned);
        self.index.insert(interned, index);
        Symbol { index }
    }

    fn get(&self, symbol: Symbol) -> Option<&'static str> {
        self.strings.get(symbol.index as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_dedup() {
        let s1 = Symbol::intern("hello");
        let s2 = Symbol::intern("hello");
        let s3 = Symbol::intern("world");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
        assert_eq!(s1.as_str(), "hello");
        assert_eq!(s3.as_str(), "world");
    }

    #[test]
    fn display_roundtrip() {
        let s = Symbol::intern("$v12");
        assert_eq!(format!("{}", s), "$v12");
    }
}
