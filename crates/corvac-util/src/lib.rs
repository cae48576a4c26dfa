//! corvac-util - Core Utilities and Foundation Types
//!
//! Fundamental types shared by every corvac crate: interned string symbols,
//! typed index vectors, and the compiler-wide error taxonomy. These are
//! zero-cost abstractions; a `Symbol` is a 4-byte handle, an `IndexVec`
//! compiles down to a plain `Vec`.

mod error;
mod index_vec;
mod symbol;

pub use error::{CompileError, ErrorCode, Result};
pub use index_vec::{Idx, IndexVec};
pub use symbol::Symbol;

// Re-export commonly used collection types
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;

/// Macro to define index types easily
#[macro_export]
macro_rules! define_idx {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $crate::Idx for $name {
            fn from_usize(idx: usize) -> Self {
                assert!(idx <= u32::MAX as usize);
                $name(idx as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}
