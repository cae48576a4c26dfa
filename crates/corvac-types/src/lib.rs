//! corvac-types - Type Representation and Checking
//!
//! The Corva type system: a sum type over primitives, type variables,
//! arrays, records, enums, traits and functions, with nominal identity
//! carried by per-declaration UIDs. This crate owns the compatibility
//! check, parametric substitution and trait conformance; the emitter in
//! `corvac-sem` drives them.

mod check;
mod env;
mod ty;

pub use check::{
    check_app, check_mutate, check_rec_lit, collect_type_vars, compatible, has_partial_type_var,
    has_type_var, subst, subst_list, subst_root,
};
pub use env::Env;
pub use ty::{
    ArrType, EnumType, FuncType, ImplBundle, RecType, SymType, TraitType, Type, TypeContext,
    TypeVar, Uid,
};
