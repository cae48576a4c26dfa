//! The type model.
//!
//! Nominal identity comes from [`Uid`], not pointer identity: two record
//! types are the same type iff they come from the same declaration. Type
//! nodes are therefore plain values, cloned freely, and never shared
//! across declarations.

use corvac_util::Symbol;
use indexmap::IndexMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Nominal identity integer assigned at type declaration.
pub type Uid = u64;

/// Generator for type UIDs, one per compilation.
///
/// Passing the context explicitly (rather than a process global) keeps
/// compilations of different modules independent; the counter itself is
/// atomic so a parallel driver needs nothing extra.
pub struct TypeContext {
    counter: AtomicU64,
}

impl TypeContext {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }

    /// Mint the next UID. Monotone within this context.
    pub fn next_uid(&self) -> Uid {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A type in the Corva type system.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Unit type, the value of empty blocks and bare statements
    Unit,
    /// Boolean type
    Bool,
    /// Primitive integer type
    Int,
    /// Primitive float type
    Float,
    /// Untyped pointer, the uniform boxed representation for generics
    VoidPtr,
    /// An unresolved type parameter, optionally bounded by a trait
    Var(TypeVar),
    /// Fixed-size homogeneous array
    Arr(ArrType),
    /// Product type with optional methods
    Rec(RecType),
    /// Sum type
    Enum(EnumType),
    /// Nominal interface
    Trait(TraitType),
    /// Function type
    Func(FuncType),
    /// Bound name of a non-generic enum variant tag
    Sym(SymType),
}

/// Type parameter, e.g. `'T` or `'T<:Adder`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeVar {
    pub name: Symbol,
    /// Trait bound the substituted type must satisfy
    pub lower: Option<Box<Type>>,
}

impl TypeVar {
    pub fn new(name: Symbol) -> Self {
        Self { name, lower: None }
    }

    pub fn bounded(name: Symbol, lower: Type) -> Self {
        Self {
            name,
            lower: Some(Box::new(lower)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrType {
    pub ele: Box<Type>,
    pub size: usize,
}

/// Record type.
///
/// `substs` holds the type arguments this instance was built with; its
/// length always equals `tp_vars` of the declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct RecType {
    pub uid: Uid,
    pub keys: Vec<Symbol>,
    pub mem_tps: Vec<Type>,
    pub tp_vars: Vec<TypeVar>,
    pub substs: Vec<Type>,
    pub impls: ImplBundle,
}

impl RecType {
    /// Index of `key` among the declared keys, if present.
    pub fn key_index(&self, key: Symbol) -> Option<usize> {
        self.keys.iter().position(|&k| k == key)
    }
}

/// Enum type. `simple` when every variant is a bare tag, in which case
/// values compile to a plain int.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub uid: Uid,
    pub simple: bool,
    pub tokens: Vec<Symbol>,
    pub tp_vars: Vec<TypeVar>,
    /// Payload type per token; `Unit` for bare tags
    pub variants: Vec<Type>,
    pub impls: ImplBundle,
}

impl EnumType {
    pub fn key_index(&self, key: Symbol) -> Option<usize> {
        self.tokens.iter().position(|&k| k == key)
    }
}

/// Trait type. The first parameter of every signature is the trait
/// itself; to express that self-recursion without cyclic ownership the
/// receiver slot holds a *skeleton* of the trait (same uid, keys and
/// type params, empty fn list). Construction is two-phase: allocate the
/// skeleton, then fill `fns`.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitType {
    pub uid: Uid,
    pub keys: Vec<Symbol>,
    pub fns: Vec<FuncType>,
    pub tp_vars: Vec<TypeVar>,
}

impl TraitType {
    /// The receiver placeholder carrying this trait's identity.
    pub fn skeleton(&self) -> TraitType {
        TraitType {
            uid: self.uid,
            keys: self.keys.clone(),
            fns: Vec::new(),
            tp_vars: self.tp_vars.clone(),
        }
    }

    pub fn key_index(&self, key: Symbol) -> Option<usize> {
        self.keys.iter().position(|&k| k == key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub uid: Uid,
    pub params: Vec<Type>,
    pub ret: Box<Type>,
    pub tp_vars: Vec<TypeVar>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymType {
    pub uid: Uid,
    pub name: Symbol,
}

/// Method table attached to a record or enum declaration.
///
/// `prefix` is the declared type name; a method `m` lowers to the
/// mangled static function `prefix$m`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImplBundle {
    pub prefix: Option<Symbol>,
    pub fns: IndexMap<Symbol, FuncType>,
}

impl ImplBundle {
    /// Mangled static-call name for method `name`, e.g. `Counter$add`.
    pub fn mangle(&self, name: Symbol) -> Symbol {
        match self.prefix {
            Some(prefix) => Symbol::intern(&format!("{}${}", prefix, name)),
            None => name,
        }
    }
}

impl Type {
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Unit | Type::Bool | Type::Int | Type::Float | Type::VoidPtr
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// The method table of this type, if it carries one.
    pub fn impls(&self) -> Option<&ImplBundle> {
        match self {
            Type::Rec(r) => Some(&r.impls),
            Type::Enum(e) => Some(&e.impls),
            _ => None,
        }
    }

    pub fn impls_mut(&mut self) -> Option<&mut ImplBundle> {
        match self {
            Type::Rec(r) => Some(&mut r.impls),
            Type::Enum(e) => Some(&mut e.impls),
            _ => None,
        }
    }
}

fn write_tp_vars(f: &mut fmt::Formatter<'_>, tp_vars: &[TypeVar]) -> fmt::Result {
    if tp_vars.is_empty() {
        return Ok(());
    }
    write!(f, "<")?;
    for (i, tv) in tp_vars.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "'{}", tv.name)?;
        if let Some(lower) = &tv.lower {
            write!(f, "<:{}", lower)?;
        }
    }
    write!(f, ">")
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "unit"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::VoidPtr => write!(f, "voidptr"),
            Type::Var(tv) => {
                write!(f, "'{}", tv.name)?;
                match &tv.lower {
                    Some(lower) => write!(f, "<:{}", lower),
                    None => Ok(()),
                }
            }
            Type::Arr(a) => write!(f, "arr<{}, {}>", a.ele, a.size),
            Type::Rec(r) => {
                write!(f, "rec")?;
                write_tp_vars(f, &r.tp_vars)?;
                write!(f, "{{")?;
                for (i, key) in r.keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}:{}", key, r.mem_tps[i])?;
                }
                write!(f, "}}")
            }
            Type::Enum(e) => {
                write!(f, "enum")?;
                write_tp_vars(f, &e.tp_vars)?;
                write!(f, "(")?;
                for (i, token) in e.tokens.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", token)?;
                    if e.variants[i] != Type::Unit {
                        write!(f, "({})", e.variants[i])?;
                    }
                }
                write!(f, ")")
            }
            Type::Trait(t) => {
                write!(f, "trait")?;
                write_tp_vars(f, &t.tp_vars)?;
                write!(f, "{{")?;
                for (i, key) in t.keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", key)?;
                }
                write!(f, "}}")
            }
            Type::Func(func) => {
                write_tp_vars(f, &func.tp_vars)?;
                write!(f, "(")?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")->{}", func.ret)
            }
            Type::Sym(s) => write!(f, "sym({})", s.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_counter_is_monotone() {
        let ctx = TypeContext::new();
        let a = ctx.next_uid();
        let b = ctx.next_uid();
        let c = ctx.next_uid();
        assert!(a < b && b < c);
    }

    #[test]
    fn display_primitives() {
        assert_eq!(Type::Int.to_string(), "int");
        assert_eq!(Type::Unit.to_string(), "unit");
        assert_eq!(
            Type::Arr(ArrType {
                ele: Box::new(Type::Int),
                size: 3
            })
            .to_string(),
            "arr<int, 3>"
        );
    }

    #[test]
    fn display_type_var_with_bound() {
        let ctx = TypeContext::new();
        let adder = TraitType {
            uid: ctx.next_uid(),
            keys: vec![Symbol::intern("add")],
            fns: Vec::new(),
            tp_vars: Vec::new(),
        };
        let tv = Type::Var(TypeVar::bounded(Symbol::intern("T"), Type::Trait(adder)));
        assert_eq!(tv.to_string(), "'T<:trait{add}");
    }

    #[test]
    fn mangle_method_name() {
        let impls = ImplBundle {
            prefix: Some(Symbol::intern("Counter")),
            fns: Default::default(),
        };
        assert_eq!(impls.mangle(Symbol::intern("add")).as_str(), "Counter$add");
    }
}
