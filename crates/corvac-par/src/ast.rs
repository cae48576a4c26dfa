//! Abstract syntax tree.

use corvac_util::Symbol;

/// One parsed compilation unit: type declarations plus the top-level
/// expression sequence.
#[derive(Debug, Clone)]
pub struct Module {
    pub type_decls: Vec<TypeDecl>,
    pub root: Vec<Expr>,
}

/// `type Name = <type-expr>`
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub ident: Symbol,
    pub tp: TypeExpr,
}

/// Surface type expression.
#[derive(Debug, Clone)]
pub enum TypeExpr {
    /// `int`, `float`, a declared alias, or a type variable in scope
    Name(Symbol),
    /// `array<T, N>`
    Arr { ele: Box<TypeExpr>, size: i64 },
    /// `rec<T..>{key: T, ..}`
    Rec {
        tp_vars: Vec<TypeVarDecl>,
        keys: Vec<Symbol>,
        mem_tps: Vec<TypeExpr>,
    },
    /// `tup<T, ..>`
    Tup(Vec<TypeExpr>),
    /// `enum<T..>(Variant(T), Bare, ..)`
    Enum {
        tp_vars: Vec<TypeVarDecl>,
        tokens: Vec<Symbol>,
        payloads: Vec<Option<TypeExpr>>,
    },
    /// `trait<T..>{ name(x: T): T, .. }`
    Trait {
        tp_vars: Vec<TypeVarDecl>,
        fns: Vec<TraitFnSig>,
    },
}

/// Declared type parameter, optionally bounded: `T` or `T: Adder`.
#[derive(Debug, Clone)]
pub struct TypeVarDecl {
    pub name: Symbol,
    pub bound: Option<Symbol>,
}

/// One method signature inside a trait type expression. The receiver is
/// implicit.
#[derive(Debug, Clone)]
pub struct TraitFnSig {
    pub name: Symbol,
    pub params: Vec<(Symbol, TypeExpr)>,
    pub ret: TypeExpr,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    And,
    Or,
}

/// Expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    Unit,
    Int(i64),
    Float(f64),
    Bool(bool),
    VarRef(Symbol),
    /// `let x[: T] = e`
    Let {
        sym: Symbol,
        tp: Option<TypeExpr>,
        bound: Box<Expr>,
    },
    /// `x <- e`
    Mutate { sym: Symbol, right: Box<Expr> },
    /// `fun name<T..>(params): ret = { body }`
    LetRec(FuncDecl),
    /// `if c then a else b`
    If {
        cond: Box<Expr>,
        then_body: Vec<Expr>,
        else_body: Vec<Expr>,
    },
    /// `for i = a .. b { body }`
    Loop {
        it: Symbol,
        from: Box<Expr>,
        to: Box<Expr>,
        body: Vec<Expr>,
    },
    /// `match v { case E.V(x) -> ..; case _ -> .. }`
    Match {
        target: Box<Expr>,
        cases: Vec<MatchCase>,
    },
    /// `array<T>(e1, e2, ..)`
    ArrayLit { ele: TypeExpr, elems: Vec<Expr> },
    /// `a[i]`
    ArrayGet {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    /// `a[i] <- e`
    ArrayPut {
        array: Box<Expr>,
        index: Box<Expr>,
        right: Box<Expr>,
    },
    /// `Name<T..>{key: e, ..}`
    RecLit {
        name: Symbol,
        tp_args: Vec<TypeExpr>,
        keys: Vec<Symbol>,
        vals: Vec<Expr>,
    },
    /// `e.field` or `e.method(args)`; also `Enum.Variant(arg)`
    DotAcs {
        target: Box<Expr>,
        field: Symbol,
        args: Option<Vec<Expr>>,
    },
    /// `f(args)` or `f<T..>(args)`
    Apply {
        callee: Box<Expr>,
        tp_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// `fun` declaration.
#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: Symbol,
    pub tp_vars: Vec<TypeVarDecl>,
    pub params: Vec<(Symbol, TypeExpr)>,
    pub ret: TypeExpr,
    pub body: Vec<Expr>,
}

/// One `case` arm of a match.
#[derive(Debug, Clone)]
pub struct MatchCase {
    pub pattern: CasePattern,
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum CasePattern {
    /// `case _`
    Default,
    /// `case Enum.Variant(x, ..)`; `binds` may be empty for bare tags
    Variant {
        enum_name: Symbol,
        token: Symbol,
        binds: Vec<Symbol>,
    },
}
