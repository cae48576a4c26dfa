//! Compatibility checking and parametric substitution.
//!
//! `compatible(left, right)` asks whether `left` can act as a container
//! receiving a value of type `right`. Substitution resolves type
//! variables against explicit type arguments, enforcing trait bounds as
//! it goes.

use crate::ty::{EnumType, FuncType, RecType, TraitType, Type, TypeVar};
use corvac_util::{CompileError, ErrorCode, Result, Symbol};
use indexmap::IndexMap;

/// Test if `left` can receive a value of type `right`.
pub fn compatible(left: &Type, right: &Type) -> Result<()> {
    // int and simple enums are interchangeable
    if is_int_simple_enum_pair(left, right) || is_int_simple_enum_pair(right, left) {
        return Ok(());
    }

    match left {
        Type::Var(lv) => match right {
            Type::Var(rv) if lv.name == rv.name => Ok(()),
            _ => Err(CompileError::new(
                ErrorCode::TypeIncompatibleTypeVar,
                format!("type var {} and {} not compatible", left, right),
            )),
        },
        Type::Unit | Type::Bool | Type::Int | Type::Float | Type::VoidPtr => {
            if std::mem::discriminant(left) == std::mem::discriminant(right) {
                Ok(())
            } else {
                Err(CompileError::new(
                    ErrorCode::TypeIncompatiblePrimitive,
                    format!("{} and {} not compatible", left, right),
                ))
            }
        }
        Type::Rec(lr) => {
            let rr = match right {
                Type::Rec(rr) if rr.uid == lr.uid && rr.substs.len() == lr.substs.len() => rr,
                _ => {
                    return Err(CompileError::new(
                        ErrorCode::TypeIncompatibleRecord,
                        format!("record {} and {} not compatible", left, right),
                    ))
                }
            };
            for (ls, rs) in lr.substs.iter().zip(&rr.substs) {
                if compatible(ls, rs).is_err() {
                    return Err(CompileError::new(
                        ErrorCode::TypeIncompatibleRecord,
                        format!(
                            "record {} and {} invoked with incompatible type argument",
                            left, right
                        ),
                    ));
                }
            }
            Ok(())
        }
        Type::Enum(le) => match right {
            Type::Enum(re) if re.uid == le.uid => Ok(()),
            _ => Err(CompileError::new(
                ErrorCode::TypeIncompatibleEnum,
                format!("enum {} and {} not compatible", left, right),
            )),
        },
        Type::Trait(lt) => trait_compatible(lt, left, right),
        Type::Arr(_) => match right {
            // element and size checking deferred
            Type::Arr(_) => Ok(()),
            _ => Err(CompileError::new(
                ErrorCode::TypeIncompatiblePrimitive,
                format!("{} and {} not compatible", left, right),
            )),
        },
        _ => Err(CompileError::internal(format!(
            "unhandled type compatible check left: {}. right: {}",
            left, right
        ))),
    }
}

fn is_int_simple_enum_pair(a: &Type, b: &Type) -> bool {
    matches!(a, Type::Int) && matches!(b, Type::Enum(e) if e.simple)
}

/// Trait conformance: every key of `lt` must be present in `right`'s
/// methods with compatible signatures (the receiver slot is skipped).
fn trait_compatible(lt: &TraitType, left: &Type, right: &Type) -> Result<()> {
    if let Type::Trait(rt) = right {
        if rt.uid == lt.uid {
            return Ok(());
        }
    }

    let incompatible = |detail: String| {
        CompileError::new(
            ErrorCode::TypeIncompatibleTrait,
            format!("trait {} and {} not compatible{}", left, right, detail),
        )
    };

    // Collect the right side's method set: another trait's signatures,
    // or a concrete impl bundle.
    let mut impls: IndexMap<Symbol, &FuncType> = IndexMap::new();
    match right {
        Type::Trait(rt) => {
            for (key, func) in rt.keys.iter().zip(&rt.fns) {
                impls.insert(*key, func);
            }
        }
        _ => match right.impls() {
            Some(bundle) => {
                for (key, func) in &bundle.fns {
                    impls.insert(*key, func);
                }
            }
            None => return Err(incompatible(String::new())),
        },
    }

    if impls.len() < lt.fns.len() {
        return Err(incompatible(String::new()));
    }
    for (key, trait_fn) in lt.keys.iter().zip(&lt.fns) {
        let right_fn = impls
            .get(key)
            .ok_or_else(|| incompatible(format!(". missing fun: {}", key)))?;
        if trait_fn.params.len() != right_fn.params.len() {
            return Err(incompatible(format!(". fun {} params not compatible", key)));
        }
        for (tp, rp) in trait_fn.params.iter().zip(&right_fn.params).skip(1) {
            compatible(tp, rp)?;
        }
        compatible(&trait_fn.ret, &right_fn.ret)?;
    }
    Ok(())
}

/// Substitute the declared type parameters of `t` with `tp_args`.
pub fn subst_root(t: &Type, tp_args: &[Type]) -> Result<Type> {
    let tp_vars: &[TypeVar] = match t {
        Type::Func(f) => &f.tp_vars,
        Type::Rec(r) => &r.tp_vars,
        Type::Enum(e) => &e.tp_vars,
        Type::Trait(tr) => &tr.tp_vars,
        _ => &[],
    };
    if tp_args.len() != tp_vars.len() {
        return Err(CompileError::new(
            ErrorCode::TypeSubstituteCountMismatch,
            "invoke type arguments more or less than defined type parameters",
        ));
    }
    // nothing to substitute
    if tp_args.is_empty() {
        return Ok(t.clone());
    }
    let mut set: IndexMap<Symbol, Type> = IndexMap::new();
    for (tv, arg) in tp_vars.iter().zip(tp_args) {
        set.insert(tv.name, arg.clone());
    }
    subst(t, &set)
}

/// Substitute type variables by name throughout `t`.
pub fn subst(t: &Type, set: &IndexMap<Symbol, Type>) -> Result<Type> {
    match t {
        Type::Var(tv) => match set.get(&tv.name) {
            Some(s) => {
                if let Some(lower) = &tv.lower {
                    check_bound(lower, s)?;
                }
                Ok(s.clone())
            }
            None => Ok(t.clone()),
        },
        Type::Func(f) => {
            let ret = subst(&f.ret, set)?;
            let params = subst_list(&f.params, set)?;
            Ok(Type::Func(FuncType {
                uid: f.uid,
                params,
                ret: Box::new(ret),
                tp_vars: Vec::new(),
            }))
        }
        Type::Rec(r) => {
            let mut substs = Vec::with_capacity(r.tp_vars.len());
            let mut tp_vars = Vec::with_capacity(r.tp_vars.len());
            for tv in &r.tp_vars {
                let s = set
                    .get(&tv.name)
                    .cloned()
                    .unwrap_or_else(|| Type::Var(tv.clone()));
                match &s {
                    Type::Var(sv) => tp_vars.push(sv.clone()),
                    _ => tp_vars.push(tv.clone()),
                }
                substs.push(s);
            }
            let mem_tps = subst_list(&r.mem_tps, set)?;
            Ok(Type::Rec(RecType {
                uid: r.uid,
                keys: r.keys.clone(),
                mem_tps,
                tp_vars,
                substs,
                impls: r.impls.clone(),
            }))
        }
        Type::Enum(e) => {
            let variants = subst_list(&e.variants, set)?;
            Ok(Type::Enum(EnumType {
                uid: e.uid,
                simple: e.simple,
                tokens: e.tokens.clone(),
                tp_vars: e.tp_vars.clone(),
                variants,
                impls: e.impls.clone(),
            }))
        }
        Type::Trait(tr) => {
            let mut tp_vars = Vec::with_capacity(tr.tp_vars.len());
            for tv in &tr.tp_vars {
                let s = set.get(&tv.name).ok_or_else(|| {
                    CompileError::internal(format!(
                        "missing substitution for trait type parameter '{}",
                        tv.name
                    ))
                })?;
                if let Some(lower) = &tv.lower {
                    check_bound(lower, s)?;
                }
                match s {
                    Type::Var(sv) => tp_vars.push(sv.clone()),
                    _ => tp_vars.push(tv.clone()),
                }
            }
            let mut trait_tp = TraitType {
                uid: tr.uid,
                keys: tr.keys.clone(),
                fns: Vec::new(),
                tp_vars,
            };
            let receiver = Type::Trait(trait_tp.skeleton());
            let mut fns = Vec::with_capacity(tr.fns.len());
            for func in &tr.fns {
                let ret = subst(&func.ret, set)?;
                let mut params = Vec::with_capacity(func.params.len());
                // the receiver slot is rebuilt against the new trait,
                // preserving self-recursion
                params.push(receiver.clone());
                for p in func.params.iter().skip(1) {
                    params.push(subst(p, set)?);
                }
                fns.push(FuncType {
                    uid: func.uid,
                    params,
                    ret: Box::new(ret),
                    tp_vars: Vec::new(),
                });
            }
            trait_tp.fns = fns;
            Ok(Type::Trait(trait_tp))
        }
        _ => Ok(t.clone()),
    }
}

fn check_bound(lower: &Type, substituted: &Type) -> Result<()> {
    compatible(lower, substituted).map_err(|e| {
        CompileError::new(
            ErrorCode::TypeTraitBound,
            format!(
                "type argument {} does not satisfy bound {}: {}",
                substituted, lower, e.msg
            ),
        )
    })
}

pub fn subst_list(ts: &[Type], set: &IndexMap<Symbol, Type>) -> Result<Vec<Type>> {
    ts.iter().map(|t| subst(t, set)).collect()
}

/// Collect every type variable appearing in `t`, in first-seen order.
pub fn collect_type_vars(t: &Type) -> IndexMap<Symbol, TypeVar> {
    let mut set = IndexMap::new();
    walk_type_vars(t, &mut set);
    set
}

fn walk_type_vars(t: &Type, set: &mut IndexMap<Symbol, TypeVar>) {
    match t {
        Type::Var(tv) => {
            set.entry(tv.name).or_insert_with(|| tv.clone());
        }
        Type::Func(f) => {
            for p in &f.params {
                walk_type_vars(p, set);
            }
            walk_type_vars(&f.ret, set);
        }
        Type::Rec(r) => {
            for m in &r.mem_tps {
                walk_type_vars(m, set);
            }
        }
        Type::Enum(e) => {
            for v in &e.variants {
                walk_type_vars(v, set);
            }
        }
        Type::Trait(tr) => {
            for f in &tr.fns {
                walk_type_vars(&Type::Func(f.clone()), set);
            }
        }
        _ => {}
    }
}

/// True when `t` is itself a type variable or contains one.
pub fn has_type_var(t: &Type) -> bool {
    matches!(t, Type::Var(_)) || has_partial_type_var(t)
}

/// True when `t` contains an unresolved type variable below the root.
pub fn has_partial_type_var(t: &Type) -> bool {
    if matches!(t, Type::Var(_)) {
        return false;
    }
    walk_partial(t)
}

fn walk_partial(t: &Type) -> bool {
    match t {
        Type::Var(_) => true,
        Type::Func(f) => f.params.iter().any(walk_partial) || walk_partial(&f.ret),
        Type::Rec(r) => !r.tp_vars.is_empty() || r.mem_tps.iter().any(walk_partial),
        Type::Enum(e) => !e.tp_vars.is_empty() || e.variants.iter().any(walk_partial),
        Type::Trait(tr) => {
            if !tr.tp_vars.is_empty() {
                return true;
            }
            for func in &tr.fns {
                // the receiver refers back to the trait itself; skip it
                for p in &func.params {
                    if let Type::Trait(pt) = p {
                        if pt.uid == tr.uid {
                            continue;
                        }
                    }
                    if walk_partial(p) {
                        return true;
                    }
                }
                if let Type::Trait(rt) = func.ret.as_ref() {
                    if rt.uid == tr.uid {
                        continue;
                    }
                }
                if walk_partial(&func.ret) {
                    return true;
                }
            }
            false
        }
        _ => false,
    }
}

/// Finalize a call: substitute the callee's type parameters, then check
/// each argument against the substituted parameter types.
pub fn check_app(t: &FuncType, tp_args: &[Type], args: &[Type]) -> Result<FuncType> {
    let substituted = subst_root(&Type::Func(t.clone()), tp_args)?;
    let func = match substituted {
        Type::Func(f) => f,
        _ => return Err(CompileError::internal("function substitution changed kind")),
    };
    if args.len() != func.params.len() {
        return Err(CompileError::new(
            ErrorCode::TypeParamCountWrong,
            format!(
                "call expects {} arguments, {} given",
                func.params.len(),
                args.len()
            ),
        ));
    }
    for (param, arg) in func.params.iter().zip(args) {
        compatible(param, arg)?;
    }
    Ok(func)
}

/// Check a record literal against its declaration.
pub fn check_rec_lit(t: &RecType, tp_args: &[Type], args: &[Type]) -> Result<RecType> {
    let substituted = subst_root(&Type::Rec(t.clone()), tp_args)?;
    let rec = match substituted {
        Type::Rec(r) => r,
        _ => return Err(CompileError::internal("record substitution changed kind")),
    };
    if args.len() != rec.mem_tps.len() {
        return Err(CompileError::new(
            ErrorCode::TypeRecordNotFulfilled,
            format!(
                "record literal expects {} members, {} given",
                rec.mem_tps.len(),
                args.len()
            ),
        ));
    }
    for (mem, arg) in rec.mem_tps.iter().zip(args) {
        compatible(mem, arg)?;
    }
    Ok(rec)
}

/// Check a mutation `left <- right`.
pub fn check_mutate(left: &Type, right: &Type) -> Result<()> {
    let right = subst_root(right, &[])?;
    compatible(left, &right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{ArrType, ImplBundle, TypeContext};

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    fn sample_rec(ctx: &TypeContext) -> RecType {
        RecType {
            uid: ctx.next_uid(),
            keys: vec![sym("c")],
            mem_tps: vec![Type::Int],
            tp_vars: Vec::new(),
            substs: Vec::new(),
            impls: ImplBundle::default(),
        }
    }

    fn simple_enum(ctx: &TypeContext) -> EnumType {
        EnumType {
            uid: ctx.next_uid(),
            simple: true,
            tokens: vec![sym("Red"), sym("Green")],
            tp_vars: Vec::new(),
            variants: vec![Type::Unit, Type::Unit],
            impls: ImplBundle::default(),
        }
    }

    #[test]
    fn compat_is_reflexive() {
        let ctx = TypeContext::new();
        let samples = vec![
            Type::Unit,
            Type::Bool,
            Type::Int,
            Type::Float,
            Type::VoidPtr,
            Type::Var(TypeVar::new(sym("T"))),
            Type::Arr(ArrType {
                ele: Box::new(Type::Int),
                size: 4,
            }),
            Type::Rec(sample_rec(&ctx)),
            Type::Enum(simple_enum(&ctx)),
        ];
        for t in &samples {
            assert!(compatible(t, t).is_ok(), "not reflexive: {}", t);
        }
    }

    #[test]
    fn primitive_mismatch() {
        let err = compatible(&Type::Int, &Type::Float).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeIncompatiblePrimitive);
    }

    #[test]
    fn int_and_simple_enum_interchange() {
        let ctx = TypeContext::new();
        let e = Type::Enum(simple_enum(&ctx));
        assert!(compatible(&Type::Int, &e).is_ok());
        assert!(compatible(&e, &Type::Int).is_ok());
    }

    #[test]
    fn payload_enum_is_not_int() {
        let ctx = TypeContext::new();
        let mut e = simple_enum(&ctx);
        e.simple = false;
        let err = compatible(&Type::Int, &Type::Enum(e)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeIncompatiblePrimitive);
    }

    #[test]
    fn records_are_nominal() {
        let ctx = TypeContext::new();
        let a = sample_rec(&ctx);
        let b = sample_rec(&ctx);
        assert!(compatible(&Type::Rec(a.clone()), &Type::Rec(a.clone())).is_ok());
        let err = compatible(&Type::Rec(a), &Type::Rec(b)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeIncompatibleRecord);
    }

    #[test]
    fn enum_uid_mismatch() {
        let ctx = TypeContext::new();
        let mut a = simple_enum(&ctx);
        let mut b = simple_enum(&ctx);
        a.simple = false;
        b.simple = false;
        let err = compatible(&Type::Enum(a), &Type::Enum(b)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeIncompatibleEnum);
    }

    fn adder_trait(ctx: &TypeContext) -> TraitType {
        let mut tr = TraitType {
            uid: ctx.next_uid(),
            keys: vec![sym("add")],
            fns: Vec::new(),
            tp_vars: Vec::new(),
        };
        let receiver = Type::Trait(tr.skeleton());
        tr.fns = vec![FuncType {
            uid: ctx.next_uid(),
            params: vec![receiver, Type::Int],
            ret: Box::new(Type::Int),
            tp_vars: Vec::new(),
        }];
        tr
    }

    fn counter_rec(ctx: &TypeContext) -> RecType {
        let mut rec = sample_rec(ctx);
        let method = FuncType {
            uid: ctx.next_uid(),
            params: vec![Type::Rec(rec.clone()), Type::Int],
            ret: Box::new(Type::Int),
            tp_vars: Vec::new(),
        };
        rec.impls.prefix = Some(sym("Counter"));
        rec.impls.fns.insert(sym("add"), method);
        rec
    }

    #[test]
    fn trait_conformance_via_impl_bundle() {
        let ctx = TypeContext::new();
        let adder = adder_trait(&ctx);
        let counter = counter_rec(&ctx);
        assert!(compatible(&Type::Trait(adder), &Type::Rec(counter)).is_ok());
    }

    #[test]
    fn trait_conformance_missing_method() {
        let ctx = TypeContext::new();
        let adder = adder_trait(&ctx);
        let plain = sample_rec(&ctx);
        let err = compatible(&Type::Trait(adder), &Type::Rec(plain)).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeIncompatibleTrait);
    }

    #[test]
    fn subst_empty_is_identity() {
        let ctx = TypeContext::new();
        let t = Type::Rec(sample_rec(&ctx));
        let out = subst(&t, &IndexMap::new()).unwrap();
        assert_eq!(out, t);
        let out = subst_root(&Type::Int, &[]).unwrap();
        assert_eq!(out, Type::Int);
    }

    fn generic_rec(ctx: &TypeContext) -> RecType {
        RecType {
            uid: ctx.next_uid(),
            keys: vec![sym("v")],
            mem_tps: vec![Type::Var(TypeVar::new(sym("T")))],
            tp_vars: vec![TypeVar::new(sym("T"))],
            substs: Vec::new(),
            impls: ImplBundle::default(),
        }
    }

    #[test]
    fn subst_root_resolves_member_types() {
        let ctx = TypeContext::new();
        let rec = generic_rec(&ctx);
        let out = subst_root(&Type::Rec(rec), &[Type::Int]).unwrap();
        match out {
            Type::Rec(r) => {
                assert_eq!(r.mem_tps, vec![Type::Int]);
                assert_eq!(r.substs, vec![Type::Int]);
            }
            other => panic!("expected rec, got {}", other),
        }
    }

    #[test]
    fn subst_root_count_mismatch() {
        let ctx = TypeContext::new();
        let rec = generic_rec(&ctx);
        let err = subst_root(&Type::Rec(rec), &[Type::Int, Type::Bool]).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeSubstituteCountMismatch);
    }

    #[test]
    fn subst_enforces_trait_bound() {
        let ctx = TypeContext::new();
        let adder = adder_trait(&ctx);
        let func = FuncType {
            uid: ctx.next_uid(),
            params: vec![Type::Var(TypeVar::bounded(
                sym("T"),
                Type::Trait(adder.clone()),
            ))],
            ret: Box::new(Type::Int),
            tp_vars: vec![TypeVar::bounded(sym("T"), Type::Trait(adder))],
        };
        let err = subst_root(&Type::Func(func.clone()), &[Type::Int]).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeTraitBound);

        let counter = counter_rec(&ctx);
        assert!(subst_root(&Type::Func(func), &[Type::Rec(counter)]).is_ok());
    }

    #[test]
    fn trait_subst_rebuilds_receiver() {
        let ctx = TypeContext::new();
        let mut tr = TraitType {
            uid: ctx.next_uid(),
            keys: vec![sym("get")],
            fns: Vec::new(),
            tp_vars: vec![TypeVar::new(sym("T"))],
        };
        let receiver = Type::Trait(tr.skeleton());
        tr.fns = vec![FuncType {
            uid: ctx.next_uid(),
            params: vec![receiver],
            ret: Box::new(Type::Var(TypeVar::new(sym("T")))),
            tp_vars: Vec::new(),
        }];
        let out = subst_root(&Type::Trait(tr.clone()), &[Type::Int]).unwrap();
        match out {
            Type::Trait(t) => {
                assert_eq!(t.uid, tr.uid);
                assert_eq!(*t.fns[0].ret, Type::Int);
                match &t.fns[0].params[0] {
                    Type::Trait(recv) => assert_eq!(recv.uid, tr.uid),
                    other => panic!("expected trait receiver, got {}", other),
                }
            }
            other => panic!("expected trait, got {}", other),
        }
    }

    #[test]
    fn collect_vars_in_order() {
        let ctx = TypeContext::new();
        let func = FuncType {
            uid: ctx.next_uid(),
            params: vec![
                Type::Var(TypeVar::new(sym("B"))),
                Type::Var(TypeVar::new(sym("A"))),
            ],
            ret: Box::new(Type::Var(TypeVar::new(sym("B")))),
            tp_vars: Vec::new(),
        };
        let vars = collect_type_vars(&Type::Func(func));
        let names: Vec<&str> = vars.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn partial_type_var_detection() {
        let ctx = TypeContext::new();
        assert!(!has_partial_type_var(&Type::Int));
        // a bare var is not "partial"
        assert!(!has_partial_type_var(&Type::Var(TypeVar::new(sym("T")))));
        assert!(has_type_var(&Type::Var(TypeVar::new(sym("T")))));

        let rec = generic_rec(&ctx);
        assert!(has_partial_type_var(&Type::Rec(rec)));

        // a self-recursive trait without type params is not partial
        let adder = adder_trait(&ctx);
        assert!(!has_partial_type_var(&Type::Trait(adder)));
    }

    #[test]
    fn check_app_substitutes_and_checks() {
        let ctx = TypeContext::new();
        let id_fn = FuncType {
            uid: ctx.next_uid(),
            params: vec![Type::Var(TypeVar::new(sym("T")))],
            ret: Box::new(Type::Var(TypeVar::new(sym("T")))),
            tp_vars: vec![TypeVar::new(sym("T"))],
        };
        let out = check_app(&id_fn, &[Type::Int], &[Type::Int]).unwrap();
        assert_eq!(*out.ret, Type::Int);

        let err = check_app(&id_fn, &[Type::Int], &[Type::Int, Type::Int]).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeParamCountWrong);

        let err = check_app(&id_fn, &[Type::Int], &[Type::Float]).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeIncompatiblePrimitive);
    }

    #[test]
    fn check_rec_lit_counts_members() {
        let ctx = TypeContext::new();
        let rec = sample_rec(&ctx);
        assert!(check_rec_lit(&rec, &[], &[Type::Int]).is_ok());
        let err = check_rec_lit(&rec, &[], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeRecordNotFulfilled);
    }
}
