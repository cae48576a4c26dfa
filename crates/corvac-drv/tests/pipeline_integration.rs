//! End-to-end pipeline tests: parse -> emit -> SSA -> evaluate.
//!
//! Each scenario checks the computed value, the shape of the CFG after
//! SSA construction (golden text where it is stable, structural
//! assertions otherwise), that no dangle sentinel survives dead-phi
//! removal, and that every block carries a terminator.

use corvac_gen::{run_module, run_module_with_globals, RtValue};
use corvac_ir::{cfg_string, func_string, verify_module, Module, Value};
use corvac_sem::{emit_ir, emit_ir_with_globals, GlobalDef};
use corvac_types::{ArrType, Type};
use corvac_util::Symbol;
use std::cell::RefCell;
use std::rc::Rc;

fn emit(src: &str) -> Module {
    let ast = corvac_par::parse(src).expect("parse");
    let module = emit_ir(&ast).expect("emit");
    verify_module(&module).expect("verify");
    module
}

fn run_int(module: &Module) -> i64 {
    match run_module(module).expect("run") {
        RtValue::Int(v) => v,
        other => panic!("expected int result, got {:?}", other),
    }
}

fn full_text(module: &Module) -> String {
    let mut out = cfg_string(&module.cfg, module.root);
    for func in &module.funcs {
        out.push_str(&func_string(&module.cfg, func));
    }
    out
}

fn phi_count(module: &Module, root: corvac_ir::BlockId) -> usize {
    module
        .cfg
        .reachable(root)
        .into_iter()
        .flat_map(|b| module.cfg.get(b).instrs.clone())
        .filter(|i| matches!(i.val, Value::Phi { .. }))
        .count()
}

#[test]
fn scenario_arithmetic_and_call() {
    let module = emit("fun f1(): int = { 1 + 2 }; f1()");
    assert_eq!(run_int(&module), 3);

    let expected = "\
#bb0:root
$v1 = ()
$v2 = f1()
$v3 = ret $v2
fun f1()
#bb1:body
$v1 = 1
$v2 = 2
$v3 = $v1+$v2
$v4 = ret $v3
";
    assert_eq!(full_text(&module), expected);
}

#[test]
fn scenario_array_get() {
    let module = emit("fun f(): int = { let a: array<int,3> = array<int>(1,2,3); a[2] }; f()");
    assert_eq!(run_int(&module), 3);

    let body_text = func_string(&module.cfg, &module.funcs[0]);
    let expected = "\
fun f()
#bb1:body
$v1 = 1
$v2 = 2
$v3 = 3
$v4 = ArrMake<int>($v1, $v2, $v3)
$v5 = $v4
$v6 = 2
$v7 = $v5[$v6]
$v8 = ret $v7
";
    assert_eq!(body_text, expected);
}

#[test]
fn scenario_array_put_then_get() {
    let module = emit(
        "fun f(b: int): int = { let a: array<int,3> = array<int>(1,2,0); a[2] <- b; a[2] }; f(3)",
    );
    assert_eq!(run_int(&module), 3);
    assert!(!full_text(&module).contains("$v_dangle"));
}

#[test]
fn scenario_loop_with_global_arrays() {
    let src =
        "fun f(a: int): int = { for a = 0 .. 3 { globalarr1[a] <- globalarr[a]*10 }; globalarr1[3] }; f(0)";
    let ast = corvac_par::parse(src).expect("parse");
    let arr_tp = Type::Arr(ArrType {
        ele: Box::new(Type::Int),
        size: 5,
    });
    let globals = vec![
        GlobalDef {
            name: Symbol::intern("globalarr"),
            tp: arr_tp.clone(),
        },
        GlobalDef {
            name: Symbol::intern("globalarr1"),
            tp: arr_tp,
        },
    ];
    let module = emit_ir_with_globals(&ast, &globals).expect("emit");
    verify_module(&module).expect("verify");

    let mk = |vals: Vec<i64>| {
        RtValue::Arr(Rc::new(RefCell::new(
            vals.into_iter().map(RtValue::Int).collect(),
        )))
    };
    let result = run_module_with_globals(
        &module,
        vec![
            (Symbol::intern("globalarr"), mk(vec![1, 3, 5, 6, 9])),
            (Symbol::intern("globalarr1"), mk(vec![0, 0, 0, 0, 0])),
        ],
    )
    .expect("run");
    match result {
        RtValue::Int(v) => assert_eq!(v, 60),
        other => panic!("expected int result, got {:?}", other),
    }
    assert!(!full_text(&module).contains("$v_dangle"));
}

#[test]
fn scenario_if_ssa() {
    let module = emit("fun f1(): int = { if 2 > 1 then 10 else 20 }; f1()");
    assert_eq!(run_int(&module), 10);

    // exactly one phi survives at the merge
    assert_eq!(phi_count(&module, module.funcs[0].body), 1);
    assert!(!full_text(&module).contains("$v_dangle"));

    let expected = "\
fun f1()
#bb1:body
$v1 = 2
$v2 = 1
$v3 = $v1>$v2
$v4 = if $v3 then #bb2 else #bb3
; to #bb2, #bb3
#bb2:then; from #bb1
$v5 = 10
$v6 = $v5
; to #bb4
#bb3:else; from #bb1
$v12 = 20
$v13 = $v12
; to #bb4
#bb4:after; from #bb2, #bb3
$v9 = PHI($v6, $v13)
$v10 = $v9
$v11 = ret $v10
";
    assert_eq!(func_string(&module.cfg, &module.funcs[0]), expected);
}

#[test]
fn scenario_generic_dispatch_through_trait() {
    let module = emit(
        "type Adder = trait { add(x: int): int };\
         type Counter = rec{c: int};\
         fun add(self: Counter, x: int): int = { self.c + x };\
         fun m(a: Adder): int = { a.add(5) };\
         m(Counter{c: 2})",
    );
    assert_eq!(run_int(&module), 7);

    // the argument is boxed to a trait object at the call site
    let root_text = cfg_string(&module.cfg, module.root);
    assert!(root_text.contains("boxtrait("));

    // the call inside m goes through the vtable
    let m = module.func(Symbol::intern("m")).unwrap();
    let m_text = func_string(&module.cfg, m);
    assert!(m_text.contains("traitcall add("));

    // the vtable slot resolves to the mangled method
    assert!(module.func(Symbol::intern("Counter$add")).is_ok());
}

#[test]
fn scenario_match_on_enum_with_payload() {
    let module = emit(
        "type Opt = enum<T>(Some(T), None);\
         fun f(): int = { match Opt.Some(41) { case Opt.Some(x) -> x + 1; case _ -> 0 } };\
         f()",
    );
    assert_eq!(run_int(&module), 42);

    let body_text = func_string(&module.cfg, &module.funcs[0]);
    // discriminant load, then a compare chain with the default last
    assert!(body_text.contains("discriminant("));
    assert!(body_text.contains("=="));
    let disc_pos = body_text.find("discriminant(").unwrap();
    let cmp_pos = body_text.find("==").unwrap();
    assert!(disc_pos < cmp_pos);
    assert!(body_text.contains(":case_next"));
    assert!(!body_text.contains("$v_dangle"));
}

#[test]
fn defs_dominate_uses() {
    use corvac_ir::dominates;
    use corvac_util::FxHashMap;

    let module = emit("fun f1(): int = { if 2 > 1 then 10 else 20 }; f1()");
    let body = module.funcs[0].body;
    let blocks = module.cfg.reachable(body);

    let mut def_block: FxHashMap<Symbol, corvac_ir::BlockId> = FxHashMap::default();
    for &b in &blocks {
        for instr in &module.cfg.get(b).instrs {
            def_block.insert(instr.ident, b);
        }
    }

    let check = |ident: &Symbol, user: corvac_ir::BlockId| {
        let def = def_block
            .get(ident)
            .unwrap_or_else(|| panic!("use of undefined ident {}", ident));
        assert!(
            dominates(&module.cfg, *def, user),
            "definition of {} does not dominate its use",
            ident
        );
    };
    for &b in &blocks {
        for instr in &module.cfg.get(b).instrs {
            match &instr.val {
                Value::Expr { args, .. } => args.iter().for_each(|a| check(a, b)),
                Value::Ref { ident, .. } => check(ident, b),
                Value::If { cond, .. } => check(cond, b),
                Value::Ret {
                    target: Some(t), ..
                } => check(t, b),
                Value::Phi { edges, .. } => {
                    // a phi operand must be available in the matching
                    // predecessor, not in the phi's own block
                    let preds = &module.cfg.get(b).preds;
                    for (edge, &pred) in edges.iter().zip(preds) {
                        check(edge, pred);
                    }
                }
                _ => {}
            }
        }
    }
}

#[test]
fn pipeline_is_deterministic() {
    let src = "fun f(a: int): int = { for a = 0 .. 3 { a }; if a > 1 then a else 0 }; f(2)";
    let text_a = full_text(&emit(src));
    let text_b = full_text(&emit(src));
    assert_eq!(text_a, text_b);
}

#[test]
fn every_block_is_terminated() {
    // verify_module (used by emit above) checks terminators; exercise
    // it over a control-flow-heavy program too
    let module = emit(
        "fun f(a: int): int = { for a = 0 .. 3 { if a > 1 then a else 0 }; a }; f(0)",
    );
    assert_eq!(run_int(&module), 4);
}
