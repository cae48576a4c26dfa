//! Textual LLVM-flavoured lowering.
//!
//! This is the `llvm` subcommand's output: the instruction stream a
//! real code generator would receive, rendered in an LLVM-like syntax.
//! It documents the backend contract; it is not fed to an assembler.

use corvac_ir::{is_dangle, BlockId, Cfg, FuncDef, Module, Op, Value};
use corvac_types::Type;
use corvac_util::{Result, Symbol};
use std::fmt::Write;

/// Lower a module to its textual form: every declared function, then
/// the root block as `@root_anon`.
pub fn lower_text(module: &Module) -> Result<String> {
    let mut out = String::from("; ModuleID = 'root'\n");
    for func in &module.funcs {
        lower_func(&module.cfg, func, &mut out);
    }
    out.push_str("\ndefine i32 @root_anon() {\n");
    lower_blocks(&module.cfg, module.root, &mut out);
    out.push_str("}\n");
    Ok(out)
}

fn lower_func(cfg: &Cfg, func: &FuncDef, out: &mut String) {
    let ret = llvm_type(&func.tp.ret);
    let params: Vec<String> = func
        .params
        .iter()
        .zip(&func.tp.params)
        .map(|(p, tp)| format!("{} {}", llvm_type(tp), reg(*p)))
        .collect();
    writeln!(
        out,
        "\ndefine {} @{}({}) {{",
        ret,
        func.name,
        params.join(", ")
    )
    .unwrap();
    lower_blocks(cfg, func.body, out);
    out.push_str("}\n");
}

fn lower_blocks(cfg: &Cfg, root: BlockId, out: &mut String) {
    for id in cfg.reachable(root) {
        let block = cfg.get(id);
        writeln!(out, "bb{}:", id.0).unwrap();
        for instr in &block.instrs {
            lower_instr(instr.ident, &instr.val, block, out);
        }
        // implicit fallthrough branch
        let last_is_branch = matches!(
            block.instrs.last().map(|i| &i.val),
            Some(Value::If { .. }) | Some(Value::Ret { .. })
        );
        if !last_is_branch {
            if let Some(&next) = block.succs.first() {
                writeln!(out, "  br label %bb{}", next.0).unwrap();
            }
        }
    }
}

fn reg(ident: Symbol) -> String {
    format!("%{}", ident.as_str().trim_start_matches('$'))
}

fn llvm_type(tp: &Type) -> &'static str {
    match tp {
        Type::Bool => "i1",
        Type::Int => "i32",
        Type::Float => "double",
        Type::Unit => "i32",
        Type::Arr(_) => "{ i32*, i32 }",
        Type::Rec(_) => "i8*",
        Type::Enum(e) if e.simple => "i32",
        Type::Enum(_) => "{ i32, i8* }",
        Type::Trait(_) => "{ i8*, i8** }",
        _ => "i8*",
    }
}

fn lower_instr(ident: Symbol, val: &Value, block: &corvac_ir::Block, out: &mut String) {
    let dst = reg(ident);
    match val {
        Value::Const { tp, raw } => {
            let text = String::from_utf8_lossy(raw);
            match tp {
                Type::Float => {
                    writeln!(out, "  {} = fadd double 0.0, {}", dst, text).unwrap()
                }
                Type::Bool => {
                    let bit = if text == "true" { 1 } else { 0 };
                    writeln!(out, "  {} = add i1 0, {}", dst, bit).unwrap()
                }
                Type::Unit => writeln!(out, "  {} = add i32 0, 0", dst).unwrap(),
                _ => writeln!(out, "  {} = add i32 0, {}", dst, text).unwrap(),
            }
        }
        Value::Ref { tp, ident } => {
            let t = llvm_type(tp);
            writeln!(out, "  {} = bitcast {} {} to {}", dst, t, reg(*ident), t).unwrap()
        }
        Value::Expr { tp, op, args } => {
            let float = matches!(tp, Type::Float) && !op.is_compare();
            let opcode = match (op, float) {
                (Op::Add, false) => "add i32",
                (Op::Add, true) => "fadd double",
                (Op::Sub, false) => "sub i32",
                (Op::Sub, true) => "fsub double",
                (Op::Mul, false) => "mul i32",
                (Op::Mul, true) => "fmul double",
                (Op::Div, false) => "sdiv i32",
                (Op::Div, true) => "fdiv double",
                (Op::Mod, _) => "srem i32",
                (Op::Lt, _) => "icmp slt i32",
                (Op::Lte, _) => "icmp sle i32",
                (Op::Gt, _) => "icmp sgt i32",
                (Op::Gte, _) => "icmp sge i32",
                (Op::Eq, _) => "icmp eq i32",
                (Op::Neq, _) => "icmp ne i32",
                (Op::And, _) => "and i1",
                (Op::Or, _) => "or i1",
            };
            writeln!(
                out,
                "  {} = {} {}, {}",
                dst,
                opcode,
                reg(args[0]),
                reg(args[1])
            )
            .unwrap()
        }
        Value::If {
            cond,
            then_blk,
            else_blk,
        } => writeln!(
            out,
            "  br i1 {}, label %bb{}, label %bb{}",
            reg(*cond),
            then_blk.0,
            else_blk.0
        )
        .unwrap(),
        Value::Phi { tp, edges, .. } => {
            let t = tp.as_ref().map(llvm_type).unwrap_or("i32");
            let incoming: Vec<String> = edges
                .iter()
                .zip(&block.preds)
                .filter(|(e, _)| !is_dangle(**e))
                .map(|(e, p)| format!("[ {}, %bb{} ]", reg(*e), p.0))
                .collect();
            writeln!(out, "  {} = phi {} {}", dst, t, incoming.join(", ")).unwrap()
        }
        Value::ArrMake { ele, args } => {
            writeln!(
                out,
                "  {} = alloca {}, i32 {}",
                dst,
                llvm_type(ele),
                args.len()
            )
            .unwrap();
            for (i, arg) in args.iter().enumerate() {
                writeln!(
                    out,
                    "  store {} {}, {}* {} ; slot {}",
                    llvm_type(ele),
                    reg(*arg),
                    llvm_type(ele),
                    dst,
                    i
                )
                .unwrap();
            }
        }
        Value::ArrGet { tp, arr, index } => {
            let t = llvm_type(tp);
            writeln!(
                out,
                "  {}.p = getelementptr {}, {}* {}, i32 {}",
                dst,
                t,
                t,
                reg(*arr),
                reg(*index)
            )
            .unwrap();
            writeln!(out, "  {} = load {}, {}* {}.p", dst, t, t, dst).unwrap();
        }
        Value::ArrPut { arr, index, right } => {
            writeln!(
                out,
                "  {}.p = getelementptr i32, i32* {}, i32 {}",
                dst,
                reg(*arr),
                reg(*index)
            )
            .unwrap();
            writeln!(out, "  store i32 {}, i32* {}.p", reg(*right), dst).unwrap();
        }
        Value::RecLit { tp, args } => {
            let fields: Vec<String> = args.iter().map(|a| reg(*a)).collect();
            writeln!(
                out,
                "  {} = insertvalue {} undef, {}",
                dst,
                llvm_type(tp),
                fields.join(", ")
            )
            .unwrap()
        }
        Value::RecAcs { target, idx, .. } => writeln!(
            out,
            "  {} = extractvalue i8* {}, {}",
            dst,
            reg(*target),
            idx
        )
        .unwrap(),
        Value::EnumVar { idx, boxed, .. } => match boxed {
            Some(payload) => writeln!(
                out,
                "  {} = insertvalue {{ i32, i8* }} {{ i32 {}, i8* undef }}, i8* {}, 1",
                dst,
                idx,
                reg(*payload)
            )
            .unwrap(),
            None => writeln!(out, "  {} = add i32 0, {}", dst, idx).unwrap(),
        },
        Value::Discriminant { target, simple } => {
            if *simple {
                writeln!(out, "  {} = bitcast i32 {} to i32", dst, reg(*target)).unwrap()
            } else {
                writeln!(
                    out,
                    "  {} = extractvalue {{ i32, i8* }} {}, 0",
                    dst,
                    reg(*target)
                )
                .unwrap()
            }
        }
        Value::Box { target, tp, .. } => writeln!(
            out,
            "  {} = inttoptr {} {} to i8*",
            dst,
            llvm_type(tp),
            reg(*target)
        )
        .unwrap(),
        Value::Unbox { target, tp, .. } => writeln!(
            out,
            "  {} = ptrtoint i8* {} to {}",
            dst,
            reg(*target),
            llvm_type(tp)
        )
        .unwrap(),
        Value::BoxTrait { target, .. } => writeln!(
            out,
            "  {} = insertvalue {{ i8*, i8** }} undef, i8* {}, 0",
            dst,
            reg(*target)
        )
        .unwrap(),
        Value::StaticCall { name, tp, args } => {
            let params: Vec<String> = args.iter().map(|a| format!("i32 {}", reg(*a))).collect();
            writeln!(
                out,
                "  {} = call {} @{}({})",
                dst,
                llvm_type(tp),
                name,
                params.join(", ")
            )
            .unwrap()
        }
        Value::TraitCall { name, tp, args, .. } => {
            writeln!(
                out,
                "  {}.fn = load i8*, i8** %vtable.{} ; slot {}",
                dst,
                reg(args[0]),
                name
            )
            .unwrap();
            let params: Vec<String> = args.iter().map(|a| format!("i32 {}", reg(*a))).collect();
            writeln!(
                out,
                "  {} = call {} {}.fn({})",
                dst,
                llvm_type(tp),
                dst,
                params.join(", ")
            )
            .unwrap()
        }
        Value::Ret { target, tp } => match target {
            Some(t) => writeln!(out, "  ret {} {}", llvm_type(tp), reg(*t)).unwrap(),
            None => writeln!(out, "  ret void").unwrap(),
        },
    }
}
