//! Textual form of the CFG, used by golden tests and the `bb`
//! subcommand.
//!
//! Per block:
//! ```text
//! #bb<id>:<name>; from #bb<id>, ...
//! <ident> = <value>
//! ; to #bb<id>, ...
//! ```

use crate::instr::{Cfg, FuncDef, Value};
use crate::BlockId;
use std::fmt::Write;

/// Render one value the way the golden tests expect it.
pub fn value_string(val: &Value) -> String {
    match val {
        Value::Const { raw, .. } => String::from_utf8_lossy(raw).into_owned(),
        Value::Ref { ident, .. } => ident.to_string(),
        Value::Expr { op, args, .. } => {
            if args.len() == 2 {
                format!("{}{}{}", args[0], op, args[1])
            } else {
                let joined: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                format!("{}({})", op, joined.join(", "))
            }
        }
        Value::If {
            cond,
            then_blk,
            else_blk,
        } => format!("if {} then {} else {}", cond, then_blk, else_blk),
        Value::Phi { edges, .. } => {
            let joined: Vec<String> = edges.iter().map(|e| e.to_string()).collect();
            format!("PHI({})", joined.join(", "))
        }
        Value::ArrMake { ele, args } => {
            let joined: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            format!("ArrMake<{}>({})", ele, joined.join(", "))
        }
        Value::ArrGet { arr, index, .. } => format!("{}[{}]", arr, index),
        Value::ArrPut { arr, index, right } => format!("{}[{}] <- {}", arr, index, right),
        Value::RecLit { args, .. } => {
            let joined: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            format!("RecLit({})", joined.join(", "))
        }
        Value::RecAcs { target, idx, .. } => format!("{}.{}", target, idx),
        Value::EnumVar { idx, boxed, .. } => match boxed {
            Some(payload) => format!("EnumVar({}, {})", idx, payload),
            None => format!("EnumVar({})", idx),
        },
        Value::Discriminant { target, .. } => format!("discriminant({})", target),
        Value::Box { target, .. } => format!("box({})", target),
        Value::Unbox { target, .. } => format!("unbox({})", target),
        Value::BoxTrait { target, .. } => format!("boxtrait({})", target),
        Value::StaticCall { name, args, .. } => {
            let joined: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            format!("{}({})", name, joined.join(", "))
        }
        Value::TraitCall { name, args, .. } => {
            let joined: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            format!("traitcall {}({})", name, joined.join(", "))
        }
        Value::Ret { target, .. } => match target {
            Some(t) => format!("ret {}", t),
            None => "ret".to_string(),
        },
    }
}

fn block_string(cfg: &Cfg, id: BlockId, out: &mut String) {
    let block = cfg.get(id);
    write!(out, "{}:{}", id, block.name).unwrap();
    if !block.preds.is_empty() {
        let joined: Vec<String> = block.preds.iter().map(|p| p.to_string()).collect();
        write!(out, "; from {}", joined.join(", ")).unwrap();
    }
    out.push('\n');
    for instr in &block.instrs {
        writeln!(out, "{} = {}", instr.ident, value_string(&instr.val)).unwrap();
    }
    if !block.succs.is_empty() {
        let joined: Vec<String> = block.succs.iter().map(|s| s.to_string()).collect();
        writeln!(out, "; to {}", joined.join(", ")).unwrap();
    }
}

/// Render every block reachable from `root`, in breadth-first order.
pub fn cfg_string(cfg: &Cfg, root: BlockId) -> String {
    let mut out = String::new();
    for id in cfg.reachable(root) {
        block_string(cfg, id, &mut out);
    }
    out
}

/// Render a function header plus its body subgraph.
pub fn func_string(cfg: &Cfg, func: &FuncDef) -> String {
    let params: Vec<String> = func.params.iter().map(|p| p.to_string()).collect();
    let mut out = format!("fun {}({})\n", func.name, params.join(", "));
    out.push_str(&cfg_string(cfg, func.body));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{Instr, Op};
    use corvac_types::Type;
    use corvac_util::Symbol;

    #[test]
    fn straight_line_block() {
        let mut cfg = Cfg::new();
        let root = cfg.block("root");
        let v1 = Symbol::intern("$v1");
        let v2 = Symbol::intern("$v2");
        let v3 = Symbol::intern("$v3");
        cfg.push_instr(root, Instr::new(v1, Value::const_int(1)));
        cfg.push_instr(root, Instr::new(v2, Value::const_int(2)));
        cfg.push_instr(root, Instr::new(v3, Value::binary(Op::Add, v1, v2, Type::Int)));

        let expected = "#bb0:root\n$v1 = 1\n$v2 = 2\n$v3 = $v1+$v2\n";
        assert_eq!(cfg_string(&cfg, root), expected);
    }

    #[test]
    fn from_and_to_edges() {
        let mut cfg = Cfg::new();
        let a = cfg.block("entry");
        let b = cfg.block("then");
        let c = cfg.block("else");
        let d = cfg.block("after");
        cfg.link(a, b);
        cfg.link(a, c);
        cfg.link(b, d);
        cfg.link(c, d);
        let cond = Symbol::intern("$v1");
        cfg.push_instr(a, Instr::new(cond, Value::const_bool(true)));
        cfg.push_instr(
            a,
            Instr::new(
                Symbol::intern("$v2"),
                Value::If {
                    cond,
                    then_blk: b,
                    else_blk: c,
                },
            ),
        );

        let text = cfg_string(&cfg, a);
        assert!(text.starts_with("#bb0:entry\n"));
        assert!(text.contains("$v2 = if $v1 then #bb1 else #bb2\n; to #bb1, #bb2\n"));
        assert!(text.contains("#bb3:after; from #bb1, #bb2\n"));
    }
}
