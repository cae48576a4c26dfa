//! Structural well-formedness checks over a lifted module.
//!
//! These back the invariants the test suites assert after SSA
//! construction: single assignment per ident, symmetric CFG edges, phi
//! edge width matching predecessor count, no dangle sentinels surviving
//! dead-phi removal, and a terminator in every block.

use crate::instr::{is_dangle, BlockId, Cfg, InstrKind, Module, Value};
use corvac_util::{CompileError, FxHashSet, Result, Symbol};

/// Check every function subgraph of `module` plus the root CFG.
pub fn verify_module(module: &Module) -> Result<()> {
    verify_cfg(&module.cfg, module.root)?;
    for func in &module.funcs {
        verify_cfg(&module.cfg, func.body)?;
    }
    Ok(())
}

fn verify_cfg(cfg: &Cfg, root: BlockId) -> Result<()> {
    let blocks = cfg.reachable(root);
    let mut defined: FxHashSet<Symbol> = FxHashSet::default();

    for &b in &blocks {
        let block = cfg.get(b);

        // CFG consistency: succ/pred are mirror images
        for &s in &block.succs {
            if !cfg.get(s).preds.contains(&b) {
                return Err(CompileError::internal(format!(
                    "edge {} -> {} missing back-reference",
                    b, s
                )));
            }
        }
        for &p in &block.preds {
            if !cfg.get(p).succs.contains(&b) {
                return Err(CompileError::internal(format!(
                    "edge {} -> {} missing forward-reference",
                    p, b
                )));
            }
        }

        // single assignment and no surviving dangle idents
        for instr in &block.instrs {
            if is_dangle(instr.ident) {
                return Err(CompileError::internal(format!(
                    "dangle ident defined in {}",
                    b
                )));
            }
            if instr.ident.as_str().starts_with("$v") && !defined.insert(instr.ident) {
                return Err(CompileError::internal(format!(
                    "ident {} defined more than once",
                    instr.ident
                )));
            }
            if let Value::Phi { edges, .. } = &instr.val {
                if edges.len() != block.preds.len() {
                    return Err(CompileError::internal(format!(
                        "phi in {} has {} edges for {} predecessors",
                        b,
                        edges.len(),
                        block.preds.len()
                    )));
                }
            }
        }

        // terminator discipline: an If ends a two-successor block, an
        // exit block ends with Ret, everything else falls through to
        // its single successor
        let last_kind = block.instrs.last().map(|i| i.kind);
        match block.succs.len() {
            0 => {
                if last_kind != Some(InstrKind::Ret) {
                    return Err(CompileError::internal(format!(
                        "exit block {} does not end with ret",
                        b
                    )));
                }
            }
            1 => {}
            2 => {
                if last_kind != Some(InstrKind::If) {
                    return Err(CompileError::internal(format!(
                        "two-successor block {} does not end with if",
                        b
                    )));
                }
            }
            n => {
                return Err(CompileError::internal(format!(
                    "block {} has {} successors",
                    b, n
                )));
            }
        }
    }
    Ok(())
}
