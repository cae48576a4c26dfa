//! Dominator tree and SSA construction.
//!
//! Given a function body's root block, [`DominatorMaker::lift`] computes
//! the dominator tree (Lengauer-Tarjan), the dominance frontier (Cytron
//! et al.), places phi nodes, renames every definition to a fresh
//! `$v<N>` version, and prunes ineffective instructions. Variables are
//! processed in sorted order so the output is deterministic
//! byte-for-byte for a given input CFG.

use crate::instr::{dangle_ident, gen_var_ident, is_dangle, BlockId, Cfg, Instr, InstrKind, Value};
use corvac_types::Type;
use corvac_util::{FxHashMap, FxHashSet, Idx, Symbol};
use std::collections::VecDeque;

/// Rewrites one function's CFG into SSA form.
pub struct DominatorMaker<'a> {
    cfg: &'a mut Cfg,
    root: BlockId,
    /// Reachable blocks in breadth-first order
    all_blocks: Vec<BlockId>,
    params: Vec<Symbol>,
    /// Parameter idents after renaming, in declaration order
    pub lift_params: Vec<Symbol>,
}

/// Lengauer-Tarjan working state, indexed by block id.
/// `pre` holds the DFS preorder number of the CFG spanning tree.
struct LtState {
    sdom: Vec<Option<BlockId>>,
    parent: Vec<Option<BlockId>>,
    ancestor: Vec<Option<BlockId>>,
    pre: Vec<u32>,
}

impl LtState {
    /// EVAL: the ancestor of `v` whose semidominator has the smallest
    /// preorder number.
    fn eval(&self, mut v: BlockId) -> BlockId {
        let mut u = v;
        while let Some(a) = self.ancestor[v.index()] {
            if self.pre[self.sdom[v.index()].unwrap().index()]
                < self.pre[self.sdom[u.index()].unwrap().index()]
            {
                u = v;
            }
            v = a;
        }
        u
    }

    /// LINK: attach `w` below `v` in the ancestor forest.
    fn link(&mut self, v: Option<BlockId>, w: BlockId) {
        self.ancestor[w.index()] = v;
    }
}

impl<'a> DominatorMaker<'a> {
    pub fn new(cfg: &'a mut Cfg, root: BlockId, params: Vec<Symbol>) -> Self {
        let all_blocks = cfg.reachable(root);
        Self {
            cfg,
            root,
            all_blocks,
            params,
            lift_params: Vec::new(),
        }
    }

    pub fn all_blocks(&self) -> &[BlockId] {
        &self.all_blocks
    }

    /// Run the full SSA pipeline. `decl_table` maps pre-SSA idents to
    /// their types; the returned table maps the renamed idents.
    pub fn lift(&mut self, decl_table: &FxHashMap<Symbol, Type>) -> FxHashMap<Symbol, Type> {
        self.build_dom_tree();
        let df = self.build_dom_frontier();
        self.place_phi(&df);
        let new_decls = self.rename(decl_table);
        self.remove_ineffective();
        new_decls
    }

    fn dfs(&self, v: BlockId, lt: &mut LtState, preorder: &mut Vec<BlockId>) {
        lt.pre[v.index()] = preorder.len() as u32;
        preorder.push(v);
        lt.sdom[v.index()] = Some(v);
        lt.link(None, v);
        for w in self.cfg.succs(v) {
            if lt.sdom[w.index()].is_none() {
                lt.parent[w.index()] = Some(v);
                self.dfs(w, lt, preorder);
            }
        }
    }

    fn build_dom_tree(&mut self) {
        let len = self.cfg.len();
        let mut lt = LtState {
            sdom: vec![None; len],
            parent: vec![None; len],
            ancestor: vec![None; len],
            pre: vec![0; len],
        };

        // Step 1. Number vertices by depth-first preorder.
        let mut preorder = Vec::with_capacity(self.all_blocks.len());
        self.dfs(self.root, &mut lt, &mut preorder);
        let n = preorder.len();

        let mut buckets = preorder.clone();
        let mut idom: Vec<Option<BlockId>> = vec![None; len];

        // In reverse preorder...
        for i in (1..n).rev() {
            let w = preorder[i];

            // Step 3. Implicitly define the immediate dominator of the
            // vertices bucketed under w.
            let mut v = buckets[i];
            while v != w {
                let u = lt.eval(v);
                if lt.pre[lt.sdom[u.index()].unwrap().index()] < i as u32 {
                    idom[v.index()] = Some(u);
                } else {
                    idom[v.index()] = Some(w);
                }
                v = buckets[lt.pre[v.index()] as usize];
            }

            // Step 2. Compute the semidominator of w.
            lt.sdom[w.index()] = lt.parent[w.index()];
            for p in self.cfg.preds(w) {
                if lt.sdom[p.index()].is_none() {
                    // predecessor unreachable from the root
                    continue;
                }
                let u = lt.eval(p);
                if lt.pre[lt.sdom[u.index()].unwrap().index()]
                    < lt.pre[lt.sdom[w.index()].unwrap().index()]
                {
                    lt.sdom[w.index()] = lt.sdom[u.index()];
                }
            }

            let parent_w = lt.parent[w.index()];
            lt.link(parent_w, w);

            if parent_w == lt.sdom[w.index()] {
                idom[w.index()] = parent_w;
            } else {
                let b = lt.pre[lt.sdom[w.index()].unwrap().index()] as usize;
                buckets[i] = buckets[b];
                buckets[b] = w;
            }
        }

        // The final step 3, for the root's bucket.
        let mut v = buckets[0];
        while v != self.root {
            idom[v.index()] = Some(self.root);
            v = buckets[lt.pre[v.index()] as usize];
        }

        // Step 4. Explicitly define immediate dominators, in preorder,
        // and derive the children relation as the inverse of idom.
        let mut children: Vec<Vec<BlockId>> = vec![Vec::new(); len];
        for &w in preorder.iter().skip(1) {
            if idom[w.index()] != lt.sdom[w.index()] {
                idom[w.index()] = idom[idom[w.index()].unwrap().index()];
            }
            children[idom[w.index()].unwrap().index()].push(w);
        }

        for &b in &self.all_blocks {
            let block = self.cfg.get_mut(b);
            block.dom.idom = idom[b.index()];
            block.dom.children = std::mem::take(&mut children[b.index()]);
        }

        self.number_dom_tree(self.root, 0, 0);
    }

    /// Pre/post numbering of the dominator tree for O(1) dominance
    /// queries.
    fn number_dom_tree(&mut self, v: BlockId, mut pre: u32, mut post: u32) -> (u32, u32) {
        self.cfg.get_mut(v).dom.pre = pre;
        pre += 1;
        for child in self.cfg.get(v).dom.children.clone() {
            (pre, post) = self.number_dom_tree(child, pre, post);
        }
        self.cfg.get_mut(v).dom.post = post;
        post += 1;
        (pre, post)
    }

    /// Dominance frontier per block, Cytron et al.
    fn build_dom_frontier(&self) -> Vec<Vec<BlockId>> {
        let mut df = vec![Vec::new(); self.cfg.len()];
        self.df_build(self.root, &mut df);
        df
    }

    fn df_build(&self, u: BlockId, df: &mut Vec<Vec<BlockId>>) {
        // Encounter each node in postorder of the dom tree.
        for child in self.cfg.get(u).dom.children.clone() {
            self.df_build(child, df);
        }
        for v in self.cfg.succs(u) {
            if self.cfg.get(v).dom.idom != Some(u) {
                df_add(df, u, v);
            }
        }
        for w in self.cfg.get(u).dom.children.clone() {
            for v in df[w.index()].clone() {
                if self.cfg.get(v).dom.idom != Some(u) {
                    df_add(df, u, v);
                }
            }
        }
    }

    /// Place phi nodes for every variable at its iterated dominance
    /// frontier. Variables are visited in sorted order so phi layout is
    /// deterministic.
    fn place_phi(&mut self, df: &[Vec<BlockId>]) {
        let mut defsites: FxHashMap<Symbol, Vec<BlockId>> = FxHashMap::default();
        let mut origs: FxHashMap<BlockId, FxHashSet<Symbol>> = FxHashMap::default();
        for &b in &self.all_blocks {
            for instr in &self.cfg.get(b).instrs {
                let sites = defsites.entry(instr.ident).or_default();
                if sites.contains(&b) {
                    continue;
                }
                sites.push(b);
                origs.entry(b).or_default().insert(instr.ident);
            }
        }

        let mut idents: Vec<Symbol> = defsites.keys().copied().collect();
        idents.sort_by_key(|s| s.as_str());

        let mut placed: FxHashMap<BlockId, FxHashSet<Symbol>> = FxHashMap::default();
        for ident in idents {
            let mut worklist: VecDeque<BlockId> = defsites[&ident].iter().copied().collect();
            while let Some(n) = worklist.pop_front() {
                for &y in &df[n.index()] {
                    let here = placed.entry(y).or_default();
                    if here.contains(&ident) {
                        continue;
                    }
                    here.insert(ident);
                    let edges = vec![dangle_ident(); self.cfg.get(y).preds.len()];
                    let phi = Instr::new(
                        ident,
                        Value::Phi {
                            orig: ident,
                            tp: None,
                            edges,
                        },
                    );
                    let block = self.cfg.get_mut(y);
                    let pos = block
                        .instrs
                        .iter()
                        .position(|i| i.kind == InstrKind::Phi)
                        .unwrap_or(0);
                    block.instrs.insert(pos, phi);

                    if !origs.get(&y).is_some_and(|s| s.contains(&ident)) {
                        worklist.push_back(y);
                    }
                }
            }
        }
    }

    fn rename(&mut self, decl_table: &FxHashMap<Symbol, Type>) -> FxHashMap<Symbol, Type> {
        let mut renaming = Renaming {
            stack: FxHashMap::default(),
            index: 0,
            orig_decls: decl_table,
            decl_table: FxHashMap::default(),
        };

        for &param in &self.params.clone() {
            let symbol = renaming.push(param);
            if let Some(tp) = decl_table.get(&param) {
                renaming.decl_table.insert(symbol, tp.clone());
            }
            self.lift_params.push(symbol);
        }

        self.rename_block(self.root, &mut renaming);

        renaming.decl_table
    }

    fn rename_block(&mut self, block: BlockId, renaming: &mut Renaming<'_>) {
        let mut instrs = std::mem::take(&mut self.cfg.get_mut(block).instrs);
        for instr in &mut instrs {
            if instr.kind == InstrKind::Phi {
                renaming.push(instr.ident);
                instr.ident = renaming.stack_symbol(instr.ident);
            } else {
                rename_operands(&mut instr.val, renaming);
                renaming.push(instr.ident);
                instr.ident = renaming.stack_symbol(instr.ident);
            }
        }
        self.cfg.get_mut(block).instrs = instrs;

        // Feed this block's current versions into the phi edges of its
        // successors, at this block's predecessor slot.
        for dest in self.cfg.succs(block) {
            let has_phi = self
                .cfg
                .get(dest)
                .instrs
                .first()
                .is_some_and(|i| i.kind == InstrKind::Phi);
            if !has_phi {
                continue;
            }
            let pred_idx = self
                .cfg
                .get(dest)
                .preds
                .iter()
                .position(|&p| p == block)
                .unwrap_or(0);
            let dest_block = self.cfg.get_mut(dest);
            for instr in &mut dest_block.instrs {
                if instr.kind != InstrKind::Phi {
                    break;
                }
                if let Value::Phi { orig, tp, edges } = &mut instr.val {
                    let orig = *orig;
                    *tp = renaming.orig_decls.get(&orig).cloned();
                    edges[pred_idx] = renaming.stack_symbol(orig);
                }
            }
        }

        // The renaming context is copied down into dominator children,
        // not inherited back upward; only the version counter advances.
        for child in self.cfg.get(block).dom.children.clone() {
            let saved = renaming.stack.clone();
            self.rename_block(child, renaming);
            renaming.stack = saved;
        }
    }

    /// Drop self-copies and phis that merge fewer than two live edges.
    fn remove_ineffective(&mut self) {
        for &b in &self.all_blocks.clone() {
            let block = self.cfg.get_mut(b);
            block.instrs.retain(|instr| match &instr.val {
                Value::Ref { ident, .. } => instr.ident != *ident,
                Value::Phi { edges, .. } => {
                    edges.iter().filter(|e| !is_dangle(**e)).count() >= 2
                }
                _ => true,
            });
        }
    }
}

fn df_add(df: &mut [Vec<BlockId>], u: BlockId, v: BlockId) {
    if !df[u.index()].contains(&v) {
        df[u.index()].push(v);
    }
}

/// True if `a` dominates `b`, answered from the dom-tree numbering.
pub fn dominates(cfg: &Cfg, a: BlockId, b: BlockId) -> bool {
    let da = &cfg.get(a).dom;
    let db = &cfg.get(b).dom;
    da.pre <= db.pre && db.post <= da.post
}

/// Per-variable version stack used while renaming.
struct Renaming<'a> {
    stack: FxHashMap<Symbol, u32>,
    index: u32,
    orig_decls: &'a FxHashMap<Symbol, Type>,
    decl_table: FxHashMap<Symbol, Type>,
}

impl Renaming<'_> {
    fn push(&mut self, symbol: Symbol) -> Symbol {
        self.index += 1;
        self.stack.insert(symbol, self.index);
        gen_var_ident(self.index)
    }

    /// Current version of `symbol`. Names never defined on this path
    /// become the dangle sentinel; non-`$` names outside the stack are
    /// globals and stay as they are.
    fn stack_symbol(&mut self, symbol: Symbol) -> Symbol {
        if is_dangle(symbol) {
            return symbol;
        }
        if let Some(&i) = self.stack.get(&symbol) {
            let new_ident = gen_var_ident(i);
            if let Some(tp) = self.orig_decls.get(&symbol) {
                self.decl_table.insert(new_ident, tp.clone());
            }
            return new_ident;
        }
        if symbol.as_str().starts_with('$') {
            return dangle_ident();
        }
        symbol
    }
}

/// Rewrite every ident-holding operand field of a value.
fn rename_operands(val: &mut Value, renaming: &mut Renaming<'_>) {
    match val {
        Value::If { cond, .. } => {
            *cond = renaming.stack_symbol(*cond);
        }
        Value::Expr { args, .. }
        | Value::ArrMake { args, .. }
        | Value::RecLit { args, .. }
        | Value::StaticCall { args, .. }
        | Value::TraitCall { args, .. } => {
            for arg in args {
                *arg = renaming.stack_symbol(*arg);
            }
        }
        Value::Ref { ident, .. } => {
            *ident = renaming.stack_symbol(*ident);
        }
        Value::Ret { target, .. } => {
            if let Some(t) = target {
                *t = renaming.stack_symbol(*t);
            }
        }
        Value::ArrGet { arr, index, .. } => {
            *arr = renaming.stack_symbol(*arr);
            *index = renaming.stack_symbol(*index);
        }
        Value::ArrPut { arr, index, right } => {
            *arr = renaming.stack_symbol(*arr);
            *index = renaming.stack_symbol(*index);
            *right = renaming.stack_symbol(*right);
        }
        Value::RecAcs { target, .. }
        | Value::Discriminant { target, .. }
        | Value::Box { target, .. }
        | Value::BoxTrait { target, .. }
        | Value::Unbox { target, .. } => {
            *target = renaming.stack_symbol(*target);
        }
        Value::EnumVar { boxed, .. } => {
            if let Some(b) = boxed {
                *b = renaming.stack_symbol(*b);
            }
        }
        Value::Const { .. } | Value::Phi { .. } => {}
    }
}
