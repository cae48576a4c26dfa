//! AST -> CFG emission with type checking.
//!
//! The emitter keeps one block arena for the whole unit. Control flow
//! lowers to linked basic blocks; a construct that merges values (if,
//! match) reserves a result ident and appends a trailing copy at each
//! branch exit, giving SSA construction an assigned source in every
//! predecessor. Function bodies are lifted into SSA as soon as they are
//! complete; the root block is lifted last.

use corvac_ir::{BlockId, Cfg, DominatorMaker, FuncDef, Instr, Op, Value};
use corvac_par::ast::{self, BinOp, CasePattern, Expr, FuncDecl, TypeExpr};
use corvac_types::{
    check_app, check_mutate, check_rec_lit, compatible, has_type_var, subst_root, ArrType, Env,
    EnumType, FuncType, ImplBundle, RecType, TraitType, Type, TypeContext, TypeVar,
};
use corvac_util::{CompileError, ErrorCode, FxHashMap, Result, Symbol};
use indexmap::IndexMap;

/// An externally-provided global, visible read-only in every scope.
#[derive(Debug, Clone)]
pub struct GlobalDef {
    pub name: Symbol,
    pub tp: Type,
}

/// Emit a compilation unit into SSA IR.
pub fn emit_ir(module: &ast::Module) -> Result<corvac_ir::Module> {
    emit_ir_with_globals(module, &[])
}

/// Emit with pre-seeded globals.
pub fn emit_ir_with_globals(
    module: &ast::Module,
    globals: &[GlobalDef],
) -> Result<corvac_ir::Module> {
    let mut e = Emitter::new();
    for g in globals {
        e.env.set_def(g.name, g.tp.clone());
        e.globals.insert(g.name, g.name);
    }

    for decl in &module.type_decls {
        let mut tp = e.emit_type(&decl.tp)?;
        if let Some(impls) = tp.impls_mut() {
            impls.prefix = Some(decl.ident);
        }
        e.env.set_type(decl.ident, tp);
    }

    let root = e.cur;
    for node in &module.root {
        e.emit_insn(node)?;
    }
    if e.cfg.get(root).instrs.is_empty() {
        e.rval(Value::const_unit(), Type::Unit);
    }
    e.insert_ret(root, None)?;

    let mut maker = DominatorMaker::new(&mut e.cfg, root, Vec::new());
    let lifted = maker.lift(&e.env.defs);
    e.env.defs.extend(lifted);

    Ok(corvac_ir::Module {
        cfg: e.cfg,
        root,
        funcs: e.funcs,
        env: e.env,
    })
}

/// Result of emitting one AST node: the defining ident and its type.
#[derive(Debug, Clone)]
struct EmitRes {
    ident: Symbol,
    tp: Type,
}

struct Emitter {
    ctx: TypeContext,
    count: u32,
    env: Env,
    /// Globals and function names, read-only in every frame
    globals: FxHashMap<Symbol, Symbol>,
    /// Scope stack of the current frame: source name -> current ident
    scopes: Vec<FxHashMap<Symbol, Symbol>>,
    /// Saved scope stacks of enclosing frames
    frames: Vec<Vec<FxHashMap<Symbol, Symbol>>>,
    /// Type variables in scope while emitting a generic declaration
    tp_vars: Vec<FxHashMap<Symbol, TypeVar>>,
    /// Set while emitting a trait type expression, for diagnostics
    in_trait_decl: bool,
    cfg: Cfg,
    cur: BlockId,
    funcs: Vec<FuncDef>,
}

impl Emitter {
    fn new() -> Self {
        let mut cfg = Cfg::new();
        let cur = cfg.block("root");
        Self {
            ctx: TypeContext::new(),
            count: 0,
            env: Env::new(),
            globals: FxHashMap::default(),
            scopes: vec![FxHashMap::default()],
            frames: Vec::new(),
            tp_vars: Vec::new(),
            in_trait_decl: false,
            cfg,
            cur,
            funcs: Vec::new(),
        }
    }

    fn gen_id(&mut self) -> Symbol {
        self.count += 1;
        Symbol::intern(&format!("$v{}", self.count))
    }

    fn instr(&mut self, ident: Symbol, val: Value, tp: Type) -> EmitRes {
        self.env.set_def(ident, tp.clone());
        self.cfg.push_instr(self.cur, Instr::new(ident, val));
        EmitRes { ident, tp }
    }

    fn rval(&mut self, val: Value, tp: Type) -> EmitRes {
        let ident = self.gen_id();
        self.instr(ident, val, tp)
    }

    fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn resolve(&self, name: Symbol) -> Option<Symbol> {
        for scope in self.scopes.iter().rev() {
            if let Some(&ident) = scope.get(&name) {
                return Some(ident);
            }
        }
        self.globals.get(&name).copied()
    }

    fn declare(&mut self, name: Symbol, ident: Symbol) -> Result<()> {
        let scope = self.scopes.last_mut().expect("scope stack empty");
        if scope.contains_key(&name) {
            return Err(CompileError::new(
                ErrorCode::TypeRedeclaration,
                format!("re-declaration of {}", name),
            ));
        }
        scope.insert(name, ident);
        Ok(())
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn emit_insn(&mut self, node: &Expr) -> Result<EmitRes> {
        match node {
            Expr::Unit => Ok(self.rval(Value::const_unit(), Type::Unit)),
            Expr::Int(v) => Ok(self.rval(Value::const_int(*v), Type::Int)),
            Expr::Float(v) => Ok(self.rval(Value::const_float(*v), Type::Float)),
            Expr::Bool(v) => Ok(self.rval(Value::const_bool(*v), Type::Bool)),
            Expr::VarRef(name) => self.emit_var_ref(*name),
            Expr::BinOp { op, left, right } => self.emit_binop(*op, left, right),
            Expr::Let { sym, tp, bound } => self.emit_let(*sym, tp.as_ref(), bound),
            Expr::Mutate { sym, right } => self.emit_mutate(*sym, right),
            Expr::LetRec(decl) => self.emit_fun(decl),
            Expr::If {
                cond,
                then_body,
                else_body,
            } => self.emit_if(cond, then_body, else_body),
            Expr::Loop { it, from, to, body } => self.emit_loop(*it, from, to, body),
            Expr::Match { target, cases } => self.emit_match(target, cases),
            Expr::ArrayLit { ele, elems } => self.emit_arr_lit(ele, elems),
            Expr::ArrayGet { array, index } => self.emit_arr_get(array, index),
            Expr::ArrayPut {
                array,
                index,
                right,
            } => self.emit_arr_put(array, index, right),
            Expr::RecLit {
                name,
                tp_args,
                keys,
                vals,
            } => self.emit_rec_lit(*name, tp_args, keys, vals),
            Expr::DotAcs {
                target,
                field,
                args,
            } => self.emit_dot_acs(target, *field, args.as_deref()),
            Expr::Apply {
                callee,
                tp_args,
                args,
            } => self.emit_apply(callee, tp_args, args),
        }
    }

    fn emit_var_ref(&mut self, name: Symbol) -> Result<EmitRes> {
        let ident = self
            .resolve(name)
            .ok_or_else(|| CompileError::internal(format!("undefined identifier: {}", name)))?;
        let tp = self.env.def(ident)?.clone();
        Ok(self.rval(
            Value::Ref {
                tp: tp.clone(),
                ident,
            },
            tp,
        ))
    }

    fn emit_binop(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<EmitRes> {
        let l = self.emit_insn(left)?;
        let r = self.emit_insn(right)?;
        let (op, tp) = match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                compatible(&l.tp, &r.tp)?;
                self.check_numeric(&l.tp)?;
                self.check_numeric(&r.tp)?;
                (arith_op(op), l.tp.clone())
            }
            BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte | BinOp::Eq | BinOp::Neq => {
                compatible(&l.tp, &r.tp)?;
                (arith_op(op), Type::Bool)
            }
            BinOp::And | BinOp::Or => {
                compatible(&Type::Bool, &l.tp)?;
                compatible(&Type::Bool, &r.tp)?;
                (arith_op(op), Type::Bool)
            }
        };
        Ok(self.rval(Value::binary(op, l.ident, r.ident, tp.clone()), tp))
    }

    fn check_numeric(&self, tp: &Type) -> Result<()> {
        if tp.is_numeric() || matches!(tp, Type::Enum(e) if e.simple) {
            Ok(())
        } else {
            Err(CompileError::new(
                ErrorCode::TypeIncompatiblePrimitive,
                format!("operand of type {} is not numeric", tp),
            ))
        }
    }

    fn emit_let(&mut self, sym: Symbol, tp: Option<&TypeExpr>, bound: &Expr) -> Result<EmitRes> {
        let bound = self.emit_insn(bound)?;
        let mut res = bound;
        if let Some(texpr) = tp {
            let declared = self.emit_type(texpr)?;
            compatible(&declared, &res.tp)?;
            if let Type::Trait(dt) = &declared {
                let already = matches!(&res.tp, Type::Trait(rt) if rt.uid == dt.uid);
                if !already {
                    res = self.rval(
                        Value::BoxTrait {
                            target: res.ident,
                            trait_tp: declared.clone(),
                        },
                        declared.clone(),
                    );
                }
            }
        }
        self.declare(sym, res.ident)?;
        Ok(res)
    }

    fn emit_mutate(&mut self, sym: Symbol, right: &Expr) -> Result<EmitRes> {
        let ident = self
            .resolve(sym)
            .ok_or_else(|| CompileError::internal(format!("undefined identifier: {}", sym)))?;
        let tp = self.env.def(ident)?.clone();
        let r = self.emit_insn(right)?;
        check_mutate(&tp, &r.tp)?;
        Ok(self.instr(
            ident,
            Value::Ref {
                tp: tp.clone(),
                ident: r.ident,
            },
            tp,
        ))
    }

    /// Append a trailing copy of `res` under `ident` at the current
    /// block's exit, so SSA renaming sees a definition of `ident` in
    /// this predecessor of the join block.
    fn mutate_ident_end_of_block(&mut self, ident: Symbol, res: &EmitRes) {
        self.instr(
            ident,
            Value::Ref {
                tp: res.tp.clone(),
                ident: res.ident,
            },
            res.tp.clone(),
        );
    }

    fn emit_body(&mut self, stmts: &[Expr]) -> Result<EmitRes> {
        let mut last = None;
        for stmt in stmts {
            last = Some(self.emit_insn(stmt)?);
        }
        match last {
            Some(res) => Ok(res),
            None => Ok(self.rval(Value::const_unit(), Type::Unit)),
        }
    }

    fn emit_if(&mut self, cond: &Expr, then_body: &[Expr], else_body: &[Expr]) -> Result<EmitRes> {
        let cond = self.emit_insn(cond)?;
        compatible(&Type::Bool, &cond.tp)?;

        let then_blk = self.cfg.block("then");
        let else_blk = self.cfg.block("else");
        let if_id = self.gen_id();
        self.instr(
            if_id,
            Value::If {
                cond: cond.ident,
                then_blk,
                else_blk,
            },
            Type::Unit,
        );
        self.cfg.link(self.cur, then_blk);
        self.cfg.link(self.cur, else_blk);

        let result_ident = self.gen_id();

        self.push_scope();
        self.cur = then_blk;
        let then_res = self.emit_body(then_body)?;
        self.mutate_ident_end_of_block(result_ident, &then_res);
        let then_exit = self.cur;
        self.pop_scope();

        self.push_scope();
        self.cur = else_blk;
        let else_res = self.emit_body(else_body)?;
        compatible(&then_res.tp, &else_res.tp)?;
        self.mutate_ident_end_of_block(result_ident, &else_res);
        let else_exit = self.cur;
        self.pop_scope();

        let after = self.cfg.block("after");
        self.cfg.link(then_exit, after);
        self.cfg.link(else_exit, after);
        self.cur = after;
        let tp = then_res.tp;
        Ok(self.rval(
            Value::Ref {
                tp: tp.clone(),
                ident: result_ident,
            },
            tp,
        ))
    }

    fn emit_loop(&mut self, it: Symbol, from: &Expr, to: &Expr, body: &[Expr]) -> Result<EmitRes> {
        self.push_scope();
        let from = self.emit_insn(from)?;
        let it_ident = match self.resolve(it) {
            Some(ident) => ident,
            None => {
                let ident = self.gen_id();
                self.env.set_def(ident, from.tp.clone());
                self.declare(it, ident)?;
                ident
            }
        };
        let it_tp = self.env.def(it_ident)?.clone();
        compatible(&it_tp, &from.tp)?;
        self.instr(
            it_ident,
            Value::Ref {
                tp: from.tp.clone(),
                ident: from.ident,
            },
            it_tp.clone(),
        );

        let start = self.cfg.block("start");
        self.cfg.link(self.cur, start);
        self.cur = start;
        let to = self.emit_insn(to)?;
        compatible(&it_tp, &to.tp)?;
        // the upper bound is inclusive: `for a = 0 .. 3` runs a = 0..=3
        let cond = self.rval(
            Value::binary(Op::Lte, it_ident, to.ident, Type::Bool),
            Type::Bool,
        );

        let body_blk = self.cfg.block("body");
        let after = self.cfg.block("after");
        let if_id = self.gen_id();
        self.instr(
            if_id,
            Value::If {
                cond: cond.ident,
                then_blk: body_blk,
                else_blk: after,
            },
            Type::Unit,
        );
        // the bound expression may have opened further blocks; branch
        // from wherever the condition landed
        let cond_exit = self.cur;
        self.cfg.link(cond_exit, body_blk);
        self.cfg.link(cond_exit, after);

        self.cur = body_blk;
        self.push_scope();
        self.emit_body(body)?;
        self.pop_scope();
        // increment the iteration variable and loop back
        let one = self.rval(Value::const_int(1), Type::Int);
        let inc = self.rval(
            Value::binary(Op::Add, it_ident, one.ident, it_tp.clone()),
            it_tp.clone(),
        );
        self.instr(
            it_ident,
            Value::Ref {
                tp: it_tp.clone(),
                ident: inc.ident,
            },
            it_tp,
        );
        self.cfg.link(self.cur, start);

        self.cur = after;
        self.pop_scope();
        Ok(self.rval(Value::const_unit(), Type::Unit))
    }

    fn emit_match(&mut self, target: &Expr, cases: &[ast::MatchCase]) -> Result<EmitRes> {
        let target = self.emit_insn(target)?;
        let etp = match &target.tp {
            Type::Enum(e) => e.clone(),
            other => {
                return Err(CompileError::new(
                    ErrorCode::TypeEnumUndefined,
                    format!("match target of type {} is not an enum", other),
                ))
            }
        };

        // the default arm must exist and come last
        for (i, case) in cases.iter().enumerate() {
            let is_default = matches!(case.pattern, CasePattern::Default);
            let is_last = i + 1 == cases.len();
            if is_default && !is_last {
                return Err(CompileError::new(
                    ErrorCode::TypeEnumOtherIllegal,
                    "default case must be the last case of a match",
                ));
            }
            if !is_default && is_last {
                return Err(CompileError::new(
                    ErrorCode::TypeEnumOtherIllegal,
                    "match is missing a default `_` case",
                ));
            }
        }
        if cases.is_empty() {
            return Err(CompileError::new(
                ErrorCode::TypeEnumOtherIllegal,
                "match is missing a default `_` case",
            ));
        }

        let disc = self.rval(
            Value::Discriminant {
                target: target.ident,
                simple: etp.simple,
            },
            Type::Int,
        );
        let result_ident = self.gen_id();
        let mut exits = Vec::new();
        let mut result_tp: Option<Type> = None;

        for case in cases {
            match &case.pattern {
                CasePattern::Variant {
                    enum_name,
                    token,
                    binds,
                } => {
                    match self.env.get_type(*enum_name) {
                        Some(Type::Enum(de)) if de.uid == etp.uid => {}
                        _ => {
                            return Err(CompileError::new(
                                ErrorCode::TypeEnumUndefined,
                                format!("{} does not name the matched enum", enum_name),
                            ))
                        }
                    }
                    let idx = etp.key_index(*token).ok_or_else(|| {
                        CompileError::new(
                            ErrorCode::TypeEnumEleUndefined,
                            format!("enum variant {} not declared", token),
                        )
                    })?;
                    let payload_tp = etp.variants[idx].clone();
                    if !binds.is_empty() && payload_tp == Type::Unit {
                        return Err(CompileError::new(
                            ErrorCode::TypeEnumDestructIllegal,
                            format!("variant {} carries no payload to destructure", token),
                        ));
                    }

                    let tag = self.rval(Value::const_int(idx as i64), Type::Int);
                    let cmp = self.rval(
                        Value::binary(Op::Eq, disc.ident, tag.ident, Type::Bool),
                        Type::Bool,
                    );
                    let case_blk = self.cfg.block("case");
                    let next_blk = self.cfg.block("case_next");
                    let if_id = self.gen_id();
                    self.instr(
                        if_id,
                        Value::If {
                            cond: cmp.ident,
                            then_blk: case_blk,
                            else_blk: next_blk,
                        },
                        Type::Unit,
                    );
                    self.cfg.link(self.cur, case_blk);
                    self.cfg.link(self.cur, next_blk);

                    self.push_scope();
                    self.cur = case_blk;
                    if !binds.is_empty() {
                        self.emit_case_binds(&target, &payload_tp, binds)?;
                    }
                    let res = self.emit_body(&case.body)?;
                    match &result_tp {
                        Some(tp) => compatible(tp, &res.tp)?,
                        None => result_tp = Some(res.tp.clone()),
                    }
                    self.mutate_ident_end_of_block(result_ident, &res);
                    exits.push(self.cur);
                    self.pop_scope();

                    self.cur = next_blk;
                }
                CasePattern::Default => {
                    // lands in the chain's trailing block
                    self.push_scope();
                    let res = self.emit_body(&case.body)?;
                    match &result_tp {
                        Some(tp) => compatible(tp, &res.tp)?,
                        None => result_tp = Some(res.tp.clone()),
                    }
                    self.mutate_ident_end_of_block(result_ident, &res);
                    exits.push(self.cur);
                    self.pop_scope();
                }
            }
        }

        let after = self.cfg.block("after");
        for exit in exits {
            self.cfg.link(exit, after);
        }
        self.cur = after;
        let tp = result_tp.expect("match has at least the default case");
        Ok(self.rval(
            Value::Ref {
                tp: tp.clone(),
                ident: result_ident,
            },
            tp,
        ))
    }

    /// Destructure a payload-carrying variant: load the boxed payload
    /// from slot 1, unbox it, and bind the case names.
    fn emit_case_binds(
        &mut self,
        target: &EmitRes,
        payload_tp: &Type,
        binds: &[Symbol],
    ) -> Result<()> {
        let slot = self.rval(
            Value::RecAcs {
                tp: Type::VoidPtr,
                target: target.ident,
                idx: 1,
            },
            Type::VoidPtr,
        );
        let unboxed = self.rval(
            Value::Unbox {
                target: slot.ident,
                tp: payload_tp.clone(),
                box_tp: Type::VoidPtr,
            },
            payload_tp.clone(),
        );
        if binds.len() == 1 {
            self.declare(binds[0], unboxed.ident)?;
            return Ok(());
        }
        let rec = match payload_tp {
            Type::Rec(r) if r.mem_tps.len() >= binds.len() => r.clone(),
            _ => {
                return Err(CompileError::new(
                    ErrorCode::TypeEnumDestructIllegal,
                    format!("variant payload {} has no {} members", payload_tp, binds.len()),
                ))
            }
        };
        for (j, bind) in binds.iter().enumerate() {
            let member = self.rval(
                Value::RecAcs {
                    tp: rec.mem_tps[j].clone(),
                    target: unboxed.ident,
                    idx: j,
                },
                rec.mem_tps[j].clone(),
            );
            self.declare(*bind, member.ident)?;
        }
        Ok(())
    }

    fn emit_arr_lit(&mut self, ele: &TypeExpr, elems: &[Expr]) -> Result<EmitRes> {
        let ele_tp = self.emit_type(ele)?;
        let mut args = Vec::with_capacity(elems.len());
        for elem in elems {
            let res = self.emit_insn(elem)?;
            compatible(&ele_tp, &res.tp)?;
            args.push(res.ident);
        }
        let tp = Type::Arr(ArrType {
            ele: Box::new(ele_tp.clone()),
            size: args.len(),
        });
        Ok(self.rval(Value::ArrMake { ele: ele_tp, args }, tp))
    }

    fn emit_arr_get(&mut self, array: &Expr, index: &Expr) -> Result<EmitRes> {
        let arr = self.emit_insn(array)?;
        let idx = self.emit_insn(index)?;
        compatible(&Type::Int, &idx.tp)?;
        let ele_tp = match &arr.tp {
            Type::Arr(a) => (*a.ele).clone(),
            other => {
                return Err(CompileError::internal(format!(
                    "subscript of non-array type {}",
                    other
                )))
            }
        };
        Ok(self.rval(
            Value::ArrGet {
                tp: ele_tp.clone(),
                arr: arr.ident,
                index: idx.ident,
            },
            ele_tp,
        ))
    }

    fn emit_arr_put(&mut self, array: &Expr, index: &Expr, right: &Expr) -> Result<EmitRes> {
        let arr = self.emit_insn(array)?;
        let idx = self.emit_insn(index)?;
        compatible(&Type::Int, &idx.tp)?;
        let r = self.emit_insn(right)?;
        if let Type::Arr(a) = &arr.tp {
            compatible(&a.ele, &r.tp)?;
        }
        Ok(self.rval(
            Value::ArrPut {
                arr: arr.ident,
                index: idx.ident,
                right: r.ident,
            },
            Type::Unit,
        ))
    }

    fn emit_rec_lit(
        &mut self,
        name: Symbol,
        tp_args: &[TypeExpr],
        keys: &[Symbol],
        vals: &[Expr],
    ) -> Result<EmitRes> {
        let rec = match self.env.get_type(name) {
            Some(Type::Rec(r)) => r.clone(),
            _ => {
                return Err(CompileError::internal(format!(
                    "undefined record type: {}",
                    name
                )))
            }
        };
        for key in keys {
            if rec.key_index(*key).is_none() {
                return Err(CompileError::new(
                    ErrorCode::TypeRecordKeyNotFound,
                    format!("record {} has no key {}", name, key),
                ));
            }
        }

        // evaluate in source order, then order members by declaration
        let mut provided: IndexMap<Symbol, EmitRes> = IndexMap::new();
        for (key, val) in keys.iter().zip(vals) {
            let res = self.emit_insn(val)?;
            provided.insert(*key, res);
        }
        let mut ordered = Vec::with_capacity(rec.keys.len());
        for key in &rec.keys {
            let res = provided.get(key).ok_or_else(|| {
                CompileError::new(
                    ErrorCode::TypeRecordNotFulfilled,
                    format!("record literal for {} is missing key {}", name, key),
                )
            })?;
            ordered.push(res.clone());
        }

        let mut tp_arg_tps = Vec::with_capacity(tp_args.len());
        for texpr in tp_args {
            tp_arg_tps.push(self.emit_type(texpr)?);
        }
        if !rec.tp_vars.is_empty() && tp_arg_tps.is_empty() {
            let mut bindings = IndexMap::new();
            for (mem, res) in rec.mem_tps.iter().zip(&ordered) {
                unify(mem, &res.tp, &mut bindings);
            }
            tp_arg_tps = self.bound_args(&rec.tp_vars, &bindings)?;
        }

        let arg_tps: Vec<Type> = ordered.iter().map(|r| r.tp.clone()).collect();
        let substituted = check_rec_lit(&rec, &tp_arg_tps, &arg_tps)?;

        // members declared as a bare type variable live in boxed slots
        let mut args = Vec::with_capacity(ordered.len());
        for (i, res) in ordered.iter().enumerate() {
            if matches!(rec.mem_tps[i], Type::Var(_)) {
                let boxed = self.rval(
                    Value::Box {
                        target: res.ident,
                        tp: res.tp.clone(),
                        box_tp: Type::VoidPtr,
                    },
                    Type::VoidPtr,
                );
                args.push(boxed.ident);
            } else {
                args.push(res.ident);
            }
        }

        let tp = Type::Rec(substituted);
        Ok(self.rval(
            Value::RecLit {
                tp: tp.clone(),
                args,
            },
            tp,
        ))
    }

    fn emit_dot_acs(
        &mut self,
        target: &Expr,
        field: Symbol,
        args: Option<&[Expr]>,
    ) -> Result<EmitRes> {
        // a dot on a type name is an enum variant constructor
        if let Expr::VarRef(name) = target {
            if self.resolve(*name).is_none() {
                if let Some(tp) = self.env.get_type(*name).cloned() {
                    return match tp {
                        Type::Enum(e) => self.emit_enum_var(e, field, args),
                        other => Err(CompileError::new(
                            ErrorCode::TypeEnumUndefined,
                            format!("{} of type {} is not an enum", name, other),
                        )),
                    };
                }
            }
        }

        let target = self.emit_insn(target)?;
        match target.tp.clone() {
            Type::Rec(rec) => self.emit_rec_acs(&target, &rec, field, args),
            Type::Trait(tr) => self.emit_trait_call(&target, &tr, field, args),
            Type::Var(tv) => match tv.lower.as_deref() {
                Some(Type::Trait(tr)) => {
                    let tr = tr.clone();
                    self.emit_trait_call(&target, &tr, field, args)
                }
                _ => Err(CompileError::new(
                    ErrorCode::TypeTraitAcsIllegal,
                    format!("type variable '{} has no trait bound to call into", tv.name),
                )),
            },
            Type::Enum(e) => {
                if field.as_str() == "discriminant" && args.is_none() {
                    return Ok(self.rval(
                        Value::Discriminant {
                            target: target.ident,
                            simple: e.simple,
                        },
                        Type::Int,
                    ));
                }
                if let Some(method) = e.impls.fns.get(&field).cloned() {
                    let mangled = e.impls.mangle(field);
                    return self.emit_method_call(&target, mangled, &method, args);
                }
                Err(CompileError::new(
                    ErrorCode::TypeEnumEleIllegal,
                    format!("illegal access {} on enum value", field),
                ))
            }
            other => Err(CompileError::new(
                ErrorCode::TypeRecordAcsIllegal,
                format!("cannot access {} on value of type {}", field, other),
            )),
        }
    }

    fn emit_rec_acs(
        &mut self,
        target: &EmitRes,
        rec: &RecType,
        field: Symbol,
        args: Option<&[Expr]>,
    ) -> Result<EmitRes> {
        if args.is_none() {
            if let Some(idx) = rec.key_index(field) {
                let tp = rec.mem_tps[idx].clone();
                return Ok(self.rval(
                    Value::RecAcs {
                        tp: tp.clone(),
                        target: target.ident,
                        idx,
                    },
                    tp,
                ));
            }
        }
        if let Some(method) = rec.impls.fns.get(&field).cloned() {
            let mangled = rec.impls.mangle(field);
            return self.emit_method_call(target, mangled, &method, args);
        }
        Err(CompileError::new(
            ErrorCode::TypeRecordAcsIllegal,
            format!("record has no member or method {}", field),
        ))
    }

    /// A method call lowers to a static call of the mangled name with
    /// the receiver prepended.
    fn emit_method_call(
        &mut self,
        target: &EmitRes,
        mangled: Symbol,
        method: &FuncType,
        args: Option<&[Expr]>,
    ) -> Result<EmitRes> {
        let args = args.unwrap_or(&[]);
        let mut arg_res = vec![target.clone()];
        for arg in args {
            arg_res.push(self.emit_insn(arg)?);
        }
        let arg_tps: Vec<Type> = arg_res.iter().map(|r| r.tp.clone()).collect();
        let substituted = check_app(method, &[], &arg_tps)?;
        let idents: Vec<Symbol> = arg_res.iter().map(|r| r.ident).collect();
        let ret = (*substituted.ret).clone();
        Ok(self.rval(
            Value::StaticCall {
                name: mangled,
                tp: ret.clone(),
                args: idents,
            },
            ret,
        ))
    }

    /// A call through a trait value: indirect through the vtable slot,
    /// with the receiver replaced by the trait object's data.
    fn emit_trait_call(
        &mut self,
        target: &EmitRes,
        tr: &TraitType,
        field: Symbol,
        args: Option<&[Expr]>,
    ) -> Result<EmitRes> {
        let idx = tr.key_index(field).ok_or_else(|| {
            CompileError::new(
                ErrorCode::TypeTraitAcsIllegal,
                format!("trait {} has no function {}", Type::Trait(tr.skeleton()), field),
            )
        })?;
        let sig = tr.fns[idx].clone();
        let args = args.unwrap_or(&[]);
        if args.len() + 1 != sig.params.len() {
            return Err(CompileError::new(
                ErrorCode::TypeParamCountWrong,
                format!(
                    "trait function {} expects {} arguments, {} given",
                    field,
                    sig.params.len() - 1,
                    args.len() + 1
                ),
            ));
        }
        let mut idents = vec![target.ident];
        for (arg, param) in args.iter().zip(sig.params.iter().skip(1)) {
            let res = self.emit_insn(arg)?;
            compatible(param, &res.tp)?;
            idents.push(res.ident);
        }
        let ret = (*sig.ret).clone();
        Ok(self.rval(
            Value::TraitCall {
                name: field,
                trait_tp: Type::Trait(tr.clone()),
                tp: ret.clone(),
                args: idents,
            },
            ret,
        ))
    }

    fn emit_enum_var(
        &mut self,
        etp: EnumType,
        field: Symbol,
        args: Option<&[Expr]>,
    ) -> Result<EmitRes> {
        let idx = etp.key_index(field).ok_or_else(|| {
            CompileError::new(
                ErrorCode::TypeEnumEleUndefined,
                format!("enum variant {} not declared", field),
            )
        })?;
        let declared_payload = etp.variants[idx].clone();
        match args {
            None | Some([]) => {
                if declared_payload != Type::Unit {
                    return Err(CompileError::new(
                        ErrorCode::TypeEnumEleIllegal,
                        format!("variant {} requires a payload", field),
                    ));
                }
                if !etp.tp_vars.is_empty() {
                    return Err(CompileError::new(
                        ErrorCode::TypeSubstituteCountMismatch,
                        format!("cannot infer type arguments for bare variant {}", field),
                    ));
                }
                let tp = Type::Enum(etp);
                Ok(self.rval(
                    Value::EnumVar {
                        tp: tp.clone(),
                        idx,
                        boxed: None,
                    },
                    tp,
                ))
            }
            Some(args) => {
                if declared_payload == Type::Unit {
                    return Err(CompileError::new(
                        ErrorCode::TypeEnumEleIllegal,
                        format!("variant {} carries no payload", field),
                    ));
                }
                if args.len() != 1 {
                    return Err(CompileError::new(
                        ErrorCode::TypeEnumEleIllegal,
                        format!("variant {} takes exactly one payload", field),
                    ));
                }
                let payload = self.emit_insn(&args[0])?;

                let substituted = if etp.tp_vars.is_empty() {
                    etp
                } else {
                    let mut bindings = IndexMap::new();
                    unify(&declared_payload, &payload.tp, &mut bindings);
                    let tp_args = self.bound_args(&etp.tp_vars, &bindings)?;
                    match subst_root(&Type::Enum(etp), &tp_args)? {
                        Type::Enum(e) => e,
                        _ => return Err(CompileError::internal("enum substitution changed kind")),
                    }
                };
                compatible(&substituted.variants[idx], &payload.tp)?;

                let boxed = self.rval(
                    Value::Box {
                        target: payload.ident,
                        tp: payload.tp.clone(),
                        box_tp: Type::VoidPtr,
                    },
                    Type::VoidPtr,
                );
                let tp = Type::Enum(substituted);
                Ok(self.rval(
                    Value::EnumVar {
                        tp: tp.clone(),
                        idx,
                        boxed: Some(boxed.ident),
                    },
                    tp,
                ))
            }
        }
    }

    fn emit_apply(
        &mut self,
        callee: &Expr,
        tp_args: &[TypeExpr],
        args: &[Expr],
    ) -> Result<EmitRes> {
        let name = match callee {
            Expr::VarRef(name) => *name,
            _ => return Err(CompileError::internal("callee must be a named function")),
        };
        let ident = self
            .resolve(name)
            .ok_or_else(|| CompileError::internal(format!("function not declared: {}", name)))?;
        let ftp = match self.env.def(ident)? {
            Type::Func(f) => f.clone(),
            other => {
                return Err(CompileError::internal(format!(
                    "{} of type {} is not callable",
                    name, other
                )))
            }
        };

        let mut arg_res = Vec::with_capacity(args.len());
        for arg in args {
            arg_res.push(self.emit_insn(arg)?);
        }
        let arg_tps: Vec<Type> = arg_res.iter().map(|r| r.tp.clone()).collect();

        let mut tp_arg_tps = Vec::with_capacity(tp_args.len());
        for texpr in tp_args {
            tp_arg_tps.push(self.emit_type(texpr)?);
        }
        if !ftp.tp_vars.is_empty() && tp_arg_tps.is_empty() {
            // infer type arguments from the argument types
            let mut bindings = IndexMap::new();
            for (param, arg) in ftp.params.iter().zip(&arg_tps) {
                unify(param, arg, &mut bindings);
            }
            tp_arg_tps = self.bound_args(&ftp.tp_vars, &bindings)?;
        }

        let substituted = check_app(&ftp, &tp_arg_tps, &arg_tps)?;

        // boxing at the call boundary: trait parameters take trait
        // objects, type-variable parameters take boxed slots
        let mut idents = Vec::with_capacity(arg_res.len());
        for (i, res) in arg_res.iter().enumerate() {
            let declared = &ftp.params[i];
            let boxed_ident = match declared {
                Type::Trait(dt) => {
                    let already = matches!(&res.tp, Type::Trait(rt) if rt.uid == dt.uid);
                    if already {
                        res.ident
                    } else {
                        self.rval(
                            Value::BoxTrait {
                                target: res.ident,
                                trait_tp: declared.clone(),
                            },
                            declared.clone(),
                        )
                        .ident
                    }
                }
                Type::Var(tv) => match tv.lower.as_deref() {
                    Some(bound @ Type::Trait(bt)) => {
                        let already = matches!(&res.tp, Type::Trait(rt) if rt.uid == bt.uid);
                        if already {
                            res.ident
                        } else {
                            self.rval(
                                Value::BoxTrait {
                                    target: res.ident,
                                    trait_tp: bound.clone(),
                                },
                                bound.clone(),
                            )
                            .ident
                        }
                    }
                    _ => {
                        self.rval(
                            Value::Box {
                                target: res.ident,
                                tp: res.tp.clone(),
                                box_tp: substituted.params[i].clone(),
                            },
                            Type::VoidPtr,
                        )
                        .ident
                    }
                },
                _ if has_type_var(declared) => {
                    self.rval(
                        Value::Box {
                            target: res.ident,
                            tp: res.tp.clone(),
                            box_tp: substituted.params[i].clone(),
                        },
                        Type::VoidPtr,
                    )
                    .ident
                }
                _ => res.ident,
            };
            idents.push(boxed_ident);
        }

        let ret = (*substituted.ret).clone();
        if has_type_var(&ftp.ret) {
            // polymorphic return comes back boxed
            let call = self.rval(
                Value::StaticCall {
                    name: ident,
                    tp: Type::VoidPtr,
                    args: idents,
                },
                Type::VoidPtr,
            );
            Ok(self.rval(
                Value::Unbox {
                    target: call.ident,
                    tp: ret.clone(),
                    box_tp: Type::VoidPtr,
                },
                ret,
            ))
        } else {
            Ok(self.rval(
                Value::StaticCall {
                    name: ident,
                    tp: ret.clone(),
                    args: idents,
                },
                ret,
            ))
        }
    }

    fn bound_args(
        &self,
        tp_vars: &[TypeVar],
        bindings: &IndexMap<Symbol, Type>,
    ) -> Result<Vec<Type>> {
        tp_vars
            .iter()
            .map(|tv| {
                bindings.get(&tv.name).cloned().ok_or_else(|| {
                    CompileError::new(
                        ErrorCode::TypeSubstituteCountMismatch,
                        format!("cannot infer type argument for '{}", tv.name),
                    )
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // functions
    // ------------------------------------------------------------------

    fn emit_fun(&mut self, decl: &FuncDecl) -> Result<EmitRes> {
        let mut tp_var_scope = FxHashMap::default();
        let mut tvs = Vec::with_capacity(decl.tp_vars.len());
        for tvd in &decl.tp_vars {
            let tv = match tvd.bound {
                Some(bound_name) => {
                    let bound = self.env.get_type(bound_name).cloned().ok_or_else(|| {
                        CompileError::new(
                            ErrorCode::TypeTraitTypeVarUndefined,
                            format!("trait bound {} not declared", bound_name),
                        )
                    })?;
                    if !matches!(bound, Type::Trait(_)) {
                        return Err(CompileError::new(
                            ErrorCode::TypeTraitTypeVarUndefined,
                            format!("bound {} is not a trait", bound_name),
                        ));
                    }
                    TypeVar::bounded(tvd.name, bound)
                }
                None => TypeVar::new(tvd.name),
            };
            tp_var_scope.insert(tvd.name, tv.clone());
            tvs.push(tv);
        }
        self.tp_vars.push(tp_var_scope);

        let mut param_tps = Vec::with_capacity(decl.params.len());
        for (_, texpr) in &decl.params {
            param_tps.push(self.emit_type(texpr)?);
        }
        let ret_tp = self.emit_type(&decl.ret)?;

        // a receiver, if any, is the first parameter and is named self
        for (i, (pname, _)) in decl.params.iter().enumerate() {
            if pname.as_str() == "self" && i != 0 {
                self.tp_vars.pop();
                return Err(CompileError::new(
                    ErrorCode::TypeMethodIllegal,
                    "receiver must be the first parameter",
                ));
            }
        }
        let receiver = decl
            .params
            .first()
            .filter(|(pname, _)| pname.as_str() == "self");
        let receiver_tname = match receiver {
            Some((_, TypeExpr::Name(tname))) => Some(*tname),
            Some(_) => {
                self.tp_vars.pop();
                return Err(CompileError::new(
                    ErrorCode::TypeMethodIllegal,
                    "receiver type must be a declared record or enum",
                ));
            }
            None => None,
        };
        let fn_name = match receiver_tname {
            Some(tname) => Symbol::intern(&format!("{}${}", tname, decl.name)),
            None => decl.name,
        };

        // fresh frame: only globals remain visible
        self.frames.push(std::mem::take(&mut self.scopes));
        self.scopes = vec![FxHashMap::default()];
        let saved_cur = self.cur;

        let mut params = Vec::with_capacity(decl.params.len());
        for ((pname, _), ptp) in decl.params.iter().zip(&param_tps) {
            self.scopes
                .last_mut()
                .expect("scope stack empty")
                .insert(*pname, *pname);
            self.env.set_def(*pname, ptp.clone());
            params.push(*pname);
        }

        let body_blk = self.cfg.block("body");
        self.cur = body_blk;
        self.emit_body(&decl.body)?;
        self.insert_ret(body_blk, Some(&ret_tp))?;

        self.cur = saved_cur;
        self.scopes = self.frames.pop().expect("frame stack empty");
        self.tp_vars.pop();

        let func_tp = FuncType {
            uid: self.ctx.next_uid(),
            params: param_tps,
            ret: Box::new(ret_tp),
            tp_vars: tvs,
        };

        if let Some(tname) = receiver_tname {
            let declared = self.env.types.get_mut(&tname);
            let impls = declared.and_then(|t| t.impls_mut()).ok_or_else(|| {
                CompileError::new(
                    ErrorCode::TypeMethodIllegal,
                    format!("receiver type {} is not a declared record or enum", tname),
                )
            })?;
            impls.prefix = Some(tname);
            impls.fns.insert(decl.name, func_tp.clone());
        }

        self.env.set_def(fn_name, Type::Func(func_tp.clone()));
        self.globals.insert(fn_name, fn_name);

        // the body subgraph is complete; lift it into SSA now, while
        // the environment still holds this function's pre-SSA types
        let mut maker = DominatorMaker::new(&mut self.cfg, body_blk, params);
        let mut decl_table = maker.lift(&self.env.defs);
        let lift_params = maker.lift_params.clone();
        for name in self.globals.keys() {
            if let Some(tp) = self.env.get_def(*name) {
                decl_table.insert(*name, tp.clone());
            }
        }
        self.funcs.push(FuncDef {
            name: fn_name,
            params: lift_params,
            body: body_blk,
            tp: func_tp,
            decl_table,
        });

        // a declaration evaluates to unit in the enclosing block
        Ok(self.rval(Value::const_unit(), Type::Unit))
    }

    /// Append an explicit `Ret` to every exit block reachable from
    /// `root`. With a declared return type the tail of every exit block
    /// is checked against it; trait returns box concrete values, and
    /// polymorphic returns come back boxed.
    fn insert_ret(&mut self, root: BlockId, declared: Option<&Type>) -> Result<()> {
        let exits: Vec<BlockId> = self
            .cfg
            .reachable(root)
            .into_iter()
            .filter(|&b| self.cfg.get(b).succs.is_empty())
            .collect();
        for exit in exits {
            let tail_ident = match self.cfg.get(exit).instrs.last() {
                Some(instr) => instr.ident,
                None => {
                    self.cur = exit;
                    self.rval(Value::const_unit(), Type::Unit).ident
                }
            };
            let tail_tp = self.env.def(tail_ident)?.clone();
            self.cur = exit;
            let mut target = tail_ident;
            let ret_tp = match declared {
                Some(ret_tp) => {
                    compatible(ret_tp, &tail_tp)?;
                    if let Type::Trait(rt) = ret_tp {
                        let already = matches!(&tail_tp, Type::Trait(tt) if tt.uid == rt.uid);
                        if !already {
                            target = self
                                .rval(
                                    Value::BoxTrait {
                                        target,
                                        trait_tp: ret_tp.clone(),
                                    },
                                    ret_tp.clone(),
                                )
                                .ident;
                        }
                    } else if has_type_var(ret_tp) && !matches!(tail_tp, Type::Var(_)) {
                        target = self
                            .rval(
                                Value::Box {
                                    target,
                                    tp: tail_tp.clone(),
                                    box_tp: Type::VoidPtr,
                                },
                                Type::VoidPtr,
                            )
                            .ident;
                    }
                    ret_tp.clone()
                }
                None => tail_tp,
            };
            let ret_id = self.gen_id();
            self.instr(
                ret_id,
                Value::Ret {
                    target: Some(target),
                    tp: ret_tp,
                },
                Type::Unit,
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // type expressions
    // ------------------------------------------------------------------

    fn emit_type(&mut self, texpr: &TypeExpr) -> Result<Type> {
        match texpr {
            TypeExpr::Name(name) => match name.as_str() {
                "unit" => Ok(Type::Unit),
                "bool" => Ok(Type::Bool),
                "int" => Ok(Type::Int),
                "float" => Ok(Type::Float),
                _ => {
                    for scope in self.tp_vars.iter().rev() {
                        if let Some(tv) = scope.get(name) {
                            return Ok(Type::Var(tv.clone()));
                        }
                    }
                    if let Some(tp) = self.env.get_type(*name) {
                        return Ok(tp.clone());
                    }
                    if self.in_trait_decl {
                        Err(CompileError::new(
                            ErrorCode::TypeTraitTypeVarUndefined,
                            format!("type {} not declared in trait", name),
                        ))
                    } else {
                        Err(CompileError::internal(format!("undefined type: {}", name)))
                    }
                }
            },
            TypeExpr::Arr { ele, size } => {
                let ele = self.emit_type(ele)?;
                Ok(Type::Arr(ArrType {
                    ele: Box::new(ele),
                    size: *size as usize,
                }))
            }
            TypeExpr::Rec {
                tp_vars,
                keys,
                mem_tps,
            } => {
                let tvs = self.emit_tp_var_decls(tp_vars)?;
                let mem_tps = mem_tps
                    .iter()
                    .map(|t| self.emit_type(t))
                    .collect::<Result<Vec<_>>>()?;
                self.tp_vars.pop();
                Ok(Type::Rec(RecType {
                    uid: self.ctx.next_uid(),
                    keys: keys.clone(),
                    mem_tps,
                    tp_vars: tvs,
                    substs: Vec::new(),
                    impls: ImplBundle::default(),
                }))
            }
            TypeExpr::Tup(tps) => {
                let mem_tps = tps
                    .iter()
                    .map(|t| self.emit_type(t))
                    .collect::<Result<Vec<_>>>()?;
                let keys = (0..mem_tps.len())
                    .map(|i| Symbol::intern(&i.to_string()))
                    .collect();
                Ok(Type::Rec(RecType {
                    uid: self.ctx.next_uid(),
                    keys,
                    mem_tps,
                    tp_vars: Vec::new(),
                    substs: Vec::new(),
                    impls: ImplBundle::default(),
                }))
            }
            TypeExpr::Enum {
                tp_vars,
                tokens,
                payloads,
            } => {
                let tvs = self.emit_tp_var_decls(tp_vars)?;
                let mut variants = Vec::with_capacity(payloads.len());
                for payload in payloads {
                    match payload {
                        Some(texpr) => variants.push(self.emit_type(texpr)?),
                        None => variants.push(Type::Unit),
                    }
                }
                self.tp_vars.pop();
                let simple = variants.iter().all(|v| *v == Type::Unit);
                Ok(Type::Enum(EnumType {
                    uid: self.ctx.next_uid(),
                    simple,
                    tokens: tokens.clone(),
                    tp_vars: tvs,
                    variants,
                    impls: ImplBundle::default(),
                }))
            }
            TypeExpr::Trait { tp_vars, fns } => {
                let tvs = self.emit_tp_var_decls(tp_vars)?;
                let was_in_trait = self.in_trait_decl;
                self.in_trait_decl = true;
                // two-phase: build the skeleton first, then signatures
                // whose receiver slot is the skeleton
                let mut trait_tp = TraitType {
                    uid: self.ctx.next_uid(),
                    keys: fns.iter().map(|f| f.name).collect(),
                    fns: Vec::new(),
                    tp_vars: tvs,
                };
                let receiver = Type::Trait(trait_tp.skeleton());
                let mut sigs = Vec::with_capacity(fns.len());
                for sig in fns {
                    let mut params = vec![receiver.clone()];
                    for (_, ptexpr) in &sig.params {
                        params.push(self.emit_type(ptexpr)?);
                    }
                    let ret = self.emit_type(&sig.ret)?;
                    sigs.push(FuncType {
                        uid: self.ctx.next_uid(),
                        params,
                        ret: Box::new(ret),
                        tp_vars: Vec::new(),
                    });
                }
                trait_tp.fns = sigs;
                self.in_trait_decl = was_in_trait;
                self.tp_vars.pop();
                Ok(Type::Trait(trait_tp))
            }
        }
    }

    /// Open a type-variable scope for a declaration's `<T, U: Bound>`
    /// list. The caller pops it.
    fn emit_tp_var_decls(&mut self, decls: &[ast::TypeVarDecl]) -> Result<Vec<TypeVar>> {
        let mut scope = FxHashMap::default();
        let mut tvs = Vec::with_capacity(decls.len());
        for decl in decls {
            let tv = match decl.bound {
                Some(bound_name) => {
                    let bound = self.env.get_type(bound_name).cloned().ok_or_else(|| {
                        CompileError::new(
                            ErrorCode::TypeTraitTypeVarUndefined,
                            format!("trait bound {} not declared", bound_name),
                        )
                    })?;
                    TypeVar::bounded(decl.name, bound)
                }
                None => TypeVar::new(decl.name),
            };
            scope.insert(decl.name, tv.clone());
            tvs.push(tv);
        }
        self.tp_vars.push(scope);
        Ok(tvs)
    }
}

fn arith_op(op: BinOp) -> Op {
    match op {
        BinOp::Add => Op::Add,
        BinOp::Sub => Op::Sub,
        BinOp::Mul => Op::Mul,
        BinOp::Div => Op::Div,
        BinOp::Mod => Op::Mod,
        BinOp::Lt => Op::Lt,
        BinOp::Lte => Op::Lte,
        BinOp::Gt => Op::Gt,
        BinOp::Gte => Op::Gte,
        BinOp::Eq => Op::Eq,
        BinOp::Neq => Op::Neq,
        BinOp::And => Op::And,
        BinOp::Or => Op::Or,
    }
}

/// Structural match of a declared type against a concrete one, binding
/// type variables by name. First binding wins.
fn unify(param: &Type, arg: &Type, bindings: &mut IndexMap<Symbol, Type>) {
    match (param, arg) {
        (Type::Var(tv), _) => {
            bindings.entry(tv.name).or_insert_with(|| arg.clone());
        }
        (Type::Arr(p), Type::Arr(a)) => unify(&p.ele, &a.ele, bindings),
        (Type::Rec(p), Type::Rec(a)) => {
            for (pm, am) in p.mem_tps.iter().zip(&a.mem_tps) {
                unify(pm, am, bindings);
            }
        }
        (Type::Func(p), Type::Func(a)) => {
            for (pp, ap) in p.params.iter().zip(&a.params) {
                unify(pp, ap, bindings);
            }
            unify(&p.ret, &a.ret, bindings);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvac_ir::{cfg_string, is_dangle, verify_module};
    use corvac_par::parse;

    fn emit(src: &str) -> corvac_ir::Module {
        let ast = parse(src).expect("parse");
        emit_ir(&ast).expect("emit")
    }

    fn emit_err(src: &str) -> CompileError {
        let ast = parse(src).expect("parse");
        emit_ir(&ast).expect_err("expected emit failure")
    }

    #[test]
    fn arithmetic_function() {
        let module = emit("fun f1(): int = { 1 + 2 }; f1()");
        assert_eq!(module.funcs.len(), 1);
        assert_eq!(module.funcs[0].name.as_str(), "f1");
        verify_module(&module).unwrap();
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let err = emit_err("fun f(): int = { let a: int = 1; let a: int = 2; a }");
        assert_eq!(err.code, ErrorCode::TypeRedeclaration);
    }

    #[test]
    fn shadowing_in_nested_scope_is_allowed() {
        let module = emit("fun f(): int = { let a: int = 1; if true then { let a: int = 2; a } else a }; f()");
        verify_module(&module).unwrap();
    }

    #[test]
    fn if_lowering_places_single_phi() {
        let module = emit("fun f1(): int = { if 2 > 1 then 10 else 20 }; f1()");
        verify_module(&module).unwrap();

        let body = module.funcs[0].body;
        let mut phi_count = 0;
        for b in module.cfg.reachable(body) {
            for instr in &module.cfg.get(b).instrs {
                if let Value::Phi { edges, .. } = &instr.val {
                    phi_count += 1;
                    assert!(edges.iter().all(|e| !is_dangle(*e)));
                }
            }
        }
        assert_eq!(phi_count, 1, "expected exactly one phi at the merge");
    }

    #[test]
    fn loop_lowering_has_backedge() {
        let module = emit("fun f(a: int): int = { for a = 0 .. 3 { a }; 1 }; f(0)");
        verify_module(&module).unwrap();

        let body = module.funcs[0].body;
        let blocks = module.cfg.reachable(body);
        let order: FxHashMap<corvac_ir::BlockId, usize> =
            blocks.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        // some block loops back to an earlier block
        let has_backedge = blocks.iter().any(|&b| {
            module
                .cfg
                .get(b)
                .succs
                .iter()
                .any(|s| order[s] < order[&b])
        });
        assert!(has_backedge, "loop did not produce a back edge");
    }

    #[test]
    fn match_missing_default_fails() {
        let err = emit_err(
            "type Opt = enum<T>(Some(T), None); fun f(): int = { match Opt.Some(41) { case Opt.Some(x) -> x } }",
        );
        assert_eq!(err.code, ErrorCode::TypeEnumOtherIllegal);
    }

    #[test]
    fn match_misplaced_default_fails() {
        let err = emit_err(
            "type Opt = enum<T>(Some(T), None); fun f(): int = { match Opt.Some(41) { case _ -> 0; case Opt.Some(x) -> x } }",
        );
        assert_eq!(err.code, ErrorCode::TypeEnumOtherIllegal);
    }

    #[test]
    fn match_lowers_to_discriminant_chain() {
        let module = emit(
            "type Opt = enum<T>(Some(T), None); fun f(): int = { match Opt.Some(41) { case Opt.Some(x) -> x + 1; case _ -> 0 } }; f()",
        );
        verify_module(&module).unwrap();

        let body = module.funcs[0].body;
        let text = cfg_string(&module.cfg, body);
        assert!(text.contains("discriminant("));
        assert!(text.contains("=="));
        assert!(text.contains("unbox("));
    }

    #[test]
    fn trait_param_boxes_and_calls_through_vtable() {
        let module = emit(
            "type Adder = trait { add(x: int): int };\
             type Counter = rec{c: int};\
             fun add(self: Counter, x: int): int = { self.c + x };\
             fun m(a: Adder): int = { a.add(5) };\
             m(Counter{c: 2})",
        );
        verify_module(&module).unwrap();

        // the method landed under its mangled name
        assert!(module.funcs.iter().any(|f| f.name.as_str() == "Counter$add"));

        let root_text = cfg_string(&module.cfg, module.root);
        assert!(root_text.contains("boxtrait("), "call site must box to the trait");

        let m_body = module.func(Symbol::intern("m")).unwrap().body;
        let m_text = cfg_string(&module.cfg, m_body);
        assert!(m_text.contains("traitcall add("), "trait method must go through the vtable");
    }

    #[test]
    fn generic_call_boxes_and_unboxes() {
        let module = emit("fun id<T>(x: T): T = { x }; id(5)");
        verify_module(&module).unwrap();

        let root_text = cfg_string(&module.cfg, module.root);
        assert!(root_text.contains("box("));
        assert!(root_text.contains("unbox("));
    }

    #[test]
    fn trait_bound_violation_is_reported() {
        let err = emit_err(
            "type Adder = trait { add(x: int): int };\
             fun m<T: Adder>(a: T): int = { a.add(5) };\
             m(3)",
        );
        assert_eq!(err.code, ErrorCode::TypeTraitBound);
    }

    #[test]
    fn record_literal_key_checking() {
        let err = emit_err("type Counter = rec{c: int}; Counter{d: 2}");
        assert_eq!(err.code, ErrorCode::TypeRecordKeyNotFound);

        let err = emit_err("type Counter = rec{c: int, d: int}; Counter{c: 2}");
        assert_eq!(err.code, ErrorCode::TypeRecordNotFulfilled);
    }

    #[test]
    fn return_type_is_checked_on_every_exit() {
        let err = emit_err("fun f(): int = { 1.5 }");
        assert_eq!(err.code, ErrorCode::TypeIncompatiblePrimitive);
    }

    #[test]
    fn call_arity_is_checked() {
        let err = emit_err("fun f(a: int): int = { a }; f(1, 2)");
        assert_eq!(err.code, ErrorCode::TypeParamCountWrong);
    }

    #[test]
    fn emission_is_deterministic() {
        let src = "fun f1(): int = { if 2 > 1 then 10 else 20 }; f1()";
        let a = emit(src);
        let b = emit(src);
        let text_a = cfg_string(&a.cfg, a.root) + &cfg_string(&a.cfg, a.funcs[0].body);
        let text_b = cfg_string(&b.cfg, b.root) + &cfg_string(&b.cfg, b.funcs[0].body);
        assert_eq!(text_a, text_b);
    }
}
