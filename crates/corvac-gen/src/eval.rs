//! Reference evaluator over the SSA CFG.
//!
//! Registers are keyed by ident; phi nodes select their operand by the
//! predecessor the walk arrived from. Boxed values stay wrapped until
//! an operation needs the concrete payload. A dangling read of a
//! primitive type yields its zero value; any other dangling read is a
//! diagnostic.

use corvac_ir::{is_dangle, BlockId, FuncDef, Module, Op, Value};
use corvac_types::Type;
use corvac_util::{CompileError, FxHashMap, Result, Symbol};
use std::cell::RefCell;
use std::rc::Rc;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum RtValue {
    Unit,
    Int(i64),
    Float(f64),
    Bool(bool),
    Arr(Rc<RefCell<Vec<RtValue>>>),
    Rec(Rc<Vec<RtValue>>),
    Enum {
        tag: i64,
        payload: Option<Rc<RtValue>>,
    },
    Boxed(Rc<RtValue>),
    TraitObj {
        data: Rc<RtValue>,
        vtable: Rc<Vec<Symbol>>,
    },
}

impl RtValue {
    /// Render the way the runner prints top-level results.
    pub fn render(&self) -> String {
        match self {
            RtValue::Unit => "unit".to_string(),
            RtValue::Int(v) => v.to_string(),
            RtValue::Float(v) => format!("{}", v),
            RtValue::Bool(v) => v.to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// Execute a module's root block and return its last value.
pub fn run_module(module: &Module) -> Result<RtValue> {
    Evaluator::new(module).run()
}

/// Execute with externally-seeded global values.
pub fn run_module_with_globals(
    module: &Module,
    globals: Vec<(Symbol, RtValue)>,
) -> Result<RtValue> {
    Evaluator::with_globals(module, globals).run()
}

pub struct Evaluator<'a> {
    module: &'a Module,
    globals: FxHashMap<Symbol, RtValue>,
}

impl<'a> Evaluator<'a> {
    pub fn new(module: &'a Module) -> Self {
        Self {
            module,
            globals: FxHashMap::default(),
        }
    }

    pub fn with_globals(module: &'a Module, globals: Vec<(Symbol, RtValue)>) -> Self {
        Self {
            module,
            globals: globals.into_iter().collect(),
        }
    }

    /// Run the top-level block.
    pub fn run(&self) -> Result<RtValue> {
        let mut regs = FxHashMap::default();
        self.exec_cfg(self.module.root, &mut regs, &self.module.env.defs)
    }

    /// Call a declared function with already-evaluated arguments.
    pub fn call(&self, func: &FuncDef, args: Vec<RtValue>) -> Result<RtValue> {
        if args.len() != func.params.len() {
            return Err(CompileError::internal(format!(
                "function {} called with {} arguments, takes {}",
                func.name,
                args.len(),
                func.params.len()
            )));
        }
        let mut regs: FxHashMap<Symbol, RtValue> =
            func.params.iter().copied().zip(args).collect();
        self.exec_cfg(func.body, &mut regs, &func.decl_table)
    }

    fn exec_cfg(
        &self,
        entry: BlockId,
        regs: &mut FxHashMap<Symbol, RtValue>,
        decls: &FxHashMap<Symbol, Type>,
    ) -> Result<RtValue> {
        let mut cur = entry;
        let mut prev: Option<BlockId> = None;
        let mut last = RtValue::Unit;
        loop {
            let block = self.module.cfg.get(cur);
            let mut branch: Option<BlockId> = None;
            for instr in &block.instrs {
                match &instr.val {
                    Value::Phi { edges, .. } => {
                        let from = prev.ok_or_else(|| {
                            CompileError::internal("phi in a block without a predecessor")
                        })?;
                        let idx = block.preds.iter().position(|&p| p == from).ok_or_else(
                            || CompileError::internal("phi predecessor not linked"),
                        )?;
                        let edge = edges[idx];
                        let v = if is_dangle(edge) {
                            zero_value(decls.get(&instr.ident))?
                        } else {
                            self.resolve(edge, regs, decls)?
                        };
                        regs.insert(instr.ident, v);
                    }
                    Value::If {
                        cond,
                        then_blk,
                        else_blk,
                    } => {
                        let c = strip(self.resolve(*cond, regs, decls)?);
                        let taken = match c {
                            RtValue::Bool(b) => b,
                            other => {
                                return Err(CompileError::internal(format!(
                                    "branch condition is not a bool: {:?}",
                                    other
                                )))
                            }
                        };
                        branch = Some(if taken { *then_blk } else { *else_blk });
                    }
                    Value::Ret { target, .. } => {
                        return match target {
                            Some(t) => self.resolve(*t, regs, decls),
                            None => Ok(RtValue::Unit),
                        };
                    }
                    other => {
                        let v = self.eval_value(other, regs, decls)?;
                        regs.insert(instr.ident, v.clone());
                        last = v;
                    }
                }
            }
            prev = Some(cur);
            cur = match branch {
                Some(b) => b,
                None => match block.succs.first() {
                    Some(&b) => b,
                    None => return Ok(last),
                },
            };
        }
    }

    fn resolve(
        &self,
        ident: Symbol,
        regs: &FxHashMap<Symbol, RtValue>,
        decls: &FxHashMap<Symbol, Type>,
    ) -> Result<RtValue> {
        if let Some(v) = regs.get(&ident) {
            return Ok(v.clone());
        }
        if let Some(v) = self.globals.get(&ident) {
            return Ok(v.clone());
        }
        if is_dangle(ident) || decls.contains_key(&ident) {
            return zero_value(decls.get(&ident));
        }
        Err(CompileError::internal(format!(
            "no value for identifier {}",
            ident
        )))
    }

    fn eval_value(
        &self,
        val: &Value,
        regs: &FxHashMap<Symbol, RtValue>,
        decls: &FxHashMap<Symbol, Type>,
    ) -> Result<RtValue> {
        match val {
            Value::Const { tp, raw } => parse_const(tp, raw),
            Value::Ref { ident, .. } => self.resolve(*ident, regs, decls),
            Value::Expr { op, args, .. } => {
                let l = strip(self.resolve(args[0], regs, decls)?);
                let r = strip(self.resolve(args[1], regs, decls)?);
                eval_binop(*op, l, r)
            }
            Value::ArrMake { args, .. } => {
                let mut elems = Vec::with_capacity(args.len());
                for a in args {
                    elems.push(self.resolve(*a, regs, decls)?);
                }
                Ok(RtValue::Arr(Rc::new(RefCell::new(elems))))
            }
            Value::ArrGet { arr, index, .. } => {
                let arr = strip(self.resolve(*arr, regs, decls)?);
                let idx = expect_int(strip(self.resolve(*index, regs, decls)?))?;
                match arr {
                    RtValue::Arr(elems) => {
                        let elems = elems.borrow();
                        elems.get(idx as usize).cloned().ok_or_else(|| {
                            CompileError::internal(format!("array index {} out of bounds", idx))
                        })
                    }
                    other => Err(CompileError::internal(format!(
                        "subscript of non-array value {:?}",
                        other
                    ))),
                }
            }
            Value::ArrPut { arr, index, right } => {
                let arr = strip(self.resolve(*arr, regs, decls)?);
                let idx = expect_int(strip(self.resolve(*index, regs, decls)?))?;
                let v = self.resolve(*right, regs, decls)?;
                match arr {
                    RtValue::Arr(elems) => {
                        let mut elems = elems.borrow_mut();
                        let len = elems.len();
                        *elems.get_mut(idx as usize).ok_or_else(|| {
                            CompileError::internal(format!(
                                "array index {} out of bounds for length {}",
                                idx, len
                            ))
                        })? = v;
                        Ok(RtValue::Unit)
                    }
                    other => Err(CompileError::internal(format!(
                        "subscript of non-array value {:?}",
                        other
                    ))),
                }
            }
            Value::RecLit { args, .. } => {
                let mut fields = Vec::with_capacity(args.len());
                for a in args {
                    fields.push(self.resolve(*a, regs, decls)?);
                }
                Ok(RtValue::Rec(Rc::new(fields)))
            }
            Value::RecAcs { target, idx, .. } => {
                let target = strip(self.resolve(*target, regs, decls)?);
                match target {
                    RtValue::Rec(fields) => fields.get(*idx).cloned().ok_or_else(|| {
                        CompileError::internal(format!("record has no slot {}", idx))
                    }),
                    RtValue::Enum { tag, payload } => match idx {
                        0 => Ok(RtValue::Int(tag)),
                        1 => payload.map(|p| (*p).clone()).ok_or_else(|| {
                            CompileError::internal("variant carries no payload")
                        }),
                        _ => Err(CompileError::internal(format!(
                            "enum value has no slot {}",
                            idx
                        ))),
                    },
                    other => Err(CompileError::internal(format!(
                        "member access on non-record value {:?}",
                        other
                    ))),
                }
            }
            Value::EnumVar { tp, idx, boxed } => {
                let payload = match boxed {
                    Some(b) => Some(Rc::new(self.resolve(*b, regs, decls)?)),
                    None => None,
                };
                let simple = matches!(tp, Type::Enum(e) if e.simple);
                if simple {
                    Ok(RtValue::Int(*idx as i64))
                } else {
                    Ok(RtValue::Enum {
                        tag: *idx as i64,
                        payload,
                    })
                }
            }
            Value::Discriminant { target, .. } => {
                let v = strip(self.resolve(*target, regs, decls)?);
                match v {
                    RtValue::Int(tag) => Ok(RtValue::Int(tag)),
                    RtValue::Enum { tag, .. } => Ok(RtValue::Int(tag)),
                    other => Err(CompileError::internal(format!(
                        "discriminant of non-enum value {:?}",
                        other
                    ))),
                }
            }
            Value::Box { target, .. } => Ok(RtValue::Boxed(Rc::new(
                self.resolve(*target, regs, decls)?,
            ))),
            Value::Unbox { target, .. } => {
                Ok(strip_once(self.resolve(*target, regs, decls)?))
            }
            Value::BoxTrait { target, trait_tp } => {
                let keys = match trait_tp {
                    Type::Trait(t) => &t.keys,
                    other => {
                        return Err(CompileError::internal(format!(
                            "boxtrait to non-trait type {}",
                            other
                        )))
                    }
                };
                let concrete = decls.get(target).ok_or_else(|| {
                    CompileError::internal(format!("no declared type for {}", target))
                })?;
                let impls = concrete.impls().ok_or_else(|| {
                    CompileError::internal(format!("type {} has no method table", concrete))
                })?;
                let mut vtable = Vec::with_capacity(keys.len());
                for key in keys {
                    if impls.fns.get(key).is_none() {
                        return Err(CompileError::internal(format!(
                            "type {} does not implement {}",
                            concrete, key
                        )));
                    }
                    vtable.push(impls.mangle(*key));
                }
                Ok(RtValue::TraitObj {
                    data: Rc::new(self.resolve(*target, regs, decls)?),
                    vtable: Rc::new(vtable),
                })
            }
            Value::StaticCall { name, args, .. } => {
                let func = self.module.func(*name)?;
                let mut arg_vals = Vec::with_capacity(args.len());
                for a in args {
                    arg_vals.push(self.resolve(*a, regs, decls)?);
                }
                self.call(func, arg_vals)
            }
            Value::TraitCall {
                name,
                trait_tp,
                args,
                ..
            } => {
                let obj = strip(self.resolve(args[0], regs, decls)?);
                let (data, vtable) = match obj {
                    RtValue::TraitObj { data, vtable } => (data, vtable),
                    other => {
                        return Err(CompileError::internal(format!(
                            "trait call on non-trait value {:?}",
                            other
                        )))
                    }
                };
                let keys = match trait_tp {
                    Type::Trait(t) => &t.keys,
                    other => {
                        return Err(CompileError::internal(format!(
                            "trait call through non-trait type {}",
                            other
                        )))
                    }
                };
                let slot = keys.iter().position(|k| k == name).ok_or_else(|| {
                    CompileError::internal(format!("trait has no function {}", name))
                })?;
                let func = self.module.func(vtable[slot])?;
                // the receiver slot is replaced by the object's data
                let mut arg_vals = vec![strip((*data).clone())];
                for a in &args[1..] {
                    arg_vals.push(self.resolve(*a, regs, decls)?);
                }
                self.call(func, arg_vals)
            }
            Value::Phi { .. } | Value::If { .. } | Value::Ret { .. } => Err(
                CompileError::internal("control instruction evaluated as value"),
            ),
        }
    }
}

/// Unwrap every box layer.
fn strip(v: RtValue) -> RtValue {
    match v {
        RtValue::Boxed(inner) => strip((*inner).clone()),
        other => other,
    }
}

/// Unwrap a single box layer, tolerating unboxed values.
fn strip_once(v: RtValue) -> RtValue {
    match v {
        RtValue::Boxed(inner) => (*inner).clone(),
        other => other,
    }
}

fn expect_int(v: RtValue) -> Result<i64> {
    match v {
        RtValue::Int(i) => Ok(i),
        other => Err(CompileError::internal(format!(
            "expected an int, got {:?}",
            other
        ))),
    }
}

fn parse_const(tp: &Type, raw: &[u8]) -> Result<RtValue> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| CompileError::internal("constant is not valid utf-8"))?;
    match tp {
        Type::Int => text
            .parse::<i64>()
            .map(RtValue::Int)
            .map_err(|e| CompileError::internal(format!("bad int constant {}: {}", text, e))),
        Type::Float => text
            .parse::<f64>()
            .map(RtValue::Float)
            .map_err(|e| CompileError::internal(format!("bad float constant {}: {}", text, e))),
        Type::Bool => match text {
            "true" => Ok(RtValue::Bool(true)),
            "false" => Ok(RtValue::Bool(false)),
            _ => Err(CompileError::internal(format!(
                "bad bool constant {}",
                text
            ))),
        },
        Type::Unit => Ok(RtValue::Unit),
        other => Err(CompileError::internal(format!(
            "unsupported constant type {}",
            other
        ))),
    }
}

/// Zero value for a primitive type; non-primitives cannot dangle.
fn zero_value(tp: Option<&Type>) -> Result<RtValue> {
    match tp {
        Some(Type::Int) => Ok(RtValue::Int(0)),
        Some(Type::Float) => Ok(RtValue::Float(0.0)),
        Some(Type::Bool) => Ok(RtValue::Bool(false)),
        Some(Type::Unit) | None => Ok(RtValue::Unit),
        Some(Type::Enum(e)) if e.simple => Ok(RtValue::Int(0)),
        Some(other) => Err(CompileError::internal(format!(
            "dangling value of non-primitive type {}",
            other
        ))),
    }
}

fn eval_binop(op: Op, l: RtValue, r: RtValue) -> Result<RtValue> {
    use RtValue::*;
    let v = match (op, l, r) {
        (Op::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (Op::Sub, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (Op::Mul, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (Op::Div, Int(a), Int(b)) => {
            if b == 0 {
                return Err(CompileError::internal("division by zero"));
            }
            Int(a / b)
        }
        (Op::Mod, Int(a), Int(b)) => {
            if b == 0 {
                return Err(CompileError::internal("remainder by zero"));
            }
            Int(a % b)
        }
        (Op::Add, Float(a), Float(b)) => Float(a + b),
        (Op::Sub, Float(a), Float(b)) => Float(a - b),
        (Op::Mul, Float(a), Float(b)) => Float(a * b),
        (Op::Div, Float(a), Float(b)) => Float(a / b),
        (Op::Lt, Int(a), Int(b)) => Bool(a < b),
        (Op::Lte, Int(a), Int(b)) => Bool(a <= b),
        (Op::Gt, Int(a), Int(b)) => Bool(a > b),
        (Op::Gte, Int(a), Int(b)) => Bool(a >= b),
        (Op::Eq, Int(a), Int(b)) => Bool(a == b),
        (Op::Neq, Int(a), Int(b)) => Bool(a != b),
        (Op::Lt, Float(a), Float(b)) => Bool(a < b),
        (Op::Lte, Float(a), Float(b)) => Bool(a <= b),
        (Op::Gt, Float(a), Float(b)) => Bool(a > b),
        (Op::Gte, Float(a), Float(b)) => Bool(a >= b),
        (Op::Eq, Float(a), Float(b)) => Bool(a == b),
        (Op::Neq, Float(a), Float(b)) => Bool(a != b),
        (Op::Eq, Bool(a), Bool(b)) => Bool(a == b),
        (Op::Neq, Bool(a), Bool(b)) => Bool(a != b),
        (Op::And, Bool(a), Bool(b)) => Bool(a && b),
        (Op::Or, Bool(a), Bool(b)) => Bool(a || b),
        (op, l, r) => {
            return Err(CompileError::internal(format!(
                "operator {} not applicable to {:?} and {:?}",
                op, l, r
            )))
        }
    };
    Ok(v)
}
