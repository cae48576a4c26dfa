//! corvac-ir - SSA Intermediate Representation
//!
//! The block-structured instruction stream the emitter produces and the
//! backend consumes, together with the dominator/SSA construction that
//! rewrites each CFG into SSA form in place.

mod dom;
mod instr;
mod print;
mod verify;

pub use dom::{dominates, DominatorMaker};
pub use instr::{
    dangle_ident, gen_var_ident, is_dangle, Block, BlockId, Cfg, DomInfo, FuncDef, Instr,
    InstrKind, Module, Op, Value,
};
pub use print::{cfg_string, func_string, value_string};
pub use verify::verify_module;
