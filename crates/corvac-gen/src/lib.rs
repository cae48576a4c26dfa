//! corvac-gen - Backend Adapter
//!
//! The contract the middle-end presents to a code generator, plus two
//! reference implementations: a textual lowering that prints an
//! LLVM-flavoured instruction stream, and an evaluator that executes
//! the SSA CFG directly. The evaluator stands in for a JIT in the
//! driver's `run` subcommand and in the end-to-end tests.

mod eval;
mod llvm;


pub use eval::{run_module, run_module_with_globals, Evaluator, RtValue};
pub use llvm::lower_text;

use corvac_ir::Module;
use corvac_util::Result;

/// A consumer of the emitted SSA IR.
pub trait Backend {
    type Output;

    /// Lower (or execute) a whole module.
    fn build_module(&mut self, module: &Module) -> Result<Self::Output>;
}

/// Textual LLVM-flavoured lowering.
pub struct TextLowering;

impl Backend for TextLowering {
    type Output = String;

    fn build_module(&mut self, module: &Module) -> Result<String> {
        lower_text(module)
    }
}

/// Direct SSA execution.
#[derive(Default)]
pub struct Interp {
    pub globals: Vec<(corvac_util::Symbol, RtValue)>,
}

impl Backend for Interp {
    type Output = RtValue;

    fn build_module(&mut self, module: &Module) -> Result<RtValue> {
        let evaluator = Evaluator::with_globals(module, self.globals.clone());
        evaluator.run()
    }
}
