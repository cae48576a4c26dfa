//! corvac-drv - Compiler Driver
//!
//! Thin orchestration over the pipeline: parse -> emit -> SSA, then
//! hand the module to the requested backend.
//!
//! Subcommands:
//! - `run <source>`  - execute and print the last top-level value
//! - `bb <source>`   - print the CFG text after SSA construction
//! - `llvm <source>` - print the backend IR textual form
//!
//! `<source>` is a path to a source file, or the program text itself
//! when no such file exists. Exit code 0 on success, 1 on compile
//! error.

use anyhow::{anyhow, bail, Result};
use corvac_gen::{lower_text, run_module};
use corvac_ir::{cfg_string, func_string};
use std::path::Path;

/// Requested driver action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    Bb,
    Llvm,
}

/// Parsed command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub source: String,
}

impl Config {
    pub fn from_args(args: &[String]) -> Result<Config> {
        if args.len() < 2 {
            bail!("usage: corvac <run|bb|llvm> <source-file-or-program>");
        }
        let command = match args[0].to_lowercase().as_str() {
            "run" => Command::Run,
            "bb" => Command::Bb,
            "llvm" => Command::Llvm,
            other => bail!("unknown subcommand {:?}; expected run, bb or llvm", other),
        };
        let source = if Path::new(&args[1]).is_file() {
            std::fs::read_to_string(&args[1])?
        } else {
            args[1].clone()
        };
        Ok(Config { command, source })
    }
}

/// Run the pipeline for one configuration and return the printable
/// output.
pub fn execute(config: &Config) -> Result<String> {
    let ast = corvac_par::parse(&config.source).map_err(|e| anyhow!("{}", e))?;
    let module = corvac_sem::emit_ir(&ast).map_err(|e| anyhow!("{}", e))?;
    match config.command {
        Command::Run => {
            let value = run_module(&module).map_err(|e| anyhow!("{}", e))?;
            Ok(value.render())
        }
        Command::Bb => {
            let mut out = cfg_string(&module.cfg, module.root);
            for func in &module.funcs {
                out.push_str(&func_string(&module.cfg, func));
            }
            Ok(out)
        }
        Command::Llvm => lower_text(&module).map_err(|e| anyhow!("{}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: Command, source: &str) -> Config {
        Config {
            command,
            source: source.to_string(),
        }
    }

    #[test]
    fn run_prints_last_value() {
        let out = execute(&config(Command::Run, "fun f1(): int = { 1 + 2 }; f1()")).unwrap();
        assert_eq!(out, "3");
    }

    #[test]
    fn bb_prints_root_and_functions() {
        let out = execute(&config(Command::Bb, "fun f1(): int = { 1 + 2 }; f1()")).unwrap();
        assert!(out.starts_with("#bb0:root\n"));
        assert!(out.contains("fun f1()\n"));
    }

    #[test]
    fn compile_errors_propagate() {
        let err = execute(&config(Command::Run, "let a: int = 1; let a: int = 2"))
            .expect_err("redeclaration must fail");
        assert!(err.to_string().contains("TYPE_REDECLARATION"));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        let args = vec!["frobnicate".to_string(), "1".to_string()];
        assert!(Config::from_args(&args).is_err());
    }
}
