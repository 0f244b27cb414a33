use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use php_opvm::compiler::block::CodeBlock;
use php_opvm::compiler::verify::verify;
use php_opvm::core::value::Val;
use php_opvm::runtime::program::Program;
use php_opvm::vm::engine::VmError;
use php_opvm::vm::executor::{ExecutionConfig, execute_program};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "opvm")]
#[command(about = "Run and inspect PHP bytecode program files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a program file
    Run {
        /// Program file (JSON)
        #[arg(name = "FILE")]
        file: PathBuf,

        /// Wall-clock limit in milliseconds (0 = unlimited)
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,

        /// Maximum nesting of user function calls
        #[arg(long)]
        max_depth: Option<usize>,

        /// Print every executed instruction to stderr
        #[arg(long)]
        trace: bool,

        /// Arguments exposed to the script as $argv
        #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Disassemble every code block of a program file
    Dump {
        #[arg(name = "FILE")]
        file: PathBuf,
    },
    /// Check the stack shape of every code block of a program file
    Verify {
        #[arg(name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            file,
            timeout_ms,
            max_depth,
            trace,
            args,
        } => run_file(&file, timeout_ms, max_depth, trace, args),
        Command::Dump { file } => dump_file(&file),
        Command::Verify { file } => verify_file(&file),
    }
}

fn load(path: &Path) -> anyhow::Result<Program> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Program::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Every named block of the program: main, functions, then methods
fn blocks(program: &Program) -> Vec<(String, &CodeBlock)> {
    let mut out = vec![("{main}".to_string(), &program.main)];
    for func in &program.functions {
        out.push((format!("{}()", func.name), &func.code));
    }
    for class in &program.classes {
        for method in &class.methods {
            out.push((format!("{}::{}()", class.name, method.name), &method.code));
        }
    }
    out
}

fn run_file(
    path: &Path,
    timeout_ms: u64,
    max_depth: Option<usize>,
    trace: bool,
    args: Vec<String>,
) -> anyhow::Result<()> {
    let program = load(path)?;

    let mut config = ExecutionConfig {
        timeout_ms,
        capture_output: false,
        trace,
        ..ExecutionConfig::default()
    };
    if let Some(depth) = max_depth {
        config.max_call_depth = depth;
    }

    let mut argv = vec![Val::string(path.to_string_lossy().as_bytes())];
    argv.extend(args.iter().map(|a| Val::string(a.as_bytes())));

    match execute_program(&program, &argv, config) {
        Ok(result) => {
            std::io::stdout().flush()?;
            if let Val::Int(status) = result.value
                && status != 0
            {
                std::process::exit(status as i32);
            }
            Ok(())
        }
        Err(failure) => {
            std::io::stdout().flush()?;
            match failure.error {
                VmError::Fatal(_) | VmError::Cancelled(_) | VmError::UncaughtException { .. } => {
                    eprintln!("PHP {}", failure.error);
                    std::process::exit(255);
                }
                other => bail!(other),
            }
        }
    }
}

fn dump_file(path: &Path) -> anyhow::Result<()> {
    let program = load(path)?;
    let mut out = std::io::stdout().lock();
    for (name, block) in blocks(&program) {
        writeln!(out, "{} (net push {}):", name, block.push_count())?;
        write!(out, "{}", block)?;
        writeln!(out)?;
    }
    Ok(())
}

fn verify_file(path: &Path) -> anyhow::Result<()> {
    let program = load(path)?;
    let mut failures = 0;
    for (name, block) in blocks(&program) {
        match verify(block) {
            Ok(profile) => println!("{}: ok (max stack {})", name, profile.max_height),
            Err(errors) => {
                failures += errors.len();
                for error in errors {
                    println!("{}: {}", name, error);
                }
            }
        }
    }
    if failures > 0 {
        bail!("{} problem(s) found", failures);
    }
    Ok(())
}
