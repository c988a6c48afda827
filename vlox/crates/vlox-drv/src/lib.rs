//! vlox-drv - The `vlox` command-line driver
//!
//! A thin shell around the VM:
//!
//! - `vlox` with no arguments starts a line-at-a-time REPL on stdin;
//! - `vlox <script>` reads the file and interprets it;
//! - anything else prints usage.
//!
//! Exit codes follow the conventions of this language family: `0` on
//! success, `65` for usage or compile errors, `70` for runtime errors,
//! `74` when the script file cannot be read.
//!
//! Setting `VLOX_LOG` (`error`..`trace`) turns on the runtime's logging
//! (GC cycles at `debug`, instruction traces at `trace`); `VLOX_GC`
//! accepts `stress` to collect before every allocation.

mod logger;

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use vlox_core::GcConfig;
use vlox_vm::{InterpretError, Vm, VmConfig};

/// Success.
pub const EX_OK: i32 = 0;
/// Usage or compile error.
pub const EX_DATAERR: i32 = 65;
/// Runtime error.
pub const EX_SOFTWARE: i32 = 70;
/// The script file could not be read.
pub const EX_IOERR: i32 = 74;

/// Entry point: dispatches on the argument list, returns the process
/// exit code.
pub fn main() -> i32 {
    logger::init_from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => repl(),
        [path] => run_file(path),
        _ => {
            eprintln!("Usage: vlox [script]");
            EX_DATAERR
        }
    }
}

/// Builds a VM configured from the environment.
fn make_vm() -> Vm {
    let stress = std::env::var("VLOX_GC")
        .map(|value| value == "stress")
        .unwrap_or(false);
    let trace = log::log_enabled!(log::Level::Trace);

    let config = VmConfig {
        gc: GcConfig {
            stress,
            ..GcConfig::default()
        },
        trace,
    };
    Vm::with_config(config, Box::new(io::stdout()))
}

/// Reads and interprets one script file.
pub fn run_file(path: &str) -> i32 {
    let source = match read_source(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("{error:#}");
            return EX_IOERR;
        }
    };

    let mut vm = make_vm();
    match vm.interpret(&source) {
        Ok(()) => EX_OK,
        Err(InterpretError::Compile) => EX_DATAERR,
        Err(InterpretError::Runtime) => EX_SOFTWARE,
    }
}

fn read_source(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("could not read script '{path}'"))
}

/// The REPL: one statement per line, errors reported and forgotten.
/// Globals persist for the whole session.
pub fn repl() -> i32 {
    let mut vm = make_vm();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let Some(Ok(line)) = lines.next() else {
            println!();
            break;
        };

        // Errors reset the VM but not the session.
        let _ = vm.interpret(&line);
    }
    EX_OK
}
