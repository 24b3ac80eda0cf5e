use std::env;
use std::fs;
use std::io::Write as _;
use std::process;

use monkey_parser::parse;
use monkey_vm::compiler::Compiler;
use monkey_vm::serialize;
use monkey_vm::vm::Vm;
use monkey_vm::{SymbolTable, Value};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        None => match read_embedded_bytecode() {
            Some(bytecode) => run_embedded(bytecode),
            None => run_repl(),
        },
        Some("help") | Some("-h") | Some("--help") => print_help(),
        Some("version") | Some("-v") | Some("--version") => println!("monkey {}", VERSION),
        Some("build") => run_build(&args[2..]),
        Some(path) => run_file(path),
    }
}

fn print_help() {
    println!("Usage:");
    println!("  monkey                           start the REPL");
    println!("  monkey <file>                     compile and run a source file");
    println!("  monkey build <file> [-o <out>]    compile to a self-contained executable");
    println!("  monkey help | -h | --help");
    println!("  monkey version | -v | --version");
}

fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("monkey: cannot read '{}': {}", path, e);
            process::exit(1);
        }
    };
    match monkey_vm::run(&source) {
        Ok(value) => println!("{}", value),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run_build(args: &[String]) {
    let Some(input) = args.first() else {
        eprintln!("monkey: build requires a source file");
        process::exit(1);
    };
    let output = match args.iter().position(|a| a == "-o") {
        Some(i) => match args.get(i + 1) {
            Some(out) => out.clone(),
            None => {
                eprintln!("monkey: -o requires a path");
                process::exit(1);
            }
        },
        None => input.strip_suffix(".mon").unwrap_or(input).to_string(),
    };

    let source = match fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("monkey: cannot read '{}': {}", input, e);
            process::exit(1);
        }
    };

    let (program, lex_errors, parse_errors) = parse(&source);
    for e in &lex_errors {
        eprintln!("[LexError] {}", e);
    }
    for e in &parse_errors {
        eprintln!("[ParseError] {}", e);
    }
    if !lex_errors.is_empty() || !parse_errors.is_empty() {
        process::exit(1);
    }

    let bytecode = match Compiler::new().compile(&program) {
        Ok(bc) => bc,
        Err(e) => {
            eprintln!("[CompileError] {}", e);
            process::exit(1);
        }
    };
    let serialized = match serialize::serialize_bytecode(&bytecode) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("monkey: {}", e);
            process::exit(1);
        }
    };

    let stub = match env::current_exe().and_then(fs::read) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("monkey: cannot read own executable to use as a stub: {}", e);
            process::exit(1);
        }
    };
    let image = serialize::embed_bytecode(&stub, &serialized);

    if let Err(e) = fs::write(&output, &image) {
        eprintln!("monkey: cannot write '{}': {}", output, e);
        process::exit(1);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = fs::metadata(&output) {
            let mut perms = meta.permissions();
            perms.set_mode(perms.mode() | 0o111);
            let _ = fs::set_permissions(&output, perms);
        }
    }
    println!("wrote {} ({} bytes)", output, image.len());
}

/// A `build` artifact is this same binary with a bytecode record appended
/// after its own image; a plain install of `monkey` has none. Checking for
/// one is how a single binary serves both as the CLI and as the stub every
/// built executable relaunches.
fn read_embedded_bytecode() -> Option<Vec<u8>> {
    let path = env::current_exe().ok()?;
    let bytes = fs::read(path).ok()?;
    serialize::extract_embedded(&bytes).map(|b| b.to_vec())
}

fn run_embedded(serialized: Vec<u8>) {
    let bytecode = match serialize::deserialize_bytecode(&serialized) {
        Ok(bc) => bc,
        Err(e) => {
            eprintln!("monkey: corrupt embedded bytecode: {}", e);
            process::exit(1);
        }
    };
    let mut vm = Vm::new(bytecode);
    if let Err(e) = vm.run() {
        eprintln!("[RuntimeError] {}", e);
        process::exit(1);
    }
}

fn run_repl() {
    use std::io::{self, BufRead};
    println!("Monkey REPL v{} — Ctrl-D to exit", VERSION);

    // A `Compiler` holds a scope stack that only ever grows; each line gets
    // its own instance seeded with the symbol table and constant pool the
    // previous line left behind, so `let` bindings resolve across lines
    // without re-compiling (or re-running) anything already evaluated.
    let mut state: Option<(SymbolTable, Vec<Value>)> = None;
    let mut globals: Vec<Value> = Vec::new();

    loop {
        print!(">> ");
        io::stdout().flush().unwrap();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("monkey: {}", e);
                break;
            }
        }
        if line.trim() == "exit" {
            break;
        }

        let (program, lex_errors, parse_errors) = parse(&line);
        if !lex_errors.is_empty() || !parse_errors.is_empty() {
            for e in &lex_errors {
                eprintln!("[LexError] {}", e);
            }
            for e in &parse_errors {
                eprintln!("[ParseError] {}", e);
            }
            continue;
        }

        let mut compiler = match state.take() {
            Some((symbols, constants)) => Compiler::new_with_state(symbols, constants),
            None => Compiler::new(),
        };

        match compiler.compile(&program) {
            Ok(bytecode) => {
                state = Some(compiler.into_state());
                let mut vm = Vm::new_with_global_store(bytecode, std::mem::take(&mut globals));
                match vm.run() {
                    Ok(()) => println!("{}", vm.last_popped_stack_elem()),
                    Err(e) => eprintln!("[RuntimeError] {}", e),
                }
                globals = vm.into_globals();
            }
            Err(e) => {
                state = Some(compiler.into_state());
                eprintln!("[CompileError] {}", e);
            }
        }
    }
}
