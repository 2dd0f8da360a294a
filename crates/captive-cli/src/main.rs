mod modules;

use std::{collections::HashMap, env, fs, process::ExitCode, time::Instant};

use captive::{evaluate, repr, EvalOptions, StdPrint};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let file_path = if args.len() > 1 { &args[1] } else { "example.py" };
    let code = match read_file(file_path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Everything past the script path is an authorized import prefix, e.g.
    // `captive script.py math random`. No flag parsing: the binary exists to
    // demonstrate the library, not to grow its own configuration surface.
    let authorized_imports = args.iter().skip(2).cloned().collect();

    let mut stdout = StdPrint;
    let mut options = EvalOptions::new(&mut stdout);
    options.authorized_imports = authorized_imports;
    options.modules = HashMap::from([
        ("math".to_string(), modules::math_module()),
        ("random".to_string(), modules::random_module()),
    ]);

    let start = Instant::now();
    match evaluate(&code, options) {
        Ok(value) => {
            let elapsed = start.elapsed();
            eprintln!("success after: {elapsed:?}\n{}", repr(&value));
            ExitCode::SUCCESS
        }
        Err(err) => {
            let elapsed = start.elapsed();
            eprintln!("error after: {elapsed:?}\n{err}");
            ExitCode::FAILURE
        }
    }
}

fn read_file(file_path: &str) -> Result<String, String> {
    eprintln!("reading file: {file_path}");
    match fs::metadata(file_path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("{file_path} is not a file"));
            }
        }
        Err(err) => return Err(format!("reading {file_path}: {err}")),
    }
    fs::read_to_string(file_path).map_err(|err| format!("reading file: {err}"))
}
