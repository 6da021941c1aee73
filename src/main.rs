mod ast;
mod error;
mod evaluator;
mod lexer;
mod natives;
mod parser;
mod repl;
mod resolver;
mod runner;
mod value;

use clap::{Arg, Command};
use evaluator::Evaluator;
use runner::RunStatus;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let matches = Command::new("sprig")
        .about("A tree-walking interpreter for the Sprig scripting language")
        .arg(
            Arg::new("file")
                .help("The script file to execute")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Start in interactive REPL mode")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(file_path) = matches.get_one::<String>("file") {
        run_file(file_path);
    } else {
        repl::start();
    }
}

fn run_file(path: &str) {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        process::exit(64);
    }

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Error reading file '{}': {}", path.display(), error);
            process::exit(64);
        }
    };

    let mut evaluator = Evaluator::new();
    match runner::run(&source, path.to_str(), &mut evaluator, false) {
        RunStatus::Ok => {}
        RunStatus::StaticError => process::exit(65),
        RunStatus::RuntimeError => process::exit(70),
    }
}
