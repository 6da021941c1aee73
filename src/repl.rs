use crate::evaluator::Evaluator;
use crate::runner;
use std::io::{self, Write};

/// Interactive prompt. One evaluator persists across lines, so top-level
/// declarations accumulate in the same global environment.
pub fn start() {
    println!("Sprig Interpreter v0.1.0");
    println!("Type 'exit' or press Ctrl+C to quit");
    println!();

    let mut evaluator = Evaluator::new();

    loop {
        print!("~#: ");
        io::stdout().flush().unwrap();

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // EOF reached (Ctrl+D or piped input ended)
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    println!("Goodbye!");
                    break;
                }

                // Errors are reported inline; the REPL keeps going either way
                runner::run(line, None, &mut evaluator, true);
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}
