use crate::error::SprigError;
use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::resolver::Resolver;

/// Outcome of one run, for the driver's exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    StaticError,
    RuntimeError,
}

/// Runs a source text through lex → parse → resolve → evaluate against the
/// given evaluator, short-circuiting at the first stage that reports any
/// error. The evaluator is shared across calls so that REPL declarations
/// accumulate in one global environment.
pub fn run(
    source: &str,
    filename: Option<&str>,
    evaluator: &mut Evaluator,
    echo: bool,
) -> RunStatus {
    let tokens = match Lexer::new(source.to_string()).scan_tokens() {
        Ok(tokens) => tokens,
        Err(errors) => {
            report_all(&errors, source, filename);
            return RunStatus::StaticError;
        }
    };

    let program = match Parser::new(tokens).parse() {
        Ok(program) => program,
        Err(errors) => {
            report_all(&errors, source, filename);
            return RunStatus::StaticError;
        }
    };

    let resolutions = match Resolver::new().resolve(&program) {
        Ok(resolutions) => resolutions,
        Err(errors) => {
            report_all(&errors, source, filename);
            return RunStatus::StaticError;
        }
    };
    evaluator.add_resolutions(resolutions);

    match evaluator.interpret(&program, echo) {
        Ok(()) => RunStatus::Ok,
        Err(error) => {
            error.report(source, filename);
            RunStatus::RuntimeError
        }
    }
}

fn report_all(errors: &[SprigError], source: &str, filename: Option<&str>) {
    for error in errors {
        error.report(source, filename);
    }
}
