//! Isolated evaluator for the assembled declaration subset.
//!
//! A small tree-walking interpreter: the assembled text is tokenized,
//! parsed and executed against a sandbox of stub globals, never against
//! real process state. The grammar covers exactly what the extracted
//! declarations use (`var`/`function`/`if`/`for`/`for-in`/`while`,
//! literals, member/index/call/assignment expressions).

pub mod ast;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod sandbox;
pub mod value;

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::vm::value::Value;

/// Hard wall-clock budget for one evaluation run.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("line {line}: parse error: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: `{name}` is not defined")]
    Undefined { name: String, line: usize },

    #[error("line {line}: {message}")]
    Type { line: usize, message: String },

    #[error("evaluation exceeded the {budget:?} execution budget")]
    Timeout { budget: Duration },
}

impl EvalError {
    /// Best-effort line into the assembled text, when one is known.
    pub fn line(&self) -> Option<usize> {
        match self {
            EvalError::Parse { line, .. }
            | EvalError::Undefined { line, .. }
            | EvalError::Type { line, .. } => Some(*line),
            EvalError::Timeout { .. } => None,
        }
    }
}

/// Top-level name/value bindings left behind by a successful run.
#[derive(Debug)]
pub struct Bindings {
    map: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }
}

/// Execute `assembled` inside a fresh sandbox and return its bindings.
pub fn evaluate(assembled: &str, budget: Duration) -> Result<Bindings, EvalError> {
    let tokens = lexer::tokenize(assembled)?;
    let program = parser::parse(tokens)?;

    let mut interp = interp::Interpreter::new(budget);
    sandbox::install(interp.globals_mut());
    interp.run(&program)?;

    Ok(Bindings {
        map: interp.into_globals(),
    })
}

/// Print the failure with the offending line and surrounding context so
/// the broken fragment is diagnosable from the debug artifact alone.
pub fn report_diagnostic(err: &EvalError, assembled: &str) {
    println!("evaluation failed: {err}");
    let Some(line) = err.line() else {
        return;
    };
    let lines: Vec<&str> = assembled.lines().collect();
    let first = line.saturating_sub(3);
    let last = (line + 2).min(lines.len());
    for (idx, text) in lines.iter().enumerate().take(last).skip(first) {
        let n = idx + 1;
        let marker = if n == line { ">" } else { " " };
        println!("{marker} {n:>5} | {text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_binds_independently() {
        let b = evaluate("var A = {x:1};\nvar B = {y:2};", DEFAULT_BUDGET).unwrap();
        let a = b.get("A").unwrap();
        let bb = b.get("B").unwrap();
        assert_eq!(a.get_property("x"), Some(Value::Num(1.0)));
        assert_eq!(a.get_property("y"), None);
        assert_eq!(bb.get_property("y"), Some(Value::Num(2.0)));
    }

    #[test]
    fn test_undefined_symbol_names_it() {
        let err = evaluate("var A = 1;\nmissingThing();", DEFAULT_BUDGET).unwrap_err();
        match err {
            EvalError::Undefined { name, line } => {
                assert_eq!(name, "missingThing");
                assert_eq!(line, 2);
            }
            other => panic!("expected Undefined, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_is_fatal() {
        let err = evaluate("while (true) {}", Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, EvalError::Timeout { .. }));
    }
}
