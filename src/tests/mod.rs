mod parser_tests;

use std::sync::{Mutex, MutexGuard};

use crate::executor::{Executor, Outcome};

// Tests that touch process-global state (cwd, standard descriptors, HOME)
// must not interleave.
static GLOBAL: Mutex<()> = Mutex::new(());

pub(crate) fn global_lock() -> MutexGuard<'static, ()> {
    GLOBAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn run_line(executor: &mut Executor, line: &str) -> Outcome {
    let tokens = crate::tokenizer::tokenize(line).expect("tokenize");
    let pipeline = crate::parser::parse(&tokens).expect("parse");
    executor.execute(&pipeline)
}
