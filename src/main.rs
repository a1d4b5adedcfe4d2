use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Editor};

pub mod ast;
pub mod builtins;
pub mod completion;
pub mod executor;
pub mod parser;
pub mod resolver;
pub mod tokenizer;

fn main() {
    let config = Config::builder()
        .completion_type(CompletionType::List)
        .history_ignore_space(true)
        .history_ignore_dups(true)
        .unwrap()
        .build();
    let mut rl: Editor<completion::Completer, DefaultHistory> =
        Editor::with_config(config).unwrap();
    rl.set_helper(Some(completion::Completer::new()));

    let mut executor = executor::Executor::new();
    let mut last_status = 0;

    let exit_code = loop {
        match rl.readline("$ ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                if line.trim().is_empty() {
                    continue;
                }

                let tokens = match tokenizer::tokenize(&line) {
                    Ok(tokens) => tokens,
                    Err(err) => {
                        eprintln!("psh: {err}");
                        continue;
                    }
                };
                #[cfg(debug_assertions)]
                eprintln!("tokens: {tokens:?}");

                let pipeline = match parser::parse(&tokens) {
                    Ok(pipeline) => pipeline,
                    Err(err) => {
                        eprintln!("psh: {err}");
                        continue;
                    }
                };

                match executor.execute(&pipeline) {
                    executor::Outcome::Status(status) => last_status = status,
                    executor::Outcome::Exit(code) => break code,
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break last_status;
            }
            Err(err) => {
                eprintln!("psh: {err}");
                break last_status;
            }
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests;
