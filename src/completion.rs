use std::fs;
use std::path::{Path, PathBuf};

use rustyline::completion::{Completer as RustylineCompleter, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper, Result};

use crate::builtins::BUILTINS;
use crate::resolver;

pub struct Completer {
    commands: Vec<String>,
}

impl Completer {
    pub fn new() -> Self {
        Self {
            commands: known_commands(),
        }
    }

    fn candidates(&self, line: &str, word_start: usize, word: &str) -> Vec<String> {
        if line[..word_start].trim().is_empty() {
            self.command_candidates(word)
        } else {
            file_candidates(word)
        }
    }

    fn command_candidates(&self, prefix: &str) -> Vec<String> {
        self.commands
            .iter()
            .filter(|command| command.starts_with(prefix))
            .cloned()
            .collect()
    }
}

fn known_commands() -> Vec<String> {
    let mut commands: Vec<String> = BUILTINS.iter().map(|name| name.to_string()).collect();

    if let Ok(path) = std::env::var("PATH") {
        for dir in path.split(':') {
            let Ok(entries) = fs::read_dir(dir) else { continue };
            for entry in entries.flatten() {
                if resolver::is_executable(&entry.path()) {
                    if let Some(name) = entry.file_name().to_str() {
                        commands.push(name.to_string());
                    }
                }
            }
        }
    }

    commands.sort();
    commands.dedup();
    commands
}

fn file_candidates(prefix: &str) -> Vec<String> {
    let path = Path::new(prefix);
    let (dir, stem) = if let Some(parent) = path.parent() {
        let parent = if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        };
        (parent, path.file_name().and_then(|s| s.to_str()).unwrap_or(""))
    } else {
        (PathBuf::from("."), prefix)
    };

    let mut completions = Vec::new();
    if let Ok(entries) = fs::read_dir(&dir) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(stem) {
                    let mut full_path = dir.join(name);
                    if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                        full_path.push(""); // trailing slash for directories
                    }
                    completions.push(full_path.to_string_lossy().into_owned());
                }
            }
        }
    }
    completions.sort();
    completions
}

impl Helper for Completer {}

impl RustylineCompleter for Completer {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Result<(usize, Vec<Pair>)> {
        let start = line[..pos].rfind(char::is_whitespace).map_or(0, |i| i + 1);
        let pairs = self
            .candidates(line, start, &line[start..pos])
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Highlighter for Completer {}

impl Hinter for Completer {
    type Hint = String;
}

impl Validator for Completer {}
