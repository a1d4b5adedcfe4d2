use std::env;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::resolver::{self, Resolution};

pub const BUILTINS: [&str; 5] = ["echo", "exit", "type", "pwd", "cd"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Echo,
    Exit,
    Type,
    Pwd,
    Cd,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        match name {
            "echo" => Some(Builtin::Echo),
            "exit" => Some(Builtin::Exit),
            "type" => Some(Builtin::Type),
            "pwd" => Some(Builtin::Pwd),
            "cd" => Some(Builtin::Cd),
            _ => None,
        }
    }
}

/// What a builtin left behind: a plain status, or a request to leave the
/// shell carrying the exit code.
#[derive(Debug, PartialEq, Eq)]
pub enum BuiltinStatus {
    Done(i32),
    Exit(i32),
}

pub fn run(builtin: Builtin, args: &[String]) -> BuiltinStatus {
    match builtin {
        Builtin::Echo => echo(args),
        Builtin::Exit => exit(args),
        Builtin::Type => type_of(args),
        Builtin::Pwd => pwd(),
        Builtin::Cd => cd(args),
    }
}

fn echo(args: &[String]) -> BuiltinStatus {
    let mut out = io::stdout();
    if writeln!(out, "{}", args.join(" ")).and_then(|_| out.flush()).is_err() {
        eprintln!("echo: write error");
        return BuiltinStatus::Done(1);
    }
    BuiltinStatus::Done(0)
}

fn exit(args: &[String]) -> BuiltinStatus {
    // A missing or non-numeric argument exits with status 0.
    let code = args.first().and_then(|arg| arg.parse().ok()).unwrap_or(0);
    BuiltinStatus::Exit(code)
}

fn type_of(args: &[String]) -> BuiltinStatus {
    let mut out = io::stdout();
    let mut status = 0;
    for name in args {
        match resolver::resolve(name) {
            Resolution::Builtin(_) => {
                if writeln!(out, "{name} is a shell builtin").is_err() {
                    status = 1;
                }
            }
            Resolution::External(path) => {
                if writeln!(out, "{name} is {}", path.display()).is_err() {
                    status = 1;
                }
            }
            Resolution::NotFound => {
                eprintln!("{name}: not found");
                status = 1;
            }
        }
    }
    let _ = out.flush();
    BuiltinStatus::Done(status)
}

fn pwd() -> BuiltinStatus {
    match env::current_dir() {
        Ok(dir) => {
            let mut out = io::stdout();
            if writeln!(out, "{}", dir.display()).and_then(|_| out.flush()).is_err() {
                eprintln!("pwd: write error");
                return BuiltinStatus::Done(1);
            }
            BuiltinStatus::Done(0)
        }
        Err(err) => {
            eprintln!("pwd: {err}");
            BuiltinStatus::Done(1)
        }
    }
}

fn cd(args: &[String]) -> BuiltinStatus {
    let target = args.first().map(String::as_str).unwrap_or("~");
    let path = match expand_tilde(target) {
        Ok(path) => path,
        Err(message) => {
            eprintln!("cd: {message}");
            return BuiltinStatus::Done(1);
        }
    };
    if env::set_current_dir(&path).is_err() {
        eprintln!("cd: {}: No such file or directory", path.display());
        return BuiltinStatus::Done(1);
    }
    BuiltinStatus::Done(0)
}

fn expand_tilde(path: &str) -> Result<PathBuf, String> {
    if path == "~" {
        env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| "HOME not set".to_string())
    } else if let Some(rest) = path.strip_prefix("~/") {
        env::var("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .map_err(|_| "HOME not set".to_string())
    } else {
        Ok(PathBuf::from(path))
    }
}
