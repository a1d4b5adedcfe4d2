use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{FromRawFd, IntoRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use thiserror::Error;

use crate::ast::{Pipeline, Redirect, Stage};
use crate::builtins::{self, Builtin, BuiltinStatus};
use crate::resolver::{self, Resolution};
use crate::tokenizer::RedirMode;

/// What executing a whole line left behind.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Status(i32),
    Exit(i32),
}

#[derive(Debug, Error)]
enum RedirError {
    #[error("{path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("cannot duplicate descriptor: {0}")]
    Dup(io::Error),
}

enum StageChild {
    Spawned(Child),
    Forked(libc::pid_t),
}

pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Executor
    }

    pub fn execute(&mut self, pipeline: &Pipeline) -> Outcome {
        match pipeline.stages.as_slice() {
            [stage] => self.run_single(stage),
            stages => self.run_pipeline(stages),
        }
    }

    /// A sole builtin stage runs in the shell process so that `cd` and
    /// `exit` can affect the shell itself; its redirections are applied to
    /// the shell's descriptors and restored afterwards.
    fn run_single(&mut self, stage: &Stage) -> Outcome {
        if let Some(builtin) = Builtin::from_name(&stage.words[0]) {
            let guard = match RedirGuard::apply(stage) {
                Ok(guard) => guard,
                Err(err) => {
                    eprintln!("psh: {err}");
                    return Outcome::Status(1);
                }
            };
            let result = builtins::run(builtin, &stage.words[1..]);
            drop(guard);
            return match result {
                BuiltinStatus::Done(status) => Outcome::Status(status),
                BuiltinStatus::Exit(code) => Outcome::Exit(code),
            };
        }
        self.run_external(stage)
    }

    fn run_external(&mut self, stage: &Stage) -> Outcome {
        let path = match resolver::resolve(&stage.words[0]) {
            Resolution::External(path) => path,
            _ => {
                eprintln!("{}: command not found", stage.words[0]);
                return Outcome::Status(127);
            }
        };

        let mut cmd = Command::new(&path);
        cmd.arg0(&stage.words[0]).args(&stage.words[1..]);
        if let Err(err) = wire_redirections(&mut cmd, stage) {
            eprintln!("psh: {err}");
            return Outcome::Status(1);
        }

        match cmd.spawn() {
            Ok(mut child) => match child.wait() {
                Ok(status) => Outcome::Status(exit_code(status)),
                Err(err) => {
                    eprintln!("psh: {}: {err}", stage.words[0]);
                    Outcome::Status(1)
                }
            },
            Err(err) => {
                eprintln!("psh: {}: {err}", stage.words[0]);
                Outcome::Status(1)
            }
        }
    }

    fn run_pipeline(&mut self, stages: &[Stage]) -> Outcome {
        let _ = io::stdout().flush();

        let pipes = match make_pipes(stages.len() - 1) {
            Ok(pipes) => pipes,
            Err(err) => {
                eprintln!("psh: pipe: {err}");
                return Outcome::Status(1);
            }
        };

        let mut children = Vec::with_capacity(stages.len());
        for (i, stage) in stages.iter().enumerate() {
            let stdin_pipe = if i > 0 { Some(pipes[i - 1].0) } else { None };
            let stdout_pipe = if i + 1 < stages.len() { Some(pipes[i].1) } else { None };
            children.push(self.spawn_stage(stage, stdin_pipe, stdout_pipe, &pipes));
        }

        // Once every stage is launched the parent must hold no pipe ends,
        // or downstream stages would never see EOF.
        for &(read_end, write_end) in &pipes {
            unsafe {
                libc::close(read_end);
                libc::close(write_end);
            }
        }

        let count = children.len();
        let mut last_status = 0;
        for (i, child) in children.into_iter().enumerate() {
            let status = match child {
                Some(StageChild::Spawned(mut child)) => match child.wait() {
                    Ok(status) => exit_code(status),
                    Err(_) => 1,
                },
                Some(StageChild::Forked(pid)) => wait_forked(pid),
                None => 127,
            };
            if i + 1 == count {
                last_status = status;
            }
        }
        Outcome::Status(last_status)
    }

    fn spawn_stage(
        &mut self,
        stage: &Stage,
        stdin_pipe: Option<RawFd>,
        stdout_pipe: Option<RawFd>,
        pipes: &[(RawFd, RawFd)],
    ) -> Option<StageChild> {
        if let Some(builtin) = Builtin::from_name(&stage.words[0]) {
            return fork_builtin(builtin, stage, stdin_pipe, stdout_pipe, pipes);
        }

        let path = match resolver::resolve(&stage.words[0]) {
            Resolution::External(path) => path,
            _ => {
                eprintln!("{}: command not found", stage.words[0]);
                return None;
            }
        };

        let mut cmd = Command::new(&path);
        cmd.arg0(&stage.words[0]).args(&stage.words[1..]);

        // Pipe ends are wired first; a file redirection below supersedes
        // the pipe for that stream.
        if stage.stdin_redirect.is_none() {
            if let Some(fd) = stdin_pipe {
                cmd.stdin(dup_for_child(fd)?);
            }
        }
        if stage.stdout_redirect.is_none() {
            if let Some(fd) = stdout_pipe {
                cmd.stdout(dup_for_child(fd)?);
            }
        }
        if let Err(err) = wire_redirections(&mut cmd, stage) {
            eprintln!("psh: {err}");
            return None;
        }

        match cmd.spawn() {
            Ok(child) => Some(StageChild::Spawned(child)),
            Err(err) => {
                eprintln!("psh: {}: {err}", stage.words[0]);
                None
            }
        }
    }
}

/// Run a builtin as one stage of a pipeline. The child wires its pipe ends
/// onto stdin/stdout, drops every pipe descriptor, lets file redirections
/// override the wiring, then exits with the builtin's status. `cd` and
/// `exit` here only affect the child.
fn fork_builtin(
    builtin: Builtin,
    stage: &Stage,
    stdin_pipe: Option<RawFd>,
    stdout_pipe: Option<RawFd>,
    pipes: &[(RawFd, RawFd)],
) -> Option<StageChild> {
    let _ = io::stdout().flush();
    match unsafe { libc::fork() } {
        -1 => {
            eprintln!("psh: fork: {}", io::Error::last_os_error());
            None
        }
        0 => {
            if let Some(fd) = stdin_pipe {
                unsafe { libc::dup2(fd, libc::STDIN_FILENO) };
            }
            if let Some(fd) = stdout_pipe {
                unsafe { libc::dup2(fd, libc::STDOUT_FILENO) };
            }
            for &(read_end, write_end) in pipes {
                unsafe {
                    libc::close(read_end);
                    libc::close(write_end);
                }
            }
            if let Err(err) = apply_redirections(stage) {
                eprintln!("psh: {err}");
                unsafe { libc::_exit(1) };
            }
            let status = match builtins::run(builtin, &stage.words[1..]) {
                BuiltinStatus::Done(status) => status,
                BuiltinStatus::Exit(code) => code,
            };
            let _ = io::stdout().flush();
            unsafe { libc::_exit(status) }
        }
        pid => Some(StageChild::Forked(pid)),
    }
}

/// Temporarily retargets the shell's standard descriptors for an in-process
/// builtin. Dropping the guard restores them in reverse order, so a failure
/// partway through setup unwinds whatever was already applied.
struct RedirGuard {
    saved: Vec<(RawFd, RawFd)>, // (saved duplicate, original target)
}

impl RedirGuard {
    fn apply(stage: &Stage) -> Result<Self, RedirError> {
        let mut guard = RedirGuard { saved: Vec::new() };
        if let Some(path) = &stage.stdin_redirect {
            guard.retarget(open_input(path)?, libc::STDIN_FILENO)?;
        }
        if let Some(redirect) = &stage.stdout_redirect {
            guard.retarget(open_target(redirect)?, libc::STDOUT_FILENO)?;
        }
        if let Some(redirect) = &stage.stderr_redirect {
            guard.retarget(open_target(redirect)?, libc::STDERR_FILENO)?;
        }
        Ok(guard)
    }

    fn retarget(&mut self, file: File, target: RawFd) -> Result<(), RedirError> {
        if target == libc::STDOUT_FILENO {
            let _ = io::stdout().flush();
        }
        let saved = unsafe { libc::dup(target) };
        if saved == -1 {
            return Err(RedirError::Dup(io::Error::last_os_error()));
        }
        if let Err(err) = replace_fd(file, target) {
            unsafe { libc::close(saved) };
            return Err(err);
        }
        self.saved.push((saved, target));
        Ok(())
    }
}

impl Drop for RedirGuard {
    fn drop(&mut self) {
        let _ = io::stdout().flush();
        while let Some((saved, target)) = self.saved.pop() {
            unsafe {
                libc::dup2(saved, target);
                libc::close(saved);
            }
        }
    }
}

/// Child-side redirection: no descriptor is saved, the process image is
/// about to be replaced or discarded anyway.
fn apply_redirections(stage: &Stage) -> Result<(), RedirError> {
    if let Some(path) = &stage.stdin_redirect {
        replace_fd(open_input(path)?, libc::STDIN_FILENO)?;
    }
    if let Some(redirect) = &stage.stdout_redirect {
        replace_fd(open_target(redirect)?, libc::STDOUT_FILENO)?;
    }
    if let Some(redirect) = &stage.stderr_redirect {
        replace_fd(open_target(redirect)?, libc::STDERR_FILENO)?;
    }
    Ok(())
}

fn replace_fd(file: File, target: RawFd) -> Result<(), RedirError> {
    let fd = file.into_raw_fd();
    let rc = unsafe { libc::dup2(fd, target) };
    let dup_err = io::Error::last_os_error();
    unsafe { libc::close(fd) };
    if rc == -1 {
        return Err(RedirError::Dup(dup_err));
    }
    Ok(())
}

/// Attach redirection targets of an external stage as plain `File` handles;
/// `Command` duplicates them onto the right descriptors in the child.
fn wire_redirections(cmd: &mut Command, stage: &Stage) -> Result<(), RedirError> {
    if let Some(path) = &stage.stdin_redirect {
        cmd.stdin(Stdio::from(open_input(path)?));
    }
    if let Some(redirect) = &stage.stdout_redirect {
        cmd.stdout(Stdio::from(open_target(redirect)?));
    }
    if let Some(redirect) = &stage.stderr_redirect {
        cmd.stderr(Stdio::from(open_target(redirect)?));
    }
    Ok(())
}

fn open_input(path: &Path) -> Result<File, RedirError> {
    File::open(path).map_err(|source| RedirError::Open {
        path: path.display().to_string(),
        source,
    })
}

fn open_target(redirect: &Redirect) -> Result<File, RedirError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o644);
    match redirect.mode {
        RedirMode::Truncate => options.truncate(true),
        RedirMode::Append => options.append(true),
    };
    options.open(&redirect.path).map_err(|source| RedirError::Open {
        path: redirect.path.display().to_string(),
        source,
    })
}

fn make_pipes(count: usize) -> io::Result<Vec<(RawFd, RawFd)>> {
    let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(count);
    for _ in 0..count {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
            let err = io::Error::last_os_error();
            for &(read_end, write_end) in &pipes {
                unsafe {
                    libc::close(read_end);
                    libc::close(write_end);
                }
            }
            return Err(err);
        }
        // Exec'd stages must not inherit unrelated pipe ends; the ends a
        // stage actually uses are re-duplicated without the flag.
        for &fd in &fds {
            unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
        }
        pipes.push((fds[0], fds[1]));
    }
    Ok(pipes)
}

fn dup_for_child(fd: RawFd) -> Option<Stdio> {
    let duped = unsafe { libc::dup(fd) };
    if duped == -1 {
        eprintln!("psh: dup: {}", io::Error::last_os_error());
        return None;
    }
    Some(unsafe { Stdio::from_raw_fd(duped) })
}

// 128+signal mirrors how sh-compatible shells report signal deaths.
fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => match status.signal() {
            Some(signal) => 128 + signal,
            None => 1,
        },
    }
}

fn wait_forked(pid: libc::pid_t) -> i32 {
    let mut status = 0;
    if unsafe { libc::waitpid(pid, &mut status, 0) } == -1 {
        return 1;
    }
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        1
    }
}
