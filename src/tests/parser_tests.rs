use std::path::PathBuf;

use crate::ast::Pipeline;
use crate::parser::{parse, ParseError};
use crate::tokenizer::{tokenize, RedirMode};

fn parsed(line: &str) -> Result<Pipeline, ParseError> {
    parse(&tokenize(line).unwrap())
}

#[test]
fn test_words_and_redirections_separate() {
    let pipeline = parsed("echo hi > out.txt 2>> err.txt").unwrap();
    assert_eq!(pipeline.stages.len(), 1);

    let stage = &pipeline.stages[0];
    assert_eq!(stage.words, ["echo", "hi"]);

    let stdout = stage.stdout_redirect.as_ref().unwrap();
    assert_eq!(stdout.path, PathBuf::from("out.txt"));
    assert_eq!(stdout.mode, RedirMode::Truncate);

    let stderr = stage.stderr_redirect.as_ref().unwrap();
    assert_eq!(stderr.path, PathBuf::from("err.txt"));
    assert_eq!(stderr.mode, RedirMode::Append);
}

#[test]
fn test_stdin_redirection_is_recorded() {
    let pipeline = parsed("cat < input.txt").unwrap();
    let stage = &pipeline.stages[0];
    assert_eq!(stage.words, ["cat"]);
    assert_eq!(stage.stdin_redirect, Some(PathBuf::from("input.txt")));
}

#[test]
fn test_pipe_partitions_stages() {
    let pipeline = parsed("echo one | cat | cat").unwrap();
    assert_eq!(pipeline.stages.len(), 3);
    assert_eq!(pipeline.stages[0].words, ["echo", "one"]);
    assert_eq!(pipeline.stages[1].words, ["cat"]);
    assert_eq!(pipeline.stages[2].words, ["cat"]);
}

#[test]
fn test_redirection_before_command_word_is_legal() {
    let pipeline = parsed("> out.txt echo hi").unwrap();
    let stage = &pipeline.stages[0];
    assert_eq!(stage.words, ["echo", "hi"]);
    assert_eq!(
        stage.stdout_redirect.as_ref().unwrap().path,
        PathBuf::from("out.txt")
    );
}

#[test]
fn test_quoted_target_keeps_spaces() {
    let pipeline = parsed("echo hi > 'my file.txt'").unwrap();
    assert_eq!(
        pipeline.stages[0].stdout_redirect.as_ref().unwrap().path,
        PathBuf::from("my file.txt")
    );
}

#[test]
fn test_empty_pipe_stages_are_rejected() {
    assert_eq!(parsed("echo hi |"), Err(ParseError::EmptyPipeStage));
    assert_eq!(parsed("| echo hi"), Err(ParseError::EmptyPipeStage));
    assert_eq!(parsed("echo a | | echo b"), Err(ParseError::EmptyPipeStage));
}

#[test]
fn test_missing_redirect_target_is_rejected() {
    assert_eq!(parsed("echo hi >"), Err(ParseError::MissingRedirectTarget));
    assert_eq!(parsed("echo hi > > f"), Err(ParseError::MissingRedirectTarget));
    assert_eq!(parsed("cat <"), Err(ParseError::MissingRedirectTarget));
}

#[test]
fn test_duplicate_stream_redirection_is_rejected() {
    assert_eq!(
        parsed("echo a > f > g"),
        Err(ParseError::MultipleRedirections)
    );
    assert_eq!(
        parsed("echo a 2> f 2>> g"),
        Err(ParseError::MultipleRedirections)
    );
    // 1> addresses the same stream as a bare >.
    assert_eq!(
        parsed("echo a > f 1> g"),
        Err(ParseError::MultipleRedirections)
    );
    assert_eq!(parsed("cat < a < b"), Err(ParseError::MultipleRedirections));
}

#[test]
fn test_distinct_streams_may_both_redirect() {
    let pipeline = parsed("echo a > f 2> g").unwrap();
    let stage = &pipeline.stages[0];
    assert!(stage.stdout_redirect.is_some());
    assert!(stage.stderr_redirect.is_some());
}

#[test]
fn test_stage_without_command_is_rejected() {
    assert_eq!(parsed("> out.txt"), Err(ParseError::EmptyCommand));
    assert_eq!(parse(&[]), Err(ParseError::EmptyCommand));
}
