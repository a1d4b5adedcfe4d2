use thiserror::Error;

/// Upper bound on the number of tokens a single line may produce.
pub const MAX_TOKENS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Operator(Operator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Pipe,                                            // |
    RedirIn,                                         // <
    RedirOut { stream: OutStream, mode: RedirMode }, // >, >>, 1>, 1>>, 2>, 2>>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirMode {
    Truncate,
    Append,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("unterminated single quote")]
    UnterminatedSingleQuote,
    #[error("unterminated double quote")]
    UnterminatedDoubleQuote,
    #[error("too many tokens on one line")]
    TokenLimitExceeded,
}

/// Split a raw input line into words and operator tokens.
///
/// Single quotes preserve everything up to the closing quote. Inside double
/// quotes a backslash only escapes `"`, `\`, `$` and backtick; before any
/// other character both characters are kept. Unquoted backslash escapes the
/// next character, which is how spaces, quotes and operators get into words.
/// The quote characters themselves never reach the output.
pub fn tokenize(line: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut buf = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_single {
            if c == '\'' {
                in_single = false;
            } else {
                buf.push(c);
            }
            continue;
        }

        if in_double {
            match c {
                '"' => in_double = false,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\' | '$' | '`')) => buf.push(next),
                    Some(next) => {
                        buf.push('\\');
                        buf.push(next);
                    }
                    None => buf.push('\\'),
                },
                _ => buf.push(c),
            }
            continue;
        }

        match c {
            '\\' => match chars.next() {
                Some(next) => buf.push(next),
                None => buf.push('\\'),
            },
            '\'' => in_single = true,
            '"' => in_double = true,
            // A stream-selecting digit only starts an operator at a word
            // boundary: `a2>b` is the word `a2` followed by `>`.
            '1' | '2' => {
                if buf.is_empty() && chars.peek() == Some(&'>') {
                    chars.next();
                    let mode = take_append(&mut chars);
                    let stream = if c == '1' { OutStream::Stdout } else { OutStream::Stderr };
                    tokens.push(Token::Operator(Operator::RedirOut { stream, mode }));
                } else {
                    buf.push(c);
                }
            }
            '>' => {
                flush_word(&mut buf, &mut tokens);
                let mode = take_append(&mut chars);
                tokens.push(Token::Operator(Operator::RedirOut {
                    stream: OutStream::Stdout,
                    mode,
                }));
            }
            '<' => {
                flush_word(&mut buf, &mut tokens);
                tokens.push(Token::Operator(Operator::RedirIn));
            }
            '|' => {
                flush_word(&mut buf, &mut tokens);
                tokens.push(Token::Operator(Operator::Pipe));
            }
            c if c.is_whitespace() => flush_word(&mut buf, &mut tokens),
            c => buf.push(c),
        }

        if tokens.len() > MAX_TOKENS {
            return Err(TokenizeError::TokenLimitExceeded);
        }
    }

    if in_single {
        return Err(TokenizeError::UnterminatedSingleQuote);
    }
    if in_double {
        return Err(TokenizeError::UnterminatedDoubleQuote);
    }

    flush_word(&mut buf, &mut tokens);
    if tokens.len() > MAX_TOKENS {
        return Err(TokenizeError::TokenLimitExceeded);
    }
    Ok(tokens)
}

fn flush_word(buf: &mut String, tokens: &mut Vec<Token>) {
    if !buf.is_empty() {
        tokens.push(Token::Word(std::mem::take(buf)));
    }
}

fn take_append(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> RedirMode {
    if chars.peek() == Some(&'>') {
        chars.next();
        RedirMode::Append
    } else {
        RedirMode::Truncate
    }
}
