//! SQL script splitting.
//!
//! Backup files and restore scripts hold many statements in one text blob.
//! Rather than asking the wire protocol for multi-statement execution, the
//! executor splits a script client-side and runs one statement at a time.
//! [`split_statements`] is quote-aware: a `;` inside a string literal,
//! quoted identifier, or comment never splits.

/// Splits a SQL script into individual statements.
///
/// Splits on `;` outside of:
/// - single- and double-quoted string literals (honoring backslash escapes
///   and doubled quotes),
/// - backtick-quoted identifiers,
/// - `--` and `#` line comments, and `/* … */` block comments.
///
/// Fragments are trimmed; empty fragments (trailing `;`, blank lines between
/// statements) are dropped. Comment text inside a statement is preserved
/// verbatim — only the split positions are computed here.
#[must_use]
pub fn split_statements(script: &str) -> Vec<String> {
    #[derive(PartialEq)]
    enum State {
        Normal,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut escaped = false;
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                ';' => {
                    push_statement(&mut statements, &mut current);
                    continue;
                },
                '\'' | '"' | '`' => {
                    state = State::Quoted(c);
                    current.push(c);
                },
                '-' if chars.peek() == Some(&'-') => {
                    state = State::LineComment;
                    current.push(c);
                },
                '#' => {
                    state = State::LineComment;
                    current.push(c);
                },
                '/' if chars.peek() == Some(&'*') => {
                    state = State::BlockComment;
                    current.push(c);
                },
                _ => current.push(c),
            },
            State::Quoted(quote) => {
                current.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' && quote != '`' {
                    escaped = true;
                } else if c == quote {
                    // A doubled quote reads as close-then-reopen, which is
                    // exactly the literal's meaning; no lookahead needed.
                    state = State::Normal;
                }
            },
            State::LineComment => {
                current.push(c);
                if c == '\n' {
                    state = State::Normal;
                }
            },
            State::BlockComment => {
                current.push(c);
                if c == '/' && current.ends_with("*/") {
                    state = State::Normal;
                }
            },
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() && !is_only_comments(statement) {
        statements.push(statement.to_string());
    }
    current.clear();
}

/// Returns `true` when a fragment contains nothing but comments, so pure
/// comment blocks between statements are not replayed as statements.
fn is_only_comments(fragment: &str) -> bool {
    let mut rest = fragment.trim_start();
    loop {
        if rest.is_empty() {
            return true;
        }
        if let Some(after) = rest.strip_prefix("--").or_else(|| rest.strip_prefix('#')) {
            rest = after
                .split_once('\n')
                .map_or("", |(_, tail)| tail)
                .trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            match after.split_once("*/") {
                Some((_, tail)) => rest = tail.trim_start(),
                None => return true,
            }
        } else {
            return false;
        }
    }
}
