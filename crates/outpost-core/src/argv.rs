// SPDX-License-Identifier: MIT

//! Splits a manifest command line into argv, respecting single- and
//! double-quoted segments. Manifest commands are never shell-interpreted:
//! no globbing, no variable expansion, no redirections — only whitespace
//! splitting with quote-aware grouping.

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ArgvError {
    #[error("unterminated {0} quote")]
    UnterminatedQuote(&'static str),
}

/// Split `command` into argv entries. Single quotes take everything
/// literally; double quotes allow backslash-escaping of `"` and `\`.
/// Unquoted backslashes are literal (manifests are not shell scripts).
pub fn split(command: &str) -> Result<Vec<String>, ArgvError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(ArgvError::UnterminatedQuote("single")),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(next @ ('"' | '\\')) => current.push(next),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(ArgvError::UnterminatedQuote("double")),
                        },
                        Some(c) => current.push(c),
                        None => return Err(ArgvError::UnterminatedQuote("double")),
                    }
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        args.push(current);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_whitespace() {
        assert_eq!(split("echo hello world").unwrap(), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn collapses_runs_of_whitespace() {
        assert_eq!(split("echo   hello").unwrap(), vec!["echo", "hello"]);
    }

    #[test]
    fn keeps_single_quoted_segment_literal() {
        assert_eq!(split("echo 'a b  c'").unwrap(), vec!["echo", "a b  c"]);
    }

    #[test]
    fn double_quotes_support_escaping() {
        assert_eq!(split(r#"echo "a \"b\" c""#).unwrap(), vec!["echo", "a \"b\" c"]);
    }

    #[test]
    fn adjacent_quoted_and_unquoted_parts_join_into_one_arg() {
        assert_eq!(split(r#"echo foo'bar baz'qux"#).unwrap(), vec!["echo", "foobar bazqux"]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(split("echo 'oops"), Err(ArgvError::UnterminatedQuote("single")));
    }

    #[test]
    fn empty_command_yields_empty_argv() {
        assert_eq!(split("   ").unwrap(), Vec::<String>::new());
    }

    #[yare::parameterized(
        single_unterminated       = { "echo 'oops", "single" },
        double_unterminated       = { r#"echo "oops"#, "double" },
        double_unterminated_after_escape = { r#"echo "a\""#, "double" },
        single_unterminated_mid_word = { "foo'bar", "single" },
    )]
    fn unterminated_quotes_report_the_right_kind(command: &str, kind: &'static str) {
        assert_eq!(split(command), Err(ArgvError::UnterminatedQuote(kind)));
    }
}
