use crate::error::ParseError;
use crate::parser::{Operator, Token};

/// One pipeline stage with its redirect operators separated out.
#[derive(Debug, Default, PartialEq)]
pub struct Redirections {
    pub argv: Vec<String>,
    /// `< file`
    pub input: Option<String>,
    /// `> file` or `>> file`. Both create the file and append to it.
    pub output: Option<String>,
}

/// Separate redirect operators from regular arguments.
/// A later redirect of the same stream replaces an earlier one.
pub fn extract_redirections(tokens: &[Token]) -> Result<Redirections, ParseError> {
    let mut result = Redirections::default();
    let mut iter = tokens.iter();

    while let Some(token) = iter.next() {
        match token {
            Token::Word(word) => result.argv.push(word.clone()),
            Token::Operator(op @ Operator::RedirectIn) => {
                result.input = Some(expect_filename(iter.next(), *op)?);
            }
            Token::Operator(op @ (Operator::RedirectOut | Operator::RedirectAppend)) => {
                result.output = Some(expect_filename(iter.next(), *op)?);
            }
            Token::Operator(op) => {
                return Err(ParseError::EmptyCommand(op.as_str().to_string()));
            }
        }
    }

    Ok(result)
}

fn expect_filename(token: Option<&Token>, operator: Operator) -> Result<String, ParseError> {
    match token {
        Some(Token::Word(path)) => Ok(path.clone()),
        _ => Err(ParseError::MissingRedirectTarget(operator.as_str().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenize;

    fn extract(input: &str) -> Result<Redirections, ParseError> {
        extract_redirections(&tokenize(input))
    }

    #[test]
    fn simple_stdout_redirect() {
        let r = extract("echo hello > out.txt").unwrap();
        assert_eq!(r.argv, vec!["echo", "hello"]);
        assert_eq!(r.output.as_deref(), Some("out.txt"));
        assert_eq!(r.input, None);
    }

    #[test]
    fn append_redirect() {
        let r = extract("echo hello >> out.txt").unwrap();
        assert_eq!(r.output.as_deref(), Some("out.txt"));
    }

    #[test]
    fn stdin_redirect() {
        let r = extract("sort < data.txt").unwrap();
        assert_eq!(r.argv, vec!["sort"]);
        assert_eq!(r.input.as_deref(), Some("data.txt"));
    }

    #[test]
    fn both_directions_anywhere_in_stage() {
        let r = extract("< in.txt tr a-z A-Z > out.txt").unwrap();
        assert_eq!(r.argv, vec!["tr", "a-z", "A-Z"]);
        assert_eq!(r.input.as_deref(), Some("in.txt"));
        assert_eq!(r.output.as_deref(), Some("out.txt"));
    }

    #[test]
    fn missing_filename_is_error() {
        assert_eq!(
            extract("echo >").unwrap_err(),
            ParseError::MissingRedirectTarget(">".into())
        );
        assert_eq!(
            extract("cat < > x").unwrap_err(),
            ParseError::MissingRedirectTarget("<".into())
        );
    }

    #[test]
    fn quoted_operator_is_a_filename() {
        let r = extract("echo hi > '|'").unwrap();
        assert_eq!(r.output.as_deref(), Some("|"));
    }
}
