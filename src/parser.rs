use crate::error::ParseError;
use crate::jobs::{Job, Process};
use crate::redirect::{self, Redirections};

/// Unquoted shell metacharacters the tokenizer splits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Pipe,
    Semicolon,
    Background,
    RedirectIn,
    RedirectOut,
    RedirectAppend,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Pipe => "|",
            Operator::Semicolon => ";",
            Operator::Background => "&",
            Operator::RedirectIn => "<",
            Operator::RedirectOut => ">",
            Operator::RedirectAppend => ">>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Operator(Operator),
}

/// States for the tokenizer state machine.
enum State {
    /// Between tokens; whitespace is skipped
    Normal,
    /// Building an unquoted word; whitespace ends it
    InWord,
    /// Inside double quotes; whitespace is preserved
    InDoubleQuote,
    /// Inside single quotes; everything is literal
    InSingleQuote,
}

/// Split a command line into words and operators. Quotes group words and
/// hide operators; a backslash makes the next character literal.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match (&state, ch) {
            (State::Normal | State::InWord, ' ' | '\t' | '\n' | '\r') => {
                if let State::InWord = state {
                    tokens.push(Token::Word(std::mem::take(&mut current)));
                }
                state = State::Normal;
            }
            (State::Normal | State::InWord, '|' | ';' | '&' | '<' | '>') => {
                if let State::InWord = state {
                    tokens.push(Token::Word(std::mem::take(&mut current)));
                }
                let op = match ch {
                    '|' => Operator::Pipe,
                    ';' => Operator::Semicolon,
                    '&' => Operator::Background,
                    '<' => Operator::RedirectIn,
                    _ if chars.peek() == Some(&'>') => {
                        chars.next();
                        Operator::RedirectAppend
                    }
                    _ => Operator::RedirectOut,
                };
                tokens.push(Token::Operator(op));
                state = State::Normal;
            }
            (State::Normal | State::InWord, '"') => {
                state = State::InDoubleQuote;
            }
            (State::Normal | State::InWord, '\'') => {
                state = State::InSingleQuote;
            }
            (State::Normal | State::InWord, '\\') => {
                current.push(chars.next().unwrap_or('\\'));
                state = State::InWord;
            }
            (State::Normal | State::InWord, c) => {
                current.push(c);
                state = State::InWord;
            }

            (State::InDoubleQuote, '"') => {
                // "" is a valid empty argument, so the word is open now.
                state = State::InWord;
            }
            (State::InDoubleQuote, '\\') => match chars.peek() {
                Some(&c) if matches!(c, '"' | '\\' | '$' | '`') => {
                    current.push(c);
                    chars.next();
                }
                _ => current.push('\\'),
            },
            (State::InDoubleQuote, c) => {
                current.push(c);
            }

            (State::InSingleQuote, '\'') => {
                state = State::InWord;
            }
            (State::InSingleQuote, c) => {
                current.push(c);
            }
        }
    }

    // An unclosed quote keeps whatever it collected.
    if !matches!(state, State::Normal) {
        tokens.push(Token::Word(current));
    }

    tokens
}

/// Parse one input line into jobs, one per `;`- or `&`-terminated segment.
/// Blank input yields no jobs.
pub fn parse_line(input: &str) -> Result<Vec<Job>, ParseError> {
    let mut jobs = Vec::new();
    let mut segment: Vec<Token> = Vec::new();

    for token in tokenize(input) {
        match token {
            Token::Operator(op @ (Operator::Semicolon | Operator::Background)) => {
                if segment.is_empty() {
                    return Err(ParseError::EmptyCommand(op.as_str().to_string()));
                }
                let foreground = op == Operator::Semicolon;
                jobs.push(build_job(std::mem::take(&mut segment), foreground)?);
            }
            other => segment.push(other),
        }
    }

    if !segment.is_empty() {
        jobs.push(build_job(segment, true)?);
    }

    Ok(jobs)
}

fn build_job(tokens: Vec<Token>, foreground: bool) -> Result<Job, ParseError> {
    let command_text = render(&tokens);
    let stages: Vec<&[Token]> = tokens
        .split(|t| *t == Token::Operator(Operator::Pipe))
        .collect();
    let last = stages.len() - 1;

    let mut processes = Vec::with_capacity(stages.len());
    for (i, stage) in stages.into_iter().enumerate() {
        let Redirections {
            argv,
            input,
            output,
        } = redirect::extract_redirections(stage)?;

        if argv.is_empty() {
            return Err(ParseError::EmptyCommand(Operator::Pipe.as_str().to_string()));
        }
        if input.is_some() && i != 0 {
            return Err(ParseError::MisplacedRedirect(Operator::RedirectIn.as_str().to_string()));
        }
        if output.is_some() && i != last {
            return Err(ParseError::MisplacedRedirect(Operator::RedirectOut.as_str().to_string()));
        }

        let mut process = Process::new(argv);
        process.input_file = input.map(Into::into);
        process.output_file = output.map(Into::into);
        processes.push(process);
    }

    Ok(Job::new(processes, command_text, foreground))
}

/// Rebuild readable command text from tokens, for status lines.
fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| match token {
            Token::Word(w) if w.is_empty() || w.contains(char::is_whitespace) => format!("'{w}'"),
            Token::Word(w) => w.clone(),
            Token::Operator(op) => op.as_str().to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::StdioMode;
    use std::path::PathBuf;

    fn words(input: &str) -> Vec<String> {
        tokenize(input)
            .into_iter()
            .map(|t| match t {
                Token::Word(w) => w,
                Token::Operator(op) => op.as_str().to_string(),
            })
            .collect()
    }

    #[test]
    fn simple_command() {
        assert_eq!(words("echo hello world"), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn quotes_preserve_spaces_and_hide_operators() {
        assert_eq!(words(r#"echo "a | b" 'c; d'"#), vec!["echo", "a | b", "c; d"]);
        assert_eq!(
            tokenize("echo '>'"),
            vec![Token::Word("echo".into()), Token::Word(">".into())]
        );
    }

    #[test]
    fn backslash_escapes() {
        assert_eq!(words(r"echo hello\ world"), vec!["echo", "hello world"]);
        assert_eq!(words(r#""hello\"world""#), vec![r#"hello"world"#]);
        assert_eq!(words(r"foo\"), vec![r"foo\"]);
    }

    #[test]
    fn empty_quoted_args_survive() {
        assert_eq!(words(r#"cmd "" ''"#), vec!["cmd", "", ""]);
    }

    #[test]
    fn operators_split_attached_words() {
        assert_eq!(
            words("a|b>>out<in;c&"),
            vec!["a", "|", "b", ">>", "out", "<", "in", ";", "c", "&"]
        );
    }

    #[test]
    fn blank_line_yields_no_jobs() {
        assert!(parse_line("").unwrap().is_empty());
        assert!(parse_line("   \t").unwrap().is_empty());
    }

    #[test]
    fn pipeline_becomes_one_job() {
        let jobs = parse_line("ls -l | grep rs | wc -l").unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert!(job.foreground);
        assert_eq!(job.processes.len(), 3);
        assert_eq!(job.processes[1].argv, vec!["grep", "rs"]);
        assert_eq!(job.command_text, "ls -l | grep rs | wc -l");
        assert_eq!(job.pgid, None);
    }

    #[test]
    fn segments_and_background_flag() {
        let jobs = parse_line("sleep 10 & echo hi; jobs").unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(!jobs[0].foreground);
        assert_eq!(jobs[0].command_text, "sleep 10");
        assert!(jobs[1].foreground);
        assert_eq!(jobs[2].leading_program(), "jobs");
    }

    #[test]
    fn redirections_land_on_pipeline_ends() {
        let jobs = parse_line("sort < in.txt | uniq >> out.txt").unwrap();
        let job = &jobs[0];
        assert_eq!(job.stdin_mode, StdioMode::File);
        assert_eq!(job.stdout_mode, StdioMode::File);
        assert_eq!(job.processes[0].input_file, Some(PathBuf::from("in.txt")));
        assert_eq!(job.processes[1].output_file, Some(PathBuf::from("out.txt")));
        assert_eq!(job.command_text, "sort < in.txt | uniq >> out.txt");
    }

    #[test]
    fn misplaced_redirections_are_rejected() {
        assert_eq!(
            parse_line("a > out | b").unwrap_err(),
            ParseError::MisplacedRedirect(">".into())
        );
        assert_eq!(
            parse_line("a | b < in").unwrap_err(),
            ParseError::MisplacedRedirect("<".into())
        );
    }

    #[test]
    fn empty_segments_are_syntax_errors() {
        assert_eq!(parse_line("; ls").unwrap_err(), ParseError::EmptyCommand(";".into()));
        assert_eq!(parse_line("ls | | wc").unwrap_err(), ParseError::EmptyCommand("|".into()));
        assert_eq!(parse_line("ls |").unwrap_err(), ParseError::EmptyCommand("|".into()));
        assert!(parse_line("&").is_err());
    }

    #[test]
    fn command_text_quotes_words_with_spaces() {
        let jobs = parse_line("echo 'a b' \"\"").unwrap();
        assert_eq!(jobs[0].command_text, "echo 'a b' ''");
        assert_eq!(jobs[0].processes[0].argv, vec!["echo", "a b", ""]);
    }
}
