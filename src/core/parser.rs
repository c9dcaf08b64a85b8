// src/core/parser.rs

use std::mem;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unterminated quote.")]
    UnterminatedQuote,
    #[error("Missing command near '{0}'.")]
    EmptyCommand(String),
    #[error("Operator '{0}' is not supported.")]
    Unsupported(String),
}

/// One command and its words, before any alias or script resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

/// Commands joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

/// Pipelines joined by `&&`: the first nonzero result stops the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub pipelines: Vec<Pipeline>,
}

/// A whole input line: statements separated by `;`, run unconditionally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine {
    pub statements: Vec<Statement>,
}

impl CommandLine {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[derive(Default)]
struct LineBuilder {
    statements: Vec<Statement>,
    pipelines: Vec<Pipeline>,
    commands: Vec<Command>,
    words: String,
    last_operator: Option<&'static str>,
}

impl LineBuilder {
    fn push_command(&mut self) -> Result<(), ParseError> {
        let words = shlex::split(&self.words).ok_or(ParseError::UnterminatedQuote)?;
        self.words.clear();

        let mut words = words.into_iter();
        let name = words.next().ok_or_else(|| {
            ParseError::EmptyCommand(self.last_operator.unwrap_or(";").to_string())
        })?;
        self.commands.push(Command {
            name,
            args: words.collect(),
        });
        Ok(())
    }

    fn push_pipeline(&mut self) -> Result<(), ParseError> {
        self.push_command()?;
        self.pipelines.push(Pipeline {
            commands: mem::take(&mut self.commands),
        });
        Ok(())
    }

    /// Closes the current statement. A statement with no words at all is
    /// dropped, so `a ;` and a blank line are fine.
    fn push_statement(&mut self) -> Result<(), ParseError> {
        if self.words.trim().is_empty() && self.commands.is_empty() && self.pipelines.is_empty() {
            self.words.clear();
            return Ok(());
        }
        self.push_pipeline()?;
        self.statements.push(Statement {
            pipelines: mem::take(&mut self.pipelines),
        });
        Ok(())
    }
}

/// Splits a line into statements, pipelines and commands.
///
/// Operators are only recognised outside quotes and when not escaped with a
/// backslash. Words are split with POSIX shell quoting rules.
pub fn parse_line(line: &str) -> Result<CommandLine, ParseError> {
    let mut builder = LineBuilder::default();
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(open) = quote {
            builder.words.push(c);
            if c == open {
                quote = None;
            } else if c == '\\' && open == '"' {
                if let Some(escaped) = chars.next() {
                    builder.words.push(escaped);
                }
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                builder.words.push(c);
            }
            '\\' => {
                builder.words.push(c);
                if let Some(escaped) = chars.next() {
                    builder.words.push(escaped);
                }
            }
            ';' => {
                builder.push_statement()?;
                builder.last_operator = Some(";");
            }
            '|' => {
                if chars.peek() == Some(&'|') {
                    return Err(ParseError::Unsupported("||".to_string()));
                }
                builder.push_command()?;
                builder.last_operator = Some("|");
            }
            '&' => {
                if chars.next_if_eq(&'&').is_none() {
                    return Err(ParseError::Unsupported("&".to_string()));
                }
                builder.push_pipeline()?;
                builder.last_operator = Some("&&");
            }
            _ => builder.words.push(c),
        }
    }

    if quote.is_some() {
        return Err(ParseError::UnterminatedQuote);
    }
    builder.push_statement()?;

    Ok(CommandLine {
        statements: builder.statements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str, args: &[&str]) -> Command {
        Command {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_simple_command() {
        let line = parse_line("ls -l /work").unwrap();
        assert_eq!(line.statements.len(), 1);
        assert_eq!(
            line.statements[0].pipelines[0].commands,
            vec![cmd("ls", &["-l", "/work"])]
        );
    }

    #[test]
    fn test_blank_lines_are_empty() {
        assert!(parse_line("").unwrap().is_empty());
        assert!(parse_line("   \t ").unwrap().is_empty());
        assert!(parse_line(" ; ").unwrap().is_empty());
    }

    #[test]
    fn test_operator_structure() {
        let line = parse_line("a | b && c ; d").unwrap();
        assert_eq!(line.statements.len(), 2);

        let first = &line.statements[0];
        assert_eq!(first.pipelines.len(), 2);
        assert_eq!(
            first.pipelines[0].commands,
            vec![cmd("a", &[]), cmd("b", &[])]
        );
        assert_eq!(first.pipelines[1].commands, vec![cmd("c", &[])]);

        assert_eq!(line.statements[1].pipelines[0].commands, vec![cmd("d", &[])]);
    }

    #[test]
    fn test_operators_inside_quotes_are_words() {
        let line = parse_line(r#"echo "a | b" 'c && d' e\;f"#).unwrap();
        assert_eq!(line.statements.len(), 1);
        assert_eq!(
            line.statements[0].pipelines[0].commands,
            vec![cmd("echo", &["a | b", "c && d", "e;f"])]
        );
    }

    #[test]
    fn test_escaped_quote_inside_double_quotes() {
        let line = parse_line(r#"echo "say \"hi\"""#).unwrap();
        assert_eq!(
            line.statements[0].pipelines[0].commands,
            vec![cmd("echo", &[r#"say "hi""#])]
        );
    }

    #[test]
    fn test_trailing_semicolon_is_allowed() {
        let line = parse_line("true;").unwrap();
        assert_eq!(line.statements.len(), 1);
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(parse_line("echo 'oops"), Err(ParseError::UnterminatedQuote));
        assert_eq!(parse_line("echo \"oops"), Err(ParseError::UnterminatedQuote));
    }

    #[test]
    fn test_dangling_operators() {
        assert_eq!(
            parse_line("a &&"),
            Err(ParseError::EmptyCommand("&&".to_string()))
        );
        assert_eq!(
            parse_line("a | | b"),
            Err(ParseError::EmptyCommand("|".to_string()))
        );
        assert_eq!(
            parse_line("| b"),
            Err(ParseError::EmptyCommand(";".to_string()))
        );
    }

    #[test]
    fn test_unsupported_operators() {
        assert_eq!(
            parse_line("a || b"),
            Err(ParseError::Unsupported("||".to_string()))
        );
        assert_eq!(
            parse_line("sleep 5 &"),
            Err(ParseError::Unsupported("&".to_string()))
        );
    }
}
