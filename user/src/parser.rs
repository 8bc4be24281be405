//! Command-line parser
//!
//! Grammar: whitespace-separated words, at most one `< file` and one
//! `> file` or `>> file`, and an optional trailing `&`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Token in a position where it is not allowed
    UnexpectedToken(String),
    /// Redirection operator with no file after it
    MissingFileName(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken(token) => write!(f, "unexpected token `{token}`"),
            ParseError::MissingFileName(op) => write!(f, "missing file name after `{op}`"),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    pub argv: Vec<String>,
    pub stdin_file: Option<String>,
    pub stdout_file: Option<String>,
    /// `>>` rather than `>`
    pub append: bool,
    pub background: bool,
}

impl ParsedCommand {
    pub fn name(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }
}

/// Command text as shown in job messages, without the `&`
impl fmt::Display for ParsedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))?;
        if let Some(file) = &self.stdin_file {
            write!(f, " < {file}")?;
        }
        if let Some(file) = &self.stdout_file {
            let op = if self.append { ">>" } else { ">" };
            write!(f, " {op} {file}")?;
        }
        Ok(())
    }
}

fn is_operator(token: &str) -> bool {
    matches!(token, "<" | ">" | ">>" | "&")
}

/// Parses one line. A blank line gives `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ParsedCommand>, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut command = ParsedCommand::default();
    let mut iter = tokens.iter().copied().enumerate();
    while let Some((index, token)) = iter.next() {
        match token {
            "&" => {
                if index + 1 != tokens.len() {
                    return Err(ParseError::UnexpectedToken(token.to_string()));
                }
                command.background = true;
            }
            "<" | ">" | ">>" => {
                let file = match iter.next() {
                    Some((_, file)) if !is_operator(file) => file.to_string(),
                    _ => return Err(ParseError::MissingFileName(token.to_string())),
                };
                let slot = if token == "<" {
                    &mut command.stdin_file
                } else {
                    command.append = token == ">>";
                    &mut command.stdout_file
                };
                if slot.replace(file).is_some() {
                    return Err(ParseError::UnexpectedToken(token.to_string()));
                }
            }
            word => command.argv.push(word.to_string()),
        }
    }

    if command.argv.is_empty() {
        return Err(ParseError::UnexpectedToken(tokens[0].to_string()));
    }
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_and_background() {
        let command = parse("sleep 5 &").unwrap().unwrap();
        assert_eq!(command.argv, vec!["sleep", "5"]);
        assert!(command.background);
        assert_eq!(command.to_string(), "sleep 5");
    }

    #[test]
    fn redirections() {
        let command = parse("cat < in >> out").unwrap().unwrap();
        assert_eq!(command.stdin_file.as_deref(), Some("in"));
        assert_eq!(command.stdout_file.as_deref(), Some("out"));
        assert!(command.append);
        assert_eq!(command.to_string(), "cat < in >> out");
    }

    #[test]
    fn blank_line() {
        assert_eq!(parse("   \t "), Ok(None));
    }

    #[test]
    fn errors() {
        assert_eq!(parse("cat <"), Err(ParseError::MissingFileName("<".into())));
        assert_eq!(parse("echo > &"), Err(ParseError::MissingFileName(">".into())));
        assert_eq!(parse("sleep & 1"), Err(ParseError::UnexpectedToken("&".into())));
        assert_eq!(parse("> out"), Err(ParseError::UnexpectedToken(">".into())));
        assert_eq!(parse("cat > a > b"), Err(ParseError::UnexpectedToken(">".into())));
    }
}
