//! Grouping of a line's words into pipelines.
//!
//! The grammar is flat: `line = (pipeline '&')* pipeline?`, where
//! `pipeline = item ('|' item)*` and `item = name arg*`. The separators are
//! whole words, so `a|b` is a single word and not a pipe.

use thiserror::Error;

const PIPE: &str = "|";
const BACKGROUND: &str = "&";

/// One command invocation within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeItem {
    name: String,
    args: Vec<String>,
}

impl PipeItem {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// One or more commands connected by `|`, optionally sent to the background
/// with a trailing `&`.
///
/// Never empty: the parser only builds a pipeline once its first item parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<PipeItem>,
    background: bool,
}

impl Pipeline {
    pub fn stages(&self) -> &[PipeItem] {
        &self.stages
    }

    pub fn is_background(&self) -> bool {
        self.background
    }
}

/// Errors that can occur while grouping words into pipelines.
///
/// `index` is the position of the offending word in the line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A `|` or `&` stood where a command name was expected.
    #[error("sh: parse error near {index}: {token}")]
    UnexpectedSeparator { index: usize, token: String },
    /// The line ended right after a `|`.
    #[error("sh: parse error near {index}: unexpected end of line")]
    MissingCommand { index: usize },
}

/// Split a line into words on whitespace. No quoting or escaping.
pub fn split_words(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_owned).collect()
}

/// Group already split words into pipelines.
///
/// An empty word list yields no pipelines. Any error discards the whole line.
pub fn parse_pipelines<S: AsRef<str>>(words: &[S]) -> Result<Vec<Pipeline>, ParseError> {
    PipelineBuilder { words, pos: 0 }.build()
}

fn is_separator(word: &str) -> bool {
    word == PIPE || word == BACKGROUND
}

struct PipelineBuilder<'a, S> {
    words: &'a [S],
    pos: usize,
}

impl<S: AsRef<str>> PipelineBuilder<'_, S> {
    fn build(mut self) -> Result<Vec<Pipeline>, ParseError> {
        let mut pipelines = Vec::new();
        while self.peek().is_some() {
            pipelines.push(self.parse_pipeline()?);
        }
        Ok(pipelines)
    }

    fn peek(&self) -> Option<&str> {
        self.words.get(self.pos).map(AsRef::as_ref)
    }

    fn consume(&mut self) -> Option<&str> {
        let word = self.words.get(self.pos).map(AsRef::as_ref);
        if word.is_some() {
            self.pos += 1;
        }
        word
    }

    /// Parse a pipeline: item ('|' item)* '&'?
    fn parse_pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let mut stages = vec![self.parse_item()?];
        loop {
            match self.peek() {
                Some(PIPE) => {
                    self.consume();
                    stages.push(self.parse_item()?);
                }
                Some(BACKGROUND) => {
                    self.consume();
                    return Ok(Pipeline {
                        stages,
                        background: true,
                    });
                }
                _ => {
                    return Ok(Pipeline {
                        stages,
                        background: false,
                    });
                }
            }
        }
    }

    /// Parse an item: name arg*
    fn parse_item(&mut self) -> Result<PipeItem, ParseError> {
        let index = self.pos;
        let name = match self.consume() {
            None => return Err(ParseError::MissingCommand { index }),
            Some(word) if is_separator(word) => {
                return Err(ParseError::UnexpectedSeparator {
                    index,
                    token: word.to_owned(),
                });
            }
            Some(word) => word.to_owned(),
        };

        let mut args = Vec::new();
        while let Some(word) = self.peek() {
            if is_separator(word) {
                break;
            }
            args.push(word.to_owned());
            self.pos += 1;
        }

        Ok(PipeItem { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Vec<Pipeline>, ParseError> {
        parse_pipelines(&split_words(line))
    }

    fn item(name: &str, args: &[&str]) -> PipeItem {
        PipeItem::new(name, args.iter().copied())
    }

    #[test]
    fn test_pipe_joins_stages() {
        let pipelines = parse("echo a | echo b").unwrap();
        assert_eq!(pipelines.len(), 1);
        assert!(!pipelines[0].is_background());
        assert_eq!(
            pipelines[0].stages(),
            &[item("echo", &["a"]), item("echo", &["b"])]
        );
    }

    #[test]
    fn test_trailing_ampersand_backgrounds() {
        let pipelines = parse("echo a &").unwrap();
        assert_eq!(pipelines.len(), 1);
        assert!(pipelines[0].is_background());
        assert_eq!(pipelines[0].stages(), &[item("echo", &["a"])]);
    }

    #[test]
    fn test_ampersand_starts_new_pipeline() {
        let pipelines = parse("sleep 1 & ls -l | wc &   pwd").unwrap();
        assert_eq!(pipelines.len(), 3);

        assert!(pipelines[0].is_background());
        assert_eq!(pipelines[0].stages(), &[item("sleep", &["1"])]);

        assert!(pipelines[1].is_background());
        assert_eq!(
            pipelines[1].stages(),
            &[item("ls", &["-l"]), item("wc", &[])]
        );

        assert!(!pipelines[2].is_background());
        assert_eq!(pipelines[2].stages(), &[item("pwd", &[])]);
    }

    #[test]
    fn test_empty_line_has_no_pipelines() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   \t ").unwrap().is_empty());
    }

    #[test]
    fn test_leading_pipe_is_error() {
        assert_eq!(
            parse("| a"),
            Err(ParseError::UnexpectedSeparator {
                index: 0,
                token: "|".to_string()
            })
        );
    }

    #[test]
    fn test_separator_after_pipe_is_error() {
        assert_eq!(
            parse("a | & b"),
            Err(ParseError::UnexpectedSeparator {
                index: 2,
                token: "&".to_string()
            })
        );
    }

    #[test]
    fn test_leading_ampersand_is_error() {
        assert!(matches!(
            parse("& a"),
            Err(ParseError::UnexpectedSeparator { index: 0, .. })
        ));
        assert!(matches!(
            parse("a & & b"),
            Err(ParseError::UnexpectedSeparator { index: 2, .. })
        ));
    }

    #[test]
    fn test_dangling_pipe_is_error() {
        assert_eq!(parse("echo a |"), Err(ParseError::MissingCommand { index: 3 }));
    }

    #[test]
    fn test_separators_glued_to_words_are_plain_words() {
        let pipelines = parse("echo a|b c&").unwrap();
        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines[0].stages(), &[item("echo", &["a|b", "c&"])]);
    }

    #[test]
    fn test_error_message_format() {
        let err = parse("ls | | wc").unwrap_err();
        assert_eq!(err.to_string(), "sh: parse error near 2: |");
    }
}
