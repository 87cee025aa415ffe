//! Line joining and argument tokenization using `nom`.
//!
//! A descriptor is read as logical lines: a trailing `\` continues the
//! instruction on the next physical line, and comment or blank lines are
//! dropped (also inside a continuation).

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till1, take_while, take_while1},
    character::complete::{alpha1, char, space0, space1},
    combinator::{eof, map, rest},
    multi::{many1, separated_list1},
    sequence::{preceded, separated_pair, terminated},
};

/// An instruction's text with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based physical line number of the first line.
    pub line: usize,
    /// Joined text, continuation markers removed.
    pub text: String,
}

/// Splits descriptor text into logical lines.
#[must_use]
pub fn logical_lines(content: &str) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    let mut current: Option<LogicalLine> = None;

    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (body, continues) = match trimmed.strip_suffix('\\') {
            Some(body) => (body.trim_end(), true),
            None => (trimmed, false),
        };
        let logical = current.get_or_insert_with(|| LogicalLine {
            line: idx + 1,
            text: String::new(),
        });
        if !logical.text.is_empty() {
            logical.text.push(' ');
        }
        logical.text.push_str(body);
        if !continues {
            lines.extend(current.take());
        }
    }

    lines.extend(current.filter(|l| !l.text.is_empty()));
    lines
}

/// Splits a logical line into its keyword and argument text.
pub fn instruction_head(input: &str) -> IResult<&str, (&str, &str)> {
    (terminated(alpha1, alt((space1, eof))), rest).parse(input)
}

/// Parses a double-quoted string with `\"`, `\\`, `\n`, `\t` escapes.
fn quoted(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"').parse(input)?;
    let mut result = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, '"')) => return Ok((&input[idx + 1..], result)),
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => result.push('\n'),
                Some((_, 't')) => result.push('\t'),
                Some((_, c @ ('\\' | '"'))) => result.push(c),
                Some((_, c)) => {
                    result.push('\\');
                    result.push(c);
                }
                None => break,
            },
            Some((_, c)) => result.push(c),
            None => break,
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn bare_word(input: &str) -> IResult<&str, String> {
    map(take_till1(|c: char| c.is_whitespace()), str::to_string).parse(input)
}

/// Whitespace-separated words; double quotes group a word.
pub fn words(input: &str) -> IResult<&str, Vec<String>> {
    terminated(
        preceded(space0, separated_list1(space1, alt((quoted, bare_word)))),
        (space0, eof),
    )
    .parse(input)
}

const fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn value_word(input: &str) -> IResult<&str, String> {
    map(take_while(|c: char| !c.is_whitespace()), str::to_string).parse(input)
}

/// `key=value` pairs as used by `ENV` and `LABEL`.
pub fn key_value_pairs(input: &str) -> IResult<&str, Vec<(String, String)>> {
    terminated(
        many1(preceded(
            space0,
            separated_pair(
                map(take_while1(is_key_char), str::to_string),
                char('='),
                alt((quoted, value_word)),
            ),
        )),
        (space0, eof),
    )
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_joins_and_keeps_first_line_number() {
        let text = "FROM base\n\nRUN pip install \\\n    # comment\n    -r requirements.txt\nCMD x\n";
        let lines = logical_lines(text);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].line, 3);
        assert_eq!(lines[1].text, "RUN pip install -r requirements.txt");
        assert_eq!(lines[2].line, 6);
    }

    #[test]
    fn trailing_continuation_is_kept() {
        let lines = logical_lines("RUN a \\");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "RUN a");
    }

    #[test]
    fn head_splits_keyword() {
        let (_, (kw, args)) = instruction_head("COPY . /app").expect("head");
        assert_eq!(kw, "COPY");
        assert_eq!(args, ". /app");
        let (_, (kw, args)) = instruction_head("CMD").expect("bare keyword");
        assert_eq!((kw, args), ("CMD", ""));
        assert!(instruction_head("FROM:x").is_err());
    }

    #[test]
    fn words_honour_quotes() {
        let (_, parsed) = words(r#"a "b c" d"#).expect("words");
        assert_eq!(parsed, vec!["a", "b c", "d"]);
    }

    #[test]
    fn key_values_with_quotes_and_empty_values() {
        let (_, pairs) = key_value_pairs(r#"A=1 B="two words" C="#).expect("pairs");
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn key_values_reject_legacy_form() {
        assert!(key_value_pairs("PYTHONUNBUFFERED 1").is_err());
    }

    #[test]
    fn unterminated_quote_fails() {
        assert!(words(r#""abc"#).is_err());
    }
}
