//! Splits template source into literal text and delimiter-enclosed
//! directives, then removes the whitespace of lines that hold nothing but a
//! single block directive.

use crate::error::{Position, TemplateError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text { text: String, pos: Position },
    /// Content between the delimiters; `pos` points just past the start
    /// delimiter.
    Directive { content: String, pos: Position },
}

/// Leading keyword of a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Elif,
    Else,
    EndIf,
    For,
    EndFor,
    Break,
    Continue,
    Default,
    Inherit,
    Def,
    EndDef,
    Py,
    Comment,
}

/// Classify a directive by its leading keyword, returning the remaining
/// argument text. `None` means the directive is a plain expression.
pub fn classify(content: &str) -> Option<(Keyword, &str)> {
    let content = content.trim();
    if let Some(rest) = content.strip_prefix('#') {
        return Some((Keyword::Comment, rest));
    }
    if let Some(rest) = content.strip_prefix("py:") {
        return Some((Keyword::Py, rest));
    }
    let word_len = content
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(content.len());
    let (word, rest) = content.split_at(word_len);
    let keyword = match word {
        "if" => Keyword::If,
        "elif" => Keyword::Elif,
        "else" => Keyword::Else,
        "endif" => Keyword::EndIf,
        "for" => Keyword::For,
        "endfor" => Keyword::EndFor,
        "break" => Keyword::Break,
        "continue" => Keyword::Continue,
        "default" => Keyword::Default,
        "inherit" => Keyword::Inherit,
        "def" => Keyword::Def,
        "enddef" => Keyword::EndDef,
        _ => return None,
    };
    // `if(x)` and `inherit"base"` still read as directives, `iffy` never gets here.
    match rest.chars().next() {
        None => Some((keyword, rest)),
        Some(c) if c.is_whitespace() || matches!(c, '(' | ':' | '"' | '\'') => {
            Some((keyword, rest))
        }
        Some(_) => None,
    }
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    line: usize,
    column: usize,
    start: &'a str,
    end: &'a str,
    name: Option<&'a str>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, delimiters: (&'a str, &'a str), name: Option<&'a str>) -> Self {
        Self {
            input,
            cursor: 0,
            line: 1,
            column: 1,
            start: delimiters.0,
            end: delimiters.1,
            name,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn advance(&mut self, n: usize) {
        for c in self.input[self.cursor..self.cursor + n].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.cursor += n;
    }

    fn error(&self, message: String, pos: Position) -> TemplateError {
        TemplateError::syntax(message, pos, self.name)
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, TemplateError> {
        let rest = self.remaining();
        if rest.is_empty() {
            return Ok(None);
        }

        let next_start = rest.find(self.start);
        let next_end = rest.find(self.end);

        if let Some(end_idx) = next_end {
            if next_start.map_or(true, |s| end_idx < s) {
                let mut ahead = self.clone();
                ahead.advance(end_idx + self.end.len());
                return Err(self.error(
                    format!("{} outside expression", self.end),
                    ahead.position(),
                ));
            }
        }

        match next_start {
            Some(0) => {
                self.advance(self.start.len());
                let pos = self.position();
                let rest = self.remaining();
                let Some(end_idx) = rest.find(self.end) else {
                    return Err(self.error(
                        format!("No {} to finish last expression", self.end),
                        pos,
                    ));
                };
                if let Some(inner) = rest.find(self.start) {
                    if inner < end_idx {
                        let mut ahead = self.clone();
                        ahead.advance(inner + self.start.len());
                        return Err(self.error(
                            format!("{} inside expression", self.start),
                            ahead.position(),
                        ));
                    }
                }
                let content = rest[..end_idx].to_string();
                self.advance(end_idx + self.end.len());
                Ok(Some(Token::Directive { content, pos }))
            }
            Some(idx) => {
                // Text before the directive
                let pos = self.position();
                let text = rest[..idx].to_string();
                self.advance(idx);
                Ok(Some(Token::Text { text, pos }))
            }
            None => {
                let pos = self.position();
                let text = rest.to_string();
                self.advance(rest.len());
                Ok(Some(Token::Text { text, pos }))
            }
        }
    }
}

/// Tokenize `source` and apply directive-line whitespace trimming.
pub fn lex(
    source: &str,
    delimiters: (&str, &str),
    name: Option<&str>,
) -> Result<Vec<Token>, TemplateError> {
    let mut tokenizer = Tokenizer::new(source, delimiters, name);
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token()? {
        tokens.push(token);
    }
    trim_directive_lines(&mut tokens);
    tokens.retain(|t| !matches!(t, Token::Text { text, .. } if text.is_empty()));
    Ok(tokens)
}

/// Directives that take a line of their own vanish together with that
/// line's indentation and newline. Expressions are never trimmed.
fn trim_directive_lines(tokens: &mut [Token]) {
    let len = tokens.len();
    let mut last_trim: Option<usize> = None;

    for i in 0..len {
        let is_block_directive = match &tokens[i] {
            Token::Directive { content, .. } => classify(content).is_some(),
            Token::Text { .. } => false,
        };
        if !is_block_directive {
            continue;
        }

        let prev = if i == 0 { Some(String::new()) } else { text_of(&tokens[i - 1]) };
        let next = if i + 1 >= len { Some(String::new()) } else { text_of(&tokens[i + 1]) };
        let (Some(prev), Some(next)) = (prev, next) else {
            continue;
        };

        let prev_blank = prev.trim().is_empty();
        let follows_trim = last_trim.is_some_and(|t| t + 2 == i) && prev_blank;
        let prev_ok = prev.is_empty()
            || trailing_newline(&prev).is_some()
            || (i == 1 && prev_blank)
            || follows_trim;
        let next_is_last_blank = i + 2 == len && next.trim().is_empty();
        let next_ok = next.is_empty() || leading_newline(&next).is_some() || next_is_last_blank;
        if !(prev_ok && next_ok) {
            continue;
        }

        if !prev.is_empty() {
            let trimmed = if (i == 1 && prev_blank) || follows_trim {
                String::new()
            } else {
                // keep the newline that ends the previous line
                match trailing_newline(&prev) {
                    Some(nl) => prev[..=nl].to_string(),
                    None => prev.clone(),
                }
            };
            set_text(&mut tokens[i - 1], trimmed);
        }
        if !next.is_empty() {
            last_trim = Some(i);
            let trimmed = if next_is_last_blank {
                String::new()
            } else {
                match leading_newline(&next) {
                    Some(end) => next[end..].to_string(),
                    None => next.clone(),
                }
            };
            set_text(&mut tokens[i + 1], trimmed);
        }
    }
}

fn text_of(token: &Token) -> Option<String> {
    match token {
        Token::Text { text, .. } => Some(text.clone()),
        Token::Directive { .. } => None,
    }
}

fn set_text(token: &mut Token, value: String) {
    if let Token::Text { text, .. } = token {
        *text = value;
    }
}

/// Index of the `\n` in a trailing `\n\r?[ \t]*`.
fn trailing_newline(s: &str) -> Option<usize> {
    let body = s.trim_end_matches([' ', '\t']);
    let body = body.strip_suffix('\r').unwrap_or(body);
    body.ends_with('\n').then(|| body.len() - 1)
}

/// Byte offset just past a leading `[ \t]*\r?\n`.
fn leading_newline(s: &str) -> Option<usize> {
    let rest = s.trim_start_matches([' ', '\t']);
    let rest_nl = rest.strip_prefix('\r').unwrap_or(rest);
    rest_nl
        .starts_with('\n')
        .then(|| s.len() - rest_nl.len() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| match t {
                Token::Text { text, .. } => text.clone(),
                Token::Directive { content, .. } => format!("<{}>", content),
            })
            .collect()
    }

    #[test]
    fn splits_text_and_directives_with_positions() {
        let tokens = lex("Hi {{name}}\n{{x}}", ("{{", "}}"), None).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text { text: "Hi ".into(), pos: Position::new(1, 1) },
                Token::Directive { content: "name".into(), pos: Position::new(1, 6) },
                Token::Text { text: "\n".into(), pos: Position::new(1, 12) },
                Token::Directive { content: "x".into(), pos: Position::new(2, 3) },
            ]
        );
    }

    #[test]
    fn custom_delimiters() {
        let tokens = lex("Hi $[[name]]", ("$[[", "]]"), None).unwrap();
        assert_eq!(texts(&tokens), ["Hi ", "<name>"]);
    }

    #[test]
    fn unbalanced_delimiters_are_errors() {
        let err = lex("a }} b", ("{{", "}}"), None).unwrap_err();
        assert!(err.to_string().starts_with("}} outside expression"));
        let err = lex("{{ a {{ b }}", ("{{", "}}"), None).unwrap_err();
        assert!(err.to_string().starts_with("{{ inside expression"));
        let err = lex("x {{ a", ("{{", "}}"), Some("t.txt")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No }} to finish last expression at line 1 column 5 in t.txt"
        );
    }

    #[test]
    fn directive_lines_are_removed() {
        let tokens = lex("{{if 1}}\n{{x}}\n{{endif}}\n", ("{{", "}}"), None).unwrap();
        assert_eq!(texts(&tokens), ["<if 1>", "<x>", "\n", "<endif>"]);
    }

    #[test]
    fn indented_directive_lines_are_removed() {
        let tokens = lex("  {{if 1}}  \nx={{x}}\n  {{endif}}  \n", ("{{", "}}"), None).unwrap();
        assert_eq!(texts(&tokens), ["<if 1>", "x=", "<x>", "\n", "<endif>"]);
    }

    #[test]
    fn expressions_keep_their_lines() {
        let tokens = lex("a\n{{x}}\nb", ("{{", "}}"), None).unwrap();
        assert_eq!(texts(&tokens), ["a\n", "<x>", "\nb"]);
    }

    #[test]
    fn directive_sharing_a_line_with_text_is_kept() {
        let tokens = lex("{{if 1}}x={{x}}\n{{endif}}\n", ("{{", "}}"), None).unwrap();
        assert_eq!(texts(&tokens), ["<if 1>", "x=", "<x>", "\n", "<endif>"]);
    }

    #[test]
    fn classifies_keywords() {
        assert_eq!(classify("if x > 0"), Some((Keyword::If, " x > 0")));
        assert_eq!(classify(" else "), Some((Keyword::Else, "")));
        assert_eq!(classify("else:"), Some((Keyword::Else, ":")));
        assert_eq!(classify("#note"), Some((Keyword::Comment, "note")));
        assert_eq!(classify("py:\nx=1\n"), Some((Keyword::Py, "\nx=1")));
        assert_eq!(classify("iffy"), None);
        assert_eq!(classify("default.x"), None);
        assert_eq!(classify("name|repr"), None);
    }
}
