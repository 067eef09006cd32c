use std::mem;
use std::sync::Arc;

use crate::ast::*;
use crate::error::{Position, TemplateError};
use crate::expr;
use crate::lexer::{Keyword, Token};

enum OpenBlock {
    If {
        branches: Vec<Branch>,
        cond: Option<Expr>,
        seen_else: bool,
    },
    For {
        targets: Vec<String>,
        iterable: Expr,
    },
    Def {
        name: String,
        params: Vec<Param>,
    },
}

impl OpenBlock {
    fn opener(&self) -> &'static str {
        match self {
            OpenBlock::If { .. } => "if",
            OpenBlock::For { .. } => "for",
            OpenBlock::Def { .. } => "def",
        }
    }

    fn closer(&self) -> Keyword {
        match self {
            OpenBlock::If { .. } => Keyword::EndIf,
            OpenBlock::For { .. } => Keyword::EndFor,
            OpenBlock::Def { .. } => Keyword::EndDef,
        }
    }
}

struct Frame {
    block: OpenBlock,
    pos: Position,
    nodes: Vec<Node>,
}

fn keyword_text(keyword: Keyword) -> &'static str {
    match keyword {
        Keyword::If => "if",
        Keyword::Elif => "elif",
        Keyword::Else => "else",
        Keyword::EndIf => "endif",
        Keyword::For => "for",
        Keyword::EndFor => "endfor",
        Keyword::Break => "break",
        Keyword::Continue => "continue",
        Keyword::Default => "default",
        Keyword::Inherit => "inherit",
        Keyword::Def => "def",
        Keyword::EndDef => "enddef",
        Keyword::Py => "py:",
        Keyword::Comment => "#",
    }
}

/// Drop the optional trailing `:` of a block opener.
fn strip_colon(s: &str) -> &str {
    let s = s.trim();
    s.strip_suffix(':').unwrap_or(s).trim_end()
}

/// `while x` style content that failed to parse as an expression.
fn unknown_directive(content: &str) -> Option<&str> {
    let content = content.trim();
    let word_len = content.find(char::is_whitespace)?;
    let word = &content[..word_len];
    let is_ident = word
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && word.chars().all(|c| c.is_alphanumeric() || c == '_');
    is_ident.then_some(word)
}

/// Builds the node tree from lexed tokens. Block directives open frames on
/// an explicit stack; closers pop them and attach the collected body.
pub struct Parser<'a> {
    name: Option<&'a str>,
    delimiters: (&'a str, &'a str),
    root: Vec<Node>,
    stack: Vec<Frame>,
    inherit: Option<Position>,
}

impl<'a> Parser<'a> {
    pub fn new(delimiters: (&'a str, &'a str), name: Option<&'a str>) -> Self {
        Self {
            name,
            delimiters,
            root: Vec::new(),
            stack: Vec::new(),
            inherit: None,
        }
    }

    pub fn parse(mut self, tokens: Vec<Token>) -> Result<Vec<Node>, TemplateError> {
        for token in tokens {
            match token {
                Token::Text { text, pos } => self.push(Node::new(pos, NodeKind::Text(text))),
                Token::Directive { content, pos } => self.directive(&content, pos)?,
            }
        }
        if let Some(frame) = self.stack.last() {
            let closer = self.tag(keyword_text(frame.block.closer()));
            return Err(self.error(format!("No {}", closer), frame.pos));
        }
        Ok(self.root)
    }

    fn current(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.nodes,
            None => &mut self.root,
        }
    }

    fn push(&mut self, node: Node) {
        self.current().push(node);
    }

    fn open(&mut self, block: OpenBlock, pos: Position) {
        self.stack.push(Frame {
            block,
            pos,
            nodes: Vec::new(),
        });
    }

    fn tag(&self, word: &str) -> String {
        format!("{}{}{}", self.delimiters.0, word, self.delimiters.1)
    }

    fn error(&self, message: impl Into<String>, pos: Position) -> TemplateError {
        TemplateError::syntax(message, pos, self.name)
    }

    fn expr_error(&self, message: String, content: &str, pos: Position) -> TemplateError {
        self.error(
            format!("invalid expression {:?}: {}", content.trim(), message),
            pos,
        )
    }

    fn no_arguments(&self, keyword: Keyword, rest: &str, pos: Position) -> Result<(), TemplateError> {
        if strip_colon(rest).is_empty() {
            Ok(())
        } else {
            Err(self.error(
                format!("Unexpected text after {}", self.tag(keyword_text(keyword))),
                pos,
            ))
        }
    }

    fn required_argument<'r>(
        &self,
        keyword: Keyword,
        rest: &'r str,
        pos: Position,
    ) -> Result<&'r str, TemplateError> {
        let arg = strip_colon(rest);
        if arg.is_empty() {
            Err(self.error(
                format!("{} requires an argument", self.tag(keyword_text(keyword))),
                pos,
            ))
        } else {
            Ok(arg)
        }
    }

    fn directive(&mut self, content: &str, pos: Position) -> Result<(), TemplateError> {
        let Some((keyword, rest)) = crate::lexer::classify(content) else {
            let (expr, filters) = expr::parse_output(content).map_err(|message| {
                match unknown_directive(content) {
                    Some(word) => self.error(format!("Unknown directive {:?}", word), pos),
                    None => self.expr_error(message, content, pos),
                }
            })?;
            self.push(Node::new(pos, NodeKind::Expr { expr, filters }));
            return Ok(());
        };

        match keyword {
            Keyword::Comment => {
                self.push(Node::new(pos, NodeKind::Comment(rest.to_string())));
            }
            Keyword::Py => {
                let statements = self.code_block(content, rest, pos)?;
                self.push(Node::new(pos, NodeKind::Code(statements)));
            }
            Keyword::If => {
                let arg = self.required_argument(keyword, rest, pos)?;
                let cond = expr::parse_expression(arg)
                    .map_err(|m| self.expr_error(m, arg, pos))?;
                self.open(
                    OpenBlock::If {
                        branches: Vec::new(),
                        cond: Some(cond),
                        seen_else: false,
                    },
                    pos,
                );
            }
            Keyword::Elif | Keyword::Else => {
                let next_cond = if keyword == Keyword::Elif {
                    let arg = self.required_argument(keyword, rest, pos)?;
                    Some(expr::parse_expression(arg).map_err(|m| self.expr_error(m, arg, pos))?)
                } else {
                    self.no_arguments(keyword, rest, pos)?;
                    None
                };
                self.expect_top(Keyword::EndIf, keyword, pos)?;
                let tag = self.tag(keyword_text(keyword));
                let else_tag = self.tag("else");
                let if_tag = self.tag("if");
                let Some(Frame {
                    block: OpenBlock::If { branches, cond, seen_else },
                    nodes,
                    ..
                }) = self.stack.last_mut()
                else {
                    return Err(TemplateError::syntax(
                        format!("{} without matching {}", tag, if_tag),
                        pos,
                        self.name,
                    ));
                };
                if *seen_else {
                    return Err(TemplateError::syntax(
                        format!("{} after {}", tag, else_tag),
                        pos,
                        self.name,
                    ));
                }
                branches.push(Branch {
                    cond: cond.take(),
                    body: mem::take(nodes),
                });
                *cond = next_cond;
                *seen_else = keyword == Keyword::Else;
            }
            Keyword::For => {
                let arg = self.required_argument(keyword, rest, pos)?;
                let (targets, iterable) = expr::parse_for(arg).map_err(|m| {
                    if m.starts_with("Bad for") {
                        self.error(m, pos)
                    } else {
                        self.expr_error(m, arg, pos)
                    }
                })?;
                self.open(OpenBlock::For { targets, iterable }, pos);
            }
            Keyword::Def => {
                let arg = self.required_argument(keyword, rest, pos)?;
                let (name, params) =
                    expr::parse_signature(arg).map_err(|m| self.expr_error(m, arg, pos))?;
                self.open(OpenBlock::Def { name, params }, pos);
            }
            Keyword::EndIf | Keyword::EndFor | Keyword::EndDef => {
                self.no_arguments(keyword, rest, pos)?;
                self.expect_top(keyword, keyword, pos)?;
                let frame = self.stack.pop().ok_or_else(|| {
                    self.error(format!("Unexpected {}", self.tag(keyword_text(keyword))), pos)
                })?;
                let node = match frame.block {
                    OpenBlock::If {
                        mut branches, cond, ..
                    } => {
                        branches.push(Branch {
                            cond,
                            body: frame.nodes,
                        });
                        NodeKind::If { branches }
                    }
                    OpenBlock::For { targets, iterable } => NodeKind::For {
                        targets,
                        iterable,
                        body: frame.nodes,
                    },
                    OpenBlock::Def { name, params } => NodeKind::Def(Arc::new(BlockDef {
                        name,
                        params,
                        body: frame.nodes,
                        pos: frame.pos,
                    })),
                };
                self.push(Node::new(frame.pos, node));
            }
            Keyword::Break | Keyword::Continue => {
                self.no_arguments(keyword, rest, pos)?;
                let in_loop = self
                    .stack
                    .iter()
                    .rev()
                    .take_while(|f| !matches!(f.block, OpenBlock::Def { .. }))
                    .any(|f| matches!(f.block, OpenBlock::For { .. }));
                if !in_loop {
                    return Err(self.error(
                        format!("{} outside of a for loop", self.tag(keyword_text(keyword))),
                        pos,
                    ));
                }
                let kind = if keyword == Keyword::Break {
                    NodeKind::Break
                } else {
                    NodeKind::Continue
                };
                self.push(Node::new(pos, kind));
            }
            Keyword::Default => {
                let arg = self.required_argument(keyword, rest, pos)?;
                let (name, expr) =
                    expr::parse_assignment(arg).map_err(|m| self.expr_error(m, arg, pos))?;
                self.push(Node::new(pos, NodeKind::Default { name, expr }));
            }
            Keyword::Inherit => {
                let tag = self.tag("inherit");
                if !self.stack.is_empty() {
                    return Err(self.error(format!("{} is only allowed at the top level", tag), pos));
                }
                if let Some(first) = self.inherit {
                    return Err(self.error(
                        format!(
                            "Duplicate {} (first at line {} column {})",
                            tag, first.line, first.column
                        ),
                        pos,
                    ));
                }
                let arg = self.required_argument(keyword, rest, pos)?;
                let expr = expr::parse_expression(arg).map_err(|m| self.expr_error(m, arg, pos))?;
                self.inherit = Some(pos);
                self.push(Node::new(pos, NodeKind::Inherit(expr)));
            }
        }
        Ok(())
    }

    /// Check that the innermost open block is the one `closer` closes.
    fn expect_top(&self, closer: Keyword, seen: Keyword, pos: Position) -> Result<(), TemplateError> {
        let seen_tag = self.tag(keyword_text(seen));
        match self.stack.last() {
            Some(frame) if frame.block.closer() == closer => Ok(()),
            Some(frame) if self.stack.iter().any(|f| f.block.closer() == closer) => {
                Err(self.error(
                    format!(
                        "No {} to close {} before {}",
                        self.tag(keyword_text(frame.block.closer())),
                        self.tag(frame.block.opener()),
                        seen_tag
                    ),
                    frame.pos,
                ))
            }
            _ => {
                let opener = match closer {
                    Keyword::EndFor => "for",
                    Keyword::EndDef => "def",
                    _ => "if",
                };
                Err(self.error(
                    format!("{} without matching {}", seen_tag, self.tag(opener)),
                    pos,
                ))
            }
        }
    }

    /// Statements of a `py:` directive, one per line, each carrying its own
    /// line number.
    fn code_block(&self, content: &str, code: &str, pos: Position) -> Result<Vec<Statement>, TemplateError> {
        let leading = &content[..content.len() - content.trim_start().len()];
        let first_line = pos.line + leading.matches('\n').count();
        let mut statements = Vec::new();
        for (offset, line) in code.split('\n').enumerate() {
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let stmt_pos = if offset == 0 && leading.is_empty() {
                pos
            } else {
                Position::new(first_line + offset, 1)
            };
            let kind = expr::parse_statement(text).map_err(|m| {
                self.error(format!("invalid statement {:?}: {}", text, m), stmt_pos)
            })?;
            statements.push(Statement { pos: stmt_pos, kind });
        }
        Ok(statements)
    }
}

pub fn parse(
    tokens: Vec<Token>,
    delimiters: (&str, &str),
    name: Option<&str>,
) -> Result<Vec<Node>, TemplateError> {
    Parser::new(delimiters, name).parse(tokens)
}
