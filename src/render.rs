use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::ast::*;
use crate::error::{Position, TemplateError};
use crate::eval::{bind_targets, exec, Evaluator};
use crate::inherit::Block;
use crate::scope::Scope;
use crate::template::{Escape, Template};
use crate::value::{html_quote, Kwargs, Value};

/// How a node sequence finished. Loop control travels up through nested
/// `if` bodies until the enclosing `for` consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Completed,
    Break,
    Continue,
}

/// Walks one template's nodes, collecting its `def` blocks and `inherit`
/// target along the way.
pub(crate) struct Renderer<'t> {
    template: &'t Template,
    pub defs: IndexMap<String, Block>,
    pub inherit: Option<(String, Position)>,
}

impl<'t> Renderer<'t> {
    pub fn new(template: &'t Template) -> Self {
        Self {
            template,
            defs: IndexMap::new(),
            inherit: None,
        }
    }

    fn runtime(&self, error: crate::error::EvalError, pos: Position) -> TemplateError {
        TemplateError::runtime(error, pos, self.template.name())
    }

    fn eval(&self, expr: &Expr, scope: &Scope, pos: Position) -> Result<Value, TemplateError> {
        Evaluator::new(scope)
            .eval(expr)
            .map_err(|e| self.runtime(e, pos))
    }

    pub fn render_nodes(
        &mut self,
        nodes: &[Node],
        scope: &mut Scope,
        out: &mut String,
    ) -> Result<Flow, TemplateError> {
        for node in nodes {
            let pos = node.pos;
            match &node.kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Expr { expr, filters } => {
                    let mut value = self.eval(expr, scope, pos)?;
                    for filter in filters {
                        let f = self.eval(filter, scope, pos)?;
                        value = f
                            .call(std::slice::from_ref(&value), &Kwargs::new())
                            .map_err(|e| self.runtime(e, pos))?;
                    }
                    self.write_value(&value, out)
                        .map_err(|e| self.runtime(e, pos))?;
                }
                NodeKind::If { branches } => {
                    for branch in branches {
                        let taken = match &branch.cond {
                            None => true,
                            Some(cond) => self.eval(cond, scope, pos)?.is_truthy(),
                        };
                        if taken {
                            match self.render_nodes(&branch.body, scope, out)? {
                                Flow::Completed => break,
                                flow => return Ok(flow),
                            }
                        }
                    }
                }
                NodeKind::For {
                    targets,
                    iterable,
                    body,
                } => {
                    let items = self
                        .eval(iterable, scope, pos)?
                        .iterate()
                        .map_err(|e| self.runtime(e, pos))?;
                    trace!(items = items.len(), "for loop");
                    for item in items {
                        bind_targets(scope, targets, item).map_err(|e| self.runtime(e, pos))?;
                        if self.render_nodes(body, scope, out)? == Flow::Break {
                            break;
                        }
                    }
                }
                NodeKind::Break => return Ok(Flow::Break),
                NodeKind::Continue => return Ok(Flow::Continue),
                NodeKind::Default { name, expr } => {
                    scope
                        .try_define_default(name, |s| Evaluator::new(s).eval(expr))
                        .map_err(|e| self.runtime(e, pos))?;
                }
                NodeKind::Code(statements) => {
                    for statement in statements {
                        exec(statement, scope).map_err(|e| self.runtime(e, statement.pos))?;
                    }
                }
                NodeKind::Comment(_) => {}
                NodeKind::Def(def) => {
                    let block = Block::new(
                        Arc::clone(def),
                        self.template.clone(),
                        Arc::new(scope.clone()),
                    );
                    scope.set(def.name.as_str(), Value::from_object(block.clone()));
                    self.defs.insert(def.name.clone(), block);
                }
                NodeKind::Inherit(expr) => {
                    let parent = self
                        .eval(expr, scope, pos)?
                        .to_text()
                        .map_err(|e| self.runtime(e, pos))?;
                    self.inherit = Some((parent, pos));
                }
            }
        }
        Ok(Flow::Completed)
    }

    fn write_value(&self, value: &Value, out: &mut String) -> Result<(), crate::error::EvalError> {
        let text = value.to_text()?;
        let safe = match value {
            Value::Html(_) => true,
            Value::Object(o) => o.is_html_safe(),
            _ => false,
        };
        match self.template.escape() {
            Escape::Html if !safe => out.push_str(&html_quote(&text)),
            _ => out.push_str(&text),
        }
        Ok(())
    }
}
