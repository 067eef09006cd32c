//! `def` blocks, the `self` view handed to parent templates and the parent
//! resolution step.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::ast::BlockDef;
use crate::error::{EvalError, Location, Position, TemplateError};
use crate::eval::Evaluator;
use crate::render::Renderer;
use crate::scope::Scope;
use crate::template::Template;
use crate::value::{Kwargs, Object, Value};

/// Longest chain of `inherit` steps a single render may take.
pub const MAX_INHERIT_DEPTH: usize = 64;

/// Produces parent templates for `inherit`.
///
/// The engine never reads files itself; a loader decides what a name means,
/// usually relative to the name of the requesting template. Caching is up to
/// the implementation.
pub trait Loader: Send + Sync {
    fn get_template(&self, name: &str, from: &Template) -> Result<Template, TemplateError>;
}

impl<F> Loader for F
where
    F: Fn(&str, &Template) -> Result<Template, TemplateError> + Send + Sync,
{
    fn get_template(&self, name: &str, from: &Template) -> Result<Template, TemplateError> {
        self(name, from)
    }
}

/// A `def` block bound to the scope it renders against. Calling it renders
/// the body and returns markup that is not escaped again.
#[derive(Clone)]
pub struct Block {
    def: Arc<BlockDef>,
    template: Template,
    scope: Arc<Scope>,
}

impl Block {
    pub(crate) fn new(def: Arc<BlockDef>, template: Template, scope: Arc<Scope>) -> Self {
        Self {
            def,
            template,
            scope,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    fn rebind(&mut self, scope: Arc<Scope>) {
        self.scope = scope;
    }

    fn bind_arguments(&self, args: &[Value], kwargs: &Kwargs) -> Result<Scope, EvalError> {
        let params = &self.def.params;
        if args.len() > params.len() {
            return Err(EvalError::Type(format!(
                "{}() takes {} positional argument(s) but {} were given",
                self.def.name,
                params.len(),
                args.len()
            )));
        }
        if let Some(unknown) = kwargs.keys().find(|k| !params.iter().any(|p| &p.name == *k)) {
            return Err(EvalError::Type(format!(
                "{}() got an unexpected keyword argument '{}'",
                self.def.name, unknown
            )));
        }

        let mut scope = Scope::clone(&self.scope);
        for (i, param) in params.iter().enumerate() {
            let from_kwargs = kwargs.get(&param.name);
            let value = match (args.get(i), from_kwargs) {
                (Some(_), Some(_)) => {
                    return Err(EvalError::Type(format!(
                        "{}() got multiple values for argument '{}'",
                        self.def.name, param.name
                    )))
                }
                (Some(v), None) | (None, Some(v)) => v.clone(),
                (None, None) => match &param.default {
                    Some(default) => Evaluator::new(&scope).eval(default)?,
                    None => {
                        return Err(EvalError::Type(format!(
                            "{}() missing required argument '{}'",
                            self.def.name, param.name
                        )))
                    }
                },
            };
            scope.set(param.name.as_str(), value);
        }
        Ok(scope)
    }

    /// Render the block with the given arguments.
    pub fn render(&self, args: &[Value], kwargs: &Kwargs) -> Result<String, TemplateError> {
        let mut scope = self
            .bind_arguments(args, kwargs)
            .map_err(|e| TemplateError::runtime(e, self.def.pos, self.template.name()))?;
        let mut out = String::new();
        Renderer::new(&self.template).render_nodes(&self.def.body, &mut scope, &mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<block {}>", self.def.name)
    }
}

impl Object for Block {
    fn type_name(&self) -> &str {
        "block"
    }

    fn call(&self, args: &[Value], kwargs: &Kwargs) -> Result<Value, EvalError> {
        Ok(Value::Html(self.render(args, kwargs)?))
    }

    fn to_text(&self) -> Result<String, EvalError> {
        Ok(self.render(&[], &Kwargs::new())?)
    }

    fn is_html_safe(&self) -> bool {
        true
    }
}

/// Stand-in for a block the child did not define.
#[derive(Debug, Clone, Copy)]
pub struct EmptyBlock;

impl Object for EmptyBlock {
    fn type_name(&self) -> &str {
        "empty_block"
    }

    fn call(&self, _args: &[Value], _kwargs: &Kwargs) -> Result<Value, EvalError> {
        Ok(Value::Html(String::new()))
    }

    fn to_text(&self) -> Result<String, EvalError> {
        Ok(String::new())
    }

    fn is_html_safe(&self) -> bool {
        true
    }

    fn is_truthy(&self) -> bool {
        false
    }
}

/// What a parent template sees as `self`: the child's blocks by name, its
/// rendered `body`, and `get`, which never fails on a missing block.
#[derive(Debug, Clone)]
pub struct SelfView {
    name: Option<String>,
    body: String,
    blocks: Arc<IndexMap<String, Block>>,
}

impl SelfView {
    pub fn body(&self) -> &str {
        &self.body
    }

    /// The block named `name`, if the child defined one.
    pub fn get(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }
}

impl Object for SelfView {
    fn type_name(&self) -> &str {
        "TemplateObject"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "body" => Some(Value::Html(self.body.clone())),
            "get" => Some(Value::from_object(BlockLookup {
                blocks: Arc::clone(&self.blocks),
            })),
            _ => self.get(name).cloned().map(Value::from_object),
        }
    }

    fn to_text(&self) -> Result<String, EvalError> {
        Ok(format!("<TemplateObject {}>", self.name.as_deref().unwrap_or("?")))
    }
}

/// `self.get`
#[derive(Debug)]
struct BlockLookup {
    blocks: Arc<IndexMap<String, Block>>,
}

impl Object for BlockLookup {
    fn type_name(&self) -> &str {
        "TemplateObjectGetter"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        Some(match self.blocks.get(name) {
            Some(block) => Value::from_object(block.clone()),
            None => Value::from_object(EmptyBlock),
        })
    }
}

/// Render `parent` with `self` bound to a view over the child's output.
pub(crate) fn render_parent(
    child: &Template,
    parent: &str,
    inherit_pos: Option<Position>,
    body: String,
    mut defs: IndexMap<String, Block>,
    mut scope: Scope,
    depth: usize,
) -> Result<String, TemplateError> {
    if depth >= MAX_INHERIT_DEPTH {
        return Err(TemplateError::Runtime {
            error: EvalError::custom(format!(
                "inheritance chain deeper than {} templates",
                MAX_INHERIT_DEPTH
            )),
            location: Location::new(inherit_pos, child.name()),
        });
    }
    let loader = child
        .loader()
        .ok_or_else(|| TemplateError::load(parent, "no loader configured"))
        .map_err(|e| e.located(inherit_pos, child.name()))?;
    let template = loader
        .get_template(parent, child)
        .map_err(|e| e.located(inherit_pos, child.name()))?;
    debug!(parent, child = ?child.name(), depth, "resolved parent template");

    // Blocks see everything the child bound, including names set after the def.
    let final_scope = Arc::new(scope.clone());
    for block in defs.values_mut() {
        block.rebind(Arc::clone(&final_scope));
    }
    let view = SelfView {
        name: child.name().map(str::to_string),
        body,
        blocks: Arc::new(defs),
    };
    scope.set("self", Value::from_object(view));
    template.render_at_depth(scope, depth + 1)
}
