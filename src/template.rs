use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::ast::Node;
use crate::builtins;
use crate::error::{EvalError, Location, TemplateError};
use crate::inherit::{render_parent, Loader};
use crate::lexer::lex;
use crate::parser::parse;
use crate::render::Renderer;
use crate::scope::Scope;
use crate::value::{Kwargs, Value};

pub const DEFAULT_DELIMITERS: (&str, &str) = ("{{", "}}");

/// How interpolated values are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escape {
    /// Verbatim.
    #[default]
    Plain,
    /// Entity-escaped unless the value is marked safe.
    Html,
}

/// Compile-time configuration of a [`Template`].
#[derive(Clone, Default)]
pub struct Options {
    name: Option<String>,
    delimiters: Option<(String, String)>,
    escape: Escape,
    default_inherit: Option<String>,
    loader: Option<Arc<dyn Loader>>,
    namespace: Kwargs,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used in error messages and handed to the loader.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn delimiters(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.delimiters = Some((start.into(), end.into()));
        self
    }

    pub fn escape(mut self, escape: Escape) -> Self {
        self.escape = escape;
        self
    }

    /// Parent used when the template has no `inherit` directive of its own.
    pub fn default_inherit(mut self, parent: impl Into<String>) -> Self {
        self.default_inherit = Some(parent.into());
        self
    }

    pub fn loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn shared_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Bind a value in every render of the template. Render bindings win.
    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.namespace.insert(name.into(), value.into());
        self
    }

    pub fn function<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&[Value], &Kwargs) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.namespace.insert(name.to_string(), Value::function(name, f));
        self
    }

    fn delimiter_pair(&self) -> (&str, &str) {
        match &self.delimiters {
            Some((start, end)) => (start.as_str(), end.as_str()),
            None => DEFAULT_DELIMITERS,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("name", &self.name)
            .field("delimiters", &self.delimiter_pair())
            .field("escape", &self.escape)
            .field("default_inherit", &self.default_inherit)
            .field("loader", &self.loader.is_some())
            .field("namespace", &self.namespace.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct Inner {
    nodes: Vec<Node>,
    options: Options,
    namespace: Scope,
}

/// A compiled template. Cheap to clone and safe to render from several
/// threads at once; every render works on its own [`Scope`].
#[derive(Clone)]
pub struct Template {
    inner: Arc<Inner>,
}

impl Template {
    pub fn new(source: &str, options: Options) -> Result<Self, TemplateError> {
        let name = options.name.as_deref();
        let delimiters = options.delimiter_pair();
        if delimiters.0.is_empty() || delimiters.1.is_empty() || delimiters.0 == delimiters.1 {
            return Err(TemplateError::Syntax {
                message: format!(
                    "Invalid delimiters {:?} and {:?}: both must be non-empty and distinct",
                    delimiters.0, delimiters.1
                ),
                location: Location::new(None, name),
            });
        }

        let tokens = lex(source, delimiters, name)?;
        let nodes = parse(tokens, delimiters, name)?;
        debug!(name = ?name, nodes = nodes.len(), escape = ?options.escape, "compiled template");

        let mut namespace = Scope::new();
        for (builtin, value) in builtins::namespace() {
            namespace.set_builtin(builtin, value);
        }
        namespace.extend(options.namespace.iter().map(|(k, v)| (k.as_str(), v.clone())));

        Ok(Self {
            inner: Arc::new(Inner {
                nodes,
                options,
                namespace,
            }),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.options.name.as_deref()
    }

    pub fn escape(&self) -> Escape {
        self.inner.options.escape
    }

    pub fn delimiters(&self) -> (&str, &str) {
        self.inner.options.delimiter_pair()
    }

    pub fn default_inherit(&self) -> Option<&str> {
        self.inner.options.default_inherit.as_deref()
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.inner.nodes
    }

    pub(crate) fn loader(&self) -> Option<&Arc<dyn Loader>> {
        self.inner.options.loader.as_ref()
    }

    /// Render against `bindings`.
    ///
    /// ```
    /// use stencil::{vars, Options, Template};
    ///
    /// let t = Template::new("Hi {{name}}", Options::new()).unwrap();
    /// assert_eq!(t.render(vars!(name = "Ian")).unwrap(), "Hi Ian");
    /// ```
    #[instrument(skip_all, fields(template = self.name().unwrap_or("<string>")))]
    pub fn render(&self, bindings: impl Into<Scope>) -> Result<String, TemplateError> {
        self.render_at_depth(bindings.into(), 0)
    }

    pub(crate) fn render_at_depth(&self, bindings: Scope, depth: usize) -> Result<String, TemplateError> {
        let mut scope = self.inner.namespace.clone();
        scope.merge(&bindings);

        let mut renderer = Renderer::new(self);
        let mut body = String::new();
        // loop control cannot reach the top level; the parser rejects it
        renderer.render_nodes(self.nodes(), &mut scope, &mut body)?;

        let parent = match renderer.inherit.take() {
            Some((parent, pos)) => Some((parent, Some(pos))),
            None => self.default_inherit().map(|p| (p.to_string(), None)),
        };
        match parent {
            Some((parent, pos)) => {
                render_parent(self, &parent, pos, body, renderer.defs, scope, depth)
            }
            None => Ok(body),
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name())
            .field("nodes", &self.inner.nodes.len())
            .field("options", &self.inner.options)
            .finish()
    }
}
