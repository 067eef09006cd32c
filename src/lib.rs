//! stencil: a small text-templating engine.
//!
//! Templates mix literal text with directives between configurable
//! delimiters (`{{` and `}}` by default):
//!
//! - `{{expr}}` and `{{expr|filter|filter}}` interpolate a value.
//! - `{{if x}} ... {{elif y}} ... {{else}} ... {{endif}}`
//! - `{{for a, b in items}} ... {{break}} ... {{continue}} ... {{endfor}}`
//! - `{{default name = expr}}` binds `name` only when it is not bound yet.
//! - `{{py: x = 1}}` runs simple assignments, one per line.
//! - `{{# comment}}`
//! - `{{def name(arg, other=1)}} ... {{enddef}}` declares a block that a
//!   parent template can reach through `self`, and `{{inherit "parent"}}`
//!   renders the parent in place of this template.
//!
//! Expressions are a small, restricted language: names,
//! attribute and index access, calls with keyword arguments, literals and
//! the usual operators. There is no way to run arbitrary host code.
//!
//! Lines that contain nothing but a single block directive vanish from the
//! output, together with their indentation and newline. Expressions never
//! cause that trimming.
//!
//! ```
//! use stencil::{substitute, substitute_html, vars, Value};
//!
//! assert_eq!(substitute("Hi {{name}}", vars!(name = "Ian")).unwrap(), "Hi Ian");
//! assert_eq!(substitute("Hi {{name}}", vars!(name = Value::None)).unwrap(), "Hi ");
//! assert_eq!(
//!     substitute_html("hi {{name}}", vars!(name = "<foo>")).unwrap(),
//!     "hi &lt;foo&gt;"
//! );
//! ```
//!
//! Errors name their position: `No {{endif}} at line 1 column 3 in foo.html`.

mod ast;
mod builtins;
mod error;
mod eval;
mod expr;
mod inherit;
mod lexer;
mod looper;
mod parser;
mod render;
mod scope;
mod template;
mod value;

pub use builtins::{attrs, url_quote};
pub use error::{EvalError, Location, Position, TemplateError};
pub use inherit::{Block, EmptyBlock, Loader, SelfView, MAX_INHERIT_DEPTH};
pub use looper::{LoopPos, Looper};
pub use scope::Scope;
pub use template::{Escape, Options, Template, DEFAULT_DELIMITERS};
pub use value::{compare, html_quote, Function, Kwargs, Object, Value};

/// Compile a plain-text template with default options.
pub fn compile(source: &str) -> Result<Template, TemplateError> {
    Template::new(source, Options::new())
}

/// Compile a template that HTML-escapes interpolated values.
pub fn compile_html(source: &str) -> Result<Template, TemplateError> {
    Template::new(source, Options::new().escape(Escape::Html))
}

/// Compile and render in one step.
pub fn substitute(source: &str, bindings: impl Into<Scope>) -> Result<String, TemplateError> {
    compile(source)?.render(bindings)
}

pub fn substitute_html(source: &str, bindings: impl Into<Scope>) -> Result<String, TemplateError> {
    compile_html(source)?.render(bindings)
}

/// Build a [`Scope`] from `name = value` pairs.
///
/// ```
/// let scope = stencil::vars!(x = 1, class_ = "big");
/// assert_eq!(scope.len(), 2);
/// ```
#[macro_export]
macro_rules! vars {
    () => {
        $crate::Scope::new()
    };
    ($($name:ident = $value:expr),+ $(,)?) => {{
        let mut scope = $crate::Scope::new();
        $( scope.set(stringify!($name), $value); )+
        scope
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_a_name() {
        assert_eq!(substitute("Hi {{name}}", vars!(name = "Ian")).unwrap(), "Hi Ian");
        assert_eq!(
            substitute("Hi {{repr(name)}}", vars!(name = "Ian")).unwrap(),
            "Hi 'Ian'"
        );
        assert_eq!(substitute("Hi {{name|repr}}", vars!(name = "Ian")).unwrap(), "Hi 'Ian'");
    }

    #[test]
    fn string_plus_int_fails_at_render() {
        let t = compile("Hi {{name+1}}").unwrap();
        let err = t.render(vars!(name = "Ian")).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Runtime {
                error: EvalError::Type(_),
                ..
            }
        ));
    }

    #[test]
    fn custom_delimiters() {
        let t = Template::new("Hi $[[repr(name)]]", Options::new().delimiters("$[[", "]]")).unwrap();
        assert_eq!(t.render(vars!(name = "Ian")).unwrap(), "Hi 'Ian'");
        let t = Template::new("Hi ${name}", Options::new().delimiters("${", "}")).unwrap();
        assert_eq!(t.render(vars!(name = "Ian")).unwrap(), "Hi Ian");
    }

    #[test]
    fn empty_vars() {
        assert!(vars!().is_empty());
    }
}
