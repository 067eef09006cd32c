use std::fmt;

use thiserror::Error;

/// 1-based line and column of a node in its template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Where an error happened. Renders as ` at line L column C in name`, with
/// either part left out when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub position: Option<Position>,
    pub name: Option<String>,
}

impl Location {
    pub fn new(position: Option<Position>, name: Option<&str>) -> Self {
        Self {
            position,
            name: name.map(str::to_string),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, " at line {} column {}", pos.line, pos.column)?;
        }
        if let Some(name) = &self.name {
            write!(f, " in {}", name)?;
        }
        Ok(())
    }
}

/// Errors surfaced by compiling or rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Raised while compiling; no part of the template is usable.
    #[error("{message}{location}")]
    Syntax { message: String, location: Location },

    /// Raised while rendering.
    #[error("{error}{location}")]
    Runtime { error: EvalError, location: Location },

    /// Raised by a [`Loader`](crate::Loader) that cannot produce a template.
    /// Built with [`TemplateError::load`]; the location is filled in at the
    /// `inherit` that asked for the template.
    #[error("cannot load template {template:?}: {reason}{location}")]
    Load {
        template: String,
        reason: String,
        location: Location,
    },
}

impl TemplateError {
    pub fn load(template: impl Into<String>, reason: impl Into<String>) -> Self {
        TemplateError::Load {
            template: template.into(),
            reason: reason.into(),
            location: Location::default(),
        }
    }

    /// Point a load failure that has no location yet at `position` in `name`.
    pub(crate) fn located(self, position: Option<Position>, name: Option<&str>) -> Self {
        match self {
            TemplateError::Load {
                template,
                reason,
                location,
            } if location == Location::default() => TemplateError::Load {
                template,
                reason,
                location: Location::new(position, name),
            },
            other => other,
        }
    }

    pub(crate) fn syntax(message: impl Into<String>, position: Position, name: Option<&str>) -> Self {
        TemplateError::Syntax {
            message: message.into(),
            location: Location::new(Some(position), name),
        }
    }

    /// Attach a location to an evaluation failure. Errors raised inside a
    /// nested template already carry their own location and pass through.
    pub(crate) fn runtime(error: EvalError, position: Position, name: Option<&str>) -> Self {
        match error {
            EvalError::Template(inner) => *inner,
            error => TemplateError::Runtime {
                error,
                location: Location::new(Some(position), name),
            },
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            TemplateError::Syntax { location, .. }
            | TemplateError::Runtime { location, .. }
            | TemplateError::Load { location, .. } => Some(location),
        }
    }

    pub fn position(&self) -> Option<Position> {
        self.location().and_then(|l| l.position)
    }
}

/// Failure while evaluating an expression or code statement.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    Undefined(String),

    #[error("'{type_name}' object has no attribute '{attr}'")]
    Attribute { type_name: String, attr: String },

    #[error("key {0} not found")]
    Key(String),

    #[error("{0}")]
    Index(String),

    #[error("{0}")]
    Type(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("cannot unpack {found} values into {expected} names")]
    Unpack { expected: usize, found: usize },

    #[error("{0}")]
    Custom(String),

    #[error(transparent)]
    Template(Box<TemplateError>),
}

impl EvalError {
    pub fn custom(message: impl Into<String>) -> Self {
        EvalError::Custom(message.into())
    }
}

impl From<TemplateError> for EvalError {
    fn from(err: TemplateError) -> Self {
        EvalError::Template(Box::new(err))
    }
}
