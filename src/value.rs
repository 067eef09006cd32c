use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::EvalError;

/// Keyword arguments of a call, in call-site order.
pub type Kwargs = IndexMap<String, Value>;

type NativeFn = dyn Fn(&[Value], &Kwargs) -> Result<Value, EvalError> + Send + Sync;

/// A host function callable from template expressions.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    f: Arc<NativeFn>,
}

impl Function {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value], &Kwargs) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value], kwargs: &Kwargs) -> Result<Value, EvalError> {
        (self.f)(args, kwargs)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

/// Capability interface for host objects exposed to templates.
///
/// Every method has a default that reports the operation as unsupported, so
/// an implementation only overrides what it actually offers.
pub trait Object: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;

    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn call(&self, _args: &[Value], _kwargs: &Kwargs) -> Result<Value, EvalError> {
        Err(EvalError::Type(format!(
            "'{}' object is not callable",
            self.type_name()
        )))
    }

    /// `obj.name(...)`. `None` falls back to `get_attr(name)` followed by a call.
    fn call_method(
        &self,
        _name: &str,
        _args: &[Value],
        _kwargs: &Kwargs,
    ) -> Option<Result<Value, EvalError>> {
        None
    }

    fn to_text(&self) -> Result<String, EvalError> {
        Ok(format!("<{}>", self.type_name()))
    }

    /// Text from `to_text` is already escaped for HTML output.
    fn is_html_safe(&self) -> bool {
        false
    }

    fn is_truthy(&self) -> bool {
        true
    }

    fn iterate(&self) -> Option<Vec<Value>> {
        None
    }
}

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Markup that must not be escaped again.
    Html(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Function(Function),
    Object(Arc<dyn Object>),
}

impl Value {
    pub fn from_object<O: Object + 'static>(object: O) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn function<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value], &Kwargs) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Value::Function(Function::new(name, f))
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Html(_) => "html",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Function(_) => "function",
            Value::Object(o) => o.type_name(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) | Value::Html(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Function(_) => true,
            Value::Object(o) => o.is_truthy(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Html(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    /// Number of items for sized values.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) | Value::Html(s) => Some(s.chars().count()),
            Value::List(l) => Some(l.len()),
            Value::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    /// Text used when the value is interpolated. `None` becomes empty text.
    pub fn to_text(&self) -> Result<String, EvalError> {
        match self {
            Value::None => Ok(String::new()),
            Value::Str(s) | Value::Html(s) => Ok(s.clone()),
            Value::Object(o) => o.to_text(),
            other => Ok(other.repr()),
        }
    }

    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) | Value::Html(s) => repr_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", repr_str(k), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Function(f) => format!("{:?}", f),
            Value::Object(o) => format!("<{} object>", o.type_name()),
        }
    }

    /// Text form of a value used as a map key.
    pub fn key_text(&self) -> String {
        match self {
            Value::Str(s) | Value::Html(s) => s.clone(),
            other => other.repr(),
        }
    }

    pub fn get_attr(&self, name: &str) -> Result<Value, EvalError> {
        let found = match self {
            Value::Map(map) => map.get(name).cloned(),
            Value::Object(o) => o.get_attr(name),
            _ => None,
        };
        found.ok_or_else(|| EvalError::Attribute {
            type_name: self.type_name().to_string(),
            attr: name.to_string(),
        })
    }

    pub fn get_item(&self, key: &Value) -> Result<Value, EvalError> {
        match (self, key) {
            (Value::List(items), _) => {
                let idx = key.as_int().ok_or_else(|| {
                    EvalError::Type(format!(
                        "list indices must be integers, not {}",
                        key.type_name()
                    ))
                })?;
                resolve_index(idx, items.len())
                    .map(|i| items[i].clone())
                    .ok_or_else(|| EvalError::Index("list index out of range".to_string()))
            }
            (Value::Str(s), _) | (Value::Html(s), _) => {
                let idx = key.as_int().ok_or_else(|| {
                    EvalError::Type(format!(
                        "string indices must be integers, not {}",
                        key.type_name()
                    ))
                })?;
                let chars: Vec<char> = s.chars().collect();
                resolve_index(idx, chars.len())
                    .map(|i| Value::Str(chars[i].to_string()))
                    .ok_or_else(|| EvalError::Index("string index out of range".to_string()))
            }
            (Value::Map(map), _) => map
                .get(&key.key_text())
                .cloned()
                .ok_or_else(|| EvalError::Key(key.repr())),
            (Value::Object(_), Value::Str(name)) => self.get_attr(name),
            _ => Err(EvalError::Type(format!(
                "'{}' object is not subscriptable",
                self.type_name()
            ))),
        }
    }

    pub fn call(&self, args: &[Value], kwargs: &Kwargs) -> Result<Value, EvalError> {
        match self {
            Value::Function(f) => f.call(args, kwargs),
            Value::Object(o) => o.call(args, kwargs),
            other => Err(EvalError::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Materialize the items a `for` loop walks over. Maps yield their keys.
    pub fn iterate(&self) -> Result<Vec<Value>, EvalError> {
        let items = match self {
            Value::List(items) => Some(items.clone()),
            Value::Map(map) => Some(map.keys().cloned().map(Value::Str).collect()),
            Value::Str(s) | Value::Html(s) => {
                Some(s.chars().map(|c| Value::Str(c.to_string())).collect())
            }
            Value::Object(o) => o.iterate(),
            _ => None,
        };
        items.ok_or_else(|| {
            EvalError::Type(format!("'{}' object is not iterable", self.type_name()))
        })
    }
}

fn resolve_index(idx: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if idx < 0 { idx + len } else { idx };
    (0..len).contains(&idx).then_some(idx as usize)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a) | Value::Html(a), Value::Str(b) | Value::Html(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(&a.f, &b.f),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Float(_), _) | (_, Value::Float(_)) => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            _ => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Ordering used by comparison operators, `sorted`, `min` and `max`.
pub fn compare(a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    match (a, b) {
        (Value::Str(x) | Value::Html(x), Value::Str(y) | Value::Html(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => {
            for (l, r) in x.iter().zip(y) {
                match compare(l, r)? {
                    Ordering::Equal => continue,
                    ord => return Ok(ord),
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            Ok(a.as_int().cmp(&b.as_int()))
        }
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                EvalError::Type("cannot order NaN".to_string())
            }),
            _ => Err(EvalError::Type(format!(
                "ordering not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

/// Entity-escape text for HTML output.
pub fn html_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        i64::try_from(i).map(Value::Int).unwrap_or(Value::Float(i as f64))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::None)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Value {
    fn from((a, b): (A, B)) -> Self {
        Value::List(vec![a.into(), b.into()])
    }
}

impl<T: Into<Value>> From<IndexMap<String, T>> for Value {
    fn from(map: IndexMap<String, T>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(map: BTreeMap<String, T>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(map: HashMap<String, T>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
