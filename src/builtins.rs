//! Functions every template can call without binding them first.

use std::cmp::Ordering;

use crate::error::EvalError;
use crate::looper::looper_value;
use crate::value::{compare, html_quote, Kwargs, Value};

/// Percent-encode everything except unreserved characters and `/`.
pub fn url_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Render `name="value"` pairs sorted by name. A trailing `_` is dropped so
/// reserved words like `class_` can be passed; `None` values are omitted.
pub fn attrs<'a, I>(pairs: I) -> Result<Value, EvalError>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut pairs: Vec<_> = pairs.into_iter().filter(|(_, v)| !v.is_none()).collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let mut parts = Vec::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = name.strip_suffix('_').unwrap_or(name);
        parts.push(format!("{}=\"{}\"", name, html_quote(&value.to_text()?)));
    }
    Ok(Value::Html(parts.join(" ")))
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        return Err(EvalError::Type(format!(
            "{}() takes {} argument(s) ({} given)",
            name,
            if min == max { min.to_string() } else { format!("{} to {}", min, max) },
            args.len()
        )));
    }
    Ok(())
}

fn one<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, EvalError> {
    expect_args(name, args, 1, 1)?;
    Ok(&args[0])
}

fn int_arg(name: &str, v: &Value) -> Result<i64, EvalError> {
    v.as_int().ok_or_else(|| {
        EvalError::Type(format!(
            "{}() expects integers, got '{}'",
            name,
            v.type_name()
        ))
    })
}

fn to_int(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Int(_) | Value::Bool(_) => Ok(Value::Int(v.as_int().unwrap_or_default())),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Str(s) | Value::Html(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::Type(format!("invalid literal for int(): {}", v.repr()))),
        other => Err(EvalError::Type(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Str(s) | Value::Html(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| EvalError::Type(format!("could not convert string to float: {}", v.repr()))),
        other => other.as_float().map(Value::Float).ok_or_else(|| {
            EvalError::Type(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn range(args: &[Value]) -> Result<Value, EvalError> {
    expect_args("range", args, 1, 3)?;
    let ints = args
        .iter()
        .map(|v| int_arg("range", v))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints[..] {
        [] => return Ok(Value::List(Vec::new())),
        [stop] => (0, stop, 1),
        [start, stop] => (start, stop, 1),
        [start, stop, step, ..] => (start, stop, step),
    };
    if step == 0 {
        return Err(EvalError::Type("range() arg 3 must not be zero".to_string()));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(Value::Int(i));
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::List(out))
}

fn sorted(args: &[Value], kwargs: &Kwargs) -> Result<Value, EvalError> {
    let mut items = one("sorted", args)?.iterate()?;
    let mut failure = None;
    items.sort_by(|a, b| {
        compare(a, b).unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        })
    });
    if let Some(err) = failure {
        return Err(err);
    }
    if kwargs.get("reverse").is_some_and(Value::is_truthy) {
        items.reverse();
    }
    Ok(Value::List(items))
}

fn extreme(name: &str, args: &[Value], want: Ordering) -> Result<Value, EvalError> {
    let items = match args {
        [single] => single.iterate()?,
        many => many.to_vec(),
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = match best {
            Some(current) if compare(&item, &current)? != want => Some(current),
            _ => Some(item),
        };
    }
    best.ok_or_else(|| EvalError::Type(format!("{}() arg is an empty sequence", name)))
}

fn enumerate(args: &[Value], kwargs: &Kwargs) -> Result<Value, EvalError> {
    let items = one("enumerate", args)?.iterate()?;
    let start = match kwargs.get("start") {
        Some(v) => int_arg("enumerate", v)?,
        None => 0,
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let n = start
            .checked_add(i as i64)
            .ok_or_else(|| EvalError::Type("integer overflow".to_string()))?;
        out.push(Value::List(vec![Value::Int(n), item]));
    }
    Ok(Value::List(out))
}

fn abs(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Int(_) | Value::Bool(_) => v
            .as_int()
            .and_then(i64::checked_abs)
            .map(Value::Int)
            .ok_or_else(|| EvalError::Type("integer overflow".to_string())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(EvalError::Type(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

/// The namespace every template starts from. Host entries from
/// [`Options`](crate::Options) and render bindings shadow these.
pub fn namespace() -> Kwargs {
    let mut ns = Kwargs::new();
    let mut add = |name: &str, f: fn(&[Value], &Kwargs) -> Result<Value, EvalError>| {
        ns.insert(name.to_string(), Value::function(name, f));
    };

    add("html", |args, _| Ok(Value::Html(one("html", args)?.to_text()?)));
    add("url", |args, _| Ok(Value::Str(url_quote(&one("url", args)?.to_text()?))));
    add("attr", |args, kwargs| {
        expect_args("attr", args, 0, 0)?;
        attrs(kwargs.iter().map(|(k, v)| (k.as_str(), v)))
    });
    add("repr", |args, _| Ok(Value::Str(one("repr", args)?.repr())));
    add("str", |args, _| match args {
        [] => Ok(Value::Str(String::new())),
        _ => Ok(Value::Str(one("str", args)?.to_text()?)),
    });
    add("int", |args, _| to_int(one("int", args)?));
    add("float", |args, _| to_float(one("float", args)?));
    add("bool", |args, _| match args {
        [] => Ok(Value::Bool(false)),
        _ => Ok(Value::Bool(one("bool", args)?.is_truthy())),
    });
    add("len", |args, _| {
        let v = one("len", args)?;
        v.len().map(Value::from).ok_or_else(|| {
            EvalError::Type(format!("object of type '{}' has no len()", v.type_name()))
        })
    });
    add("range", |args, _| range(args));
    add("enumerate", enumerate);
    add("sorted", sorted);
    add("reversed", |args, _| {
        let mut items = one("reversed", args)?.iterate()?;
        items.reverse();
        Ok(Value::List(items))
    });
    add("list", |args, _| match args {
        [] => Ok(Value::List(Vec::new())),
        _ => one("list", args)?.iterate().map(Value::List),
    });
    add("min", |args, _| extreme("min", args, Ordering::Less));
    add("max", |args, _| extreme("max", args, Ordering::Greater));
    add("abs", |args, _| abs(one("abs", args)?));
    add("looper", |args, _| looper_value(one("looper", args)?));
    ns
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
        namespace()[name].call(args, &Kwargs::new())
    }

    #[rstest]
    #[case("with space", "with%20space")]
    #[case("a/b?c=d&e", "a/b%3Fc%3Dd%26e")]
    #[case("caf\u{e9}", "caf%C3%A9")]
    #[case("safe-_.~", "safe-_.~")]
    fn url_quoting(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(url_quote(input), expected);
    }

    #[test]
    fn attrs_sorts_strips_and_omits() {
        let class = Value::from("a<b");
        let id = Value::Int(3);
        let none = Value::None;
        let out = attrs([("id", &id), ("class_", &class), ("title", &none)]).unwrap();
        assert_eq!(out, Value::Html("class=\"a&lt;b\" id=\"3\"".to_string()));
    }

    #[test]
    fn range_variants() {
        assert_eq!(call("range", &[Value::Int(3)]).unwrap(), Value::from(vec![0, 1, 2]));
        assert_eq!(
            call("range", &[Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap(),
            Value::from(vec![5, 3, 1])
        );
        assert!(call("range", &[Value::Int(1), Value::Int(2), Value::Int(0)]).is_err());
    }

    #[test]
    fn sorted_with_reverse() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("reverse".into(), Value::Bool(true));
        let out = namespace()["sorted"]
            .call(&[Value::from(vec![2, 3, 1])], &kwargs)
            .unwrap();
        assert_eq!(out, Value::from(vec![3, 2, 1]));
        assert!(call("sorted", &[Value::List(vec![Value::Int(1), Value::from("a")])]).is_err());
    }

    #[test]
    fn min_max_and_conversions() {
        assert_eq!(call("max", &[Value::from(vec![1, 5, 3])]).unwrap(), Value::Int(5));
        assert_eq!(call("min", &[Value::Int(4), Value::Int(2)]).unwrap(), Value::Int(2));
        assert!(call("max", &[Value::List(vec![])]).is_err());
        assert_eq!(call("int", &[Value::from(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call("int", &[Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert_eq!(call("float", &[Value::from("1.5")]).unwrap(), Value::Float(1.5));
        assert_eq!(call("len", &[Value::from("héllo")]).unwrap(), Value::Int(5));
        assert_eq!(call("abs", &[Value::Int(-3)]).unwrap(), Value::Int(3));
    }

    #[test]
    fn html_marks_text_safe() {
        assert_eq!(
            call("html", &[Value::from("<b>")]).unwrap(),
            Value::Html("<b>".to_string())
        );
    }
}
