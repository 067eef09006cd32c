use std::cmp::Ordering;
use std::mem;

use crate::ast::*;
use crate::error::EvalError;
use crate::scope::Scope;
use crate::value::{compare, Kwargs, Value};

/// Evaluates expressions against a read-only view of the render scope.
pub struct Evaluator<'s> {
    scope: &'s Scope,
}

impl<'s> Evaluator<'s> {
    pub fn new(scope: &'s Scope) -> Self {
        Self { scope }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(name) => self
                .scope
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Undefined(name.clone())),
            Expr::List(items) => items
                .iter()
                .map(|e| self.eval(e))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Map(pairs) => {
                let mut map = Kwargs::new();
                for (k, v) in pairs {
                    map.insert(self.eval(k)?.key_text(), self.eval(v)?);
                }
                Ok(Value::Map(map))
            }
            Expr::Attribute(obj, attr) => self.eval(obj)?.get_attr(attr),
            Expr::Index(obj, idx) => {
                let val = self.eval(obj)?;
                let idx_val = self.eval(idx)?;
                val.get_item(&idx_val)
            }
            Expr::Call {
                callee,
                args,
                kwargs,
            } => {
                let args = args
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut kw = Kwargs::new();
                for (name, e) in kwargs {
                    kw.insert(name.clone(), self.eval(e)?);
                }
                match callee.as_ref() {
                    Expr::Attribute(obj, method) => {
                        let target = self.eval(obj)?;
                        call_method(&target, method, &args, &kw)
                    }
                    other => self.eval(other)?.call(&args, &kw),
                }
            }
            Expr::Unary(op, operand) => unary_op(*op, self.eval(operand)?),
            Expr::BinOp(lhs, BinOp::And, rhs) => {
                let l = self.eval(lhs)?;
                if l.is_truthy() {
                    self.eval(rhs)
                } else {
                    Ok(l)
                }
            }
            Expr::BinOp(lhs, BinOp::Or, rhs) => {
                let l = self.eval(lhs)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval(rhs)
                }
            }
            Expr::BinOp(lhs, op, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                binary_op(*op, l, r)
            }
            Expr::Compare(first, chain) => {
                let mut left = self.eval(first)?;
                for (op, e) in chain {
                    let right = self.eval(e)?;
                    if !compare_op(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }
}

/// Run one code-block statement, updating `scope`.
pub fn exec(statement: &Statement, scope: &mut Scope) -> Result<(), EvalError> {
    match &statement.kind {
        StatementKind::Assign { targets, value } => {
            let value = Evaluator::new(scope).eval(value)?;
            bind_targets(scope, targets, value)
        }
        StatementKind::AugAssign { name, op, value } => {
            let current = scope
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Undefined(name.clone()))?;
            let rhs = Evaluator::new(scope).eval(value)?;
            let updated = binary_op(*op, current, rhs)?;
            scope.set(name.as_str(), updated);
            Ok(())
        }
        StatementKind::Expr(expr) => Evaluator::new(scope).eval(expr).map(|_| ()),
    }
}

/// Bind one name directly, or unpack a sequence of exactly `targets.len()`
/// items into several names.
pub fn bind_targets(scope: &mut Scope, targets: &[String], value: Value) -> Result<(), EvalError> {
    if let [name] = targets {
        scope.set(name.as_str(), value);
        return Ok(());
    }
    let items = value.iterate()?;
    if items.len() != targets.len() {
        return Err(EvalError::Unpack {
            expected: targets.len(),
            found: items.len(),
        });
    }
    for (name, item) in targets.iter().zip(items) {
        scope.set(name.as_str(), item);
    }
    Ok(())
}

fn unary_op(op: UnaryOp, v: Value) -> Result<Value, EvalError> {
    match (op, &v) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(_) | Value::Bool(_)) => v
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(overflow),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Int(_) | Value::Bool(_) | Value::Float(_)) => Ok(v),
        _ => Err(EvalError::Type(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

enum Numbers {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numbers(a: &Value, b: &Value) -> Option<Numbers> {
    match (a, b) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            Some(Numbers::Ints(a.as_int()?, b.as_int()?))
        }
        _ => Some(Numbers::Floats(a.as_float()?, b.as_float()?)),
    }
}

fn overflow() -> EvalError {
    EvalError::Type("integer overflow".to_string())
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
        BinOp::And => "and",
        BinOp::Or => "or",
    }
}

/// Upper bound on the length of a string or list built by `*`.
const MAX_REPEAT_LEN: usize = 1 << 24;

/// Number of copies for `seq * n`, refusing results that would not fit.
fn repeat_times(len: usize, times: i64) -> Result<usize, EvalError> {
    let times = usize::try_from(times).unwrap_or(0);
    if len == 0 {
        return Ok(0);
    }
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(EvalError::Type("repeated sequence is too long".to_string())),
    }
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>, EvalError> {
    let times = repeat_times(items.len(), times)?;
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    Ok(out)
}

/// Arithmetic operators. `and`/`or` are accepted for completeness but the
/// evaluator short-circuits them before getting here.
pub fn binary_op(op: BinOp, a: Value, b: Value) -> Result<Value, EvalError> {
    let unsupported = |a: &Value, b: &Value| {
        EvalError::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op_symbol(op),
            a.type_name(),
            b.type_name()
        ))
    };

    match op {
        BinOp::And => return Ok(if a.is_truthy() { b } else { a }),
        BinOp::Or => return Ok(if a.is_truthy() { a } else { b }),
        _ => {}
    }

    match (op, &a, &b) {
        (BinOp::Add, Value::Html(x), Value::Html(y)) => return Ok(Value::Html(format!("{}{}", x, y))),
        (BinOp::Add, Value::Str(x) | Value::Html(x), Value::Str(y) | Value::Html(y)) => {
            return Ok(Value::Str(format!("{}{}", x, y)))
        }
        (BinOp::Add, Value::Str(_) | Value::Html(_), _) => {
            return Err(EvalError::Type(format!(
                "can only concatenate str (not \"{}\") to str",
                b.type_name()
            )))
        }
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.clone();
            items.extend(y.iter().cloned());
            return Ok(Value::List(items));
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            return Ok(Value::Str(s.repeat(repeat_times(s.len(), *n)?)))
        }
        (BinOp::Mul, Value::List(items), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::List(items)) => {
            return repeat(items, *n).map(Value::List)
        }
        _ => {}
    }

    let nums = numbers(&a, &b).ok_or_else(|| unsupported(&a, &b))?;
    match (op, nums) {
        (BinOp::Add, Numbers::Ints(x, y)) => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
        (BinOp::Sub, Numbers::Ints(x, y)) => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
        (BinOp::Mul, Numbers::Ints(x, y)) => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
        (BinOp::Add, Numbers::Floats(x, y)) => Ok(Value::Float(x + y)),
        (BinOp::Sub, Numbers::Floats(x, y)) => Ok(Value::Float(x - y)),
        (BinOp::Mul, Numbers::Floats(x, y)) => Ok(Value::Float(x * y)),
        (BinOp::Div, Numbers::Ints(x, y)) => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            Ok(Value::Float(x as f64 / y as f64))
        }
        (BinOp::Div, Numbers::Floats(x, y)) => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            Ok(Value::Float(x / y))
        }
        (BinOp::FloorDiv, Numbers::Ints(x, y)) => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            let q = x.checked_div(y).ok_or_else(overflow)?;
            // round toward negative infinity
            if x % y != 0 && ((x < 0) != (y < 0)) {
                Ok(Value::Int(q - 1))
            } else {
                Ok(Value::Int(q))
            }
        }
        (BinOp::FloorDiv, Numbers::Floats(x, y)) => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            Ok(Value::Float((x / y).floor()))
        }
        (BinOp::Mod, Numbers::Ints(x, y)) => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            // result takes the sign of the divisor
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                Ok(Value::Int(r + y))
            } else {
                Ok(Value::Int(r))
            }
        }
        (BinOp::Mod, Numbers::Floats(x, y)) => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            Ok(Value::Float(x - y * (x / y).floor()))
        }
        (BinOp::Pow, Numbers::Ints(x, y)) => match u32::try_from(y) {
            Ok(exp) => x.checked_pow(exp).map(Value::Int).ok_or_else(overflow),
            Err(_) if y < 0 => Ok(Value::Float((x as f64).powf(y as f64))),
            Err(_) => Err(overflow()),
        },
        (BinOp::Pow, Numbers::Floats(x, y)) => Ok(Value::Float(x.powf(y))),
        (BinOp::And | BinOp::Or, _) => Err(unsupported(&a, &b)),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, EvalError> {
    match haystack {
        Value::Str(s) | Value::Html(s) => match needle.as_str() {
            Some(n) => Ok(s.contains(n)),
            None => Err(EvalError::Type(format!(
                "'in <string>' requires string as left operand, not {}",
                needle.type_name()
            ))),
        },
        Value::List(items) => Ok(items.contains(needle)),
        Value::Map(map) => Ok(map.contains_key(&needle.key_text())),
        Value::Object(_) => Ok(haystack.iterate()?.contains(needle)),
        other => Err(EvalError::Type(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn identical(a: &Value, b: &Value) -> bool {
    mem::discriminant(a) == mem::discriminant(b) && a == b
}

pub fn compare_op(op: CmpOp, a: &Value, b: &Value) -> Result<bool, EvalError> {
    Ok(match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => compare(a, b)? == Ordering::Less,
        CmpOp::Le => compare(a, b)? != Ordering::Greater,
        CmpOp::Gt => compare(a, b)? == Ordering::Greater,
        CmpOp::Ge => compare(a, b)? != Ordering::Less,
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Is => identical(a, b),
        CmpOp::IsNot => !identical(a, b),
    })
}

fn no_kwargs(method: &str, kwargs: &Kwargs) -> Result<(), EvalError> {
    if kwargs.is_empty() {
        Ok(())
    } else {
        Err(EvalError::Type(format!("{}() takes no keyword arguments", method)))
    }
}

fn str_arg<'v>(args: &'v [Value], i: usize, method: &str) -> Result<&'v str, EvalError> {
    args.get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| EvalError::Type(format!("{}() argument {} must be str", method, i + 1)))
}

fn arity(method: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else if min == max {
        Err(EvalError::Type(format!(
            "{}() takes exactly {} argument(s) ({} given)",
            method,
            min,
            args.len()
        )))
    } else {
        Err(EvalError::Type(format!(
            "{}() takes {} to {} arguments ({} given)",
            method,
            min,
            max,
            args.len()
        )))
    }
}

fn str_method(s: &str, method: &str, args: &[Value]) -> Option<Result<Value, EvalError>> {
    let chars_arg = |args: &[Value]| -> Result<Option<Vec<char>>, EvalError> {
        arity(method, args, 0, 1)?;
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(_) => Ok(Some(str_arg(args, 0, method)?.chars().collect())),
        }
    };
    let result = match method {
        "upper" => arity(method, args, 0, 0).map(|_| Value::Str(s.to_uppercase())),
        "lower" => arity(method, args, 0, 0).map(|_| Value::Str(s.to_lowercase())),
        "strip" | "lstrip" | "rstrip" => chars_arg(args).map(|chars| {
            let is_stripped = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match method {
                "strip" => s.trim_matches(is_stripped),
                "lstrip" => s.trim_start_matches(is_stripped),
                _ => s.trim_end_matches(is_stripped),
            };
            Value::Str(out.to_string())
        }),
        "startswith" => arity(method, args, 1, 1)
            .and_then(|_| str_arg(args, 0, method))
            .map(|p| Value::Bool(s.starts_with(p))),
        "endswith" => arity(method, args, 1, 1)
            .and_then(|_| str_arg(args, 0, method))
            .map(|p| Value::Bool(s.ends_with(p))),
        "replace" => arity(method, args, 2, 2).and_then(|_| {
            let old = str_arg(args, 0, method)?;
            let new = str_arg(args, 1, method)?;
            Ok(Value::Str(s.replace(old, new)))
        }),
        "split" => arity(method, args, 0, 1).and_then(|_| {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::from).collect(),
                Some(_) => {
                    let sep = str_arg(args, 0, method)?;
                    if sep.is_empty() {
                        return Err(EvalError::Type("empty separator".to_string()));
                    }
                    s.split(sep).map(Value::from).collect()
                }
            };
            Ok(Value::List(parts))
        }),
        "join" => arity(method, args, 1, 1).and_then(|_| {
            let parts = args[0]
                .iterate()?
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        EvalError::Type(format!(
                            "sequence item: expected str instance, {} found",
                            v.type_name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Str(parts.join(s)))
        }),
        "title" | "capitalize" => arity(method, args, 0, 0).map(|_| {
            let mut out = String::with_capacity(s.len());
            let mut at_word_start = true;
            for (i, c) in s.chars().enumerate() {
                let upper = if method == "title" { at_word_start } else { i == 0 };
                if upper {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                at_word_start = !c.is_alphanumeric();
            }
            Value::Str(out)
        }),
        _ => return None,
    };
    Some(result)
}

fn map_method(map: &Kwargs, method: &str, args: &[Value]) -> Option<Result<Value, EvalError>> {
    let result = match method {
        "items" => arity(method, args, 0, 0).map(|_| {
            Value::List(
                map.iter()
                    .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
            )
        }),
        "keys" => arity(method, args, 0, 0)
            .map(|_| Value::List(map.keys().cloned().map(Value::Str).collect())),
        "values" => arity(method, args, 0, 0).map(|_| Value::List(map.values().cloned().collect())),
        "get" => arity(method, args, 1, 2).map(|_| {
            map.get(&args[0].key_text())
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or_default())
        }),
        _ => return None,
    };
    Some(result)
}

fn list_method(items: &[Value], method: &str, args: &[Value]) -> Option<Result<Value, EvalError>> {
    let result = match method {
        "index" => arity(method, args, 1, 1).and_then(|_| {
            items
                .iter()
                .position(|v| *v == args[0])
                .map(Value::from)
                .ok_or_else(|| EvalError::Custom(format!("{} is not in list", args[0].repr())))
        }),
        "count" => arity(method, args, 1, 1)
            .map(|_| Value::from(items.iter().filter(|v| **v == args[0]).count())),
        _ => return None,
    };
    Some(result)
}

/// `target.method(args)`: host objects first, then the built-in methods of
/// strings, maps and lists, then a plain attribute lookup and call.
pub fn call_method(
    target: &Value,
    method: &str,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value, EvalError> {
    let builtin = match target {
        Value::Object(obj) => obj.call_method(method, args, kwargs),
        Value::Str(s) | Value::Html(s) => no_kwargs(method, kwargs)
            .err()
            .map(Err)
            .or_else(|| str_method(s, method, args)),
        Value::Map(map) if !map.contains_key(method) => no_kwargs(method, kwargs)
            .err()
            .map(Err)
            .or_else(|| map_method(map, method, args)),
        Value::List(items) => no_kwargs(method, kwargs)
            .err()
            .map(Err)
            .or_else(|| list_method(items, method, args)),
        _ => None,
    };
    match builtin {
        Some(result) => result,
        None => target.get_attr(method)?.call(args, kwargs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    fn eval_in(src: &str, scope: &Scope) -> Result<Value, EvalError> {
        Evaluator::new(scope).eval(&parse_expression(src).unwrap())
    }

    fn eval(src: &str) -> Value {
        eval_in(src, &Scope::new()).unwrap()
    }

    #[test]
    fn integer_division_floors() {
        assert_eq!(eval("7 // 2"), Value::Int(3));
        assert_eq!(eval("-7 // 2"), Value::Int(-4));
        assert_eq!(eval("-7 % 3"), Value::Int(2));
        assert_eq!(eval("7 % -3"), Value::Int(-2));
        assert_eq!(eval("7 / 2"), Value::Float(3.5));
        assert_eq!(eval("2 ** 10"), Value::Int(1024));
        assert_eq!(eval("-2 ** 2"), Value::Int(-4));
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("'ab' * 2"), Value::from("abab"));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(matches!(
            eval_in("1 / 0", &Scope::new()),
            Err(EvalError::ZeroDivision)
        ));
        assert!(matches!(
            eval_in("1 % 0", &Scope::new()),
            Err(EvalError::ZeroDivision)
        ));
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(eval_in("9223372036854775807 + 1", &Scope::new()).is_err());
    }

    #[test]
    fn huge_repetition_is_an_error() {
        assert_eq!(eval("'ab' * 3"), Value::from("ababab"));
        assert_eq!(eval("[1] * -2"), Value::List(vec![]));
        assert_eq!(eval("3 * [1, 2]"), Value::from(vec![1, 2, 1, 2, 1, 2]));
        assert_eq!(eval("[] * 10 ** 12"), Value::List(vec![]));
        for src in ["'ab' * 9223372036854775807", "[1] * 10 ** 12"] {
            let err = eval_in(src, &Scope::new()).unwrap_err();
            assert_eq!(err.to_string(), "repeated sequence is too long");
        }
    }

    #[test]
    fn string_plus_int_is_a_type_error() {
        let scope = Scope::new().with("name", "Ian");
        let err = eval_in("name + 1", &scope).unwrap_err();
        assert_eq!(err.to_string(), "can only concatenate str (not \"int\") to str");
    }

    #[test]
    fn undefined_names() {
        let err = eval_in("x", &Scope::new()).unwrap_err();
        assert!(matches!(err, EvalError::Undefined(ref n) if n == "x"));
    }

    #[test]
    fn boolean_operators_short_circuit_and_return_operands() {
        assert_eq!(eval("0 or 'x'"), Value::from("x"));
        assert_eq!(eval("'' and undefined_name"), Value::from(""));
        assert_eq!(eval("not 0"), Value::Bool(true));
    }

    #[test]
    fn chained_comparisons_and_membership() {
        assert_eq!(eval("1 < 2 < 3"), Value::Bool(true));
        assert_eq!(eval("1 < 3 < 2"), Value::Bool(false));
        assert_eq!(eval("'a' in 'cat'"), Value::Bool(true));
        assert_eq!(eval("3 not in [1, 2]"), Value::Bool(true));
        assert_eq!(eval("'k' in {'k': 1}"), Value::Bool(true));
        assert_eq!(eval("None is None"), Value::Bool(true));
        assert_eq!(eval("1 is not 1.0"), Value::Bool(true));
    }

    #[test]
    fn attribute_index_and_methods() {
        let scope = Scope::new().with(
            "z",
            Value::from(serde_json::json!({"a": 2, "b": 4})),
        );
        assert_eq!(eval_in("z.a", &scope).unwrap(), Value::Int(2));
        assert_eq!(eval_in("z['b']", &scope).unwrap(), Value::Int(4));
        assert_eq!(
            eval_in("z.items()[0]", &scope).unwrap(),
            Value::List(vec![Value::from("a"), Value::Int(2)])
        );
        assert_eq!(eval_in("z.get('missing', 7)", &scope).unwrap(), Value::Int(7));
        assert_eq!(eval("'Apple'[0].upper()"), Value::from("A"));
        assert_eq!(eval("', '.join(['a', 'b'])"), Value::from("a, b"));
        assert_eq!(eval("' x '.strip()"), Value::from("x"));
        assert_eq!(eval("'a-b'.split('-')"), Value::from(vec!["a", "b"]));
        assert_eq!(eval("[1, 2, 2].count(2)"), Value::Int(2));
        assert!(eval_in("'a'.nope()", &Scope::new()).is_err());
    }

    #[test]
    fn conditional_expression() {
        assert_eq!(eval("'odd' if 3 % 2 else 'even'"), Value::from("odd"));
    }

    #[test]
    fn statements_update_scope() {
        let mut scope = Scope::new();
        let stmt = |src: &str| Statement {
            pos: Default::default(),
            kind: crate::expr::parse_statement(src).unwrap(),
        };
        exec(&stmt("x = 1"), &mut scope).unwrap();
        exec(&stmt("x += 2"), &mut scope).unwrap();
        exec(&stmt("a, b = [x, 'b']"), &mut scope).unwrap();
        assert_eq!(scope.get("x"), Some(&Value::Int(3)));
        assert_eq!(scope.get("a"), Some(&Value::Int(3)));
        assert_eq!(scope.get("b"), Some(&Value::from("b")));
        assert!(matches!(
            exec(&stmt("a, b = [1, 2, 3]"), &mut scope),
            Err(EvalError::Unpack { expected: 2, found: 3 })
        ));
    }
}
