//! Position-aware iteration.
//!
//! ```
//! use stencil::Looper;
//!
//! let seq = vec!["apple", "asparagus", "Banana", "orange"];
//! let mut headings = Vec::new();
//! for (pos, item) in Looper::new(seq) {
//!     if pos.first_group(|i: &&str| i[..1].to_uppercase()) {
//!         headings.push((pos.number(), item));
//!     }
//! }
//! assert_eq!(headings, [(1, "apple"), (3, "Banana"), (4, "orange")]);
//! ```

use std::sync::Arc;

use crate::error::EvalError;
use crate::value::{Kwargs, Object, Value};

/// Wraps a finite sequence; iterating yields each item together with its
/// [`LoopPos`].
#[derive(Debug, Clone)]
pub struct Looper<T> {
    items: Arc<Vec<T>>,
    index: usize,
}

impl<T> Looper<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: Arc::new(items.into_iter().collect()),
            index: 0,
        }
    }
}

impl<T: Clone> Iterator for Looper<T> {
    type Item = (LoopPos<T>, T);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.get(self.index)?.clone();
        let pos = LoopPos {
            items: Arc::clone(&self.items),
            index: self.index,
        };
        self.index += 1;
        Some((pos, item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.items.len() - self.index;
        (left, Some(left))
    }
}

impl<T: Clone> ExactSizeIterator for Looper<T> {}

/// Where an iteration currently is within its sequence.
#[derive(Debug, Clone)]
pub struct LoopPos<T> {
    items: Arc<Vec<T>>,
    index: usize,
}

impl<T> LoopPos<T> {
    /// 0-based
    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn length(&self) -> usize {
        self.items.len()
    }

    pub fn first(&self) -> bool {
        self.index == 0
    }

    pub fn last(&self) -> bool {
        self.index + 1 == self.items.len()
    }

    pub fn item(&self) -> &T {
        &self.items[self.index]
    }

    pub fn previous(&self) -> Option<&T> {
        self.index.checked_sub(1).and_then(|i| self.items.get(i))
    }

    pub fn next(&self) -> Option<&T> {
        self.items.get(self.index + 1)
    }

    /// The 1-based position is odd.
    pub fn odd(&self) -> bool {
        self.index % 2 == 0
    }

    pub fn even(&self) -> bool {
        !self.odd()
    }

    /// True at the first item, or when `key` differs from the previous item's.
    pub fn first_group<K: PartialEq>(&self, mut key: impl FnMut(&T) -> K) -> bool {
        match self.previous() {
            None => true,
            Some(prev) => key(prev) != key(self.item()),
        }
    }

    /// True at the last item, or when `key` differs from the next item's.
    pub fn last_group<K: PartialEq>(&self, mut key: impl FnMut(&T) -> K) -> bool {
        match self.next() {
            None => true,
            Some(next) => key(next) != key(self.item()),
        }
    }

    fn try_first_group<K: PartialEq, E>(
        &self,
        mut key: impl FnMut(&T) -> Result<K, E>,
    ) -> Result<bool, E> {
        match self.previous() {
            None => Ok(true),
            Some(prev) => Ok(key(prev)? != key(self.item())?),
        }
    }

    fn try_last_group<K: PartialEq, E>(
        &self,
        mut key: impl FnMut(&T) -> Result<K, E>,
    ) -> Result<bool, E> {
        match self.next() {
            None => Ok(true),
            Some(next) => Ok(key(next)? != key(self.item())?),
        }
    }
}

/// Resolve a template-side group key: a callable is called with the item,
/// `".name"` reads an attribute, any other string is a key or attribute.
fn group_key(getter: &Value, item: &Value) -> Result<Value, EvalError> {
    match getter {
        Value::Str(name) => match name.strip_prefix('.') {
            Some(attr) => item.get_attr(attr),
            None => match item {
                Value::Map(_) | Value::List(_) => item.get_item(getter),
                _ => item.get_attr(name),
            },
        },
        Value::Function(_) | Value::Object(_) => getter.call(std::slice::from_ref(item), &Kwargs::new()),
        other => Err(EvalError::Type(format!(
            "group key must be a string or callable, not {}",
            other.type_name()
        ))),
    }
}

impl Object for LoopPos<Value> {
    fn type_name(&self) -> &str {
        "loop_pos"
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        let value = match name {
            "index" => Value::from(self.index()),
            "number" => Value::from(self.number()),
            "length" => Value::from(self.length()),
            "first" => Value::Bool(self.first()),
            "last" => Value::Bool(self.last()),
            "odd" => Value::Bool(self.odd()),
            "even" => Value::Bool(self.even()),
            "item" => self.item().clone(),
            "previous" => self.previous().cloned().unwrap_or_default(),
            "next" => self.next().cloned().unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }

    fn call_method(
        &self,
        name: &str,
        args: &[Value],
        _kwargs: &Kwargs,
    ) -> Option<Result<Value, EvalError>> {
        let grouped = match name {
            "first_group" | "last_group" => name == "first_group",
            _ => return None,
        };
        let Some(getter) = args.first() else {
            return Some(Err(EvalError::Type(format!(
                "{}() missing required argument: 'getter'",
                name
            ))));
        };
        let key = |item: &Value| group_key(getter, item);
        let result = if grouped {
            self.try_first_group(key)
        } else {
            self.try_last_group(key)
        };
        Some(result.map(Value::Bool))
    }

    fn to_text(&self) -> Result<String, EvalError> {
        Ok(format!("<loop pos={} length={}>", self.index, self.length()))
    }
}

/// Template-facing `looper(seq)`: a list of `[pos, item]` pairs.
pub fn looper_value(seq: &Value) -> Result<Value, EvalError> {
    let pairs = Looper::new(seq.iterate()?)
        .map(|(pos, item)| Value::List(vec![Value::from_object(pos), item]))
        .collect();
    Ok(Value::List(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_and_flags() {
        let seen: Vec<_> = Looper::new(["a", "b", "c"])
            .map(|(pos, item)| (pos.index(), pos.number(), pos.first(), pos.last(), pos.odd(), item))
            .collect();
        assert_eq!(
            seen,
            [
                (0, 1, true, false, true, "a"),
                (1, 2, false, false, false, "b"),
                (2, 3, false, true, true, "c"),
            ]
        );
    }

    #[test]
    fn neighbours() {
        let positions: Vec<_> = Looper::new([1, 2, 3]).map(|(pos, _)| pos).collect();
        assert_eq!(positions[0].previous(), None);
        assert_eq!(positions[0].next(), Some(&2));
        assert_eq!(positions[2].previous(), Some(&2));
        assert_eq!(positions[2].next(), None);
        assert_eq!(positions[1].length(), 3);
    }

    #[test]
    fn groups_by_key() {
        let seq = ["apple", "asparagus", "Banana", "orange"];
        let first: Vec<bool> = Looper::new(seq)
            .map(|(pos, _)| pos.first_group(|i| i[..1].to_uppercase()))
            .collect();
        let last: Vec<bool> = Looper::new(seq)
            .map(|(pos, _)| pos.last_group(|i| i[..1].to_uppercase()))
            .collect();
        assert_eq!(first, [true, false, true, true]);
        assert_eq!(last, [false, true, true, true]);
    }

    #[test]
    fn empty_sequence_yields_nothing() {
        assert_eq!(Looper::new(Vec::<i32>::new()).count(), 0);
    }

    #[test]
    fn template_object_groups_by_map_key() {
        let seq = Value::from(serde_json::json!([
            {"kind": "fruit"}, {"kind": "fruit"}, {"kind": "veg"}
        ]));
        let Value::List(pairs) = looper_value(&seq).unwrap() else {
            panic!("looper yields a list");
        };
        let flags: Vec<Value> = pairs
            .iter()
            .map(|pair| {
                let pos = pair.get_item(&Value::Int(0)).unwrap();
                crate::eval::call_method(&pos, "first_group", &[Value::from("kind")], &Kwargs::new())
                    .unwrap()
            })
            .collect();
        assert_eq!(flags, [Value::Bool(true), Value::Bool(false), Value::Bool(true)]);
    }
}
