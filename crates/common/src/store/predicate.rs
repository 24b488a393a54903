use std::cmp::Ordering;

use serde_json::Value;

use crate::object::WireDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A filter on one top-level field of a document
///
/// `path` and `version` can be filtered like plain fields. Ordering
/// comparisons only match values of the same type.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Op::Eq, value)
    }

    pub fn matches(&self, doc: &WireDocument) -> bool {
        let found = match self.field.as_str() {
            "path" => Some(Value::String(doc.path.clone())),
            "version" => Some(Value::from(doc.version)),
            name => doc.fields.get(name).cloned(),
        };
        let Some(found) = found else {
            return false;
        };
        match self.op {
            Op::Eq => found == self.value,
            Op::Ne => found != self.value,
            op => match compare(&found, &self.value) {
                Some(ordering) => match op {
                    Op::Lt => ordering == Ordering::Less,
                    Op::Le => ordering != Ordering::Greater,
                    Op::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                None => false,
            },
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn doc() -> WireDocument {
        let mut doc = WireDocument::new("/cities/a", 3);
        doc.fields.insert("name".into(), Value::from("Berlin"));
        doc.fields.insert("population".into(), Value::from(3_600_000));
        doc
    }

    #[test]
    fn test_operators() {
        let doc = doc();
        assert!(Predicate::eq("name", "Berlin").matches(&doc));
        assert!(Predicate::new("name", Op::Ne, "Paris").matches(&doc));
        assert!(Predicate::new("population", Op::Gt, 1_000_000).matches(&doc));
        assert!(Predicate::new("population", Op::Ge, 3_600_000).matches(&doc));
        assert!(!Predicate::new("population", Op::Lt, 3_600_000).matches(&doc));
        assert!(Predicate::new("population", Op::Le, 3_600_000.0).matches(&doc));
        assert!(Predicate::new("version", Op::Lt, 4).matches(&doc));
        assert!(Predicate::eq("path", "/cities/a").matches(&doc));
    }

    #[test]
    fn test_missing_and_mixed_types() {
        let doc = doc();
        assert!(!Predicate::eq("mayor", "x").matches(&doc));
        assert!(!Predicate::new("mayor", Op::Ne, "x").matches(&doc));
        assert!(!Predicate::new("name", Op::Gt, 3).matches(&doc));
    }
}
