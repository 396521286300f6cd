//=========================================================================
// Emit Result
//=========================================================================
//
// Values returned by listeners during one emission.
//
// Listener return values are always collected as a sequence. The
// legacy "0 → nothing, 1 → value, many → array" shape is produced in one
// place only: `EmitResult::collapse`.
//
//=========================================================================

//=== External Dependencies ===============================================

use serde_json::Value;

//=== Collapsed ===========================================================

/// Collapsed view of an [`EmitResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum Collapsed {
    Nothing,
    One(Value),
    Many(Vec<Value>),
}

//=== EmitResult ==========================================================

/// Ordered return values of the listeners that produced one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmitResult {
    values: Vec<Value>,
}

impl EmitResult {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Appends the values of another result, preserving order.
    pub fn merge(&mut self, other: EmitResult) {
        self.values.extend(other.values);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value if exactly one listener returned something.
    pub fn single(&self) -> Option<&Value> {
        match self.values.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Collapses the values: none, exactly one, or many.
    pub fn collapse(self) -> Collapsed {
        let mut values = self.values;
        match values.len() {
            0 => Collapsed::Nothing,
            1 => Collapsed::One(values.remove(0)),
            _ => Collapsed::Many(values),
        }
    }

    /// Collapses into a single JSON value (`None`, the value, or an array).
    pub fn into_value(self) -> Option<Value> {
        match self.collapse() {
            Collapsed::Nothing => None,
            Collapsed::One(v) => Some(v),
            Collapsed::Many(vs) => Some(Value::Array(vs)),
        }
    }
}

impl FromIterator<Value> for EmitResult {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
