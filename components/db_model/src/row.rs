//! Row shapes and row values.

use std::rc::Rc;

use thiserror::Error;

use crate::types::TypeId;
use crate::value::DbValue;

/// One attribute of a row shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Attribute type.
    pub type_id: TypeId,
    /// Whether the attribute has been dropped. Dropped attributes keep
    /// their slot (positions stay stable) but are invisible to name lookup
    /// and are never marshaled.
    pub dropped: bool,
}

impl Attribute {
    /// Create a live attribute.
    pub fn new(name: &str, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
            dropped: false,
        }
    }

    /// Create a dropped attribute placeholder.
    pub fn dropped(name: &str, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
            dropped: true,
        }
    }
}

/// The attribute layout of a composite value or result set.
#[derive(Debug, Clone, PartialEq)]
pub struct RowShape {
    attrs: Vec<Attribute>,
}

/// Error building a row from parts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    /// Value count does not match the shape's attribute count.
    #[error("row has {got} values but shape has {want} attributes")]
    Arity {
        /// Values supplied.
        got: usize,
        /// Attributes in the shape.
        want: usize,
    },
}

impl RowShape {
    /// Create a shape from attributes.
    pub fn new(attrs: Vec<Attribute>) -> Rc<Self> {
        Rc::new(Self { attrs })
    }

    /// Convenience: a shape of live attributes from (name, type) pairs.
    pub fn of(columns: &[(&str, TypeId)]) -> Rc<Self> {
        Self::new(
            columns
                .iter()
                .map(|(name, ty)| Attribute::new(name, *ty))
                .collect(),
        )
    }

    /// All attributes, including dropped ones.
    pub fn attrs(&self) -> &[Attribute] {
        &self.attrs
    }

    /// Number of attribute slots, including dropped ones.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the shape has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Position of a live attribute by name. Dropped attributes are not
    /// found.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.attrs
            .iter()
            .position(|a| !a.dropped && a.name == name)
    }
}

/// A row value: a shape plus one optional value per attribute slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    shape: Rc<RowShape>,
    values: Vec<Option<DbValue>>,
}

impl Row {
    /// Build a row from attribute values; `None` entries are nulls.
    pub fn from_parts(shape: Rc<RowShape>, values: Vec<Option<DbValue>>) -> Result<Self, RowError> {
        if values.len() != shape.len() {
            return Err(RowError::Arity {
                got: values.len(),
                want: shape.len(),
            });
        }
        Ok(Self { shape, values })
    }

    /// The row's shape.
    pub fn shape(&self) -> &Rc<RowShape> {
        &self.shape
    }

    /// Read the value at an attribute position (`None` if null).
    pub fn get(&self, index: usize) -> Option<&DbValue> {
        self.values.get(index).and_then(|v| v.as_ref())
    }

    /// All values in slot order.
    pub fn values(&self) -> &[Option<DbValue>] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::builtin;

    #[test]
    fn test_position_skips_dropped() {
        let shape = RowShape::new(vec![
            Attribute::new("a", builtin::INT),
            Attribute::dropped("gone", builtin::TEXT),
            Attribute::new("b", builtin::TEXT),
        ]);
        assert_eq!(shape.position("a"), Some(0));
        assert_eq!(shape.position("gone"), None);
        assert_eq!(shape.position("b"), Some(2));
    }

    #[test]
    fn test_row_arity_check() {
        let shape = RowShape::of(&[("a", builtin::INT), ("b", builtin::TEXT)]);
        let err = Row::from_parts(shape, vec![Some(DbValue::Int(1))]).unwrap_err();
        assert_eq!(err, RowError::Arity { got: 1, want: 2 });
    }

    #[test]
    fn test_row_get() {
        let shape = RowShape::of(&[("a", builtin::INT), ("b", builtin::TEXT)]);
        let row = Row::from_parts(shape, vec![Some(DbValue::Int(7)), None]).unwrap();
        assert_eq!(row.get(0), Some(&DbValue::Int(7)));
        assert_eq!(row.get(1), None);
    }
}
