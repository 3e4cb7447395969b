//! Database value representation.
//!
//! Values are kept in a typed enum rather than an opaque byte form; the
//! canonical textual form of a scalar is produced by its type's output
//! function in the [`crate::types`] registry, never by this module.

use crate::row::Row;
use crate::types::TypeId;

/// Any non-null database value.
///
/// Null is represented as `Option<DbValue>::None` throughout the crate, so
/// that nullness is explicit at every boundary rather than an enum variant
/// that could be forgotten in a match arm.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// Boolean scalar
    Bool(bool),
    /// 64-bit integer scalar
    Int(i64),
    /// Double-precision float scalar
    Float(f64),
    /// Text scalar
    Text(String),
    /// Composite value (a row with a shape)
    Composite(Row),
    /// Multi-dimensional array value
    Array(DbArray),
}

/// A multi-dimensional array, stored flattened in row-major order.
///
/// `dims` holds the extent of each dimension; the number of dimensions is
/// `dims.len()`. `elements.len()` is always the product of the extents.
/// Per-element nulls are represented with `Option`.
#[derive(Debug, Clone, PartialEq)]
pub struct DbArray {
    /// Type of the array elements.
    pub element_type: TypeId,
    /// Extent of each dimension, outermost first.
    pub dims: Vec<usize>,
    /// Flattened elements in row-major order.
    pub elements: Vec<Option<DbValue>>,
}

impl DbArray {
    /// Create a zero-length one-dimensional array of the given element type.
    pub fn empty(element_type: TypeId) -> Self {
        Self {
            element_type,
            dims: vec![0],
            elements: Vec::new(),
        }
    }

    /// Total number of element slots (product of the dimension extents).
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl DbValue {
    /// Borrow this value as a composite row, if it is one.
    pub fn as_composite(&self) -> Option<&Row> {
        match self {
            DbValue::Composite(row) => Some(row),
            _ => None,
        }
    }

    /// Borrow this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&DbArray> {
        match self {
            DbValue::Array(array) => Some(array),
            _ => None,
        }
    }
}

/// Convenience constructor used in tests: a one-dimensional array of
/// optional elements.
pub fn array_1d(element_type: TypeId, elements: Vec<Option<DbValue>>) -> DbValue {
    DbValue::Array(DbArray {
        element_type,
        dims: vec![elements.len()],
        elements,
    })
}
