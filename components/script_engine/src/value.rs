//! The engine's dynamic value model.

use indexmap::IndexMap;

/// Any value a script can hold or produce.
///
/// The model is deliberately closed: the conversion layer above maps every
/// database value into exactly these shapes and back. Mappings preserve
/// insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Dynamic {
    /// The absent value.
    Null,
    /// A scalar, always carried as text.
    Scalar(String),
    /// An ordered sequence of values.
    Sequence(Vec<Dynamic>),
    /// A string-keyed, insertion-ordered mapping.
    Mapping(IndexMap<String, Dynamic>),
    /// A sequence wrapper tagged with the database array type it came
    /// from, so a round trip preserves the element type.
    TaggedArray {
        /// Identifier of the source array type.
        tag: u32,
        /// The (possibly nested) elements.
        elements: Vec<Dynamic>,
    },
}

impl Dynamic {
    /// Scalar constructor from anything stringly.
    pub fn scalar(text: impl Into<String>) -> Self {
        Dynamic::Scalar(text.into())
    }

    /// Script-level truthiness: null is false, a scalar is false when it
    /// reads as empty, zero or a false boolean, and every aggregate is
    /// true.
    pub fn truthy(&self) -> bool {
        match self {
            Dynamic::Null => false,
            Dynamic::Scalar(s) => !matches!(s.as_str(), "" | "0" | "f" | "false"),
            _ => true,
        }
    }

    /// Borrow the scalar text, if this is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Dynamic::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the elements if this value is sequence-shaped (a plain
    /// sequence or a tagged array).
    pub fn array_like(&self) -> Option<&[Dynamic]> {
        match self {
            Dynamic::Sequence(items) => Some(items),
            Dynamic::TaggedArray { elements, .. } => Some(elements),
            _ => None,
        }
    }

    /// Borrow the mapping, if this is one.
    pub fn as_mapping(&self) -> Option<&IndexMap<String, Dynamic>> {
        match self {
            Dynamic::Mapping(map) => Some(map),
            _ => None,
        }
    }
}
