//! The conversion core.

use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use db_model::row::{Row, RowShape};
use db_model::types::{builtin, TypeClass, TypeError, TypeId, TypeRegistry};
use db_model::value::{DbArray, DbValue};
use script_engine::Dynamic;

/// Conversion failure in either direction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConvError {
    /// Type registry or per-type input/output failure.
    #[error(transparent)]
    Type(#[from] TypeError),
    /// A mapping key does not name a live attribute of the target shape.
    #[error("no column named \"{0}\" in target row shape")]
    UnknownColumn(String),
    /// A composite target received a non-mapping value.
    #[error("cannot convert {0} to a composite value")]
    NotComposite(String),
    /// An array target received a non-sequence value.
    #[error("cannot convert {0} to an array value")]
    NotArray(String),
    /// Nested sequences do not form a rectangular array.
    #[error("multidimensional arrays must have array expressions with matching dimensions")]
    DimensionMismatch,
    /// Value nesting exceeded the conversion depth limit.
    #[error("value nesting exceeds depth limit of {0}")]
    TooDeep(usize),
    /// A record-typed result was produced in a context with no known shape.
    #[error("function returning record called in context that cannot accept type record")]
    RecordShapeUnknown,
    /// The type cannot cross the boundary.
    #[error("cannot convert value of type {0}")]
    Unsupported(String),
}

fn variant_name(value: &Dynamic) -> &'static str {
    match value {
        Dynamic::Null => "null",
        Dynamic::Scalar(_) => "a scalar",
        Dynamic::Sequence(_) => "a sequence",
        Dynamic::Mapping(_) => "a mapping",
        Dynamic::TaggedArray { .. } => "an array",
    }
}

/// Bidirectional converter between database values and engine values.
///
/// Both directions recurse through composites and arrays and are guarded by
/// the same depth limit.
pub struct Marshal {
    registry: Rc<TypeRegistry>,
    max_depth: usize,
}

impl Marshal {
    /// Create a converter over a type registry.
    pub fn new(registry: Rc<TypeRegistry>, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
        }
    }

    /// The registry this converter resolves types against.
    pub fn registry(&self) -> &Rc<TypeRegistry> {
        &self.registry
    }

    /// Convert a database value (null included) into an engine value.
    pub fn to_dynamic(
        &self,
        value: Option<&DbValue>,
        type_id: TypeId,
    ) -> Result<Dynamic, ConvError> {
        self.out(value, type_id, 0)
    }

    /// Convert a whole row into a mapping keyed by live attribute names.
    pub fn row_to_mapping(&self, row: &Row) -> Result<Dynamic, ConvError> {
        self.row_out(row, 0)
    }

    /// Convert an engine value into a database value of the given type.
    ///
    /// `result_shape` supplies the row shape for a `record`-typed target,
    /// which has no intrinsic shape of its own.
    pub fn to_database(
        &self,
        value: &Dynamic,
        type_id: TypeId,
        result_shape: Option<&Rc<RowShape>>,
    ) -> Result<Option<DbValue>, ConvError> {
        self.in_(value, type_id, result_shape, 0)
    }

    /// Convert a mapping into a row of the given shape. Keys must name
    /// live attributes; attributes absent from the mapping become null.
    pub fn mapping_to_row(
        &self,
        map: &IndexMap<String, Dynamic>,
        shape: &Rc<RowShape>,
    ) -> Result<Row, ConvError> {
        self.map_in(map, shape, 0)
    }

    /// Render an engine value as the canonical output text of a named
    /// type. Null renders as `NULL`.
    pub fn to_literal(&self, value: &Dynamic, type_name: &str) -> Result<String, ConvError> {
        let type_id = self.registry.by_name(type_name)?;
        match self.to_database(value, type_id, None)? {
            None => Ok("NULL".to_string()),
            Some(converted) => self.output_text(&converted, type_id),
        }
    }

    fn output_text(&self, value: &DbValue, type_id: TypeId) -> Result<String, ConvError> {
        let meta = self.registry.lookup(type_id)?;
        match &meta.io {
            Some(io) => Ok(io.output(value)),
            None => Err(ConvError::Unsupported(meta.name.clone())),
        }
    }

    fn guard(&self, depth: usize) -> Result<(), ConvError> {
        if depth > self.max_depth {
            Err(ConvError::TooDeep(self.max_depth))
        } else {
            Ok(())
        }
    }

    fn out(
        &self,
        value: Option<&DbValue>,
        type_id: TypeId,
        depth: usize,
    ) -> Result<Dynamic, ConvError> {
        self.guard(depth)?;
        let value = match value {
            None => return Ok(Dynamic::Null),
            Some(v) => v,
        };
        let meta = self.registry.lookup(type_id)?;
        match meta.class {
            TypeClass::Scalar => match &meta.io {
                Some(io) => Ok(Dynamic::Scalar(io.output(value))),
                None => Err(ConvError::Unsupported(meta.name.clone())),
            },
            TypeClass::Composite => {
                let row = value
                    .as_composite()
                    .ok_or_else(|| ConvError::NotComposite(meta.name.clone()))?;
                self.row_out(row, depth + 1)
            }
            TypeClass::Array => {
                let array = value
                    .as_array()
                    .ok_or_else(|| ConvError::NotArray(meta.name.clone()))?;
                self.array_out(array, type_id, depth + 1)
            }
            TypeClass::Pseudo => Err(ConvError::Unsupported(meta.name.clone())),
        }
    }

    fn row_out(&self, row: &Row, depth: usize) -> Result<Dynamic, ConvError> {
        self.guard(depth)?;
        let mut map = IndexMap::new();
        for (index, attr) in row.shape().attrs().iter().enumerate() {
            if attr.dropped {
                continue;
            }
            let converted = self.out(row.get(index), attr.type_id, depth + 1)?;
            map.insert(attr.name.clone(), converted);
        }
        Ok(Dynamic::Mapping(map))
    }

    fn array_out(
        &self,
        array: &DbArray,
        type_id: TypeId,
        depth: usize,
    ) -> Result<Dynamic, ConvError> {
        let elements =
            self.array_level(&array.dims, &array.elements, array.element_type, depth)?;
        Ok(Dynamic::TaggedArray {
            tag: type_id.0,
            elements,
        })
    }

    // Rebuild one nesting level of a flattened row-major array; inner
    // levels come out as plain sequences.
    fn array_level(
        &self,
        dims: &[usize],
        flat: &[Option<DbValue>],
        element_type: TypeId,
        depth: usize,
    ) -> Result<Vec<Dynamic>, ConvError> {
        self.guard(depth)?;
        match dims {
            [] => Ok(Vec::new()),
            [n] => {
                let mut out = Vec::with_capacity(*n);
                for slot in flat.iter().take(*n) {
                    out.push(self.out(slot.as_ref(), element_type, depth + 1)?);
                }
                Ok(out)
            }
            [n, rest @ ..] => {
                let stride = flat.len() / n.max(&1);
                let mut out = Vec::with_capacity(*n);
                for chunk in flat.chunks(stride.max(1)).take(*n) {
                    out.push(Dynamic::Sequence(self.array_level(
                        rest,
                        chunk,
                        element_type,
                        depth + 1,
                    )?));
                }
                Ok(out)
            }
        }
    }

    fn in_(
        &self,
        value: &Dynamic,
        type_id: TypeId,
        result_shape: Option<&Rc<RowShape>>,
        depth: usize,
    ) -> Result<Option<DbValue>, ConvError> {
        self.guard(depth)?;
        if type_id == builtin::VOID {
            return Ok(None);
        }
        let meta = self.registry.lookup(type_id)?;
        if matches!(value, Dynamic::Null) {
            if meta.rejects_null {
                return Err(ConvError::Type(TypeError::NullRejected(meta.name.clone())));
            }
            return Ok(None);
        }
        if type_id == builtin::RECORD {
            let shape = result_shape.ok_or(ConvError::RecordShapeUnknown)?;
            let map = value
                .as_mapping()
                .ok_or_else(|| ConvError::NotComposite(variant_name(value).to_string()))?;
            return Ok(Some(DbValue::Composite(self.map_in(map, shape, depth + 1)?)));
        }
        match meta.class {
            TypeClass::Array => {
                let element_type = meta
                    .element
                    .ok_or_else(|| ConvError::Unsupported(meta.name.clone()))?;
                let items = value
                    .array_like()
                    .ok_or_else(|| ConvError::NotArray(variant_name(value).to_string()))?;
                Ok(Some(DbValue::Array(self.seq_in(
                    items,
                    element_type,
                    depth + 1,
                )?)))
            }
            TypeClass::Composite => {
                let shape = meta
                    .shape
                    .clone()
                    .ok_or_else(|| ConvError::Unsupported(meta.name.clone()))?;
                let map = value
                    .as_mapping()
                    .ok_or_else(|| ConvError::NotComposite(variant_name(value).to_string()))?;
                Ok(Some(DbValue::Composite(self.map_in(
                    map,
                    &shape,
                    depth + 1,
                )?)))
            }
            TypeClass::Scalar => match &meta.io {
                Some(io) => match value.as_scalar() {
                    Some(text) => Ok(Some(io.parse(text)?)),
                    None => Err(ConvError::Unsupported(format!(
                        "{} from {}",
                        meta.name,
                        variant_name(value)
                    ))),
                },
                None => Err(ConvError::Unsupported(meta.name.clone())),
            },
            TypeClass::Pseudo => Err(ConvError::Unsupported(meta.name.clone())),
        }
    }

    fn map_in(
        &self,
        map: &IndexMap<String, Dynamic>,
        shape: &Rc<RowShape>,
        depth: usize,
    ) -> Result<Row, ConvError> {
        self.guard(depth)?;
        let mut values: Vec<Option<DbValue>> = vec![None; shape.len()];
        for (key, value) in map {
            let position = shape
                .position(key)
                .ok_or_else(|| ConvError::UnknownColumn(key.clone()))?;
            let attr = &shape.attrs()[position];
            values[position] = self.in_(value, attr.type_id, None, depth + 1)?;
        }
        Row::from_parts(shape.clone(), values).map_err(|e| ConvError::Unsupported(e.to_string()))
    }

    fn seq_in(
        &self,
        items: &[Dynamic],
        element_type: TypeId,
        depth: usize,
    ) -> Result<DbArray, ConvError> {
        self.guard(depth)?;
        if items.is_empty() {
            return Ok(DbArray::empty(element_type));
        }
        let mut dims = vec![items.len()];
        let mut probe = &items[0];
        while let Some(inner) = probe.array_like() {
            dims.push(inner.len());
            if inner.is_empty() {
                break;
            }
            probe = &inner[0];
        }
        let mut elements = Vec::new();
        self.flatten(items, &dims, element_type, depth, &mut elements)?;
        Ok(DbArray {
            element_type,
            dims,
            elements,
        })
    }

    fn flatten(
        &self,
        items: &[Dynamic],
        dims: &[usize],
        element_type: TypeId,
        depth: usize,
        out: &mut Vec<Option<DbValue>>,
    ) -> Result<(), ConvError> {
        self.guard(depth)?;
        let (&extent, rest) = dims
            .split_first()
            .ok_or(ConvError::DimensionMismatch)?;
        if items.len() != extent {
            return Err(ConvError::DimensionMismatch);
        }
        for item in items {
            if rest.is_empty() {
                if item.array_like().is_some() {
                    return Err(ConvError::DimensionMismatch);
                }
                out.push(self.in_(item, element_type, None, depth + 1)?);
            } else {
                let inner = item
                    .array_like()
                    .ok_or(ConvError::DimensionMismatch)?;
                self.flatten(inner, rest, element_type, depth + 1, out)?;
            }
        }
        Ok(())
    }
}
