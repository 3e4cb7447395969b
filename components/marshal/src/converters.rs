//! Per-slot converters resolved once at procedure compile time.
//!
//! A compiled procedure carries one converter per declared argument and one
//! for its result, so per-call conversion never repeats type resolution.

use std::rc::Rc;

use db_model::row::RowShape;
use db_model::types::{TypeId, TypeRegistry};
use db_model::value::DbValue;
use script_engine::Dynamic;

use crate::convert::{ConvError, Marshal};

/// Converter for one declared argument slot.
#[derive(Debug, Clone)]
pub struct ArgConverter {
    type_id: TypeId,
}

impl ArgConverter {
    /// Resolve a converter, failing if the type is unknown.
    pub fn new(registry: &TypeRegistry, type_id: TypeId) -> Result<Self, ConvError> {
        registry.lookup(type_id)?;
        Ok(Self { type_id })
    }

    /// Database-to-engine direction, used for call arguments.
    pub fn input(&self, marshal: &Marshal, value: Option<&DbValue>) -> Result<Dynamic, ConvError> {
        marshal.to_dynamic(value, self.type_id)
    }
}

/// Converter for a procedure's result slot.
#[derive(Debug, Clone)]
pub struct ResultConverter {
    type_id: TypeId,
}

impl ResultConverter {
    /// Resolve a converter, failing if the type is unknown.
    pub fn new(registry: &TypeRegistry, type_id: TypeId) -> Result<Self, ConvError> {
        registry.lookup(type_id)?;
        Ok(Self { type_id })
    }

    /// Convert a returned engine value to the declared result type.
    /// `result_shape` feeds record-typed results with the caller's
    /// expected shape.
    pub fn output(
        &self,
        marshal: &Marshal,
        value: &Dynamic,
        result_shape: Option<&Rc<RowShape>>,
    ) -> Result<Option<DbValue>, ConvError> {
        marshal.to_database(value, self.type_id, result_shape)
    }
}
