//! Type metadata registry.
//!
//! Every conversion between textual and typed form goes through the parse
//! and output entry points registered here, so scripting-side values always
//! round-trip through the database's own I/O semantics.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::row::RowShape;
use crate::value::DbValue;

/// Identifier of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// Broad classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// Plain scalar with parse/output functions
    Scalar,
    /// Composite (row) type with a shape
    Composite,
    /// Array type with an element type
    Array,
    /// Pseudo-type (void, record, trigger); not directly storable
    Pseudo,
}

/// Parse/output entry points for a scalar type.
///
/// `parse` is the only way a textual value becomes a typed one; it may
/// reject malformed text. Registered domain-style types may additionally
/// reject null via [`TypeMeta::rejects_null`].
pub trait ScalarIo {
    /// Parse canonical input text into a value of this type.
    fn parse(&self, text: &str) -> Result<DbValue, TypeError>;
    /// Produce the canonical output text for a value of this type.
    fn output(&self, value: &DbValue) -> String;
}

/// Metadata describing one registered type.
pub struct TypeMeta {
    /// The type's identifier.
    pub id: TypeId,
    /// Display name, e.g. `"bigint"`.
    pub name: String,
    /// Classification.
    pub class: TypeClass,
    /// Element type, for arrays.
    pub element: Option<TypeId>,
    /// Row shape, for composites.
    pub shape: Option<Rc<RowShape>>,
    /// Scalar parse/output functions.
    pub io: Option<Rc<dyn ScalarIo>>,
    /// Whether the parse entry point rejects null input (domain-style
    /// not-null constraint).
    pub rejects_null: bool,
}

impl std::fmt::Debug for TypeMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeMeta")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("class", &self.class)
            .field("element", &self.element)
            .field("rejects_null", &self.rejects_null)
            .finish()
    }
}

/// Errors raised by type lookup and scalar I/O.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    /// No type registered under this id.
    #[error("lookup failed for type {0}")]
    UnknownType(u32),
    /// No type registered under this name.
    #[error("lookup failed for type \"{0}\"")]
    UnknownTypeName(String),
    /// Text did not parse as a value of the type.
    #[error("invalid input syntax for type {ty}: \"{text}\"")]
    InvalidText {
        /// Target type name.
        ty: String,
        /// The offending input text.
        text: String,
    },
    /// The type's parse entry point rejects null.
    #[error("null value not allowed for type {0}")]
    NullRejected(String),
    /// A value of the wrong variant reached an I/O function.
    #[error("value is not of type {0}")]
    WrongVariant(String),
}

/// Well-known built-in type ids, installed by [`TypeRegistry::with_builtins`].
pub mod builtin {
    use super::TypeId;

    /// `boolean`
    pub const BOOL: TypeId = TypeId(1);
    /// `bigint`
    pub const INT: TypeId = TypeId(2);
    /// `double precision`
    pub const FLOAT: TypeId = TypeId(3);
    /// `text`
    pub const TEXT: TypeId = TypeId(4);

    /// `boolean[]`
    pub const BOOL_ARRAY: TypeId = TypeId(101);
    /// `bigint[]`
    pub const INT_ARRAY: TypeId = TypeId(102);
    /// `double precision[]`
    pub const FLOAT_ARRAY: TypeId = TypeId(103);
    /// `text[]`
    pub const TEXT_ARRAY: TypeId = TypeId(104);

    /// `void` pseudo-type
    pub const VOID: TypeId = TypeId(90);
    /// `record` pseudo-type
    pub const RECORD: TypeId = TypeId(91);
    /// `trigger` pseudo-type
    pub const TRIGGER: TypeId = TypeId(92);
}

struct BoolIo;

impl ScalarIo for BoolIo {
    fn parse(&self, text: &str) -> Result<DbValue, TypeError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "1" | "yes" | "on" => Ok(DbValue::Bool(true)),
            "f" | "false" | "0" | "no" | "off" => Ok(DbValue::Bool(false)),
            _ => Err(TypeError::InvalidText {
                ty: "boolean".into(),
                text: text.into(),
            }),
        }
    }

    fn output(&self, value: &DbValue) -> String {
        match value {
            DbValue::Bool(true) => "t".into(),
            DbValue::Bool(false) => "f".into(),
            _ => String::new(),
        }
    }
}

struct IntIo;

impl ScalarIo for IntIo {
    fn parse(&self, text: &str) -> Result<DbValue, TypeError> {
        text.trim()
            .parse::<i64>()
            .map(DbValue::Int)
            .map_err(|_| TypeError::InvalidText {
                ty: "bigint".into(),
                text: text.into(),
            })
    }

    fn output(&self, value: &DbValue) -> String {
        match value {
            DbValue::Int(n) => n.to_string(),
            _ => String::new(),
        }
    }
}

struct FloatIo;

impl ScalarIo for FloatIo {
    fn parse(&self, text: &str) -> Result<DbValue, TypeError> {
        text.trim()
            .parse::<f64>()
            .map(DbValue::Float)
            .map_err(|_| TypeError::InvalidText {
                ty: "double precision".into(),
                text: text.into(),
            })
    }

    fn output(&self, value: &DbValue) -> String {
        match value {
            DbValue::Float(n) => {
                let mut buf = ryu::Buffer::new();
                buf.format(*n).to_string()
            }
            _ => String::new(),
        }
    }
}

struct TextIo;

impl ScalarIo for TextIo {
    fn parse(&self, text: &str) -> Result<DbValue, TypeError> {
        Ok(DbValue::Text(text.to_string()))
    }

    fn output(&self, value: &DbValue) -> String {
        match value {
            DbValue::Text(s) => s.clone(),
            _ => String::new(),
        }
    }
}

/// Registry of type metadata, looked up by id or by name.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_id: HashMap<u32, Rc<TypeMeta>>,
    by_name: HashMap<String, TypeId>,
    next_id: u32,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            next_id: 1000,
        }
    }

    /// Create a registry populated with the built-in scalar, array, and
    /// pseudo types.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.install_scalar(builtin::BOOL, "boolean", Rc::new(BoolIo), false);
        reg.install_scalar(builtin::INT, "bigint", Rc::new(IntIo), false);
        reg.install_scalar(builtin::FLOAT, "double precision", Rc::new(FloatIo), false);
        reg.install_scalar(builtin::TEXT, "text", Rc::new(TextIo), false);
        reg.install_array(builtin::BOOL_ARRAY, "boolean[]", builtin::BOOL);
        reg.install_array(builtin::INT_ARRAY, "bigint[]", builtin::INT);
        reg.install_array(builtin::FLOAT_ARRAY, "double precision[]", builtin::FLOAT);
        reg.install_array(builtin::TEXT_ARRAY, "text[]", builtin::TEXT);
        reg.install_pseudo(builtin::VOID, "void");
        reg.install_pseudo(builtin::RECORD, "record");
        reg.install_pseudo(builtin::TRIGGER, "trigger");
        reg
    }

    fn install(&mut self, meta: TypeMeta) {
        self.by_name.insert(meta.name.clone(), meta.id);
        self.by_id.insert(meta.id.0, Rc::new(meta));
    }

    fn install_scalar(&mut self, id: TypeId, name: &str, io: Rc<dyn ScalarIo>, rejects_null: bool) {
        self.install(TypeMeta {
            id,
            name: name.into(),
            class: TypeClass::Scalar,
            element: None,
            shape: None,
            io: Some(io),
            rejects_null,
        });
    }

    fn install_array(&mut self, id: TypeId, name: &str, element: TypeId) {
        self.install(TypeMeta {
            id,
            name: name.into(),
            class: TypeClass::Array,
            element: Some(element),
            shape: None,
            io: None,
            rejects_null: false,
        });
    }

    fn install_pseudo(&mut self, id: TypeId, name: &str) {
        self.install(TypeMeta {
            id,
            name: name.into(),
            class: TypeClass::Pseudo,
            element: None,
            shape: None,
            io: None,
            rejects_null: false,
        });
    }

    /// Register a scalar type with custom I/O functions. Returns the new id.
    pub fn register_scalar(
        &mut self,
        name: &str,
        io: Rc<dyn ScalarIo>,
        rejects_null: bool,
    ) -> TypeId {
        let id = TypeId(self.next_id);
        self.next_id += 1;
        self.install_scalar(id, name, io, rejects_null);
        id
    }

    /// Register a composite type for the given row shape. Returns the new id.
    pub fn register_composite(&mut self, name: &str, shape: Rc<RowShape>) -> TypeId {
        let id = TypeId(self.next_id);
        self.next_id += 1;
        self.install(TypeMeta {
            id,
            name: name.into(),
            class: TypeClass::Composite,
            element: None,
            shape: Some(shape),
            io: None,
            rejects_null: false,
        });
        id
    }

    /// Register an array type over an existing element type. Returns the new id.
    pub fn register_array(&mut self, name: &str, element: TypeId) -> TypeId {
        let id = TypeId(self.next_id);
        self.next_id += 1;
        self.install_array(id, name, element);
        id
    }

    /// Look up type metadata by id.
    pub fn lookup(&self, id: TypeId) -> Result<Rc<TypeMeta>, TypeError> {
        self.by_id
            .get(&id.0)
            .cloned()
            .ok_or(TypeError::UnknownType(id.0))
    }

    /// Look up a type id by its registered name.
    pub fn by_name(&self, name: &str) -> Result<TypeId, TypeError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| TypeError::UnknownTypeName(name.to_string()))
    }
}
