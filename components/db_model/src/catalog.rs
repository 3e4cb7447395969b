//! Function catalog entries.
//!
//! The host database owns the catalog; this module only defines the shape
//! of a function definition as the language handler sees it, plus the
//! identifiers used to key cached compilations.

use thiserror::Error;

use crate::types::TypeId;

/// Stable identity of a catalog function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// Identity of the calling database user.
///
/// Trusted interpreter contexts are keyed by caller; the single untrusted
/// context uses [`CallerId::SHARED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(pub u32);

impl CallerId {
    /// The shared key used for the untrusted context, which is not
    /// segregated per caller.
    pub const SHARED: CallerId = CallerId(0);
}

/// Freshness stamp of a function definition.
///
/// The host bumps this whenever the definition changes (source edit, drop
/// and re-create, owner change). A cached compilation is stale when its
/// recorded stamp differs from the catalog's current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceStamp(pub u64);

/// Declared volatility of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    /// May have side effects; queries it issues run read-write.
    Volatile,
    /// Stable within a statement; queries run read-only.
    Stable,
    /// Pure; queries run read-only.
    Immutable,
}

/// A function definition as read from the host catalog.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    /// Catalog identity.
    pub id: FunctionId,
    /// Function name, used in diagnostics and compiled-unit naming.
    pub name: String,
    /// Procedure body source text.
    pub source: String,
    /// Declared argument types.
    pub arg_types: Vec<TypeId>,
    /// Declared return type.
    pub return_type: TypeId,
    /// Whether the function returns a set of rows rather than one value.
    pub returns_set: bool,
    /// Declared volatility.
    pub volatility: Volatility,
    /// Whether the function runs in the trusted (sandboxed) language
    /// variant.
    pub trusted: bool,
    /// Current freshness stamp.
    pub stamp: SourceStamp,
}

impl FunctionDef {
    /// Whether queries issued by this function run read-only.
    pub fn read_only(&self) -> bool {
        self.volatility != Volatility::Volatile
    }
}

/// Catalog lookup failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    /// No function with the given identity exists.
    #[error("function {0} not found in catalog")]
    UnknownFunction(u32),
}
