//! Record-to-row mapping.
//!
//! A record type declares its fields once through [`Record::fields`]; the first call to
//! [`describe`] resolves them into a [`Descriptor`] (column bindings plus options) that is
//! cached for the rest of the process. [`Fields`] is the object-safe accessor the descriptor
//! uses to read and write individual fields, including fields of inlined records.
//!
//! ```rust
//! use dbmux::prelude::*;
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Person {
//!     id: i64,
//!     name: String,
//!     age: i64,
//! }
//!
//! dbmux::impl_record!(Person {
//!     id: "id,omitempty",
//!     name,
//!     age,
//! });
//!
//! let descriptor = Person::describe().unwrap();
//! assert_eq!(descriptor.columns(), vec!["id", "name", "age"]);
//! ```

mod descriptor;
mod destination;
mod macros;

use std::sync::Arc;

pub use descriptor::{Binding, Descriptor, ExtractMode, describe};
pub use destination::{Container, Destination};

use crate::error::DbError;
use crate::types::{Value, ValueMap};

/// Resolves the descriptor of a nested record type.
pub type DescribeFn = fn() -> Result<Arc<Descriptor>, DbError>;

/// Declaration of one struct field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub(crate) name: &'static str,
    pub(crate) tag: Option<&'static str>,
    pub(crate) exported: bool,
    pub(crate) nested: Option<DescribeFn>,
}

impl FieldSpec {
    /// A scalar field whose column defaults to the field name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            tag: None,
            exported: true,
            nested: None,
        }
    }

    /// A field holding another record; combine with the `inline` tag option to flatten it.
    #[must_use]
    pub fn nested<R: Record>(name: &'static str) -> Self {
        Self {
            name,
            tag: None,
            exported: true,
            nested: Some(describe::<R>),
        }
    }

    /// Column binding and options, e.g. `"id,omitempty"`, `",inline"` or `"-"`.
    #[must_use]
    pub const fn tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Mark the field as private; private fields never map to a column.
    #[must_use]
    pub const fn private(mut self) -> Self {
        self.exported = false;
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Field-level access by name. Object safe so descriptors can walk nested records.
pub trait Fields {
    /// Read a field as a [`Value`]; `None` when the name is not a field of this record.
    fn get_field(&self, name: &str) -> Option<Value>;

    /// Assign a field from a [`Value`].
    ///
    /// # Errors
    /// Returns `DbError::ConversionError` if the value does not fit the field type, or
    /// `DbError::ValidationError` if `name` is not a field.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), DbError>;

    /// Borrow a nested record field.
    fn nested(&self, _name: &str) -> Option<&dyn Fields> {
        None
    }

    /// Mutably borrow a nested record field.
    fn nested_mut(&mut self, _name: &str) -> Option<&mut dyn Fields> {
        None
    }
}

/// A struct that can be mapped to and from rows.
pub trait Record: Fields + Default + Send + Sync + 'static {
    /// Field declarations in column order.
    fn fields() -> Vec<FieldSpec>;

    /// Cached descriptor for this type.
    ///
    /// # Errors
    /// Returns `DbError::MappingConflict` if the field declarations are inconsistent.
    fn describe() -> Result<Arc<Descriptor>, DbError>
    where
        Self: Sized,
    {
        describe::<Self>()
    }
}

/// Extract a record into a map for storage as a single nested column.
///
/// # Errors
/// Returns `DbError::MappingConflict` if the record type cannot be described.
pub fn record_to_value<R: Record>(record: &R) -> Result<Value, DbError> {
    let descriptor = describe::<R>()?;
    let map: ValueMap = descriptor
        .extract(record, ExtractMode::Read)
        .into_iter()
        .collect();
    Ok(Value::Record(map))
}

/// Populate a record from a value produced by [`record_to_value`] (or a JSON text column).
///
/// # Errors
/// Returns `DbError::ConversionError` if the value is not a record or a field does not convert.
pub fn record_from_value<R: Record>(value: Value) -> Result<R, DbError> {
    use crate::types::FromValue;

    let mut record = R::default();
    if value.is_null() {
        return Ok(record);
    }
    let map = ValueMap::from_value(value)?;
    let descriptor = describe::<R>()?;
    descriptor.populate(&mut record, &crate::results::Row::from_map(map))?;
    Ok(record)
}
