use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::error::DbError;
use crate::results::{Row, normalize_column};
use crate::types::Value;

use super::{FieldSpec, Fields, Record};

type DescriptorCache = LazyLock<RwLock<HashMap<TypeId, Arc<Descriptor>>>>;

static DESCRIPTORS: DescriptorCache = LazyLock::new(|| RwLock::new(HashMap::new()));

thread_local! {
    // types currently being described on this thread, to catch recursive inlining
    static IN_PROGRESS: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// Whether extraction feeds a write (insert/update) or a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// `omitempty` fields with zero values are skipped.
    Write,
    /// Every mapped field is returned.
    Read,
}

/// One resolved column binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Field names from the described record down to the bound field.
    pub path: Vec<&'static str>,
    pub column: String,
    pub omitempty: bool,
}

impl Binding {
    /// Dotted field path, e.g. `address.city`.
    #[must_use]
    pub fn field_path(&self) -> String {
        self.path.join(".")
    }
}

/// Resolved field-to-column mapping of a record type.
#[derive(Debug, PartialEq, Eq)]
pub struct Descriptor {
    type_name: &'static str,
    bindings: Vec<Binding>,
}

#[derive(Debug, Default)]
struct TagOptions<'a> {
    column: Option<&'a str>,
    skip: bool,
    omitempty: bool,
    inline: bool,
}

impl<'a> TagOptions<'a> {
    fn parse(tag: Option<&'a str>) -> Self {
        let Some(tag) = tag else {
            return Self::default();
        };
        if tag.trim() == "-" {
            return Self {
                skip: true,
                ..Self::default()
            };
        }
        let mut parts = tag.split(',').map(str::trim);
        let column = parts.next().filter(|c| !c.is_empty());
        let mut opts = Self {
            column,
            ..Self::default()
        };
        for part in parts {
            match part {
                "omitempty" => opts.omitempty = true,
                "inline" => opts.inline = true,
                "" => {}
                other => tracing::debug!(option = other, "ignoring unknown field option"),
            }
        }
        opts
    }
}

/// Describe a record type, building and caching the descriptor on first use.
///
/// # Errors
/// Returns `DbError::MappingConflict` when two fields resolve to the same column, when
/// `inline` is applied to a field that is not a record, or when inlining is recursive.
pub fn describe<R: Record>() -> Result<Arc<Descriptor>, DbError> {
    let id = TypeId::of::<R>();
    if let Some(found) = DESCRIPTORS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
    {
        return Ok(Arc::clone(found));
    }

    let type_name = std::any::type_name::<R>();
    let recursive = IN_PROGRESS.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.contains(&id) {
            true
        } else {
            stack.push(id);
            false
        }
    });
    if recursive {
        return Err(DbError::MappingConflict {
            type_name,
            message: "record inlines itself".to_string(),
        });
    }
    let built = Descriptor::build(type_name, &R::fields());
    IN_PROGRESS.with(|stack| {
        stack.borrow_mut().retain(|t| *t != id);
    });
    let built = Arc::new(built?);

    let mut cache = DESCRIPTORS.write().unwrap_or_else(PoisonError::into_inner);
    Ok(Arc::clone(cache.entry(id).or_insert(built)))
}

impl Descriptor {
    fn build(type_name: &'static str, specs: &[FieldSpec]) -> Result<Self, DbError> {
        let mut bindings: Vec<Binding> = Vec::with_capacity(specs.len());
        let mut owners: HashMap<String, String> = HashMap::new();

        let mut push = |binding: Binding, bindings: &mut Vec<Binding>| {
            let key = normalize_column(&binding.column);
            if let Some(owner) = owners.get(&key) {
                return Err(DbError::MappingConflict {
                    type_name,
                    message: format!(
                        "column `{}` is bound by both `{owner}` and `{}`",
                        binding.column,
                        binding.field_path()
                    ),
                });
            }
            owners.insert(key, binding.field_path());
            bindings.push(binding);
            Ok(())
        };

        for spec in specs {
            if !spec.exported {
                continue;
            }
            let options = TagOptions::parse(spec.tag);
            if options.skip {
                continue;
            }
            if options.inline {
                let Some(nested) = spec.nested else {
                    return Err(DbError::MappingConflict {
                        type_name,
                        message: format!("field `{}` is tagged inline but is not a record", spec.name),
                    });
                };
                let inner = nested()?;
                for b in &inner.bindings {
                    let mut path = Vec::with_capacity(b.path.len() + 1);
                    path.push(spec.name);
                    path.extend_from_slice(&b.path);
                    push(
                        Binding {
                            path,
                            column: b.column.clone(),
                            omitempty: b.omitempty,
                        },
                        &mut bindings,
                    )?;
                }
            } else {
                push(
                    Binding {
                        path: vec![spec.name],
                        column: options.column.unwrap_or(spec.name).to_string(),
                        omitempty: options.omitempty,
                    },
                    &mut bindings,
                )?;
            }
        }

        Ok(Self {
            type_name,
            bindings,
        })
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Column names in declaration order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.column.as_str()).collect()
    }

    /// Find the binding for a column, case/underscore-insensitively.
    #[must_use]
    pub fn binding_for_column(&self, column: &str) -> Option<&Binding> {
        self.bindings
            .iter()
            .find(|b| b.column == column)
            .or_else(|| {
                let wanted = normalize_column(column);
                self.bindings
                    .iter()
                    .find(|b| normalize_column(&b.column) == wanted)
            })
    }

    /// Ordered column/value pairs of `record`.
    pub fn extract(&self, record: &dyn Fields, mode: ExtractMode) -> Vec<(String, Value)> {
        let mut out = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let Some(value) = read_path(record, &binding.path) else {
                continue;
            };
            if mode == ExtractMode::Write && binding.omitempty && value.is_zero() {
                continue;
            }
            out.push((binding.column.clone(), value));
        }
        out
    }

    /// Read the value bound to `column`, if mapped.
    pub fn value_of(&self, record: &dyn Fields, column: &str) -> Option<Value> {
        self.binding_for_column(column)
            .and_then(|b| read_path(record, &b.path))
    }

    /// Assign `value` to the field bound to `column`. Unmapped columns are ignored.
    ///
    /// # Errors
    /// Returns `DbError::ConversionError` if the value does not fit the field.
    pub fn assign(&self, record: &mut dyn Fields, column: &str, value: Value) -> Result<(), DbError> {
        match self.binding_for_column(column) {
            Some(binding) => write_path(record, &binding.path, value),
            None => Ok(()),
        }
    }

    /// Assign every mapped column present in `row`; missing columns leave fields untouched.
    ///
    /// # Errors
    /// Returns `DbError::ConversionError` if a value does not fit its field.
    pub fn populate(&self, record: &mut dyn Fields, row: &Row) -> Result<(), DbError> {
        for binding in &self.bindings {
            if let Some(value) = row.get(&binding.column) {
                write_path(record, &binding.path, value.clone()).map_err(|e| match e {
                    DbError::ConversionError(msg) => DbError::ConversionError(format!(
                        "{}.{}: {msg}",
                        self.type_name,
                        binding.field_path()
                    )),
                    other => other,
                })?;
            }
        }
        Ok(())
    }
}

fn read_path(record: &dyn Fields, path: &[&'static str]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut current = record;
    for name in parents {
        current = current.nested(name)?;
    }
    current.get_field(last)
}

fn write_path(record: &mut dyn Fields, path: &[&'static str], value: Value) -> Result<(), DbError> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(());
    };
    let mut current = record;
    for name in parents {
        current = current.nested_mut(name).ok_or_else(|| {
            DbError::ValidationError(format!("field `{name}` is not a nested record"))
        })?;
    }
    current.set_field(last, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FromValue, ValueMap};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Address {
        city: String,
        zip: String,
    }

    crate::impl_record!(Address { city, zip: "postal_code" });

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Customer {
        id: i64,
        full_name: String,
        address: Address,
        notes: String,
        secret: String,
    }

    impl Fields for Customer {
        fn get_field(&self, name: &str) -> Option<Value> {
            match name {
                "id" => Some(self.id.into()),
                "full_name" => Some(self.full_name.clone().into()),
                "notes" => Some(self.notes.clone().into()),
                "secret" => Some(self.secret.clone().into()),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: Value) -> Result<(), DbError> {
            match name {
                "id" => self.id = i64::from_value(value)?,
                "full_name" => self.full_name = String::from_value(value)?,
                "notes" => self.notes = String::from_value(value)?,
                "secret" => self.secret = String::from_value(value)?,
                other => {
                    return Err(DbError::ValidationError(format!("no field {other}")));
                }
            }
            Ok(())
        }

        fn nested(&self, name: &str) -> Option<&dyn Fields> {
            (name == "address").then_some(&self.address as &dyn Fields)
        }

        fn nested_mut(&mut self, name: &str) -> Option<&mut dyn Fields> {
            if name == "address" {
                Some(&mut self.address)
            } else {
                None
            }
        }
    }

    impl Record for Customer {
        fn fields() -> Vec<FieldSpec> {
            vec![
                FieldSpec::new("id").tag("id,omitempty"),
                FieldSpec::new("full_name"),
                FieldSpec::nested::<Address>("address").tag(",inline"),
                FieldSpec::new("notes").tag("-"),
                FieldSpec::new("secret").private(),
            ]
        }
    }

    #[test]
    fn inline_fields_join_parent_namespace() {
        let d = describe::<Customer>().unwrap();
        assert_eq!(d.columns(), vec!["id", "full_name", "city", "postal_code"]);
        assert_eq!(d.bindings()[2].field_path(), "address.city");
    }

    #[test]
    fn describe_is_cached_and_idempotent() {
        let a = describe::<Customer>().unwrap();
        let b = describe::<Customer>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
    }

    #[test]
    fn write_mode_skips_zero_omitempty() {
        let d = describe::<Customer>().unwrap();
        let c = Customer {
            full_name: "Ada".into(),
            ..Customer::default()
        };
        let write: Vec<String> = d.extract(&c, ExtractMode::Write).into_iter().map(|(k, _)| k).collect();
        assert!(!write.contains(&"id".to_string()));
        let read: Vec<String> = d.extract(&c, ExtractMode::Read).into_iter().map(|(k, _)| k).collect();
        assert!(read.contains(&"id".to_string()));
    }

    #[test]
    fn populate_reaches_inlined_fields() {
        let d = describe::<Customer>().unwrap();
        let mut map = ValueMap::new();
        map.insert("ID".into(), Value::Int(7));
        map.insert("FullName".into(), Value::Text("Grace".into()));
        map.insert("postal_code".into(), Value::Text("0150".into()));
        map.insert("notes".into(), Value::Text("ignored".into()));
        let mut c = Customer::default();
        d.populate(&mut c, &Row::from_map(map)).unwrap();
        assert_eq!(c.id, 7);
        assert_eq!(c.full_name, "Grace");
        assert_eq!(c.address.zip, "0150");
        assert!(c.notes.is_empty());
    }

    #[derive(Debug, Default)]
    struct Clash {
        name: String,
        label: String,
    }

    crate::impl_record!(Clash { name, label: "Name" });

    #[test]
    fn duplicate_columns_conflict() {
        let err = describe::<Clash>().unwrap_err();
        assert!(matches!(err, DbError::MappingConflict { .. }));
    }

    #[derive(Debug, Default)]
    struct Shadow {
        city: String,
        address: Address,
    }

    crate::impl_record!(Shadow { city, address: ",inline" => Address });

    #[test]
    fn inline_collision_with_parent_conflicts() {
        let err = describe::<Shadow>().unwrap_err();
        assert!(format!("{err}").contains("city"));
    }

    #[derive(Debug, Default)]
    struct BadInline {
        name: String,
    }

    crate::impl_record!(BadInline { name: ",inline" });

    #[test]
    fn inline_requires_record() {
        assert!(matches!(
            describe::<BadInline>(),
            Err(DbError::MappingConflict { .. })
        ));
    }
}
