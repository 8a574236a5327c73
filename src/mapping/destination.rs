use crate::error::DbError;
use crate::results::Row;
use crate::types::ValueMap;

use super::{Record, describe};

/// Something a single row can be written into: a record, a generic map or a raw [`Row`].
pub trait Destination {
    /// Overwrite `self` with the contents of `row`.
    ///
    /// # Errors
    /// Returns `DbError::ConversionError` if a value does not fit, or
    /// `DbError::MappingConflict` if the record type cannot be described.
    fn assign_row(&mut self, row: &Row) -> Result<(), DbError>;
}

/// Something many rows can be collected into.
pub trait Container {
    /// Drop previously collected rows.
    fn reset(&mut self);

    /// Append one row.
    ///
    /// # Errors
    /// Same as [`Destination::assign_row`].
    fn push_row(&mut self, row: &Row) -> Result<(), DbError>;
}

impl<R: Record> Destination for R {
    fn assign_row(&mut self, row: &Row) -> Result<(), DbError> {
        describe::<R>()?.populate(self, row)
    }
}

impl Destination for ValueMap {
    fn assign_row(&mut self, row: &Row) -> Result<(), DbError> {
        self.clear();
        self.extend(row.iter().map(|(k, v)| (k.to_string(), v.clone())));
        Ok(())
    }
}

impl Destination for Row {
    fn assign_row(&mut self, row: &Row) -> Result<(), DbError> {
        *self = row.clone();
        Ok(())
    }
}

impl<D: Destination + Default> Container for Vec<D> {
    fn reset(&mut self) {
        self.clear();
    }

    fn push_row(&mut self, row: &Row) -> Result<(), DbError> {
        let mut item = D::default();
        item.assign_row(row)?;
        self.push(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Pet {
        name: String,
        legs: i64,
    }

    crate::impl_record!(Pet { name, legs });

    fn row(name: &str, legs: i64) -> Row {
        Row::from_pairs(vec![
            ("name".into(), Value::Text(name.into())),
            ("legs".into(), Value::Int(legs)),
        ])
    }

    #[test]
    fn record_destination() {
        let mut pet = Pet::default();
        pet.assign_row(&row("Rex", 4)).unwrap();
        assert_eq!(pet, Pet { name: "Rex".into(), legs: 4 });
    }

    #[test]
    fn map_destination_replaces_contents() {
        let mut map = ValueMap::new();
        map.insert("stale".into(), Value::Null);
        map.assign_row(&row("Tweety", 2)).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("legs"), Some(&Value::Int(2)));
    }

    #[test]
    fn vec_container_collects_records() {
        let mut pets: Vec<Pet> = vec![Pet::default()];
        pets.reset();
        pets.push_row(&row("Rex", 4)).unwrap();
        pets.push_row(&row("Nemo", 0)).unwrap();
        assert_eq!(pets.len(), 2);
        assert_eq!(pets[1].name, "Nemo");
    }
}
