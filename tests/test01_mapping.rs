mod common;

use std::sync::Arc;

use common::{Person, TestResult};
use dbmux::mapping::ExtractMode;
use dbmux::prelude::*;

#[derive(Debug, Default, Clone, PartialEq)]
struct Audit {
    created_by: String,
    revision: i64,
}

impl_record!(Audit {
    created_by,
    revision: "revision,omitempty",
});

#[derive(Debug, Default, Clone, PartialEq)]
struct Place {
    lat: f64,
    lon: f64,
}

impl_record!(Place { lat, lon });

#[derive(Debug, Default, Clone, PartialEq)]
struct Shop {
    id: i64,
    title: String,
    audit: Audit,
    location: Place,
    secret: String,
}

impl_record!(Shop {
    id: "id,omitempty",
    title: "shop_title",
    audit: ",inline" => Audit,
    location => Place,
    secret: "-",
});

#[derive(Debug, Default, Clone)]
struct Clash {
    a: String,
    b: String,
}

impl_record!(Clash {
    a: "same",
    b: "same",
});

fn shop() -> Shop {
    Shop {
        id: 7,
        title: "corner".into(),
        audit: Audit {
            created_by: "ops".into(),
            revision: 3,
        },
        location: Place {
            lat: 52.5,
            lon: 13.4,
        },
        secret: "hidden".into(),
    }
}

#[test]
fn describe_is_idempotent() -> TestResult {
    let first = Shop::describe()?;
    let second = Shop::describe()?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.columns(), second.columns());
    assert_eq!(
        first.columns(),
        vec!["id", "shop_title", "created_by", "revision", "location"]
    );
    Ok(())
}

#[test]
fn extract_then_populate_round_trips() -> TestResult {
    let original = shop();
    let descriptor = Shop::describe()?;
    let row = Row::from_pairs(descriptor.extract(&original, ExtractMode::Read));

    let mut copy = Shop::default();
    descriptor.populate(&mut copy, &row)?;
    assert_eq!(copy.id, original.id);
    assert_eq!(copy.title, original.title);
    assert_eq!(copy.audit, original.audit);
    assert_eq!(copy.location, original.location);
    // skipped columns never travel
    assert_eq!(copy.secret, "");
    Ok(())
}

#[test]
fn write_mode_drops_zero_omitempty_fields() -> TestResult {
    let person = Person::new("A", 30);
    let pairs = Person::describe()?.extract(&person, ExtractMode::Write);
    let columns: Vec<&str> = pairs.iter().map(|(c, _)| c.as_str()).collect();
    assert_eq!(columns, vec!["name", "age"]);

    let read: Vec<String> = Person::describe()?
        .extract(&person, ExtractMode::Read)
        .into_iter()
        .map(|(c, _)| c)
        .collect();
    assert_eq!(read, vec!["id", "name", "age", "email"]);
    Ok(())
}

#[test]
fn duplicate_columns_are_a_mapping_conflict() {
    let err = Clash::describe().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MappingConflict);
}

#[test]
fn destinations_accept_records_maps_and_vectors() -> TestResult {
    let row = Row::from_pairs(vec![
        ("id".into(), Value::Int(1)),
        ("name".into(), Value::from("A")),
        ("age".into(), Value::Int(30)),
        ("email".into(), Value::Null),
    ]);

    let mut person = Person::default();
    person.assign_row(&row)?;
    assert_eq!(person.name, "A");
    assert_eq!(person.email, None);

    let mut map = ValueMap::new();
    map.assign_row(&row)?;
    assert_eq!(map.get("age"), Some(&Value::Int(30)));

    let mut many: Vec<Person> = vec![Person::default()];
    many.reset();
    many.push_row(&row)?;
    many.push_row(&row)?;
    assert_eq!(many.len(), 2);
    Ok(())
}

#[test]
fn populate_reports_the_offending_field() {
    let row = Row::from_pairs(vec![("age".into(), Value::from("old"))]);
    let mut person = Person::default();
    let err = Person::describe()
        .and_then(|d| d.populate(&mut person, &row))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert!(err.to_string().contains("age"));
}
