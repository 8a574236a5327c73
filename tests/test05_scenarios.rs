mod common;

use std::collections::BTreeSet;

use common::{Person, TestResult, ddl, every_backend, people, seeded_people, sqlite};
use dbmux::prelude::*;

#[tokio::test(flavor = "multi_thread")]
async fn range_filter_sorted_descending() -> TestResult {
    for env in every_backend().await? {
        let people = seeded_people(&env).await?;
        let mut found: Vec<Person> = Vec::new();
        people
            .find(Cond::new().gte("age", 28))
            .sort(&["-age"])
            .all(&mut found)
            .await?;
        let got: Vec<(&str, i64)> = found.iter().map(|p| (p.name.as_str(), p.age)).collect();
        assert_eq!(got, vec![("C", 40), ("A", 30)], "{}", env.backend());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn disjunction_ignores_insertion_order() -> TestResult {
    for env in every_backend().await? {
        for order in [["A", "B", "C"], ["C", "B", "A"], ["B", "C", "A"]] {
            let people = people(&env).await?;
            for name in order {
                people.append(&mut Person::new(name, 1)).await?;
            }
            let mut found: Vec<Person> = Vec::new();
            people
                .find(or([Cond::new().eq("name", "A"), Cond::new().eq("name", "B")]))
                .all(&mut found)
                .await?;
            let names: BTreeSet<String> = found.into_iter().map(|p| p.name).collect();
            assert_eq!(
                names,
                BTreeSet::from(["A".to_string(), "B".to_string()]),
                "{} {order:?}",
                env.backend()
            );
        }
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn update_then_read_back() -> TestResult {
    for env in every_backend().await? {
        let people = seeded_people(&env).await?;
        let mut changes = ValueMap::new();
        changes.insert("age".into(), Value::Int(99));
        let touched = people
            .find(Cond::new().eq("name", "A"))
            .update(changes)
            .await?;
        assert_eq!(touched, 1);

        let mut dest = Person::default();
        people.find(Cond::new().eq("name", "A")).one(&mut dest).await?;
        assert_eq!(dest.age, 99, "{}", env.backend());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_then_count() -> TestResult {
    for env in every_backend().await? {
        let people = seeded_people(&env).await?;
        let removed = people.find(Cond::new().lt("age", 28)).remove().await?;
        assert_eq!(removed, 1);
        assert_eq!(people.find_all().count().await?, 2, "{}", env.backend());
        let mut left: Vec<Person> = Vec::new();
        people.find_all().all(&mut left).await?;
        assert!(left.iter().all(|p| p.name != "B"));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn record_updates_honour_omitempty_but_maps_write_zeroes() -> TestResult {
    for env in every_backend().await? {
        let people = seeded_people(&env).await?;
        let patch = Person {
            id: 0,
            name: "A2".into(),
            age: 31,
            email: None,
        };
        people.find(Cond::new().eq("name", "A")).update(&patch).await?;

        let mut a = Person::default();
        people.find(Cond::new().eq("name", "A2")).one(&mut a).await?;
        assert_eq!(a.age, 31);
        assert_ne!(a.id, 0, "{}", env.backend());

        let mut zero = ValueMap::new();
        zero.insert("age".into(), Value::Int(0));
        people.find(Cond::new().eq("name", "A2")).update(zero).await?;
        people.find(Cond::new().eq("name", "A2")).one(&mut a).await?;
        assert_eq!(a.age, 0);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn generated_keys_round_trip_into_records() -> TestResult {
    for env in every_backend().await? {
        let people = people(&env).await?;
        let mut first = Person::new("first", 1);
        let key = people.append(&mut first).await?;
        assert!(first.id > 0, "{}", env.backend());
        assert_eq!(key.and_then(|k| k.as_int()), Some(first.id));

        let mut second = Person::new("second", 2);
        people.append(&mut second).await?;
        assert!(second.id > first.id);

        let mut fetched = Person::default();
        people
            .find(Cond::new().eq("id", second.id))
            .one(&mut fetched)
            .await?;
        assert_eq!(fetched, second);
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Tag {
    code: String,
    label: String,
}

impl_record!(Tag { code, label });

#[tokio::test(flavor = "multi_thread")]
async fn text_keys_are_stored_as_given() -> TestResult {
    let env = sqlite().await?;
    ddl(
        &env,
        "CREATE TABLE tags (code TEXT PRIMARY KEY, label TEXT);",
        "",
    )
    .await?;
    let tags = env.session.collection(&["tags"])?;

    let mut abc = ValueMap::new();
    abc.insert("code".into(), Value::from("abc"));
    assert_eq!(tags.append_values(abc).await?, Some(Value::from("abc")));

    let mut blank = ValueMap::new();
    blank.insert("code".into(), Value::from(""));
    assert_eq!(tags.append_values(blank).await?, Some(Value::from("")));

    let mut record = Tag {
        code: "xyz".into(),
        label: "kept".into(),
    };
    assert_eq!(tags.append(&mut record).await?, Some(Value::from("xyz")));
    assert_eq!(record.code, "xyz");

    let mut rows: Vec<ValueMap> = Vec::new();
    tags.find_all().sort(&["code"]).all(&mut rows).await?;
    let codes: Vec<&Value> = rows.iter().filter_map(|r| r.get("code")).collect();
    assert_eq!(
        codes,
        vec![&Value::from(""), &Value::from("abc"), &Value::from("xyz")]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn rowid_keys_report_the_generated_value() -> TestResult {
    let env = sqlite().await?;
    ddl(
        &env,
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);",
        "",
    )
    .await?;
    let notes = env.session.collection(&["notes"])?;
    let mut explicit = ValueMap::new();
    explicit.insert("id".into(), Value::Int(7));
    assert_eq!(notes.append_values(explicit).await?, Some(Value::Int(7)));

    let mut generated = ValueMap::new();
    generated.insert("id".into(), Value::Int(0));
    generated.insert("body".into(), Value::from("x"));
    assert_eq!(notes.append_values(generated).await?, Some(Value::Int(8)));
    Ok(())
}
