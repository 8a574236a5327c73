mod common;

use std::collections::HashSet;

use common::{Person, TestResult, every_backend, people};
use dbmux::prelude::*;

#[tokio::test(flavor = "multi_thread")]
async fn count_ignores_skip_and_limit() -> TestResult {
    for env in every_backend().await? {
        let people = people(&env).await?;
        for i in 0..30 {
            people.append(&mut Person::new(&format!("p{i:02}"), 20 + i)).await?;
        }
        let adults = people.find(Cond::new().gte("age", 25));
        let total = adults.count().await?;
        assert_eq!(total, 25, "{}", env.backend());
        assert_eq!(adults.skip(10).limit(8).count().await?, total);
        assert_eq!(adults.limit(1).count().await?, total);

        let mut window: Vec<Person> = Vec::new();
        adults.sort(&["age"]).skip(10).limit(8).all(&mut window).await?;
        let ages: Vec<i64> = window.iter().map(|p| p.age).collect();
        assert_eq!(ages, (35..43).collect::<Vec<_>>(), "{}", env.backend());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn next_visits_each_row_once() -> TestResult {
    for env in every_backend().await? {
        let people = people(&env).await?;
        for i in 0..17 {
            people.append(&mut Person::new(&format!("n{i}"), i)).await?;
        }
        let mut rs = people.find_all().sort(&["-age"]);
        let expected = rs.count().await?;

        let mut seen = HashSet::new();
        let mut person = Person::default();
        loop {
            match rs.next(&mut person).await {
                Ok(()) => assert!(seen.insert(person.id), "duplicate id {}", person.id),
                Err(e) if e.is_no_more_rows() => break,
                Err(e) => return Err(e.into()),
            }
        }
        assert_eq!(seen.len() as u64, expected, "{}", env.backend());
        assert_eq!(rs.state(), CursorState::Drained);
        rs.close().await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn double_close_then_reads_fail() -> TestResult {
    for env in every_backend().await? {
        let people = common::seeded_people(&env).await?;
        let mut rs = people.find_all();
        let mut first = Person::default();
        rs.next(&mut first).await?;
        assert_eq!(rs.state(), CursorState::Open);

        rs.close().await?;
        rs.close().await?;
        assert_eq!(rs.state(), CursorState::Closed);

        let mut person = Person::default();
        let mut all: Vec<Person> = Vec::new();
        for err in [
            rs.next(&mut person).await.unwrap_err(),
            rs.one(&mut person).await.unwrap_err(),
            rs.all(&mut all).await.unwrap_err(),
            rs.count().await.unwrap_err(),
            rs.remove().await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::CursorClosed, "{}", env.backend());
        }
        // the closed set still derives fresh queries
        assert_eq!(rs.limit(2).count().await?, 3);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn modifier_after_fetch_runs_a_new_query() -> TestResult {
    for env in every_backend().await? {
        let people = common::seeded_people(&env).await?;
        let mut by_age = people.find_all().sort(&["age"]);
        let mut person = Person::default();
        by_age.next(&mut person).await?;
        assert_eq!(person.name, "B");

        let mut reversed = by_age.sort(&["-age"]);
        assert_eq!(reversed.state(), CursorState::Built);
        reversed.next(&mut person).await?;
        assert_eq!(person.name, "C");

        by_age.next(&mut person).await?;
        assert_eq!(person.name, "A", "{}", env.backend());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn select_projects_and_aliases() -> TestResult {
    for env in every_backend().await? {
        let people = common::seeded_people(&env).await?;
        let mut rows: Vec<ValueMap> = Vec::new();
        people
            .find(Cond::new().eq("name", "C"))
            .select(["name AS who", "age"])
            .all(&mut rows)
            .await?;
        assert_eq!(rows.len(), 1);
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["age", "who"], "{}", env.backend());
        assert_eq!(rows[0]["who"], Value::from("C"));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn pagination_walks_every_page() -> TestResult {
    for env in every_backend().await? {
        let people = people(&env).await?;
        for i in 0..10 {
            people.append(&mut Person::new(&format!("x{i}"), i)).await?;
        }
        let pages = people.find_all().sort(&["age"]).paginate(4);
        assert_eq!(pages.total_pages().await?, 3);
        let mut collected = Vec::new();
        for n in 1..=3 {
            let mut page: Vec<Person> = Vec::new();
            pages.page(n).all(&mut page).await?;
            collected.extend(page.into_iter().map(|p| p.age));
        }
        assert_eq!(collected, (0..10).collect::<Vec<_>>(), "{}", env.backend());
    }
    Ok(())
}
