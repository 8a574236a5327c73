#![allow(dead_code)]

use std::error::Error;

use dbmux::prelude::*;
use tempfile::TempDir;

pub type TestResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub email: Option<String>,
}

impl_record!(Person {
    id: "id,omitempty",
    name,
    age,
    email: "email,omitempty",
});

impl Person {
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            name: name.to_string(),
            age,
            ..Self::default()
        }
    }
}

/// A session plus whatever keeps its database alive.
pub struct Env {
    pub session: Session,
    _dir: Option<TempDir>,
}

impl Env {
    pub fn backend(&self) -> &'static str {
        self.session.backend()
    }
}

pub async fn memory() -> Result<Env, Box<dyn Error>> {
    dbmux::register_builtin();
    let session = Session::open("memory", &ConnectionSettings::new()).await?;
    Ok(Env {
        session,
        _dir: None,
    })
}

pub async fn sqlite() -> Result<Env, Box<dyn Error>> {
    dbmux::register_builtin();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dbmux_test.db");
    let settings = ConnectionSettings::for_database(path.to_string_lossy())
        .option("busy_timeout", "2000");
    let session = Session::open("sqlite", &settings).await?;
    Ok(Env {
        session,
        _dir: Some(dir),
    })
}

#[cfg(feature = "postgres")]
pub async fn postgres() -> Result<Option<Env>, Box<dyn Error>> {
    let Ok(host) = std::env::var("DBMUX_TEST_PG_HOST") else {
        return Ok(None);
    };
    dbmux::register_builtin();
    let mut settings = ConnectionSettings::new()
        .host(host)
        .database(std::env::var("DBMUX_TEST_PG_DATABASE").unwrap_or_else(|_| "testing".into()))
        .user(std::env::var("DBMUX_TEST_PG_USER").unwrap_or_else(|_| "testuser".into()))
        .option("pool_size", "2");
    if let Ok(pw) = std::env::var("DBMUX_TEST_PG_PASSWORD") {
        settings = settings.password(pw);
    }
    let session = Session::open("postgres", &settings).await?;
    Ok(Some(Env {
        session,
        _dir: None,
    }))
}

/// Every backend reachable from this test run.
pub async fn every_backend() -> Result<Vec<Env>, Box<dyn Error>> {
    #[allow(unused_mut)]
    let mut envs = vec![memory().await?, sqlite().await?];
    #[cfg(feature = "postgres")]
    if let Some(pg) = postgres().await? {
        envs.push(pg);
    }
    Ok(envs)
}

/// Run DDL on SQL backends; the memory store creates collections on first insert.
pub async fn ddl(env: &Env, sqlite_sql: &str, postgres_sql: &str) -> TestResult {
    match env.backend() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let shared = env
                .session
                .driver_as::<dbmux::sqlite::SharedSqliteConnection>()
                .ok_or("sqlite driver handle")?;
            let guard = shared.lock().await;
            guard.as_ref().ok_or("sqlite connection closed")?.execute_batch(sqlite_sql)?;
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let pool = env
                .session
                .driver_as::<dbmux::postgres::Pool>()
                .ok_or("postgres driver handle")?;
            pool.get().await?.batch_execute(postgres_sql).await?;
            // prepared plans still point at the dropped tables
            pool.manager().statement_caches.clear();
        }
        _ => {
            let _ = (sqlite_sql, postgres_sql);
        }
    }
    Ok(())
}

/// Fresh, empty `people` collection.
pub async fn people(env: &Env) -> Result<Collection, Box<dyn Error>> {
    ddl(
        env,
        "DROP TABLE IF EXISTS people;
         CREATE TABLE people (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT NOT NULL,
             age INTEGER NOT NULL,
             email TEXT
         );",
        "DROP TABLE IF EXISTS people;
         CREATE TABLE people (
             id BIGSERIAL PRIMARY KEY,
             name TEXT NOT NULL,
             age BIGINT NOT NULL,
             email TEXT
         );",
    )
    .await?;
    let people = env.session.collection(&["people"])?;
    people.truncate().await?;
    Ok(people)
}

/// `people` holding A(30), B(25) and C(40).
pub async fn seeded_people(env: &Env) -> Result<Collection, Box<dyn Error>> {
    let people = people(env).await?;
    for (name, age) in [("A", 30), ("B", 25), ("C", 40)] {
        people.append(&mut Person::new(name, age)).await?;
    }
    Ok(people)
}
