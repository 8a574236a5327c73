use deadpool_postgres::{Config as PgConfig, Pool, PoolConfig, Runtime};
use tokio_postgres::NoTls;

use crate::config::{Address, ConnectionSettings};
use crate::error::DbError;

use super::BACKEND_NAME;

pub const DEFAULT_PORT: u16 = 5432;

/// Map generic settings onto a deadpool-postgres config.
///
/// A socket path is passed as the host (libpq convention for Unix sockets). `charset`
/// becomes `client_encoding`; options `pool_size` and `application_name` are honored.
///
/// # Errors
/// Returns `DbError::ValidationError` if `database` or `user` is missing, no host or
/// socket is given, or an option is malformed.
pub fn pg_config(settings: &ConnectionSettings) -> Result<PgConfig, DbError> {
    let mut cfg = PgConfig::new();
    cfg.dbname = Some(
        settings
            .database
            .clone()
            .ok_or_else(|| DbError::ValidationError("postgres requires a database".into()))?,
    );
    cfg.user = Some(
        settings
            .user
            .clone()
            .ok_or_else(|| DbError::ValidationError("postgres requires a user".into()))?,
    );
    cfg.password.clone_from(&settings.password);
    match settings.address() {
        Address::Tcp { host, port } => {
            cfg.host = Some(host.to_string());
            cfg.port = Some(port.unwrap_or(DEFAULT_PORT));
        }
        Address::Socket(path) => cfg.host = Some(path.to_string()),
        Address::Local => {
            return Err(DbError::ValidationError(
                "postgres requires a host or a socket".into(),
            ));
        }
    }
    if let Some(charset) = &settings.charset {
        cfg.options = Some(format!("-c client_encoding={charset}"));
    }
    cfg.application_name = settings.get_option("application_name").map(str::to_string);
    if let Some(size) = settings.parse_option::<usize>("pool_size")? {
        if size == 0 {
            return Err(DbError::ValidationError("pool_size must be at least 1".into()));
        }
        cfg.pool = Some(PoolConfig::new(size));
    }
    Ok(cfg)
}

/// Build the pool and check out one connection so bad credentials fail here.
///
/// # Errors
/// Returns `DbError::ConnectionError` wrapping the pool or driver failure.
pub async fn connect_pool(settings: &ConnectionSettings) -> Result<Pool, DbError> {
    let pool = pg_config(settings)?
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| DbError::connection(BACKEND_NAME, e))?;
    let first = pool
        .get()
        .await
        .map_err(|e| DbError::connection(BACKEND_NAME, e))?;
    drop(first);
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_addressing_and_options() {
        let settings = ConnectionSettings::new()
            .host("db")
            .database("app")
            .user("app")
            .charset("UTF8")
            .option("pool_size", "4")
            .option("application_name", "reports");
        let cfg = pg_config(&settings).unwrap();
        assert_eq!(cfg.port, Some(DEFAULT_PORT));
        assert_eq!(cfg.options.as_deref(), Some("-c client_encoding=UTF8"));
        assert_eq!(cfg.application_name.as_deref(), Some("reports"));
        assert_eq!(cfg.pool.map(|p| p.max_size), Some(4));
    }

    #[test]
    fn requires_database_user_and_address() {
        let base = ConnectionSettings::new().host("db");
        assert!(pg_config(&base.clone().user("u")).is_err());
        assert!(pg_config(&base.database("d")).is_err());
        let local = ConnectionSettings::for_database("d").user("u");
        assert!(pg_config(&local).is_err());
    }
}
