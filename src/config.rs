use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Backend-neutral connection settings.
///
/// Exactly one addressing mode may be set: `socket` or `host`/`port`. File based and
/// in-process backends address by `database` alone.
///
/// ```rust
/// use dbmux::prelude::*;
///
/// let settings = ConnectionSettings::new()
///     .host("localhost")
///     .port(5432)
///     .database("app")
///     .user("app")
///     .option("application_name", "reports");
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "socket_path")]
    pub socket: Option<String>,
    pub charset: Option<String>,
    pub options: BTreeMap<String, String>,
}

/// How a backend is reached, derived from validated settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address<'a> {
    Socket(&'a str),
    Tcp { host: &'a str, port: Option<u16> },
    /// Only a database name or path was given.
    Local,
}

impl ConnectionSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings naming only a database (file path for SQLite, store name for memory).
    #[must_use]
    pub fn for_database(database: impl Into<String>) -> Self {
        Self::new().database(database)
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Look up a backend option.
    #[must_use]
    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Parse a backend option, reporting malformed values as `ValidationError`.
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` if the option is present but does not parse.
    pub fn parse_option<T>(&self, key: &str) -> Result<Option<T>, DbError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get_option(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    DbError::ValidationError(format!("option {key}={raw:?} is invalid: {e}"))
                })
            })
            .transpose()
    }

    /// Check the addressing rules.
    ///
    /// Settings with neither host nor socket address the database by name or path alone
    /// ([`Address::Local`]), which is how file and in-memory backends are opened. Backends
    /// reached over the network additionally call [`ConnectionSettings::require_address`].
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` when socket and host/port are combined, when a port
    /// is given without a host, or when a string field is present but blank.
    pub fn validate(&self) -> Result<(), DbError> {
        for (label, field) in [
            ("host", &self.host),
            ("socket", &self.socket),
            ("database", &self.database),
            ("user", &self.user),
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(DbError::ValidationError(format!("{label} must not be blank")));
            }
        }
        if self.socket.is_some() && (self.host.is_some() || self.port.is_some()) {
            return Err(DbError::ValidationError(
                "socket and host/port are mutually exclusive".to_string(),
            ));
        }
        if self.port.is_some() && self.host.is_none() {
            return Err(DbError::ValidationError("port requires a host".to_string()));
        }
        Ok(())
    }

    /// Refuse [`Address::Local`] for a backend that must be reached by host or socket.
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` when neither host nor socket is set.
    pub fn require_address(&self, backend: &str) -> Result<(), DbError> {
        if self.address() == Address::Local {
            return Err(DbError::ValidationError(format!(
                "{backend} requires a host or a socket"
            )));
        }
        Ok(())
    }

    /// The addressing mode of validated settings.
    #[must_use]
    pub fn address(&self) -> Address<'_> {
        if let Some(socket) = self.socket.as_deref() {
            Address::Socket(socket)
        } else if let Some(host) = self.host.as_deref() {
            Address::Tcp {
                host,
                port: self.port,
            }
        } else {
            Address::Local
        }
    }

    /// Load settings from a JSON document.
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` if the JSON is malformed or the settings are invalid.
    pub fn from_json(json: &str) -> Result<Self, DbError> {
        let settings: ConnectionSettings = serde_json::from_str(json)
            .map_err(|e| DbError::ValidationError(format!("invalid settings JSON: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `{PREFIX}_HOST`, `{PREFIX}_PORT`, `{PREFIX}_DATABASE`,
    /// `{PREFIX}_USER`, `{PREFIX}_PASSWORD`, `{PREFIX}_SOCKET` and `{PREFIX}_CHARSET`.
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` if the port does not parse or the settings are invalid.
    pub fn from_env(prefix: &str) -> Result<Self, DbError> {
        let var = |name: &str| std::env::var(format!("{prefix}_{name}")).ok();
        let port = var("PORT")
            .map(|raw| {
                raw.parse::<u16>().map_err(|e| {
                    DbError::ValidationError(format!("{prefix}_PORT={raw:?} is invalid: {e}"))
                })
            })
            .transpose()?;
        let settings = ConnectionSettings {
            host: var("HOST"),
            port,
            database: var("DATABASE"),
            user: var("USER"),
            password: var("PASSWORD"),
            socket: var("SOCKET"),
            charset: var("CHARSET"),
            options: BTreeMap::new(),
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_and_host_conflict() {
        let settings = ConnectionSettings::new().host("db").socket("/tmp/.s.PGSQL.5432");
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, DbError::ValidationError(_)));
    }

    #[test]
    fn port_without_host_is_rejected() {
        assert!(ConnectionSettings::new().port(5432).validate().is_err());
    }

    #[test]
    fn address_modes() {
        let tcp = ConnectionSettings::new().host("db").port(1);
        assert_eq!(tcp.address(), Address::Tcp { host: "db", port: Some(1) });
        let local = ConnectionSettings::for_database("app.db");
        assert_eq!(local.address(), Address::Local);
    }

    #[test]
    fn network_backends_need_an_address() {
        let local = ConnectionSettings::for_database("app").user("u");
        assert!(local.validate().is_ok());
        assert!(matches!(
            local.require_address("postgres"),
            Err(DbError::ValidationError(_))
        ));
        assert!(local.clone().host("db").require_address("postgres").is_ok());
        assert!(local.socket("/run/db.sock").require_address("postgres").is_ok());
    }

    #[test]
    fn loads_from_json_with_options() {
        let settings = ConnectionSettings::from_json(
            r#"{"database": "app", "socket_path": "/run/db.sock", "options": {"busy_timeout": "250"}}"#,
        )
        .unwrap();
        assert_eq!(settings.address(), Address::Socket("/run/db.sock"));
        assert_eq!(settings.parse_option::<u64>("busy_timeout").unwrap(), Some(250));
    }

    #[test]
    fn malformed_option_is_a_validation_error() {
        let settings = ConnectionSettings::for_database("x").option("busy_timeout", "soon");
        assert!(settings.parse_option::<u64>("busy_timeout").is_err());
    }
}
