//! Connection configuration.
//!
//! Options arrive as a [`RawConfig`] (straight from the command line) and are
//! resolved once into an immutable [`ConnectionConfig`]. Everything downstream
//! consumes the resolved value and never re-checks for empty fields.

/// Metric key prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "postgres";

/// Environment variable consulted when no password is given explicitly.
pub const PASSWORD_ENV: &str = "PGPASSWORD";

/// Options as supplied by the caller, before defaulting.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub option: String,
    pub sslmode: String,
    pub connect_timeout: u64,
    pub query_timeout: u64,
    pub prefix: String,
}

impl RawConfig {
    /// Applies defaults and produces the immutable per-run configuration.
    ///
    /// `env_password` is the value of [`PASSWORD_ENV`], if set. An explicit
    /// password always wins over it.
    pub fn resolve(self, env_password: Option<String>) -> ConnectionConfig {
        let prefix = if self.prefix.is_empty() {
            DEFAULT_PREFIX.to_string()
        } else {
            self.prefix
        };

        let option = Some(self.option).filter(|o| !o.trim().is_empty());

        ConnectionConfig {
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password.or(env_password).unwrap_or_default(),
            database: self.database,
            option,
            sslmode: self.sslmode,
            connect_timeout: self.connect_timeout,
            query_timeout: self.query_timeout,
            prefix,
        }
    }
}

/// Fully resolved configuration for one collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
    option: Option<String>,
    sslmode: String,
    connect_timeout: u64,
    query_timeout: u64,
    prefix: String,
}

impl ConnectionConfig {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Raw suffix appended to the statistics query, if any.
    pub fn option(&self) -> Option<&str> {
        self.option.as_deref()
    }

    pub fn sslmode(&self) -> &str {
        &self.sslmode
    }

    /// Connect timeout in seconds.
    pub fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    /// Server-side statement timeout in seconds. Zero means unbounded.
    pub fn query_timeout(&self) -> u64 {
        self.query_timeout
    }

    /// Namespace prefix for all emitted metric keys. Never empty.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether the connection should be attempted without TLS.
    pub fn tls_disabled(&self) -> bool {
        self.sslmode == "disable"
    }

    /// Builds the libpq-style connection string.
    ///
    /// Every field is emitted, quoted, even when empty. `options` is added
    /// only when a query timeout is configured.
    pub fn connection_string(&self) -> String {
        let mut parts = vec![
            format!("user={}", quote_value(&self.user)),
            format!("password={}", quote_value(&self.password)),
            format!("host={}", quote_value(&self.host)),
            format!("port={}", self.port),
            format!("dbname={}", quote_value(&self.database)),
            format!("sslmode={}", quote_value(&self.sslmode)),
            format!("connect_timeout={}", self.connect_timeout),
        ];
        if self.query_timeout > 0 {
            let options = format!("-c statement_timeout={}", self.query_timeout * 1000);
            parts.push(format!("options={}", quote_value(&options)));
        }
        parts.join(" ")
    }
}

/// Quotes a value for a key=value connection string.
fn quote_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            host: "db.local".to_string(),
            port: 5433,
            user: "monitor".to_string(),
            password: None,
            database: "shop".to_string(),
            option: String::new(),
            sslmode: "disable".to_string(),
            connect_timeout: 5,
            query_timeout: 0,
            prefix: String::new(),
        }
    }

    #[test]
    fn empty_prefix_defaults_to_postgres() {
        let config = raw().resolve(None);
        assert_eq!(config.prefix(), "postgres");
    }

    #[test]
    fn explicit_prefix_is_kept() {
        let config = RawConfig {
            prefix: "pg-main".to_string(),
            ..raw()
        }
        .resolve(None);
        assert_eq!(config.prefix(), "pg-main");
    }

    #[test]
    fn password_falls_back_to_environment_value() {
        let config = raw().resolve(Some("from-env".to_string()));
        assert_eq!(config.password(), "from-env");

        let config = RawConfig {
            password: Some("explicit".to_string()),
            ..raw()
        }
        .resolve(Some("from-env".to_string()));
        assert_eq!(config.password(), "explicit");

        assert_eq!(raw().resolve(None).password(), "");
    }

    #[test]
    fn blank_option_means_no_suffix() {
        assert_eq!(raw().resolve(None).option(), None);

        let config = RawConfig {
            option: "  ".to_string(),
            ..raw()
        }
        .resolve(None);
        assert_eq!(config.option(), None);

        let config = RawConfig {
            option: "WHERE relname = 'orders'".to_string(),
            ..raw()
        }
        .resolve(None);
        assert_eq!(config.option(), Some("WHERE relname = 'orders'"));
    }

    #[test]
    fn connection_string_keeps_empty_fields() {
        let config = RawConfig {
            database: String::new(),
            ..raw()
        }
        .resolve(None);
        assert_eq!(
            config.connection_string(),
            "user='monitor' password='' host='db.local' port=5433 dbname='' \
             sslmode='disable' connect_timeout=5"
        );
    }

    #[test]
    fn connection_string_escapes_quotes() {
        let config = RawConfig {
            password: Some(r"it's\secret".to_string()),
            ..raw()
        }
        .resolve(None);
        assert!(
            config
                .connection_string()
                .contains(r"password='it\'s\\secret'")
        );
    }

    #[test]
    fn query_timeout_becomes_statement_timeout() {
        let config = RawConfig {
            query_timeout: 30,
            ..raw()
        }
        .resolve(None);
        assert!(
            config
                .connection_string()
                .ends_with("options='-c statement_timeout=30000'")
        );
    }

    #[test]
    fn tls_disabled_only_for_disable() {
        assert!(raw().resolve(None).tls_disabled());
        let config = RawConfig {
            sslmode: "require".to_string(),
            ..raw()
        }
        .resolve(None);
        assert!(!config.tls_disabled());
    }
}
