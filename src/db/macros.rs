//! Database dispatch macros for reducing code duplication.
//!
//! The driver layer holds one variant per backend. These macros generate the
//! match arms so each operation reads as one line per backend.

use serde::{Deserialize, Serialize};

/// Database backend type for dispatch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Includes MariaDB
    MySql,
    SQLite,
}

impl DatabaseType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Parse a driver name as it appears in configuration.
    pub fn from_driver_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Self::MySql),
            "sqlite" | "sqlite3" => Some(Self::SQLite),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Macro for generating driver dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => mysql::execute(c, stmt).await,
///     SQLite(c) => sqlite::execute(c, stmt).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::driver::DriverConnection::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
