//! SQL dialect contract
//!
//! A [`Dialect`] owns everything backend specific: connections, parameter
//! conversion, DDL and error classification. [`SqlBackend`](super::SqlBackend)
//! builds statements and drives batches on top of it.

use super::schema::TableSchema;
use crate::query::QueryParameter;
use crate::value::Value;
use std::error::Error as StdError;
use std::io;

/// Windows socket error codes treated as dropped connections.
///
/// 10052 network dropped connection on reset, 10053 connection aborted,
/// 10054 connection reset by peer, 10057 socket not connected,
/// 10058 send after socket shutdown.
pub const TRANSIENT_SOCKET_CODES: [i32; 5] = [10052, 10053, 10054, 10057, 10058];

pub trait Dialect: Send + Sync {
    type Connection;
    type Param;
    type Error: StdError + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn open(&self) -> Result<Self::Connection, Self::Error>;

    fn close(&self, connection: Self::Connection);

    /// Create the table of `schema`, or add what is missing. Never drops anything.
    fn check_or_create_table(&self, connection: &mut Self::Connection, schema: &TableSchema) -> Result<(), Self::Error>;

    fn convert_parameter(&self, parameter: &QueryParameter) -> Self::Param;

    fn is_constraint_violation(&self, error: &Self::Error) -> bool;

    /// Execute a statement, returning the affected row count.
    fn execute(&self, connection: &mut Self::Connection, sql: &str, params: &[Self::Param]) -> Result<i64, Self::Error>;

    /// Execute an INSERT, returning the key generated for the new row.
    fn execute_returning_id(
        &self,
        connection: &mut Self::Connection,
        sql: &str,
        params: &[Self::Param],
    ) -> Result<i64, Self::Error>;

    fn query(&self, connection: &mut Self::Connection, sql: &str, params: &[Self::Param]) -> Result<Vec<Vec<Value>>, Self::Error>;

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name)
    }

    /// Placeholder text for a named parameter
    fn parameter_name(&self, name: &str) -> String {
        format!("@{}", name)
    }

    /// Is this a dropped connection worth reconnecting for?
    fn is_transient(&self, error: &Self::Error) -> bool {
        is_transient_error(error)
    }
}

/// Walk an error's source chain looking for a dropped-connection I/O error.
pub fn is_transient_error(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(io_error) = error.downcast_ref::<io::Error>() {
            if is_transient_io(io_error) {
                return true;
            }
        }
        current = error.source();
    }
    false
}

fn is_transient_io(error: &io::Error) -> bool {
    if let Some(code) = error.raw_os_error() {
        if TRANSIENT_SOCKET_CODES.contains(&code) || is_transient_errno(code) {
            return true;
        }
    }
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
    )
}

#[cfg(unix)]
fn is_transient_errno(code: i32) -> bool {
    [
        libc::ECONNRESET,
        libc::ECONNABORTED,
        libc::ENOTCONN,
        libc::ESHUTDOWN,
        libc::EPIPE,
        libc::ENETRESET,
    ]
    .contains(&code)
}

#[cfg(not(unix))]
fn is_transient_errno(_code: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "command failed")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_socket_codes_are_transient() {
        for code in TRANSIENT_SOCKET_CODES {
            let error = io::Error::from_raw_os_error(code);
            assert!(is_transient_error(&error), "code {}", code);
        }
    }

    #[test]
    fn test_transient_found_in_source_chain() {
        let error = Wrapped(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(is_transient_error(&error));
    }

    #[cfg(unix)]
    #[test]
    fn test_posix_errno_is_transient() {
        let error = Wrapped(io::Error::from_raw_os_error(libc::ECONNRESET));
        assert!(is_transient_error(&error));
    }

    #[test]
    fn test_other_errors_are_not_transient() {
        let error = Wrapped(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!is_transient_error(&error));
        let error = io::Error::other("syntax error");
        assert!(!is_transient_error(&error));
    }
}
