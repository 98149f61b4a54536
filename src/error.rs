//! Typed errors surfaced at the library boundary, plus the teacher's
//! location-tagged `anyhow` macros for glue code that doesn't need a
//! matchable kind.

use thiserror::Error;

/// Error kinds a caller of this crate's core can match on (spec §7).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    #[error("invalid report line at {file}:{line}: {detail}")]
    InvalidReportLine {
        file: String,
        line: u64,
        detail: String,
    },

    #[error("inconsistent reports: {detail}")]
    InconsistentReports { detail: String },

    #[error("line too long at {file}:{line} ({len} bytes, limit 512)")]
    LineTooLong { file: String, line: u64, len: usize },

    #[error("non-UTF-8 report at {file}:{line}")]
    NonUtf8Report { file: String, line: u64 },

    #[error("too many reports: {count} (limit 16)")]
    TooManyReports { count: usize },

    #[error("unknown node type byte {byte:?} at {path}")]
    UnknownNodeType { path: String, byte: u8 },
}

impl CoreError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .expect("Short function name")
    }};
}

#[macro_export]
macro_rules! bail_loc {
    ($msg:expr) => {
        anyhow::bail!("[{}:{} - {}] {}", file!(), function_name!(), line!(), $msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        anyhow::bail!("[{}:{} - {}] {}", file!(), function_name!(), line!(), format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! anyhow_loc {
    ($msg:expr) => {
        anyhow::anyhow!("[{}:{} - {}] {}", file!(), function_name!(), line!(), $msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        anyhow::anyhow!("[{}:{} - {}] {}", file!(), function_name!(), line!(), format!($fmt, $($arg)*))
    };
}
