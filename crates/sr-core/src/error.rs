//! Unified error type for the streamrelay application.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`].

use std::fmt;
use std::time::Duration;

/// Unified error type covering all failure modes in streamrelay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request data failed validation (missing or malformed URL, bad query).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The upstream origin could not be reached or answered with garbage.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The upstream did not deliver response headers in time.
    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),

    /// A redirect could not be followed (e.g. no `Location` header).
    #[error("Redirect error: {0}")]
    Redirect(String),

    /// The redirect chain grew past the hop bound.
    #[error("Redirect loop: gave up after {hops} hops")]
    HopLimit {
        /// Number of redirects followed before giving up.
        hops: u8,
    },

    /// A playlist body could not be decoded or rewritten.
    #[error("Rewrite error: {0}")]
    Rewrite(String),

    /// An external tool (ffmpeg) is missing, failed to start, or died.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A compatibility job did not produce a playable playlist in time.
    #[error("Job {job_id} not ready after {waited:?}")]
    NotReady {
        /// Content-addressed job identifier.
        job_id: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Upstream(_) => 502,
            Error::Timeout(_) => 504,
            Error::Redirect(_) => 502,
            Error::HopLimit { .. } => 508,
            Error::Rewrite(_) => 502,
            Error::Tool { .. } => 500,
            Error::NotReady { .. } => 502,
            Error::NotFound { .. } => 404,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "invalid_input",
            Error::Upstream(_) => "upstream_error",
            Error::Timeout(_) => "upstream_timeout",
            Error::Redirect(_) => "redirect_error",
            Error::HopLimit { .. } => "hop_limit",
            Error::Rewrite(_) => "rewrite_error",
            Error::Tool { .. } => "transcoder_error",
            Error::NotReady { .. } => "not_ready",
            Error::NotFound { .. } => "not_found",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Upstream`].
    pub fn upstream(message: impl fmt::Display) -> Self {
        Error::Upstream(message.to_string())
    }

    /// Convenience constructor for [`Error::Rewrite`].
    pub fn rewrite(message: impl fmt::Display) -> Self {
        Error::Rewrite(message.to_string())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = Error::Validation("missing url parameter".into());
        assert_eq!(err.to_string(), "Validation error: missing url parameter");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn upstream_maps_to_bad_gateway() {
        let err = Error::upstream("connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.http_status(), 502);
        assert_eq!(err.code(), "upstream_error");
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let err = Error::Timeout(Duration::from_secs(15));
        assert_eq!(err.to_string(), "Upstream timed out after 15s");
        assert_eq!(err.http_status(), 504);
    }

    #[test]
    fn redirect_errors() {
        assert_eq!(Error::Redirect("no location".into()).http_status(), 502);
        let err = Error::HopLimit { hops: 6 };
        assert_eq!(err.to_string(), "Redirect loop: gave up after 6 hops");
        assert_eq!(err.http_status(), 508);
    }

    #[test]
    fn rewrite_display() {
        let err = Error::rewrite("body is not UTF-8");
        assert_eq!(err.to_string(), "Rewrite error: body is not UTF-8");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn tool_and_not_ready_are_distinct() {
        let tool = Error::tool("ffmpeg", "exit status 1");
        assert_eq!(tool.to_string(), "Tool error [ffmpeg]: exit status 1");
        assert_eq!(tool.http_status(), 500);

        let not_ready = Error::NotReady {
            job_id: "abc".into(),
            waited: Duration::from_secs(20),
        };
        assert_eq!(not_ready.http_status(), 502);
        assert_ne!(tool.code(), not_ready.code());
    }

    #[test]
    fn not_found_display() {
        let err = Error::not_found("job", "abc-123");
        assert_eq!(err.to_string(), "job not found: abc-123");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn result_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::Internal("boom".into()))
        }
        assert!(err_fn().is_err());
    }
}
