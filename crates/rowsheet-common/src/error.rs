//! Error representation shared by every layer.
//!
//! - **`RemoteError`** : what the document engine (or the transport) reported
//! - **`ErrorKind`**   : the canonical failure classes of a row operation
//! - **`ErrorContext`**: optional sheet / stable-id / remote-status location info
//! - **`RowError`**    : one struct that glues the three together

use std::{error::Error, fmt};

use crate::sheet::{SheetId, StableId};

/// Failure reported by the document engine boundary.
///
/// `status` is the engine's HTTP-style status when it answered at all, and
/// `None` when the request never got a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "remote error {status}: {}", self.message),
            None => write!(f, "transport error: {}", self.message),
        }
    }
}

impl Error for RemoteError {}

/// Failure classes of a row operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A read against the document engine failed.
    RemoteRead,
    /// A write or structural mutation against the document engine failed.
    RemoteWrite,
    /// No row tag (or no sheet) matched the request.
    NotFound,
    /// The payload lacks a required field (the stable `id`).
    MissingField,
    /// The request is malformed: unparsable ids, non-scalar fields, bad ranges.
    InvalidRequest,
    /// No usable credentials or token.
    Auth,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RemoteRead => "remote read failed",
            Self::RemoteWrite => "remote write failed",
            Self::NotFound => "not found",
            Self::MissingField => "missing field",
            Self::InvalidRequest => "invalid request",
            Self::Auth => "not authorized",
        })
    }
}

/// Where an error happened. Every part is optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ErrorContext {
    pub sheet_id: Option<SheetId>,
    pub stable_id: Option<StableId>,
    pub remote_status: Option<u16>,
}

/// The single error type row operations return.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowError {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub context: Option<ErrorContext>,
}

/* ───────────────────── Constructors & helpers ─────────────────────── */

impl From<ErrorKind> for RowError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            context: None,
        }
    }
}

impl RowError {
    pub fn new(kind: ErrorKind) -> Self {
        kind.into()
    }

    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn with_sheet(mut self, sheet_id: SheetId) -> Self {
        self.context_mut().sheet_id = Some(sheet_id);
        self
    }

    pub fn with_stable_id(mut self, stable_id: StableId) -> Self {
        self.context_mut().stable_id = Some(stable_id);
        self
    }

    pub fn with_remote_status(mut self, status: Option<u16>) -> Self {
        self.context_mut().remote_status = status;
        self
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        self.context.get_or_insert_with(ErrorContext::default)
    }

    /// Wrap a failed engine read, keeping its message verbatim.
    pub fn remote_read(err: RemoteError) -> Self {
        Self::new(ErrorKind::RemoteRead)
            .with_message(err.message)
            .with_remote_status(err.status)
    }

    /// Wrap a failed engine write, keeping its message verbatim.
    pub fn remote_write(err: RemoteError) -> Self {
        Self::new(ErrorKind::RemoteWrite)
            .with_message(err.message)
            .with_remote_status(err.status)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound).with_message(msg)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorKind::MissingField).with_message(format!("Must include {field}"))
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest).with_message(msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth).with_message(msg)
    }

    pub fn remote_status(&self) -> Option<u16> {
        self.context.as_ref().and_then(|c| c.remote_status)
    }

    pub fn stable_id(&self) -> Option<StableId> {
        self.context.as_ref().and_then(|c| c.stable_id)
    }

    /// The bare message, falling back to the kind's description.
    pub fn message(&self) -> String {
        match &self.message {
            Some(msg) => msg.clone(),
            None => self.kind.to_string(),
        }
    }
}

/* ───────────────────────── Display / Error ────────────────────────── */

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }

        if let Some(ref ctx) = self.context {
            match (ctx.sheet_id, ctx.stable_id) {
                (Some(sheet), Some(id)) => write!(f, " (sheet {sheet}, id {id})")?,
                (Some(sheet), None) => write!(f, " (sheet {sheet})")?,
                (None, Some(id)) => write!(f, " (id {id})")?,
                (None, None) => {}
            }
        }

        Ok(())
    }
}

impl Error for RowError {}

impl From<RowError> for String {
    fn from(error: RowError) -> Self {
        format!("{error}")
    }
}

impl PartialEq<ErrorKind> for RowError {
    fn eq(&self, other: &ErrorKind) -> bool {
        self.kind == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = RowError::not_found("no row tagged with id 7")
            .with_sheet(0)
            .with_stable_id(7);
        assert_eq!(
            err.to_string(),
            "not found: no row tagged with id 7 (sheet 0, id 7)"
        );
        assert_eq!(err, ErrorKind::NotFound);
        assert_eq!(err.stable_id(), Some(7));
    }

    #[test]
    fn remote_errors_keep_message_and_status() {
        let err =
            RowError::remote_read(RemoteError::new(403, "The caller does not have permission"));
        assert_eq!(err.kind, ErrorKind::RemoteRead);
        assert_eq!(err.remote_status(), Some(403));
        assert_eq!(err.message(), "The caller does not have permission");

        let err = RowError::remote_write(RemoteError::transport("connection reset"));
        assert_eq!(err.remote_status(), None);
        assert_eq!(err.to_string(), "remote write failed: connection reset");
    }

    #[test]
    fn message_falls_back_to_kind() {
        assert_eq!(RowError::new(ErrorKind::Auth).message(), "not authorized");
        assert_eq!(
            RowError::missing_field("id").message(),
            "Must include id"
        );
    }
}
