//! Classification of engine connection failures.
//!
//! `Bollard` reports a missing or inaccessible socket as a generic error,
//! sometimes wrapping the underlying `io::Error` several levels deep. The
//! helpers here dig the I/O kind out so callers see `SocketNotFound` or
//! `PermissionDenied` with the offending path.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::ContainerError;

/// Extract the filesystem path from a `unix://` or `npipe://` URI.
pub(super) fn extract_socket_path(socket_uri: &str) -> Option<&Path> {
    socket_uri
        .strip_prefix("unix://")
        .or_else(|| socket_uri.strip_prefix("npipe://"))
        .map(Path::new)
}

/// Classify a `Bollard` connection error into a semantic `ContainerError`.
///
/// Network endpoints carry no socket path and always classify as
/// `ConnectionFailed`.
pub(super) fn classify_connection_error(
    bollard_error: &bollard::errors::Error,
    socket_uri: &str,
) -> ContainerError {
    let socket_path = extract_socket_path(socket_uri);
    let message = bollard_error.to_string();

    let kind = match bollard_error {
        bollard::errors::Error::SocketNotFoundError(_) => Some(ErrorKind::NotFound),
        bollard::errors::Error::IOError { err } => {
            Some(io_error_kind_in_chain(err).unwrap_or_else(|| err.kind()))
        }
        other => io_error_kind_in_chain(other),
    };

    match (kind, socket_path) {
        (Some(ErrorKind::NotFound), Some(path)) => ContainerError::SocketNotFound {
            path: path.to_path_buf(),
        },
        (Some(ErrorKind::PermissionDenied), Some(path)) => ContainerError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ContainerError::ConnectionFailed { message },
    }
}

/// Walk the error source chain looking for an `io::Error` kind.
fn io_error_kind_in_chain(error: &dyn std::error::Error) -> Option<ErrorKind> {
    let mut current = error.source();
    while let Some(source) = current {
        if let Some(io_error) = source.downcast_ref::<std::io::Error>() {
            return Some(io_error.kind());
        }
        current = source.source();
    }
    None
}
