//! Ergonomic error context helpers.
//!
//! Provides extension traits that turn `hyper`, `hyper-util` and IO errors
//! into `NetError` variants, logging the original cause.

use crate::base::neterror::NetError;
use std::error::Error as StdError;
use std::io;
use url::Url;

/// Map an IO error onto the closest transport error.
pub fn net_error_from_io(err: &io::Error) -> NetError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
        io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
        io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => NetError::ConnectionClosed,
        io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
        io::ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
        _ => NetError::ConnectionFailed,
    }
}

fn find_io_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err);
        }
        current = e.source();
    }
    None
}

/// Extension trait for adding transport context to client Results.
pub trait TransportResultExt<T> {
    /// Convert the error into a `NetError`, logging it against `url`.
    ///
    /// # Example
    /// ```ignore
    /// use taskbridge::base::context::TransportResultExt;
    ///
    /// let response = client.request(req).await.transport_context(&url)?;
    /// ```
    fn transport_context(self, url: &Url) -> Result<T, NetError>;
}

impl<T> TransportResultExt<T> for Result<T, hyper_util::client::legacy::Error> {
    fn transport_context(self, url: &Url) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(url = %url, error = %e, "request failed");
            match find_io_error(&e) {
                Some(io_err) => net_error_from_io(io_err),
                None if e.is_connect() => NetError::ConnectionFailed,
                None => NetError::InvalidHttpResponse,
            }
        })
    }
}

impl<T> TransportResultExt<T> for Result<T, hyper::Error> {
    fn transport_context(self, url: &Url) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(url = %url, error = %e, "body read failed");
            if let Some(io_err) = find_io_error(&e) {
                net_error_from_io(io_err)
            } else if e.is_incomplete_message() {
                NetError::ContentLengthMismatch
            } else if e.is_canceled() {
                NetError::Aborted
            } else {
                NetError::HttpBodyError
            }
        })
    }
}
