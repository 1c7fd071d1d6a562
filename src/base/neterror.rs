use crate::delegate::Callback;
use thiserror::Error;

/// Transport failure reported by the engine.
///
/// Propagated verbatim to the byte stream, the pending response and the
/// completion handlers, which is why it is `Copy`.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic
    #[error("Request failed")]
    Failed,
    #[error("Request aborted")]
    Aborted,
    #[error("Operation timed out")]
    TimedOut,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Internet disconnected")]
    InternetDisconnected,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Connection timed out")]
    ConnectionTimedOut,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Disallowed URL scheme")]
    DisallowedUrlScheme,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid redirect")]
    InvalidRedirect,
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("Unsafe redirect")]
    UnsafeRedirect,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Content decoding failed")]
    ContentDecodingFailed,
    #[error("Invalid auth credentials")]
    InvalidAuthCredentials,
    #[error("Missing auth credentials")]
    MissingAuthCredentials,
    #[error("Content-Length mismatch")]
    ContentLengthMismatch,
    #[error("Incomplete chunked encoding")]
    IncompleteChunkedEncoding,
    #[error("Invalid HTTP response")]
    InvalidHttpResponse,

    // Body consumption
    #[error("HTTP body error")]
    HttpBodyError,
    #[error("Body is not valid UTF-8")]
    InvalidUtf8,
    #[error("Body is not valid JSON")]
    JsonParseError,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Failed => -2,
            NetError::Aborted => -3,
            NetError::TimedOut => -7,

            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::InternetDisconnected => -106,
            NetError::SslProtocolError => -107,
            NetError::ConnectionTimedOut => -118,

            NetError::InvalidUrl => -300,
            NetError::DisallowedUrlScheme => -301,
            NetError::UnknownUrlScheme => -302,
            NetError::InvalidRedirect => -303,
            NetError::TooManyRedirects => -310,
            NetError::UnsafeRedirect => -311,
            NetError::InvalidResponse => -320,
            NetError::EmptyResponse => -324,
            NetError::ContentDecodingFailed => -330,
            NetError::InvalidAuthCredentials => -338,
            NetError::MissingAuthCredentials => -341,
            NetError::ContentLengthMismatch => -354,
            NetError::IncompleteChunkedEncoding => -355,
            NetError::InvalidHttpResponse => -370,

            // Local codes, kept clear of the -900..=-906 blob range.
            NetError::HttpBodyError => -10001,
            NetError::InvalidUtf8 => -10002,
            NetError::JsonParseError => -10003,
            NetError::Unknown(code) => *code,
        }
    }

    /// True for errors caused by the caller giving up on the task.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, NetError::Aborted)
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -2 => NetError::Failed,
            -3 => NetError::Aborted,
            -7 => NetError::TimedOut,

            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -106 => NetError::InternetDisconnected,
            -107 => NetError::SslProtocolError,
            -118 => NetError::ConnectionTimedOut,

            -300 => NetError::InvalidUrl,
            -301 => NetError::DisallowedUrlScheme,
            -302 => NetError::UnknownUrlScheme,
            -303 => NetError::InvalidRedirect,
            -310 => NetError::TooManyRedirects,
            -311 => NetError::UnsafeRedirect,
            -320 => NetError::InvalidResponse,
            -324 => NetError::EmptyResponse,
            -330 => NetError::ContentDecodingFailed,
            -338 => NetError::InvalidAuthCredentials,
            -341 => NetError::MissingAuthCredentials,
            -354 => NetError::ContentLengthMismatch,
            -355 => NetError::IncompleteChunkedEncoding,
            -370 => NetError::InvalidHttpResponse,

            -10001 => NetError::HttpBodyError,
            -10002 => NetError::InvalidUtf8,
            -10003 => NetError::JsonParseError,
            _ => NetError::Unknown(code),
        }
    }
}

/// Defects in the delegate layer itself.
///
/// These are never produced by the engine. Seeing one means a callback was
/// routed to a delegate that cannot handle it.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum DelegateError {
    #[error("delegate reported {0:?} but has no handler for it")]
    ContractViolation(Callback),
}
