use thiserror::Error;

/// Everything here is fatal and terminates the run; the only non-fatal
/// failure in the system is `notify::NotificationError`, which never
/// converts into this type.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed configuration, detected before any network call.
    #[error("config error: {0}")]
    Config(String),

    /// The exchange answered with a non-2xx HTTP status.
    #[error("request to {path} failed with status {status}")]
    Transport { path: String, status: u16 },

    /// The HTTP call itself failed (connect, TLS, body read).
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The exchange reported application-level errors in its envelope.
    #[error("exchange error: {0}")]
    Exchange(String),

    /// The response parsed as JSON but not into the expected shape.
    #[error("unexpected response shape: {0}")]
    ResponseShape(String),
}
