//! Error taxonomy shared by the release pipeline.
//!
//! Every component returns [`Error`] unchanged up to the command dispatcher,
//! which is the only place that prints it and picks the exit code.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to initialise HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("download of {url} ended after {received} of {expected} bytes")]
    Truncated {
        url: String,
        expected: u64,
        received: u64,
    },

    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: String, after: Duration },

    #[error("Unable to find the release \"{0}\"")]
    ReleaseNotFound(String),

    #[error("Unable to find the asset \"{asset}\" in release \"{release}\"")]
    AssetNotFound { asset: String, release: String },

    #[error("asset \"{0}\" has no download URL")]
    MissingDownloadUrl(String),

    #[error("{package} is already installed at version {version}")]
    AlreadyInstalled { package: String, version: String },

    #[error("{tool} failed: {message}")]
    Subprocess { tool: String, message: String },

    #[error("could not {action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("interrupted")]
    Cancelled,
}

impl Error {
    /// Maps a reqwest failure, keeping client-side timeouts distinct.
    pub fn transport(url: &str, source: reqwest::Error, limit: Duration) -> Self {
        if source.is_timeout() {
            Error::Timeout {
                what: format!("request to {}", url),
                after: limit,
            }
        } else {
            Error::Transport {
                url: url.to_string(),
                source,
            }
        }
    }

    pub fn filesystem(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// Outcomes the user can act on directly; reported without the `error:` prefix.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Error::ReleaseNotFound(_) | Error::AssetNotFound { .. } | Error::AlreadyInstalled { .. }
        )
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_expected() {
            2
        } else {
            1
        }
    }
}

/// Runs `fut` with an upper bound, surfacing expiry as [`Error::Timeout`].
pub async fn bounded<F>(what: &str, after: Duration, fut: F) -> Result<F::Output>
where
    F: std::future::Future,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| Error::Timeout {
            what: what.to_string(),
            after,
        })
}
