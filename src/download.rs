use crate::config::Settings;
use crate::error::{bounded, Error, Result};
use crate::meter::MeteredStream;
use crate::types::Asset;
use futures_util::StreamExt;
use indicatif::DecimalBytes;
use reqwest::header::ACCEPT;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Owns a downloaded artifact and deletes it when dropped.
///
/// Call [`ArtifactGuard::remove`] on the success path to surface removal
/// errors; every other exit path falls back to best-effort removal on drop.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
    armed: bool,
}

impl ArtifactGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(mut self) -> Result<()> {
        self.armed = false;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::filesystem("remove", &self.path, err)),
        }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed {}", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!("Could not remove {}: {}", self.path.display(), err),
        }
    }
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or(rest)
}

/// Maps a failed body chunk, reporting a short body against a known length.
fn body_error(url: &str, err: reqwest::Error, limit: Duration, total: Option<u64>, received: u64) -> Error {
    match total {
        Some(expected) if err.is_body() && received < expected => Error::Truncated {
            url: url.to_string(),
            expected,
            received,
        },
        _ => Error::transport(url, err, limit),
    }
}

/// Streams `asset` into `dest`, reporting progress on stderr.
///
/// The returned guard owns `dest` together with the number of bytes written.
/// `dest` is only claimed once it has been created, so a failure before that
/// leaves an existing file alone; any later failure removes it.
pub async fn download_asset(
    client: &reqwest::Client,
    asset: &Asset,
    dest: &Path,
    settings: &Settings,
) -> Result<(ArtifactGuard, u64)> {
    let source = asset
        .download_source(settings.download_via_api)
        .ok_or_else(|| Error::MissingDownloadUrl(asset.name.clone()))?;
    let url = source.url;
    let limit = settings.http_timeout();

    tracing::info!("Downloading {} from {}", asset.name, url);
    eprint!("Connecting to {}", host_of(url));

    let mut request = client.get(url);
    if source.octet_stream {
        request = request.header(ACCEPT, "application/octet-stream");
    }

    let sent = bounded(&format!("request to {}", url), limit, request.send())
        .await
        .and_then(|sent| sent.map_err(|e| Error::transport(url, e, limit)));
    let response = match sent {
        Ok(response) => response,
        Err(err) => {
            eprintln!();
            return Err(err);
        }
    };

    let status = response.status();
    if !status.is_success() {
        eprintln!();
        return Err(Error::Status {
            url: url.to_string(),
            status,
        });
    }

    let total = response.content_length();
    eprint!(
        "\rGet {} 0 B/{}",
        asset.name,
        total.map_or_else(|| "?".to_string(), |t| DecimalBytes(t).to_string())
    );

    let mut file = match fs::File::create(dest) {
        Ok(file) => file,
        Err(err) => {
            eprintln!();
            return Err(Error::filesystem("create", dest, err));
        }
    };
    let artifact = ArtifactGuard::new(dest);
    let mut stream = MeteredStream::new(
        Box::pin(response.bytes_stream()),
        total,
        asset.name.as_str(),
        io::stderr(),
    );

    let copied: Result<()> = async {
        loop {
            let next = bounded(&format!("download of {}", url), limit, stream.next()).await?;
            match next {
                None => break,
                Some(Ok(chunk)) => {
                    file.write_all(&chunk)
                        .map_err(|e| Error::filesystem("write", dest, e))?;
                }
                Some(Err(err)) => {
                    let received = stream.state().bytes_transferred;
                    return Err(body_error(url, err, limit, total, received));
                }
            }
        }
        file.flush().map_err(|e| Error::filesystem("write", dest, e))
    }
    .await;
    // Keep later output off the progress line
    eprintln!();
    copied?;

    let received = stream.state().bytes_transferred;
    if let Some(expected) = total {
        if received < expected {
            return Err(Error::Truncated {
                url: url.to_string(),
                expected,
                received,
            });
        }
    }

    tracing::info!("Downloaded {} ({})", asset.name, DecimalBytes(received));
    Ok((artifact, received))
}
