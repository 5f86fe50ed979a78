//! Local Debian package database access.
//!
//! Queries `dpkg-query` for the installed version of the target package and
//! runs `dpkg -i` on a downloaded artifact.

use crate::config::Settings;
use crate::error::{bounded, Error, Result};
use crate::platform::is_privileged;
use crate::types::InstalledVersion;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Status abbreviation followed by the version, e.g. `ii 1.60.0`.
pub const QUERY_FORMAT: &str = "${db:Status-Abbrev}${source:Version}";

/// Status abbreviation of a package that is installed and configured.
const INSTALLED_MARKER: &str = "ii ";

/// Asks the package database which version of the configured package is installed.
///
/// A missing query tool and an unknown package both yield
/// [`InstalledVersion::NotInstalled`].
pub async fn installed_version(settings: &Settings) -> Result<InstalledVersion> {
    let tool = &settings.query_tool;

    let mut cmd = Command::new(tool);
    cmd.args(["-f", QUERY_FORMAT, "-W", settings.package_name.as_str()])
        .env("LC_ALL", "C")
        .env("LANG", "C")
        .env("LANGUAGE", "C")
        .stdin(Stdio::null())
        .kill_on_drop(true);

    tracing::debug!("Querying installed version of {} with {}", settings.package_name, tool);

    let output = match bounded("package query", settings.query_timeout(), cmd.output()).await? {
        Ok(output) => output,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // Without a package database there is nothing installed to compare against
            tracing::debug!("{} not found, treating {} as not installed", tool, settings.package_name);
            return Ok(InstalledVersion::NotInstalled);
        }
        Err(err) => {
            return Err(Error::Subprocess {
                tool: tool.clone(),
                message: err.to_string(),
            })
        }
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(parse_status_line(&combined))
    } else {
        classify_failure(tool, &output.status.to_string(), &combined)
    }
}

/// Interprets successful query output.
pub fn parse_status_line(output: &str) -> InstalledVersion {
    let line = output.lines().next().unwrap_or_default();
    match line.strip_prefix(INSTALLED_MARKER) {
        Some(version) if !version.trim().is_empty() => {
            InstalledVersion::Installed(version.trim().to_string())
        }
        _ => InstalledVersion::NotInstalled,
    }
}

/// Interprets a failed query; an unknown package is not an error.
pub fn classify_failure(tool: &str, status: &str, output: &str) -> Result<InstalledVersion> {
    let output = output.trim();
    if output.to_lowercase().contains("no packages found") {
        return Ok(InstalledVersion::NotInstalled);
    }

    let mut message = format!("while querying installed package version: {}", status);
    if !output.is_empty() {
        message.push_str(": ");
        message.push_str(output);
    }
    Err(Error::Subprocess {
        tool: tool.to_string(),
        message,
    })
}

/// True unless `installed` is exactly `candidate`.
pub fn should_install(candidate: &str, installed: &InstalledVersion) -> bool {
    match installed {
        InstalledVersion::Installed(version) => version != candidate,
        InstalledVersion::NotInstalled => true,
    }
}

/// Whether two differently spelled version strings denote the same release.
///
/// Release names and package versions come from different systems, so
/// `v1.60.0` and `1.60.0-1` can describe the same build. This only feeds a
/// warning; [`should_install`] stays an exact comparison.
pub fn same_release_spelled_differently(release: &str, package: &str) -> bool {
    if release == package {
        return false;
    }
    match (loose_version(release), loose_version(package)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn loose_version(raw: &str) -> Option<semver::Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    // Drop a Debian revision such as "-1" or "-0ubuntu2"
    let upstream = match trimmed.rsplit_once('-') {
        Some((upstream, revision)) if revision.chars().next().is_some_and(|c| c.is_ascii_digit()) => {
            upstream
        }
        _ => trimmed,
    };
    semver::Version::parse(upstream).ok()
}

/// Builds the installer command line, prefixed with the escalation tool when needed.
pub fn installer_argv(settings: &Settings, artifact: &Path, privileged: bool) -> Vec<OsString> {
    let mut argv = Vec::with_capacity(4);
    if !privileged && !settings.escalation_tool.is_empty() {
        argv.push(OsString::from(&settings.escalation_tool));
    }
    argv.push(OsString::from(&settings.install_tool));
    argv.push(OsString::from("-i"));
    argv.push(artifact.as_os_str().to_os_string());
    argv
}

/// Installs `artifact` with the package manager, passing its output through.
pub async fn install_package(settings: &Settings, artifact: &Path) -> Result<()> {
    let argv = installer_argv(settings, artifact, is_privileged());
    let program = argv[0].to_string_lossy().into_owned();

    tracing::info!("Running {:?}", argv);

    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| Error::Subprocess {
            tool: program.clone(),
            message: format!("could not start: {}", err),
        })?;

    let status = bounded("package installation", settings.install_timeout(), child.wait())
        .await?
        .map_err(|err| Error::Subprocess {
            tool: program.clone(),
            message: err.to_string(),
        })?;

    if !status.success() {
        return Err(Error::Subprocess {
            tool: program,
            message: format!("while installing {}: {}", settings.package_name, status),
        });
    }

    Ok(())
}
