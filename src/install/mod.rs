//! Release listing and installation
//!
//! This module wires the pipeline together:
//! - Resolving a release from the GitHub releases API
//! - Picking the configured asset from it
//! - Skipping packages that are already installed at that version
//! - Downloading the asset and handing it to the package manager

pub mod asset;
pub mod deb;
pub mod github;

pub use asset::resolve_asset;
pub use deb::{install_package, installed_version, should_install};
pub use github::{has_asset, ReleaseCatalog};

use crate::config::Settings;
use crate::download::download_asset;
use crate::error::{Error, Result};
use crate::types::{InstalledVersion, Release};
use std::path::Path;

/// Names of releases that ship the configured asset, newest first.
pub async fn list_releases(settings: &Settings) -> Result<Vec<String>> {
    let catalog = ReleaseCatalog::new(settings)?;
    let with_asset = has_asset(&settings.asset_name);
    let releases = catalog.fetch_all(&[&with_asset]).await?;

    Ok(releases.into_iter().map(|release| release.name).collect())
}

/// Resolves `version` (`None` or `"latest"` meaning the newest release).
pub async fn find_release(catalog: &ReleaseCatalog, version: Option<&str>) -> Result<Release> {
    match version {
        None | Some("latest") => catalog.fetch_latest().await,
        Some(version) => catalog.fetch_by_name(version).await,
    }
}

/// Downloads and installs the requested release unless it is already installed.
///
/// Returns the name of the installed release.
pub async fn install_release(settings: &Settings, version: Option<&str>) -> Result<String> {
    let catalog = ReleaseCatalog::new(settings)?;
    let release = find_release(&catalog, version).await?;
    tracing::debug!(
        "Resolved release '{}' (tag '{}') with {} assets",
        release.name,
        release.tag_name,
        release.assets.len()
    );
    let asset = resolve_asset(&release, &settings.asset_name)?;

    let installed = installed_version(settings).await?;
    if !should_install(&release.name, &installed) {
        return Err(Error::AlreadyInstalled {
            package: settings.package_name.clone(),
            version: release.name.clone(),
        });
    }
    if let InstalledVersion::Installed(current) = &installed {
        if deb::same_release_spelled_differently(&release.name, current) {
            tracing::warn!(
                "Release '{}' and installed package version '{}' look like the same version; installing anyway",
                release.name,
                current
            );
        } else {
            tracing::info!("Upgrading {} from {} to {}", settings.package_name, current, release.name);
        }
    }

    eprintln!("Installing {} {}...", settings.package_name, release.name);

    let (artifact, _) =
        download_asset(catalog.client(), asset, Path::new(&settings.asset_name), settings).await?;
    install_package(settings, artifact.path()).await?;
    artifact.remove()?;

    tracing::info!("Successfully installed {} {}", settings.package_name, release.name);
    Ok(release.name)
}
