use crate::error::{Error, Result};
use crate::types::{Asset, Release};

/// Returns the first asset of `release` named exactly `wanted`.
pub fn resolve_asset<'a>(release: &'a Release, wanted: &str) -> Result<&'a Asset> {
    tracing::trace!(
        "Looking for asset '{}' among {} assets of {} ({})",
        wanted,
        release.assets.len(),
        release.name,
        release.tag_name
    );

    release
        .assets
        .iter()
        .find(|asset| asset.name == wanted)
        .ok_or_else(|| Error::AssetNotFound {
            asset: wanted.to_string(),
            release: release.name.clone(),
        })
}
