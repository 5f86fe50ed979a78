use serde::{Deserialize, Deserializer};

/// A published release as returned by the releases API.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Release {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    /// API form of the asset URL; needs `Accept: application/octet-stream`.
    #[serde(rename = "url", default, deserialize_with = "null_as_empty")]
    pub api_url: String,
    #[serde(
        rename = "browser_download_url",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub download_url: String,
}

/// Where to fetch an asset's bytes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSource<'a> {
    pub url: &'a str,
    pub octet_stream: bool,
}

impl Asset {
    /// Picks the preferred URL form, falling back to the other one when it is empty.
    pub fn download_source(&self, via_api: bool) -> Option<DownloadSource<'_>> {
        let api = (!self.api_url.is_empty()).then_some(DownloadSource {
            url: &self.api_url,
            octet_stream: true,
        });
        let direct = (!self.download_url.is_empty()).then_some(DownloadSource {
            url: &self.download_url,
            octet_stream: false,
        });

        if via_api {
            api.or(direct)
        } else {
            direct.or(api)
        }
    }
}

/// Result of asking the local package database about the target package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstalledVersion {
    Installed(String),
    NotInstalled,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
