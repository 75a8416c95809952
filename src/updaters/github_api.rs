// GitHub REST API calls used by the GitHub updater

use super::http::{self, Headers};
use serde::Deserialize;

pub const DEFAULT_API: &str = "https://api.github.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub created_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

/// Headers for API calls and asset downloads, with the token if one is set
pub fn auth_headers(token: Option<&str>) -> Headers {
    let mut headers = Headers::new();
    if let Some(token) = token {
        headers.insert("Authorization".into(), format!("Bearer {}", token));
    }
    headers
}

pub async fn list_releases(api: &str, repo: &str, headers: &Headers) -> anyhow::Result<Vec<Release>> {
    let url = http::make_url(api, &["repos", repo, "releases"], &[("per_page", "100")]);
    http::fetch_json(&url, headers)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to fetch GitHub releases for '{}': {}", repo, e))
}

/// Newest published release whose prerelease flag matches
pub fn latest_release(releases: &[Release], prerelease: bool) -> Option<&Release> {
    releases
        .iter()
        .filter(|r| !r.draft && r.prerelease == prerelease)
        .max_by(|a, b| a.created_at.cmp(&b.created_at))
}

/// Commit SHA a tag points to
pub async fn tag_commit(api: &str, repo: &str, tag: &str, headers: &Headers) -> anyhow::Result<String> {
    let url = http::make_url(api, &["repos", repo, "git", "ref", "tags", tag], &[]);
    let git_ref: GitRef = http::fetch_json(&url, headers)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to resolve tag '{}' of '{}': {}", tag, repo, e))?;
    Ok(git_ref.object.sha)
}
