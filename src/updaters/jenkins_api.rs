// Jenkins JSON API calls shared by the Jenkins plugin and BungeeCord server updaters

use super::http::{self, Headers};
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct JobInfo {
    #[serde(rename = "lastSuccessfulBuild")]
    last_successful_build: Option<BuildRef>,
}

#[derive(Debug, Deserialize)]
struct BuildRef {
    number: i64,
}

#[derive(Debug, Deserialize)]
struct BuildInfo {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "relativePath")]
    pub relative_path: String,
}

pub async fn last_successful_build(job_url: &str) -> anyhow::Result<i64> {
    let url = http::make_url(
        job_url,
        &["api", "json"],
        &[("tree", "lastSuccessfulBuild[number]")],
    );
    let job: JobInfo = http::fetch_json(&url, &Headers::new()).await?;
    job.last_successful_build
        .map(|build| build.number)
        .ok_or_else(|| anyhow::anyhow!("Jenkins job {} has no successful build", job_url))
}

pub async fn build_artifacts(job_url: &str, build: i64) -> anyhow::Result<Vec<Artifact>> {
    let url = http::make_url(
        job_url,
        &[&build.to_string(), "api", "json"],
        &[("tree", "artifacts[fileName,relativePath]")],
    );
    let info: BuildInfo = http::fetch_json(&url, &Headers::new()).await?;
    Ok(info.artifacts)
}

/// First artifact whose file name matches `pattern`, or the first jar
pub fn find_artifact<'a>(artifacts: &'a [Artifact], pattern: Option<&Regex>) -> Option<&'a Artifact> {
    artifacts
        .iter()
        .find(|a| super::matches_file(pattern, &a.file_name))
}

pub fn artifact_url(job_url: &str, build: i64, artifact: &Artifact) -> String {
    http::make_url(
        job_url,
        &[&build.to_string(), "artifact", &artifact.relative_path],
        &[],
    )
}
