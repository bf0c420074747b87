//! Locating a server's source on GitHub.
//!
//! Registrations that install straight from a repository carry the file's
//! GitHub URL as their installation string, and a commit SHA so installs can
//! be pinned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mcproto_atproto::AtprotoError;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::RegistryError;

const GITHUB: &str = "https://github.com/";

async fn run_git(args: &[&str], cwd: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Normalize a git remote to an `https://github.com/owner/repo` base.
///
/// SSH remotes are rewritten and a trailing `.git` dropped. A remote of the
/// form `...@branch` pins the branch; it is returned separately.
pub fn github_remote(remote: &str) -> Result<(String, Option<String>), RegistryError> {
    let mut remote = remote.trim().to_string();
    if let Some(path) = remote.strip_prefix("git@github.com:") {
        remote = format!("{GITHUB}{path}");
    }
    if let Some(stripped) = remote.strip_suffix(".git") {
        remote = stripped.to_string();
    }
    if !remote.starts_with(GITHUB) {
        return Err(RegistryError::Validation(
            "repository must be hosted on GitHub".to_string(),
        ));
    }

    match remote.split_once('@') {
        Some((base, branch)) => Ok((base.to_string(), Some(branch.to_string()))),
        None => Ok((remote, None)),
    }
}

/// The GitHub blob URL of `file` on the checked-out branch.
pub async fn github_blob_url(file: &Path) -> Result<String, RegistryError> {
    let file = tokio::fs::canonicalize(file)
        .await
        .map_err(|e| RegistryError::Validation(format!("{}: {}", file.display(), e)))?;
    let dir = file.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    let root = run_git(&["rev-parse", "--show-toplevel"], &dir)
        .await
        .ok_or_else(|| RegistryError::Validation("not in a git repository".to_string()))?;
    let root = PathBuf::from(root);

    let remote = run_git(&["config", "--get", "remote.origin.url"], &root)
        .await
        .ok_or_else(|| RegistryError::Validation("no git remote configured".to_string()))?;
    let branch = run_git(&["rev-parse", "--abbrev-ref", "HEAD"], &root)
        .await
        .ok_or_else(|| RegistryError::Validation("no branch checked out".to_string()))?;

    let (base, pinned) = github_remote(&remote)?;
    let branch = pinned.unwrap_or(branch);

    let root = tokio::fs::canonicalize(&root)
        .await
        .map_err(|e| RegistryError::Validation(format!("{}: {}", root.display(), e)))?;
    let relative = file.strip_prefix(&root).map_err(|_| {
        RegistryError::Validation(format!("{} is outside {}", file.display(), root.display()))
    })?;
    let relative: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    Ok(format!("{}/blob/{}/{}", base, branch, relative.join("/")))
}

/// Convert a GitHub blob URL into its raw content URL.
///
/// ```
/// use mcproto_registry::source::github_to_raw_url;
///
/// assert_eq!(
///     github_to_raw_url("https://github.com/o/r/blob/main/src/server.py").unwrap(),
///     "https://raw.githubusercontent.com/o/r/refs/heads/main/src/server.py"
/// );
/// ```
pub fn github_to_raw_url(url: &str) -> Result<String, RegistryError> {
    if !url.starts_with(GITHUB) || !url.contains("/blob/") {
        return Err(RegistryError::Validation(
            "URL must be a GitHub file URL".to_string(),
        ));
    }

    let parts: Vec<&str> = url.split('/').collect();
    if parts.len() < 8 || parts[5] != "blob" {
        return Err(RegistryError::Validation(format!(
            "unexpected GitHub URL format: {}",
            url
        )));
    }

    Ok(format!(
        "https://raw.githubusercontent.com/{}/{}/refs/heads/{}/{}",
        parts[3],
        parts[4],
        parts[6],
        parts[7..].join("/")
    ))
}

/// Path segments of a github.com URL, or `None` for other hosts.
fn github_path(url: &str) -> Option<Vec<&str>> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    if !host.ends_with("github.com") {
        return None;
    }
    let path = path.split(['?', '#']).next().unwrap_or("");
    Some(path.split('/').filter(|p| !p.is_empty()).collect())
}

/// The commit, tree or blob ref embedded in a GitHub URL.
pub fn commit_sha_from_url(url: &str) -> Option<String> {
    let parts = github_path(url)?;
    if parts.len() >= 4 && matches!(parts[2], "commit" | "tree" | "blob") {
        return Some(parts[3].to_string());
    }
    None
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

/// Minimal GitHub REST client.
pub struct GithubApi {
    http: reqwest::Client,
    base_url: String,
}

impl Default for GithubApi {
    fn default() -> Self {
        Self::new("https://api.github.com")
    }
}

impl GithubApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mcproto/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// SHA of the default branch head.
    pub async fn head_commit(&self, owner: &str, repo: &str) -> Result<String, RegistryError> {
        let url = format!("{}/repos/{}/{}/commits/HEAD", self.base_url, owner, repo);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| RegistryError::Transport(AtprotoError::Http(e)))?;

        if !response.status().is_success() {
            return Err(RegistryError::NotFound(format!(
                "{}/{} HEAD ({})",
                owner,
                repo,
                response.status()
            )));
        }

        let commit: CommitResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Transport(AtprotoError::Http(e)))?;
        Ok(commit.sha)
    }

    /// A commit SHA for an installation string, when it points at GitHub.
    ///
    /// Uses the ref in the URL when there is one, otherwise asks for the
    /// default branch head. Failures are logged, never returned.
    pub async fn resolve_commit_sha(&self, installation: &str) -> Option<String> {
        if let Some(sha) = commit_sha_from_url(installation) {
            return Some(sha);
        }

        let parts = github_path(installation)?;
        let [owner, repo, ..] = parts.as_slice() else {
            return None;
        };

        match self.head_commit(owner, repo).await {
            Ok(sha) => {
                debug!(owner, repo, sha = %sha, "resolved head commit");
                Some(sha)
            }
            Err(e) => {
                warn!(owner, repo, error = %e, "failed to fetch head commit");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn ssh_remote_is_normalized() {
        let (base, branch) = github_remote("git@github.com:zzstoatzz/mcproto.git").unwrap();
        assert_eq!(base, "https://github.com/zzstoatzz/mcproto");
        assert_eq!(branch, None);
    }

    #[test]
    fn pinned_branch_is_split_off() {
        let (base, branch) = github_remote("https://github.com/o/r@dev").unwrap();
        assert_eq!(base, "https://github.com/o/r");
        assert_eq!(branch.as_deref(), Some("dev"));
    }

    #[test]
    fn non_github_remote_is_rejected() {
        assert!(github_remote("https://gitlab.com/o/r.git").is_err());
    }

    #[test]
    fn raw_url_requires_blob() {
        assert!(github_to_raw_url("https://github.com/o/r/tree/main/src").is_err());
        assert!(github_to_raw_url("https://example.com/o/r/blob/main/x.py").is_err());
    }

    #[test]
    fn commit_sha_extraction() {
        assert_eq!(
            commit_sha_from_url("https://github.com/o/r/blob/abc123/server.py").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            commit_sha_from_url("https://github.com/o/r/commit/def456").as_deref(),
            Some("def456")
        );
        assert_eq!(commit_sha_from_url("https://github.com/o/r"), None);
        assert_eq!(commit_sha_from_url("uvx mcp-server-fetch"), None);
    }

    #[tokio::test]
    async fn head_commit_from_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/commits/HEAD"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"sha": "cafef00d"})),
            )
            .mount(&server)
            .await;

        let api = GithubApi::new(server.uri());
        assert_eq!(api.head_commit("o", "r").await.unwrap(), "cafef00d");
        assert_eq!(
            api.resolve_commit_sha("https://github.com/o/r").await.as_deref(),
            Some("cafef00d")
        );
    }

    #[tokio::test]
    async fn resolve_commit_sha_swallows_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = GithubApi::new(server.uri());
        assert_eq!(api.resolve_commit_sha("https://github.com/o/missing").await, None);
    }

    #[tokio::test]
    async fn blob_url_from_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let git = |args: &[&str]| {
            std::process::Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        };
        if !git(&["init", "-q"]) {
            // no git binary available
            return;
        }
        assert!(git(&["symbolic-ref", "HEAD", "refs/heads/trunk"]));
        assert!(git(&["remote", "add", "origin", "git@github.com:o/r.git"]));
        assert!(git(&[
            "-c",
            "user.email=t@example.com",
            "-c",
            "user.name=t",
            "commit",
            "-q",
            "--allow-empty",
            "-m",
            "init"
        ]));

        std::fs::create_dir_all(dir.path().join("servers")).unwrap();
        let file = dir.path().join("servers/echo.py");
        std::fs::write(&file, "mcp = FastMCP(\"echo\")\n").unwrap();

        let url = github_blob_url(&file).await.unwrap();
        assert_eq!(url, "https://github.com/o/r/blob/trunk/servers/echo.py");
    }
}
