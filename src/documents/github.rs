//! GitHub repository loader (REST API, no clone).
//!
//! One request lists the whole tree (`git/trees/{branch}?recursive=1`), then
//! each kept blob is fetched raw from the contents endpoint. A few fetches
//! run concurrently; results keep tree order.

use futures_util::{StreamExt, stream};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::Document;
use crate::config::GithubConfig;
use crate::error::AppError;
use crate::settings::GithubRepo;

const CONCURRENT_FETCHES: usize = 8;
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone)]
pub struct GithubLoader {
    client: Client,
    api_base_url: String,
    token: Option<String>,
    exclude_extensions: Vec<String>,
    max_file_bytes: u64,
}

impl GithubLoader {
    /// `token` (from `GITHUB_PAT`) raises the rate limit and unlocks private
    /// repositories; public ones load without it.
    pub fn new(cfg: &GithubConfig, token: Option<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("chatrag/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| AppError::Github(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base_url: cfg.api_base_url.clone(),
            token,
            exclude_extensions: cfg.exclude_extensions.clone(),
            max_file_bytes: cfg.max_file_bytes,
        })
    }

    pub async fn load(&self, repo: &GithubRepo) -> Result<Vec<Document>, AppError> {
        if !repo.is_complete() {
            return Err(AppError::Github(format!("incomplete repository coordinates: {repo}")));
        }

        let tree = self.fetch_tree(repo).await?;
        if tree.truncated {
            warn!(%repo, "repository tree truncated by GitHub; some files are missing");
        }
        let paths = select_blobs(tree.tree, &self.exclude_extensions, self.max_file_bytes);
        info!(%repo, files = paths.len(), "fetching repository files");

        let fetched: Vec<Result<Option<Document>, AppError>> = stream::iter(paths)
            .map(|path| self.fetch_document(repo, path))
            .buffered(CONCURRENT_FETCHES)
            .collect()
            .await;

        let mut docs = Vec::new();
        for doc in fetched {
            if let Some(doc) = doc? {
                docs.push(doc);
            }
        }
        info!(%repo, documents = docs.len(), "loaded repository documents");
        Ok(docs)
    }

    async fn fetch_tree(&self, repo: &GithubRepo) -> Result<TreeResponse, AppError> {
        let mut url = self.repo_url(repo, &["git", "trees", &repo.branch])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let response = self
            .request(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| AppError::Github(format!("tree request failed: {e}")))?;
        let response = check_status(response, "tree").await?;
        response
            .json::<TreeResponse>()
            .await
            .map_err(|e| AppError::Github(format!("failed to parse tree: {e}")))
    }

    async fn fetch_document(&self, repo: &GithubRepo, path: String) -> Result<Option<Document>, AppError> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/'));
        let mut url = self.repo_url(repo, &segments)?;
        url.query_pairs_mut().append_pair("ref", &repo.branch);

        let response = self
            .request(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github.raw")
            .send()
            .await
            .map_err(|e| AppError::Github(format!("fetch {path} failed: {e}")))?;
        let response = check_status(response, &path).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Github(format!("read {path} failed: {e}")))?;

        let Ok(content) = String::from_utf8(bytes.to_vec()) else {
            warn!(%path, "skipping non-UTF-8 repository file");
            return Ok(None);
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        debug!(%path, bytes = content.len(), "fetched repository file");

        let source = blob_url(repo, &path);
        let title = path.rsplit('/').next().unwrap_or(&path).to_string();
        Ok(Some(
            Document::new(title, source, content)
                .with_metadata("file_path", path)
                .with_metadata("repo", format!("{}/{}", repo.owner, repo.repo))
                .with_metadata("branch", repo.branch.clone()),
        ))
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let req = self.client.get(url).header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// `{api}/repos/{owner}/{repo}/{segments...}` with each segment escaped.
    fn repo_url(&self, repo: &GithubRepo, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.api_base_url)
            .map_err(|e| AppError::Github(format!("invalid api_base_url {}: {e}", self.api_base_url)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Github(format!("api_base_url cannot be a base: {}", self.api_base_url)))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.repo.as_str()])
            .extend(segments);
        Ok(url)
    }
}

/// Human-facing link to a file; used as the document source.
pub fn blob_url(repo: &GithubRepo, path: &str) -> String {
    format!(
        "https://github.com/{}/{}/blob/{}/{}",
        repo.owner, repo.repo, repo.branch, path
    )
}

/// Case-insensitive suffix match against the exclusion list.
pub fn is_excluded(path: &str, exclude_extensions: &[String]) -> bool {
    let lower = path.to_ascii_lowercase();
    exclude_extensions
        .iter()
        .any(|ext| !ext.is_empty() && lower.ends_with(&ext.to_ascii_lowercase()))
}

/// Blob paths worth fetching, in tree order.
fn select_blobs(entries: Vec<TreeEntry>, exclude_extensions: &[String], max_file_bytes: u64) -> Vec<String> {
    entries
        .into_iter()
        .filter(|e| e.kind == "blob")
        .filter(|e| !is_excluded(&e.path, exclude_extensions))
        .filter(|e| {
            let fits = e.size.is_none_or(|size| size <= max_file_bytes);
            if !fits {
                debug!(path = %e.path, size = ?e.size, "skipping oversized repository file");
            }
            fits
        })
        .map(|e| e.path)
        .collect()
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or(body);
    Err(AppError::Github(format!("{what}: HTTP {status}: {detail}")))
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        [".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn loader(api: &str) -> GithubLoader {
        let cfg = GithubConfig {
            repo: GithubRepo::default(),
            api_base_url: api.to_string(),
            exclude_extensions: defaults(),
            max_file_bytes: 1024,
            timeout_seconds: 5,
        };
        GithubLoader::new(&cfg, None).unwrap()
    }

    #[test]
    fn exclusions_match_suffix_case_insensitively() {
        let ex = defaults();
        assert!(is_excluded("assets/Logo.PNG", &ex));
        assert!(is_excluded("photo.jpeg", &ex));
        assert!(is_excluded("favicon.ico", &ex));
        assert!(!is_excluded("src/main.rs", &ex));
        assert!(!is_excluded("docs/png-notes.md", &ex));
    }

    #[test]
    fn select_keeps_small_text_blobs() {
        let tree: TreeResponse = serde_json::from_str(
            r#"{"sha":"abc","truncated":false,"tree":[
                {"path":"src","type":"tree"},
                {"path":"src/lib.rs","type":"blob","size":120},
                {"path":"img/a.svg","type":"blob","size":50},
                {"path":"big.json","type":"blob","size":999999},
                {"path":"vendor","type":"commit"},
                {"path":"README.md","type":"blob","size":10}
            ]}"#,
        )
        .unwrap();
        let kept = select_blobs(tree.tree, &defaults(), 1024);
        assert_eq!(kept, vec!["src/lib.rs", "README.md"]);
    }

    #[test]
    fn blob_url_points_at_github() {
        let repo = GithubRepo::new("octocat", "hello", "main");
        assert_eq!(
            blob_url(&repo, "src/app.py"),
            "https://github.com/octocat/hello/blob/main/src/app.py"
        );
    }

    #[test]
    fn repo_url_escapes_segments() {
        let repo = GithubRepo::new("octocat", "hello", "feature/x");
        let url = loader("https://api.github.com")
            .repo_url(&repo, &["contents", "docs", "my file.md"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octocat/hello/contents/docs/my%20file.md"
        );
        let tree = loader("https://ghe.example.com/api/v3/")
            .repo_url(&repo, &["git", "trees", &repo.branch])
            .unwrap();
        assert_eq!(
            tree.as_str(),
            "https://ghe.example.com/api/v3/repos/octocat/hello/git/trees/feature%2Fx"
        );
    }

    #[tokio::test]
    async fn incomplete_repo_is_rejected_without_network() {
        let err = loader("http://127.0.0.1:9")
            .load(&GithubRepo::new("octocat", "", "main"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Github(_)));
    }
}
