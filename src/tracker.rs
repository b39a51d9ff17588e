//! Issue/PR tracking service boundary.
//!
//! The orchestrator reads issue metadata (number, title, body, labels that
//! encode workflow type and model selection), writes progress comments, and
//! drives pull requests. Comment posting is best-effort by contract; PR
//! operations failing are fatal to the Ship phase.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::state::{IssueClass, ModelSet, WorkflowType};

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = "adw-orchestrator";

/// An issue as read from the tracker (subset of fields we care about).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueLabel {
    pub name: String,
}

impl TrackedIssue {
    pub fn label_names(&self) -> Vec<&str> {
        self.labels.iter().map(|l| l.name.as_str()).collect()
    }

    /// Issue class from labels; unlabeled issues default to feature.
    pub fn issue_class(&self) -> IssueClass {
        for label in self.label_names() {
            match label {
                "bug" => return IssueClass::Bug,
                "chore" => return IssueClass::Chore,
                "feature" | "enhancement" => return IssueClass::Feature,
                _ => {}
            }
        }
        IssueClass::Feature
    }

    /// Workflow type from labels, if any (`adw-zte`, `adw-sdlc`,
    /// `adw-plan-build`).
    pub fn workflow_type(&self) -> Option<WorkflowType> {
        for label in self.label_names() {
            match label {
                "adw-zte" => return Some(WorkflowType::Zte),
                "adw-sdlc" => return Some(WorkflowType::Sdlc),
                "adw-plan-build" => return Some(WorkflowType::PlanBuild),
                _ => {}
            }
        }
        None
    }

    /// Model tier from labels; `model-heavy` opts into the heavier set.
    pub fn model_set(&self) -> ModelSet {
        if self.label_names().contains(&"model-heavy") {
            ModelSet::Heavy
        } else {
            ModelSet::Base
        }
    }
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn fetch_issue(&self, number: u64) -> Result<TrackedIssue>;

    /// Post a progress comment. Callers treat failures as non-fatal.
    async fn post_comment(&self, issue_number: u64, body: &str) -> Result<()>;

    /// Open a pull request from `head_branch` into the base branch.
    /// Returns the PR number.
    async fn create_pr(&self, head_branch: &str, title: &str, body: &str) -> Result<u64>;

    async fn approve_pr(&self, pr_number: u64) -> Result<()>;

    async fn merge_pr(&self, pr_number: u64) -> Result<()>;
}

/// GitHub REST implementation.
pub struct GitHubTracker {
    client: reqwest::Client,
    /// `owner/repo` slug.
    repo: String,
    token: String,
    base_branch: String,
}

#[derive(Debug, Deserialize)]
struct PrResponse {
    number: u64,
}

impl GitHubTracker {
    pub fn new(
        repo: impl Into<String>,
        token: impl Into<String>,
        base_branch: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            repo: repo.into(),
            token: token.into(),
            base_branch: base_branch.into(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/repos/{}/{}", GITHUB_API, self.repo, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
    }
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    async fn fetch_issue(&self, number: u64) -> Result<TrackedIssue> {
        self.request(reqwest::Method::GET, &format!("issues/{}", number))
            .send()
            .await
            .context("Failed to send issue request to GitHub")?
            .error_for_status()
            .context("GitHub issue API returned error status")?
            .json()
            .await
            .context("Failed to parse issue response from GitHub")
    }

    async fn post_comment(&self, issue_number: u64, body: &str) -> Result<()> {
        self.request(
            reqwest::Method::POST,
            &format!("issues/{}/comments", issue_number),
        )
        .json(&serde_json::json!({ "body": body }))
        .send()
        .await
        .context("Failed to send comment to GitHub")?
        .error_for_status()
        .context("GitHub comment API returned error status")?;
        Ok(())
    }

    async fn create_pr(&self, head_branch: &str, title: &str, body: &str) -> Result<u64> {
        let resp: PrResponse = self
            .request(reqwest::Method::POST, "pulls")
            .json(&serde_json::json!({
                "title": title,
                "head": head_branch,
                "base": self.base_branch,
                "body": body,
            }))
            .send()
            .await
            .context("Failed to send PR create request to GitHub")?
            .error_for_status()
            .context("GitHub PR API returned error status")?
            .json()
            .await
            .context("Failed to parse PR response from GitHub")?;
        Ok(resp.number)
    }

    async fn approve_pr(&self, pr_number: u64) -> Result<()> {
        self.request(
            reqwest::Method::POST,
            &format!("pulls/{}/reviews", pr_number),
        )
        .json(&serde_json::json!({ "event": "APPROVE" }))
        .send()
        .await
        .context("Failed to send PR approval to GitHub")?
        .error_for_status()
        .context("GitHub review API returned error status")?;
        Ok(())
    }

    async fn merge_pr(&self, pr_number: u64) -> Result<()> {
        self.request(reqwest::Method::PUT, &format!("pulls/{}/merge", pr_number))
            .json(&serde_json::json!({ "merge_method": "squash" }))
            .send()
            .await
            .context("Failed to send PR merge to GitHub")?
            .error_for_status()
            .context("GitHub merge API returned error status")?;
        Ok(())
    }
}
