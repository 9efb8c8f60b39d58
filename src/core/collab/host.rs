//! Release creation on the hosting service (GitLab).

use serde_json::{json, Value};

use crate::env::EnvOverlay;
use crate::error::Result;

/// A release to publish on the hosting service.
pub struct ReleaseSpec {
    pub name: String,
    pub tag: String,
    pub description: String,
    /// Optional `(label, url)` asset link shown on the release page.
    pub assets_url: Option<(String, String)>,
}

pub trait ReleaseHost {
    fn create_release(&self, spec: &ReleaseSpec) -> Result<()>;
}

/// GitLab API client driven by the CI job environment.
pub struct GitLabHost {
    env: EnvOverlay,
    client: reqwest::blocking::Client,
}

impl GitLabHost {
    pub fn new(env: EnvOverlay) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self { env, client })
    }
}

fn release_body(spec: &ReleaseSpec) -> Value {
    let mut body = json!({
        "name": spec.name,
        "tag_name": spec.tag,
        "description": spec.description,
    });
    if let Some((label, url)) = &spec.assets_url {
        body["assets"] = json!({ "links": [{ "name": label, "url": url }] });
    }
    body
}

impl ReleaseHost for GitLabHost {
    fn create_release(&self, spec: &ReleaseSpec) -> Result<()> {
        let api = self.env.require("CI_API_V4_URL")?;
        let project = self.env.require("CI_PROJECT_ID")?;
        let url = format!("{api}/projects/{project}/releases");

        self.client
            .post(&url)
            .header("PRIVATE-TOKEN", self.env.require("GITLAB_USER_TOKEN")?)
            .json(&release_body(spec))
            .send()?
            .error_for_status()?;
        Ok(())
    }
}
