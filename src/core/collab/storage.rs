//! Remote artifact storage over an Artifactory-style HTTP API.
//!
//! Packages live in a single bucket. Directories are packed into zip
//! bundles before upload; downloads are unpacked back into place.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::env::EnvOverlay;
use crate::error::{Error, Result};
use crate::log_status;
use crate::utils::{artifact, io};

/// Bucket published packages land in.
pub const DEFAULT_BUCKET: &str = "vjer-published-files";
/// Extension for packed artifact bundles.
pub const PKG_EXT: &str = ".zip";

/// Remote storage surface the build, deploy, and release steps depend on.
pub trait RemoteStorage {
    fn exists(&self, name: &str) -> Result<bool>;
    fn store(&self, name: &str, path: &Path) -> Result<()>;
    /// Download `name` into `dest_dir`, returning the local path.
    fn retrieve(&self, name: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// HTTP storage client configured from the environment. The URL and token
/// are optional until a call actually needs them, so projects that never
/// publish run without storage credentials.
pub struct HttpStorage {
    base_url: Option<String>,
    token: Option<String>,
    bucket: String,
    client: reqwest::blocking::Client,
}

impl HttpStorage {
    pub fn from_env(env: &EnvOverlay) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: env
                .get("VJER_STORAGE_URL")
                .map(|s| s.trim_end_matches('/').to_string()),
            token: env.get("VJER_STORAGE_TOKEN").map(str::to_string),
            bucket: DEFAULT_BUCKET.to_string(),
            client,
        })
    }

    fn base_url(&self) -> Result<&str> {
        self.base_url.as_deref().ok_or_else(|| {
            Error::config_invalid_value(
                "VJER_STORAGE_URL",
                "remote storage requires the storage URL environment variable",
            )
        })
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            Error::config_invalid_value(
                "VJER_STORAGE_TOKEN",
                "remote storage requires the storage token environment variable",
            )
        })
    }
}

impl RemoteStorage for HttpStorage {
    fn exists(&self, name: &str) -> Result<bool> {
        let url = format!("{}/api/storage/{}/{name}", self.base_url()?, self.bucket);
        let response = self.client.get(&url).bearer_auth(self.token()?).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response.error_for_status()?;
        Ok(true)
    }

    fn store(&self, name: &str, path: &Path) -> Result<()> {
        let contents = io::read_bytes(path, "read package for upload")?;
        let checksum = format!("{:x}", Sha256::digest(&contents));
        let url = format!("{}/{}/{name}", self.base_url()?, self.bucket);
        self.client
            .put(&url)
            .bearer_auth(self.token()?)
            .header("X-Checksum-Sha256", checksum)
            .body(contents)
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn retrieve(&self, name: &str, dest_dir: &Path) -> Result<PathBuf> {
        let url = format!(
            "{}/{}/{name}?skipUpdateStats=true",
            self.base_url()?,
            self.bucket
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token()?)
            .send()?
            .error_for_status()?;
        let bytes = response.bytes()?;
        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(name);
        io::write_bytes(&dest, &bytes, "write retrieved package")?;
        Ok(dest)
    }
}

/// Publish a package: a plain file is uploaded as-is, a directory is packed
/// into a zip bundle first. Without `exists_ok`, publishing over an
/// existing package is an error.
pub fn publish_package(
    storage: &dyn RemoteStorage,
    source: &Path,
    package: &str,
    exists_ok: bool,
) -> Result<()> {
    if !exists_ok && storage.exists(package)? {
        return Err(Error::duplicate_publish(package));
    }
    log_status!("Publishing package: {package}");
    if source.is_dir() {
        let staging = TempDir::new()?;
        let bundle = staging.path().join(package);
        artifact::pack(source, &bundle)?;
        storage.store(package, &bundle)
    } else {
        storage.store(package, source)
    }
}

/// Fetch a published bundle and unpack it into `dest_dir`.
pub fn get_stored_artifact(
    storage: &dyn RemoteStorage,
    package: &str,
    dest_dir: &Path,
) -> Result<()> {
    if !storage.exists(package)? {
        return Err(Error::remote_file_not_found(package));
    }
    let staging = TempDir::new()?;
    let bundle = storage.retrieve(package, staging.path())?;
    artifact::unpack(&bundle, dest_dir)
}
