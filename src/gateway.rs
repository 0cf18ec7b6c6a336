use async_trait::async_trait;
use log::{error, info};
use once_cell::sync::Lazy;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Fixed set of page areas used as namespace keys throughout the image-config
/// and upload paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Home,
    About,
    Gallery,
    Services,
    Blog,
    Projects,
}

impl Section {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "home" => Some(Self::Home),
            "about" => Some(Self::About),
            "gallery" => Some(Self::Gallery),
            "services" => Some(Self::Services),
            "blog" => Some(Self::Blog),
            "projects" => Some(Self::Projects),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::About => "about",
            Self::Gallery => "gallery",
            Self::Services => "services",
            Self::Blog => "blog",
            Self::Projects => "projects",
        }
    }
}

/// Lowercase, collapse runs of non-alphanumerics to a single underscore,
/// trim leading/trailing separators.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// `ambient-frames/<section>/<sanitized-name>_<unix-timestamp>`
pub fn build_public_id(section: Section, name: &str, timestamp: i64) -> String {
    format!("ambient-frames/{}/{}_{}", section.as_str(), sanitize_name(name), timestamp)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not_found")]
    NotFound,
    #[error("upstream: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait UploadGateway: Send + Sync {
    /// Store image bytes under a fresh public id for (section, name) and
    /// return the served URL plus the id needed to delete or overwrite later.
    async fn upload(&self, section: Section, name: &str, bytes: Vec<u8>) -> Result<Uploaded, GatewayError>;
    async fn delete(&self, public_id: &str) -> Result<(), GatewayError>;
}

static HTTP: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// HTTP adapter for a Cloudinary-compatible image CDN. All credentials come
/// from the environment; nothing is hardcoded.
pub struct HttpUploadGateway {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    base_url: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

impl HttpUploadGateway {
    pub fn from_env() -> anyhow::Result<Self> {
        let cloud_name = std::env::var("CDN_CLOUD_NAME")
            .map_err(|_| anyhow::anyhow!("CDN_CLOUD_NAME must be set"))?;
        let api_key = std::env::var("CDN_API_KEY")
            .map_err(|_| anyhow::anyhow!("CDN_API_KEY must be set"))?;
        let api_secret = std::env::var("CDN_API_SECRET")
            .map_err(|_| anyhow::anyhow!("CDN_API_SECRET must be set"))?;
        let base_url = std::env::var("CDN_BASE_URL")
            .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".into());
        info!("initialized upload gateway for cloud '{cloud_name}'");
        Ok(Self { cloud_name, api_key, api_secret, base_url })
    }

    /// SHA-256 over the sorted `key=value` params joined with `&`, with the
    /// API secret appended (the CDN's request-signing scheme).
    fn signature(&self, params: &[(&str, &str)], timestamp: i64) -> String {
        let mut pairs: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        pairs.push(format!("timestamp={timestamp}"));
        pairs.sort();
        let mut hasher = Sha256::new();
        hasher.update(pairs.join("&").as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl UploadGateway for HttpUploadGateway {
    async fn upload(&self, section: Section, name: &str, bytes: Vec<u8>) -> Result<Uploaded, GatewayError> {
        let timestamp = chrono::Utc::now().timestamp();
        let public_id = build_public_id(section, name, timestamp);
        let signature = self.signature(&[("public_id", &public_id)], timestamp);

        let part = reqwest::multipart::Part::bytes(bytes).file_name(sanitize_name(name));
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("public_id", public_id.clone())
            .text("timestamp", timestamp.to_string())
            .text("api_key", self.api_key.clone())
            .text("signature", signature);

        let url = format!("{}/{}/image/upload", self.base_url, self.cloud_name);
        let resp = HTTP
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!("cdn upload failed status={status} body={body}");
            return Err(GatewayError::Upstream(format!("upload returned {status}")));
        }
        let parsed: UploadResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;
        Ok(Uploaded { url: parsed.secure_url, public_id: parsed.public_id })
    }

    async fn delete(&self, public_id: &str) -> Result<(), GatewayError> {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = self.signature(&[("public_id", public_id)], timestamp);
        let url = format!("{}/{}/image/destroy", self.base_url, self.cloud_name);
        let resp = HTTP
            .post(&url)
            .form(&[
                ("public_id", public_id),
                ("timestamp", &timestamp.to_string()),
                ("api_key", &self.api_key),
                ("signature", &signature),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(GatewayError::Upstream(format!("destroy returned {}", resp.status())));
        }
        Ok(())
    }
}
