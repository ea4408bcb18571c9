//! Off-chain blob and metadata store client.
//!
//! Asset creation is strictly ordered: the image is uploaded first, the
//! metadata document (which embeds the image URI) second, and only then is
//! the ledger write attempted with the metadata URI. Any upload failure
//! aborts the flow before the ledger is touched.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use tessera_common::{MarketError, Result, TraitPair};

/// The JSON document the blob store serves to wallets and galleries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub name: String,
    pub description: String,
    /// URI of the previously uploaded image.
    pub image: String,
    pub attributes: Vec<TraitPair>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload raw image bytes; returns the served URI.
    async fn upload_image(&self, filename: &str, bytes: Vec<u8>) -> Result<String>;

    /// Upload a metadata document; returns the served URI.
    async fn upload_metadata(&self, doc: &MetadataDocument) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UriResponse {
    uri: String,
}

/// HTTP implementation against the metadata server.
#[derive(Clone)]
pub struct HttpBlobStore {
    base: String,
    client: Client,
}

impl HttpBlobStore {
    pub fn new(base: impl Into<String>, timeout_ms: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("reqwest client");
        HttpBlobStore {
            base: base.into(),
            client,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload_image(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let url = format!("{}/uploadImage", self.base);
        let form = Form::new().part("image", Part::bytes(bytes).file_name(filename.to_string()));
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(MarketError::upload)?;
        let status = resp.status();
        if !status.is_success() {
            let t = resp.text().await.unwrap_or_default();
            return Err(MarketError::Upload(format!(
                "image upload failed {status} {t}"
            )));
        }
        let body: UriResponse = resp.json().await.map_err(MarketError::upload)?;
        Ok(body.uri)
    }

    async fn upload_metadata(&self, doc: &MetadataDocument) -> Result<String> {
        let url = format!("{}/uploadMetadata", self.base);
        let resp = self
            .client
            .post(&url)
            .json(doc)
            .send()
            .await
            .map_err(MarketError::upload)?;
        let status = resp.status();
        if !status.is_success() {
            let t = resp.text().await.unwrap_or_default();
            return Err(MarketError::Upload(format!(
                "metadata upload failed {status} {t}"
            )));
        }
        let body: UriResponse = resp.json().await.map_err(MarketError::upload)?;
        Ok(body.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_document_uses_wallet_field_names() {
        let doc = MetadataDocument {
            name: "Plot 9".to_string(),
            description: "corner plot".to_string(),
            image: "http://blobs/images/9.png".to_string(),
            attributes: vec![TraitPair {
                trait_type: "Size".to_string(),
                value: "100x100".to_string(),
            }],
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["attributes"][0]["traitType"], "Size");
        assert_eq!(json["image"], "http://blobs/images/9.png");
    }
}
