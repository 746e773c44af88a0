use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::{CloudinaryConfig, SignatureAlgorithm};
use crate::media::{ImageUpload, MediaUploader, UploadError};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

pub struct CloudinaryUploader {
    config: CloudinaryConfig,
    client: reqwest::Client,
}

impl CloudinaryUploader {
    pub fn new(config: CloudinaryConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        )
    }
}

/// Request signature: parameters sorted by name, joined as `k=v&k=v`, with
/// the API secret appended, then hashed.
pub fn sign(params: &[(&str, String)], api_secret: &str, algorithm: SignatureAlgorithm) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let payload = format!("{joined}{api_secret}");
    match algorithm {
        SignatureAlgorithm::Sha1 => format!("{:x}", Sha1::digest(payload.as_bytes())),
        SignatureAlgorithm::Sha256 => format!("{:x}", Sha256::digest(payload.as_bytes())),
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload(
        &self,
        image: ImageUpload,
        folder: &str,
        public_id: &str,
    ) -> Result<String, UploadError> {
        let signed = vec![
            ("folder", folder.to_string()),
            ("public_id", public_id.to_string()),
            ("timestamp", Utc::now().timestamp().to_string()),
        ];
        let algorithm = self.config.signature_algorithm;
        let signature = sign(&signed, &self.config.api_secret, algorithm);

        let data_uri = format!(
            "data:{};base64,{}",
            image.content_type,
            STANDARD.encode(&image.bytes)
        );

        let mut form = signed;
        form.push(("file", data_uri));
        form.push(("api_key", self.config.api_key.clone()));
        form.push(("signature", signature));
        if algorithm == SignatureAlgorithm::Sha256 {
            form.push(("signature_algorithm", algorithm.as_str().to_string()));
        }

        let response = self.client.post(self.endpoint()).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected(format!("status {status}: {body}")));
        }

        let uploaded: UploadResponse = response.json().await?;
        info!(
            public_id,
            bytes = image.bytes.len(),
            file_name = image.file_name.as_deref().unwrap_or(""),
            "image uploaded"
        );
        Ok(uploaded.secure_url)
    }
}

#[cfg(test)]
mod tests {
    use super::sign;
    use crate::config::SignatureAlgorithm;

    #[test]
    fn signature_is_independent_of_parameter_order() {
        let a = sign(
            &[
                ("timestamp", "1700000000".to_string()),
                ("folder", "donations".to_string()),
            ],
            "secret",
            SignatureAlgorithm::Sha256,
        );
        let b = sign(
            &[
                ("folder", "donations".to_string()),
                ("timestamp", "1700000000".to_string()),
            ],
            "secret",
            SignatureAlgorithm::Sha256,
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn signature_depends_on_secret() {
        let params = [("public_id", "donation-1".to_string())];
        assert_ne!(
            sign(&params, "one", SignatureAlgorithm::Sha1),
            sign(&params, "two", SignatureAlgorithm::Sha1)
        );
    }

    #[test]
    fn sha1_signature_matches_sdk_default() {
        // sha1("public_id=sample&timestamp=1315060510abcd")
        let params = [
            ("timestamp", "1315060510".to_string()),
            ("public_id", "sample".to_string()),
        ];
        assert_eq!(
            sign(&params, "abcd", SignatureAlgorithm::Sha1),
            "c3470533147774275dd37996cc4d0e68fd03cd4f"
        );
    }
}
