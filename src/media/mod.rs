pub mod cloudinary;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AppError;

pub use cloudinary::CloudinaryUploader;

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error("upload transport failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::Upstream(format!("image upload failed: {err}"))
    }
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(
        &self,
        image: ImageUpload,
        folder: &str,
        public_id: &str,
    ) -> Result<String, UploadError>;
}
