//! Company logo uploads into object storage.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::{Customer, Repository, RepositoryError};
use crate::backend::{BackendError, ObjectStorage};

pub const ALLOWED_LOGO_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/webp", "image/svg+xml"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File type not supported. Allowed types: {}", allowed_list())]
    UnsupportedType,

    #[error("File size too large. Maximum size: {max_mb}MB")]
    TooLarge { max_mb: f64 },

    #[error("Customer {0} not found")]
    UnknownCustomer(String),

    #[error("Failed to upload logo: {0}")]
    Storage(#[from] BackendError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn allowed_list() -> String {
    ALLOWED_LOGO_TYPES
        .iter()
        .filter_map(|t| t.split('/').nth(1))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Checks type and size. Returns the file extension for the stored object.
pub fn validate_logo(content_type: Option<&str>, size: usize, max_size_mb: f64) -> Result<&'static str, UploadError> {
    let content_type = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .ok_or(UploadError::UnsupportedType)?;

    let ext = match content_type.as_str() {
        "image/png" => "png",
        "image/jpeg" => "jpeg",
        "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => return Err(UploadError::UnsupportedType),
    };

    let size_mb = size as f64 / (1024.0 * 1024.0);
    if size_mb > max_size_mb {
        return Err(UploadError::TooLarge { max_mb: max_size_mb });
    }
    Ok(ext)
}

fn object_path(customer_id: &str, ext: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
    format!("{customer_id}/{}-{suffix}.{ext}", Utc::now().timestamp_millis())
}

pub struct LogoUploader {
    storage: Arc<dyn ObjectStorage>,
    customers: Arc<dyn Repository<Customer>>,
    bucket: String,
    max_size_mb: f64,
}

impl LogoUploader {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        customers: Arc<dyn Repository<Customer>>,
        bucket: impl Into<String>,
        max_size_mb: f64,
    ) -> Self {
        Self {
            storage,
            customers,
            bucket: bucket.into(),
            max_size_mb,
        }
    }

    /// Validates, stores the file, and points the customer's
    /// `customization.logo` at its public URL. Invalid files never reach the
    /// network.
    pub async fn upload(&self, customer_id: &str, content_type: Option<&str>, data: Bytes) -> Result<Customer, UploadError> {
        let ext = validate_logo(content_type, data.len(), self.max_size_mb)?;

        let customer = self
            .customers
            .get(customer_id)
            .await?
            .ok_or_else(|| UploadError::UnknownCustomer(customer_id.to_owned()))?;

        let path = object_path(customer_id, ext);
        let content_type = content_type.unwrap_or_default();
        self.storage.put(&self.bucket, &path, content_type, data).await?;
        let url = self.storage.public_url(&self.bucket, &path);
        info!(customer = customer_id, %url, "logo uploaded");

        let mut customization = customer.customization;
        customization.logo = Some(url);
        let patch = serde_json::json!({ "customization": customization });
        Ok(self.customers.update(customer_id, patch).await?)
    }
}
