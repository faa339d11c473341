//! Image upload: stage one of the capture pipeline.
//!
//! The blob store is write-once, so the object name must be unique per
//! upload. Prefixing the original file name with the upload instant keeps
//! names collision-free across rapid repeat scans while staying
//! recognisable when browsing the bucket.

use chrono::Utc;
use tracing::info;

use crate::error::CaptureError;
use crate::model::ImageSource;
use crate::store::BlobStore;

/// Build the unique object name for one upload: `{millis}_{file_name}`.
pub fn object_name(upload_millis: i64, file_name: &str) -> String {
    format!("{}_{}", upload_millis, file_name)
}

/// Upload the selected image and return its public URL.
///
/// Failure aborts the pipeline: without a stored image there is nothing to
/// attach the eventual record to.
pub async fn upload_image(
    blob: &dyn BlobStore,
    image: &ImageSource,
) -> Result<String, CaptureError> {
    let name = object_name(Utc::now().timestamp_millis(), &image.file_name);
    let url = blob.upload(&name, &image.bytes, &image.mime).await?;
    info!("uploaded receipt image as '{}' → {}", name, url);
    Ok(url)
}
