//! Image upload and vision-language queries
//!
//! Uploads go through a brokered signed URL so the client never holds
//! storage credentials; queries send an image reference plus a prompt to a
//! vision-language model.

mod query;
mod upload;

pub use query::{GeminiVision, VisionQuerier};
pub use upload::{ImageUploader, SignedUrlUploader};

use std::path::{Path, PathBuf};

/// A captured still image
///
/// Read-only after capture; reused across voice turns until replaced.
#[derive(Debug, Clone)]
pub struct Photo {
    /// Local storage location
    pub path: PathBuf,
    /// Content type inferred from the file extension
    pub content_type: &'static str,
}

impl Photo {
    /// Build a photo handle from a local file path
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content_type = guess_mime(&path.to_string_lossy());
        Self { path, content_type }
    }
}

/// Durable references to an uploaded image
#[derive(Debug, Clone)]
pub struct ImageReference {
    /// Storage-scheme URI (gs://bucket/object)
    pub gs_uri: String,
    /// HTTPS read URI
    pub https_url: String,
}

/// Guess an image mime type from a URI or path extension
///
/// Defaults to JPEG, matching what the camera produces.
#[must_use]
pub fn guess_mime(uri: &str) -> &'static str {
    let lower = uri.split('?').next().unwrap_or(uri).to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

/// File name for an upload, derived from the photo path
pub(crate) fn upload_filename(path: &Path) -> String {
    path.file_name()
        .map_or_else(
            || format!("photo-{}.jpg", uuid::Uuid::new_v4()),
            |n| n.to_string_lossy().into_owned(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_guess_by_extension() {
        assert_eq!(guess_mime("photo.PNG"), "image/png");
        assert_eq!(guess_mime("shot.webp"), "image/webp");
        assert_eq!(guess_mime("anim.gif"), "image/gif");
        assert_eq!(guess_mime("pic.jpeg"), "image/jpeg");
        assert_eq!(guess_mime("pic.jpg?x=1"), "image/jpeg");
        assert_eq!(guess_mime("no-extension"), "image/jpeg");
    }

    #[test]
    fn photo_infers_content_type() {
        let photo = Photo::from_path("/tmp/scene.png");
        assert_eq!(photo.content_type, "image/png");
    }

    #[test]
    fn filename_falls_back_to_generated() {
        let name = upload_filename(Path::new("/tmp/capture.jpg"));
        assert_eq!(name, "capture.jpg");
    }
}
