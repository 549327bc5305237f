// Image upload storage

use std::{collections::HashMap, path::PathBuf};

use axum::{body::Bytes, extract::Multipart};
use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_BOOKING_IMAGES: usize = 5;

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

/// Subdirectory of the upload root an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadScope {
    Users,
    Services,
    Bookings,
}

impl UploadScope {
    const ALL: [UploadScope; 3] = [Self::Users, Self::Services, Self::Bookings];

    pub fn dir(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Services => "services",
            Self::Bookings => "bookings",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// The image parts of a multipart form plus its plain text fields.
#[derive(Debug, Default)]
pub struct ImageForm {
    pub images: Vec<UploadedImage>,
    pub fields: HashMap<String, String>,
}

impl ImageForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Drains `multipart`, keeping at most `max_files` parts named `image_field`.
pub async fn read_image_form(
    mut multipart: Multipart,
    image_field: &str,
    max_files: usize,
) -> Result<ImageForm> {
    let mut form = ImageForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name != image_field {
            let text = field.text().await?;
            form.fields.insert(name, text);
            continue;
        }

        if form.images.len() >= max_files {
            return Err(AppError::Validation(format!(
                "Maximum {max_files} images allowed per upload"
            )));
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        if data.is_empty() {
            return Err(AppError::Validation(format!("{file_name} is empty")));
        }
        if data.len() > MAX_IMAGE_BYTES {
            return Err(AppError::Validation(
                "Image size cannot exceed 5MB".to_string(),
            ));
        }

        let image = UploadedImage {
            file_name,
            content_type,
            data,
        };
        // Reject the whole form before anything reaches the disk.
        image_extension(&image)?;
        form.images.push(image);
    }

    Ok(form)
}

fn image_extension(image: &UploadedImage) -> Result<&'static str> {
    let invalid = || {
        AppError::Validation("Only image files (JPEG, PNG, GIF, WEBP) are allowed".to_string())
    };

    let extension = std::path::Path::new(&image.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(invalid)?;

    let (extension, mime) = IMAGE_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .ok_or_else(invalid)?;

    match image.content_type.as_deref() {
        Some(content_type) if !content_type.eq_ignore_ascii_case(mime) => Err(invalid()),
        _ => Ok(extension),
    }
}

#[derive(Clone, Debug)]
pub struct StorageService {
    base_path: PathBuf,
}

impl StorageService {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub async fn init(&self) -> Result<()> {
        for scope in UploadScope::ALL {
            fs::create_dir_all(self.scope_path(scope))
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {e}")))?;
        }
        Ok(())
    }

    pub fn scope_path(&self, scope: UploadScope) -> PathBuf {
        self.base_path.join(scope.dir())
    }

    /// Writes `image` under `scope` and returns its public `/uploads/...` URL.
    pub async fn save(&self, scope: UploadScope, prefix: &str, image: &UploadedImage) -> Result<String> {
        let extension = image_extension(image)?;
        let file_name = format!("{prefix}-{}.{extension}", Uuid::new_v4());
        let dir = self.scope_path(scope);

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {e}")))?;
        fs::write(dir.join(&file_name), &image.data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store upload: {e}")))?;

        tracing::debug!(scope = scope.dir(), %file_name, bytes = image.data.len(), "Stored upload");

        Ok(format!("/uploads/{}/{file_name}", scope.dir()))
    }

    /// Writes every image or none: if one write fails, the files already
    /// written by this call are removed again.
    pub async fn save_all(
        &self,
        scope: UploadScope,
        prefix: &str,
        images: &[UploadedImage],
    ) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(images.len());
        for image in images {
            match self.save(scope, prefix, image).await {
                Ok(url) => urls.push(url),
                Err(e) => {
                    self.remove_all(&urls).await;
                    return Err(e);
                }
            }
        }
        Ok(urls)
    }

    pub async fn remove_all(&self, urls: &[String]) {
        for url in urls {
            self.remove(url).await;
        }
    }

    /// Removes a previously stored upload. Unknown or foreign URLs are ignored.
    pub async fn remove(&self, url: &str) {
        let Some(relative) = url.strip_prefix("/uploads/") else {
            return;
        };
        if relative.split('/').any(|part| part == ".." || part.is_empty()) {
            return;
        }

        if let Err(e) = fs::remove_file(self.base_path.join(relative)).await {
            tracing::warn!("Failed to remove upload {url}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, content_type: Option<&str>) -> UploadedImage {
        UploadedImage {
            file_name: name.to_string(),
            content_type: content_type.map(str::to_string),
            data: Bytes::from_static(b"\x89PNG"),
        }
    }

    #[test]
    fn accepts_known_image_types() {
        assert_eq!(image_extension(&image("a.PNG", Some("image/png"))).unwrap(), "png");
        assert_eq!(image_extension(&image("b.jpeg", None)).unwrap(), "jpeg");
        assert_eq!(image_extension(&image("c.webp", Some("image/webp"))).unwrap(), "webp");
    }

    #[test]
    fn rejects_other_files() {
        assert!(image_extension(&image("notes.txt", Some("text/plain"))).is_err());
        assert!(image_extension(&image("noext", Some("image/png"))).is_err());
        assert!(image_extension(&image("fake.png", Some("application/pdf"))).is_err());
    }

    #[tokio::test]
    async fn save_then_remove() {
        let root = std::env::temp_dir().join(format!("ttc-storage-{}", Uuid::new_v4()));
        let storage = StorageService::new(&root);
        storage.init().await.unwrap();

        let url = storage
            .save(UploadScope::Services, "service", &image("bin.png", Some("image/png")))
            .await
            .unwrap();
        assert!(url.starts_with("/uploads/services/service-"));
        assert!(url.ends_with(".png"));

        let path = root.join(url.trim_start_matches("/uploads/"));
        assert!(path.exists());
        storage.remove(&url).await;
        assert!(!path.exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn save_all_leaves_nothing_behind_on_failure() {
        let root = std::env::temp_dir().join(format!("ttc-storage-{}", Uuid::new_v4()));
        let storage = StorageService::new(&root);
        storage.init().await.unwrap();

        let images = [
            image("front.png", Some("image/png")),
            image("back.gif", Some("image/gif")),
            image("notes.txt", Some("text/plain")),
        ];
        assert!(storage
            .save_all(UploadScope::Bookings, "booking", &images)
            .await
            .is_err());
        let left = std::fs::read_dir(storage.scope_path(UploadScope::Bookings))
            .unwrap()
            .count();
        assert_eq!(left, 0);

        let urls = storage
            .save_all(UploadScope::Bookings, "booking", &images[..2])
            .await
            .unwrap();
        assert_eq!(urls.len(), 2);
        storage.remove_all(&urls).await;
        let left = std::fs::read_dir(storage.scope_path(UploadScope::Bookings))
            .unwrap()
            .count();
        assert_eq!(left, 0);

        let _ = std::fs::remove_dir_all(root);
    }
}
