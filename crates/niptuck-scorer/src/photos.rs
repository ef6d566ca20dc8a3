/// Photo intake: the ordered, capped list of images for one scoring session.
///
/// A new selection always replaces the previous one. Files are read concurrently; the
/// resulting list keeps selection order.
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use niptuck_common::mcp_api::PhotoSummary;

pub const MAX_PHOTOS: usize = 5;
const FALLBACK_MIME: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct Photo {
    pub source: PathBuf,
    pub mime_type: String,
    /// `data:<mime>;base64,<body>`
    pub data_url: String,
    pub byte_len: usize,
    pub sha256: String,
}

impl Photo {
    pub fn from_bytes(source: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        let source = source.into();
        let mime_type = detect_mime(&source);
        let data_url = format!("data:{mime_type};base64,{}", BASE64.encode(bytes));
        let sha256 = format!("{:x}", Sha256::digest(bytes));
        Self {
            source,
            mime_type,
            data_url,
            byte_len: bytes.len(),
            sha256,
        }
    }

    /// The base64 body of the data URL (everything after the first comma).
    pub fn base64_body(&self) -> &str {
        match self.data_url.find(',') {
            Some(i) => &self.data_url[i + 1..],
            None => &self.data_url,
        }
    }

    pub fn summary(&self, index: usize) -> PhotoSummary {
        PhotoSummary {
            index,
            path: self.source.display().to_string(),
            mime_type: self.mime_type.clone(),
            bytes: self.byte_len,
            sha256: self.sha256.clone(),
        }
    }
}

/// Image type from the extension; anything that is not `image/*` is sent as JPEG.
fn detect_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub accepted: usize,
    pub discarded: usize,
    pub unreadable: Vec<String>,
}

#[derive(Debug, Default)]
pub struct PhotoIntake {
    photos: Vec<Photo>,
}

impl PhotoIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    /// The "no photos" placeholder shows exactly when nothing is selected.
    pub fn placeholder_visible(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn reset(&mut self) {
        self.photos.clear();
    }

    /// Replace the selection with the first `MAX_PHOTOS` of `paths`.
    pub async fn select_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> SelectionOutcome {
        self.reset();

        let discarded = paths.len().saturating_sub(MAX_PHOTOS);
        let selected: Vec<PathBuf> = paths
            .iter()
            .take(MAX_PHOTOS)
            .map(|p| p.as_ref().to_path_buf())
            .collect();

        let reads = selected.into_iter().map(|path| async move {
            let result = tokio::fs::read(&path).await;
            (path, result)
        });

        let mut outcome = SelectionOutcome {
            discarded,
            ..SelectionOutcome::default()
        };
        for (path, result) in join_all(reads).await {
            match result {
                Ok(bytes) => self.photos.push(Photo::from_bytes(path, &bytes)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read photo, skipping");
                    outcome.unreadable.push(path.display().to_string());
                }
            }
        }
        outcome.accepted = self.photos.len();

        info!(
            accepted = outcome.accepted,
            discarded,
            unreadable = outcome.unreadable.len(),
            "photo selection updated"
        );
        outcome
    }

    pub fn summaries(&self) -> Vec<PhotoSummary> {
        self.photos
            .iter()
            .enumerate()
            .map(|(i, p)| p.summary(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, name.as_bytes()).expect("write fixture");
                path
            })
            .collect()
    }

    #[tokio::test]
    async fn keeps_first_five_in_selection_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = write_files(
            dir.path(),
            &["a.jpg", "b.png", "c.webp", "d.jpeg", "e.gif", "f.jpg", "g.jpg"],
        );

        let mut intake = PhotoIntake::new();
        let outcome = intake.select_files(&paths).await;

        assert_eq!(outcome.accepted, 5);
        assert_eq!(outcome.discarded, 2);
        assert!(outcome.unreadable.is_empty());
        let names: Vec<String> = intake
            .photos()
            .iter()
            .map(|p| p.source.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["a.jpg", "b.png", "c.webp", "d.jpeg", "e.gif"]);
        assert!(!intake.placeholder_visible());
    }

    #[tokio::test]
    async fn empty_selection_then_reset_shows_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = write_files(dir.path(), &["one.jpg", "two.jpg"]);

        let mut intake = PhotoIntake::new();
        intake.select_files(&paths).await;
        assert_eq!(intake.len(), 2);

        let none: Vec<PathBuf> = Vec::new();
        let outcome = intake.select_files(&none).await;
        assert_eq!(outcome.accepted, 0);
        intake.reset();
        assert!(intake.is_empty());
        assert!(intake.placeholder_visible());
    }

    #[tokio::test]
    async fn reselecting_the_same_file_rebuilds_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = write_files(dir.path(), &["same.jpg"]);

        let mut intake = PhotoIntake::new();
        intake.select_files(&paths).await;
        let first = intake.photos()[0].sha256.clone();
        intake.select_files(&paths).await;
        assert_eq!(intake.len(), 1);
        assert_eq!(intake.photos()[0].sha256, first);
    }

    #[tokio::test]
    async fn unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut paths = write_files(dir.path(), &["ok.jpg"]);
        paths.insert(0, dir.path().join("missing.jpg"));

        let mut intake = PhotoIntake::new();
        let outcome = intake.select_files(&paths).await;
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.unreadable.len(), 1);
        assert!(outcome.unreadable[0].ends_with("missing.jpg"));
    }

    #[test]
    fn data_url_and_mime_detection() {
        let png = Photo::from_bytes("face.PNG", b"hello");
        assert_eq!(png.mime_type, "image/png");
        assert_eq!(png.data_url, "data:image/png;base64,aGVsbG8=");
        assert_eq!(png.base64_body(), "aGVsbG8=");
        assert_eq!(png.byte_len, 5);

        assert_eq!(Photo::from_bytes("notes.txt", b"x").mime_type, "image/jpeg");
        assert_eq!(Photo::from_bytes("noext", b"x").mime_type, "image/jpeg");
    }
}
