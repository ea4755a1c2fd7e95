//! Image resolution boundary.
//!
//! Geometry emitters need absolute pixel sizes, and VOC export optionally
//! copies source images next to its XML. Both go through the [`ImageFetcher`]
//! trait so tests can stub resolution and so network acquisition can live
//! outside the conversion core. The default implementation only resolves
//! local paths and probes dimensions with `imagesize` without decoding the
//! whole file.

use std::path::{Path, PathBuf};

/// A successfully resolved image reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedImage {
    pub width: u32,
    pub height: u32,
    /// Local file holding the bytes, when one exists (used by VOC export).
    pub path: Option<PathBuf>,
}

/// Resolves an image reference to its dimensions and, when available, bytes.
///
/// Returning `None` triggers the partial-failure policy: the task is skipped
/// with a warning and the run continues.
pub trait ImageFetcher {
    fn resolve(&self, reference: &str) -> Option<ResolvedImage>;
}

/// Resolves references against the local filesystem.
///
/// Remote URLs are not fetched; a task referencing one succeeds only when
/// its results carry `original_width`/`original_height`.
#[derive(Clone, Debug, Default)]
pub struct LocalImageFetcher {
    /// Project root that relative (or `/data/...`-style) references resolve
    /// against.
    pub project_dir: Option<PathBuf>,
}

impl LocalImageFetcher {
    pub fn new(project_dir: Option<PathBuf>) -> Self {
        LocalImageFetcher { project_dir }
    }

    fn candidates(&self, reference: &str) -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(reference)];
        if let Some(project_dir) = &self.project_dir {
            let relative = reference.trim_start_matches('/');
            candidates.push(project_dir.join(relative));
            candidates.push(project_dir.join("upload").join(relative));
        }
        candidates
    }
}

impl ImageFetcher for LocalImageFetcher {
    fn resolve(&self, reference: &str) -> Option<ResolvedImage> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return None;
        }

        for candidate in self.candidates(reference) {
            if !candidate.is_file() {
                continue;
            }
            match imagesize::size(&candidate) {
                Ok(size) => {
                    return Some(ResolvedImage {
                        width: size.width as u32,
                        height: size.height as u32,
                        path: Some(candidate),
                    })
                }
                Err(err) => {
                    log::warn!("cannot probe image size of {}: {err}", candidate.display());
                }
            }
        }

        None
    }
}

/// Fetcher that resolves nothing, for callers that only trust recorded sizes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFetch;

impl ImageFetcher for NoFetch {
    fn resolve(&self, _reference: &str) -> Option<ResolvedImage> {
        None
    }
}

/// Test-friendly fetcher returning fixed dimensions for every reference.
#[derive(Clone, Copy, Debug)]
pub struct FixedSize {
    pub width: u32,
    pub height: u32,
}

impl ImageFetcher for FixedSize {
    fn resolve(&self, _reference: &str) -> Option<ResolvedImage> {
        Some(ResolvedImage {
            width: self.width,
            height: self.height,
            path: None,
        })
    }
}

/// Copy a resolved image into `image_dir`, keyed by `file_name`.
///
/// Already-exported files are left untouched so repeated runs do not re-copy.
pub fn export_image_bytes(
    resolved: &ResolvedImage,
    image_dir: &Path,
    file_name: &str,
) -> std::io::Result<Option<PathBuf>> {
    let Some(source) = &resolved.path else {
        return Ok(None);
    };

    std::fs::create_dir_all(image_dir)?;
    let destination = image_dir.join(file_name);
    if !destination.exists() {
        std::fs::copy(source, &destination)?;
    }
    Ok(Some(destination))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal valid 1x1 PNG.
    const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn local_fetcher_resolves_relative_to_project_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("img.png"), TINY_PNG).expect("write png");

        let fetcher = LocalImageFetcher::new(Some(dir.path().to_path_buf()));
        let resolved = fetcher.resolve("/img.png").expect("resolve");
        assert_eq!((resolved.width, resolved.height), (1, 1));
        assert!(resolved.path.is_some());
    }

    #[test]
    fn local_fetcher_declines_remote_urls() {
        let fetcher = LocalImageFetcher::default();
        assert!(fetcher.resolve("https://host/img.png").is_none());
    }

    #[test]
    fn export_skips_existing_destination() {
        let src_dir = tempfile::tempdir().expect("tempdir");
        let out_dir = tempfile::tempdir().expect("tempdir");
        let source = src_dir.path().join("img.png");
        std::fs::write(&source, TINY_PNG).expect("write png");

        let resolved = ResolvedImage {
            width: 1,
            height: 1,
            path: Some(source),
        };

        let first = export_image_bytes(&resolved, out_dir.path(), "img.png")
            .expect("export")
            .expect("destination path");
        std::fs::write(&first, b"sentinel").expect("overwrite destination");

        export_image_bytes(&resolved, out_dir.path(), "img.png").expect("re-export");
        let bytes = std::fs::read(&first).expect("read destination");
        assert_eq!(bytes, b"sentinel");
    }
}
