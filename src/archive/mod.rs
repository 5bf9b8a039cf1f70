//! CBZ packing
//!
//! Pages are written into a zip inside the scratch directory. The resulting
//! [`ArchiveArtifact`] owns its temporary file: dropping it deletes the file,
//! so every exit path of a job leaves the scratch directory clean.

mod naming;

pub use naming::{artifact_name, sanitize};

use bytes::Bytes;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::config::{ArchiveConfig, Compression};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no pages to archive")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive task failed: {0}")]
    Task(String),
}

/// A packed CBZ waiting for delivery
#[derive(Debug)]
pub struct ArchiveArtifact {
    file: NamedTempFile,
    name: String,
    member_count: usize,
    size: u64,
}

impl ArchiveArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Name the artifact is delivered under
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member_count(&self) -> usize {
        self.member_count
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub async fn bytes(&self) -> io::Result<Bytes> {
        tokio::fs::read(self.path()).await.map(Bytes::from)
    }

    /// Delete the backing file now and surface any error
    pub fn release(self) -> io::Result<()> {
        debug!(artifact = %self.name, "Releasing artifact");
        self.file.close()
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    scratch_dir: PathBuf,
    compression: Compression,
}

impl ArchiveBuilder {
    pub fn new(scratch_dir: impl Into<PathBuf>, compression: Compression) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            compression,
        }
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(config.scratch_dir.clone(), config.compression)
    }

    /// Pack `pages` in order into `{title}_{label}.cbz`
    ///
    /// Pages of several chapters may be passed back to back; member numbering
    /// simply continues.
    pub async fn build(
        &self,
        title: &str,
        label: &str,
        pages: Vec<Bytes>,
    ) -> Result<ArchiveArtifact, ArchiveError> {
        if pages.is_empty() {
            return Err(ArchiveError::Empty);
        }

        let name = artifact_name(title, label);
        let scratch_dir = self.scratch_dir.clone();
        let method = match self.compression {
            Compression::Deflated => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        };

        let (file, member_count, size) =
            tokio::task::spawn_blocking(move || write_zip(&scratch_dir, method, &pages))
                .await
                .map_err(|e| ArchiveError::Task(e.to_string()))??;

        debug!(artifact = %name, members = member_count, size, "Archive built");

        Ok(ArchiveArtifact {
            file,
            name,
            member_count,
            size,
        })
    }
}

fn write_zip(
    scratch_dir: &Path,
    method: CompressionMethod,
    pages: &[Bytes],
) -> Result<(NamedTempFile, usize, u64), ArchiveError> {
    std::fs::create_dir_all(scratch_dir)?;
    let file = tempfile::Builder::new()
        .prefix("chapterbox-")
        .suffix(".cbz")
        .tempfile_in(scratch_dir)?;

    let options = SimpleFileOptions::default().compression_method(method);
    let width = pages.len().to_string().len().max(3);

    let mut zip = zip::ZipWriter::new(file.as_file());
    for (i, page) in pages.iter().enumerate() {
        let member = format!("{:0width$}.{}", i + 1, sniff_extension(page));
        zip.start_file(member, options)?;
        zip.write_all(page)?;
    }
    zip.finish()?.sync_all()?;

    let size = file.as_file().metadata()?.len();
    Ok((file, pages.len(), size))
}

/// Pick an extension from the image magic bytes, defaulting to jpg
fn sniff_extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [b'G', b'I', b'F', b'8', ..] => "gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn page(tag: &str) -> Bytes {
        let mut bytes = vec![0xFF, 0xD8, 0xFF];
        bytes.extend_from_slice(tag.as_bytes());
        Bytes::from(bytes)
    }

    fn member_names(path: &Path) -> Vec<String> {
        let file = std::fs::File::open(path).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        archive.file_names().map(str::to_string).collect::<Vec<_>>()
    }

    #[tokio::test]
    async fn test_build_preserves_page_order() {
        let dir = TempDir::new().unwrap();
        let builder = ArchiveBuilder::new(dir.path(), Compression::Deflated);

        let artifact = builder
            .build("Title", "Chapter 1", vec![page("a"), page("b"), page("c")])
            .await
            .unwrap();

        assert_eq!(artifact.name(), "Title_Chapter_1.cbz");
        assert_eq!(artifact.member_count(), 3);
        assert!(artifact.size() > 0);

        let mut names = member_names(artifact.path());
        names.sort();
        assert_eq!(names, ["001.jpg", "002.jpg", "003.jpg"]);

        let mut archive = zip::ZipArchive::new(std::fs::File::open(artifact.path()).unwrap()).unwrap();
        let mut second = Vec::new();
        archive.by_name("002.jpg").unwrap().read_to_end(&mut second).unwrap();
        assert_eq!(second, page("b").to_vec());
    }

    #[tokio::test]
    async fn test_member_width_grows_with_page_count() {
        let dir = TempDir::new().unwrap();
        let builder = ArchiveBuilder::new(dir.path(), Compression::Stored);
        let pages = (0..1200).map(|i| page(&i.to_string())).collect();

        let artifact = builder.build("T", "Volume 1", pages).await.unwrap();

        let names = member_names(artifact.path());
        assert!(names.contains(&"0001.jpg".to_string()));
        assert!(names.contains(&"1200.jpg".to_string()));
    }

    #[tokio::test]
    async fn test_drop_and_release_delete_the_file() {
        let dir = TempDir::new().unwrap();
        let builder = ArchiveBuilder::new(dir.path(), Compression::Deflated);

        let dropped = builder.build("T", "1", vec![page("x")]).await.unwrap();
        let dropped_path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!dropped_path.exists());

        let released = builder.build("T", "2", vec![page("y")]).await.unwrap();
        let released_path = released.path().to_path_buf();
        released.release().unwrap();
        assert!(!released_path.exists());

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_page_list_is_rejected() {
        let dir = TempDir::new().unwrap();
        let builder = ArchiveBuilder::new(dir.path(), Compression::Deflated);

        let result = builder.build("T", "1", Vec::new()).await;
        assert!(matches!(result, Err(ArchiveError::Empty)));
    }

    #[test]
    fn test_sniff_extension() {
        assert_eq!(sniff_extension(&[0x89, b'P', b'N', b'G', 0x0D]), "png");
        assert_eq!(sniff_extension(b"GIF89a"), "gif");
        assert_eq!(sniff_extension(b"RIFF\0\0\0\0WEBPVP8"), "webp");
        assert_eq!(sniff_extension(&[0xFF, 0xD8, 0xFF]), "jpg");
        assert_eq!(sniff_extension(b""), "jpg");
    }
}
