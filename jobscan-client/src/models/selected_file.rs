//! Selected files and the ordered selection list

use jobscan_common::human_size::format_file_size;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a selected file's bytes come from
#[derive(Debug, Clone)]
pub enum FileSource {
    /// File on local disk, read at submission time
    Disk(PathBuf),
    /// Bytes already held in memory
    Memory(Arc<[u8]>),
}

/// One file chosen by the user
///
/// No identity beyond its position in the selection.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    /// File name as shown to the user and sent in the upload
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Declared MIME type
    pub mime_type: String,
    source: FileSource,
}

impl SelectedFile {
    /// Build from in-memory bytes with a declared MIME type
    pub fn in_memory(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            mime_type: mime_type.into(),
            source: FileSource::Memory(Arc::from(bytes)),
        }
    }

    /// Build from a file on disk
    ///
    /// The MIME type is sniffed from the file header; the extension is the
    /// fallback when the header is not recognized.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let sniffed = infer::get_from_path(path)?.map(|kind| kind.mime_type().to_string());
        let mime_type = sniffed.unwrap_or_else(|| mime_from_extension(&name).to_string());

        Ok(Self {
            name,
            size: metadata.len(),
            mime_type,
            source: FileSource::Disk(path.to_path_buf()),
        })
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Load the file contents for upload
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Disk(path) => tokio::fs::read(path).await,
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// MIME type implied by a file name's extension
pub fn mime_from_extension(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Ordered, index-addressed list of selected files
#[derive(Debug, Clone, Default)]
pub struct FileSelection {
    files: Vec<SelectedFile>,
}

/// Summary shown beneath the selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionStats {
    pub count: usize,
    pub total_bytes: u64,
    /// `total_bytes` formatted for display
    pub total_display: String,
}

impl FileSelection {
    pub fn new(files: Vec<SelectedFile>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[SelectedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Remove the file at `index`, shifting later files down
    pub fn remove(&mut self, index: usize) -> Option<SelectedFile> {
        if index < self.files.len() {
            Some(self.files.remove(index))
        } else {
            None
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn stats(&self) -> SelectionStats {
        let total_bytes = self.total_bytes();
        SelectionStats {
            count: self.files.len(),
            total_bytes,
            total_display: format_file_size(total_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    fn png(name: &str, size: usize) -> SelectedFile {
        SelectedFile::in_memory(name, "image/png", vec![0u8; size])
    }

    #[test]
    fn test_stats_sum_sizes() {
        let selection = FileSelection::new(vec![png("a.png", 2 * MB), png("b.png", 3 * MB)]);
        let stats = selection.stats();

        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_bytes, 5 * MB as u64);
        assert_eq!(stats.total_display, "5 MB");
    }

    #[test]
    fn test_remove_by_index_keeps_order() {
        let mut selection =
            FileSelection::new(vec![png("a.png", 1), png("b.png", 1), png("c.png", 1)]);

        let removed = selection.remove(1).unwrap();
        assert_eq!(removed.name, "b.png");

        let names: Vec<_> = selection.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "c.png"]);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut selection = FileSelection::new(vec![png("a.png", 1)]);
        assert!(selection.remove(5).is_none());
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_extension("scan.JPG"), "image/jpeg");
        assert_eq!(mime_from_extension("scan.jpeg"), "image/jpeg");
        assert_eq!(mime_from_extension("page.png"), "image/png");
        assert_eq!(mime_from_extension("paper.pdf"), "application/pdf");
        assert_eq!(mime_from_extension("notes.txt"), "application/octet-stream");
        assert_eq!(mime_from_extension("no_extension"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_from_path_sniffs_png_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scan.bin");
        // PNG signature followed by padding
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0u8; 32]);
        tokio::fs::write(&path, &bytes).await.unwrap();

        let file = SelectedFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "scan.bin");
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.size, bytes.len() as u64);
        assert_eq!(file.read_bytes().await.unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_from_path_falls_back_to_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("page.jpg");
        tokio::fs::write(&path, b"not really a jpeg").await.unwrap();

        let file = SelectedFile::from_path(&path).await.unwrap();
        assert_eq!(file.mime_type, "image/jpeg");
    }
}
