use std::path::Path;

use crate::hash::generate_file_hash;

/// A workbook handed to the processor by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    name: String,
    bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lowercase extension without the dot, or `""` when the name has none.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    /// File name without its extension (used as the sheet name for CSV input).
    pub fn stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn content_hash(&self) -> String {
        generate_file_hash(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_extension_and_stem() {
        let file = InputFile::new("Stock Report.XLSX", vec![1, 2, 3]);
        assert_eq!(file.extension(), "xlsx");
        assert_eq!(file.stem(), "Stock Report");
        assert_eq!(file.size(), 3);

        let bare = InputFile::new("README", Vec::new());
        assert_eq!(bare.extension(), "");
    }

    #[test]
    fn hash_ignores_the_file_name() {
        let a = InputFile::new("a.xlsx", b"same bytes".to_vec());
        let b = InputFile::new("b.xlsx", b"same bytes".to_vec());
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.csv");
        std::fs::write(&path, "Material\n1\n").unwrap();
        let file = InputFile::from_path(&path).unwrap();
        assert_eq!(file.name(), "stock.csv");
        assert_eq!(file.bytes(), b"Material\n1\n");
    }
}
