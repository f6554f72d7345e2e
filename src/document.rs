use anyhow::{Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use std::fs;
use std::path::{Path, PathBuf};

/// Represents a document with its content and metadata
#[derive(Debug, Clone)]
pub struct Document {
    /// The actual text content of the document
    pub content: String,
    /// The document's file name (used as document ID)
    pub document_id: String,
    /// The document's MIME type
    pub mime_type: String,
    /// Where the document was loaded from, if it came from disk
    pub source: Option<PathBuf>,
}

impl Document {
    /// Create a new document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let file_name = path
            .file_name()
            .context("Invalid file name")?
            .to_str()
            .context("Invalid file name encoding")?
            .to_string();

        // Detect MIME type
        let mime_type = detect_mime_type(path);
        debug!("Detected MIME type: {}", mime_type);

        let content = read_document_content(path, &mime_type)?;

        Ok(Document {
            content,
            document_id: file_name,
            mime_type,
            source: Some(path.to_path_buf()),
        })
    }

    /// Create a plain text document that never touched the filesystem
    pub fn from_text(document_id: impl Into<String>, content: impl Into<String>) -> Self {
        Document {
            content: content.into(),
            document_id: document_id.into(),
            mime_type: "text/plain".to_string(),
            source: None,
        }
    }
}

/// Load every document named by `paths`.
///
/// A directory contributes the supported files directly inside it, in name
/// order. Unsupported files inside a directory are skipped; an unsupported
/// file named explicitly is an error.
pub fn load_documents<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            for file in supported_files_in(path)? {
                documents.push(Document::from_file(&file)?);
            }
        } else if path.exists() {
            documents.push(Document::from_file(path)?);
        } else {
            anyhow::bail!("File not found: {}", path.display());
        }
    }

    info!("Loaded {} document(s)", documents.len());
    Ok(documents)
}

fn supported_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read directory entry in {}", dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        if is_supported_mime(&detect_mime_type(&path)) {
            files.push(path);
        } else {
            warn!("Skipping unsupported file: {}", path.display());
        }
    }

    files.sort();
    Ok(files)
}

fn detect_mime_type(path: &Path) -> String {
    from_path(path).first_or_octet_stream().to_string()
}

fn is_supported_mime(mime_type: &str) -> bool {
    mime_type.starts_with("application/pdf") || mime_type.starts_with("text/")
}

/// Read content from a document based on its MIME type
pub fn read_document_content<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<String> {
    let path = file_path.as_ref();

    let content = match mime_type {
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            let content = extract_text(path)
                .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

            // PDF extraction can sometimes include excessive whitespace
            normalize_whitespace(&content)
        }

        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read text file: {}", path.display()))?
        }

        _ => {
            return Err(anyhow::anyhow!(
                "Unsupported document format: {}. Only text and PDF files are supported.",
                mime_type
            ))
        }
    };

    if content.trim().is_empty() {
        warn!(
            "Document {} is empty or contains only whitespace",
            path.display()
        );
    }

    Ok(content)
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
pub fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    // Replace multiple consecutive newlines with double newlines (paragraph separator)
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        let text = "This  has   multiple    spaces.\n\n\nAnd multiple newlines.\r\nAnd Windows line endings.";
        let expected =
            "This has multiple spaces.\n\nAnd multiple newlines.\nAnd Windows line endings.";
        assert_eq!(normalize_whitespace(text), expected);
    }

    #[test]
    fn test_normalize_whitespace_trims_edges() {
        assert_eq!(normalize_whitespace("\n\n  Title\n\n\n\n"), "Title");
        assert_eq!(normalize_whitespace("   \n \r\n"), "");
    }

    #[test]
    fn test_load_directory_skips_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "second").unwrap();
        fs::write(dir.path().join("a.md"), "# first").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let documents = load_documents(&[dir.path()]).unwrap();
        let ids: Vec<&str> = documents.iter().map(|d| d.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a.md", "b.txt"]);
        assert_eq!(documents[1].content, "second");
        assert_eq!(documents[1].mime_type, "text/plain");
    }

    #[test]
    fn test_explicit_unsupported_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("image.png");
        fs::write(&image, [0u8, 1, 2]).unwrap();

        let err = load_documents(&[&image]).unwrap_err();
        assert!(err.to_string().contains("Unsupported document format"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = load_documents(&["does/not/exist.pdf"]).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
