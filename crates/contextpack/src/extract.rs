//! Attachment content extraction.
//!
//! Stored file references are untrusted. [`resolve_upload_path`] reduces a
//! reference to its base name and then re-checks that the resolved path
//! is still inside the upload root; both checks always run.

use std::path::{Component, Path, PathBuf};

use sc_domain::error::{Error, Result};
use sc_domain::model::Attachment;
use sc_domain::trace::TraceEvent;

const TEXT_SUFFIXES: &[&str] = &[".txt", ".md", ".csv"];
const TEXT_MIME_TYPES: &[&str] = &["text/plain", "text/markdown", "text/csv"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Map a stored reference to a path under `upload_root`.
///
/// Layer 1 keeps only the final path segment (either separator style).
/// Layer 2 resolves the result, following symlinks when the file exists,
/// and rejects anything that is not a direct child of the root.
pub fn resolve_upload_path(upload_root: &Path, reference: &str) -> Result<PathBuf> {
    let base = base_name(reference).ok_or_else(|| denied(reference))?;

    let root = upload_root
        .canonicalize()
        .unwrap_or_else(|_| lexical_absolute(upload_root));
    let candidate = root.join(base);

    let resolved = match candidate.canonicalize() {
        Ok(real) => real,
        Err(_) => lexical_absolute(&candidate),
    };

    if resolved.parent() != Some(root.as_path()) {
        return Err(denied(reference));
    }
    Ok(candidate)
}

/// Final segment of `reference`, or `None` when there is no usable name.
fn base_name(reference: &str) -> Option<&str> {
    let last = reference.rsplit(|c: char| c == '/' || c == '\\').next()?;
    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
        return None;
    }
    Some(last)
}

/// Absolute, `.`/`..`-normalized form of `path` without touching disk.
fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn denied(reference: &str) -> Error {
    tracing::warn!(reference = %reference, "path traversal attempt blocked");
    TraceEvent::TraversalBlocked {
        reference: reference.to_owned(),
    }
    .emit();
    Error::AccessDenied("file path outside uploads directory".into())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Extractor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Text,
    Pdf,
    Binary,
}

impl FileKind {
    fn of(attachment: &Attachment) -> Self {
        let name = attachment.file_name.to_ascii_lowercase();
        let mime = attachment.file_type.to_ascii_lowercase();
        if TEXT_MIME_TYPES.contains(&mime.as_str()) || TEXT_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            FileKind::Text
        } else if mime == "application/pdf" || name.ends_with(".pdf") {
            FileKind::Pdf
        } else {
            FileKind::Binary
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            FileKind::Text => "text",
            FileKind::Pdf => "pdf",
            FileKind::Binary => "binary",
        }
    }
}

/// Reads attachment content from a single upload root.
#[derive(Debug, Clone)]
pub struct AttachmentExtractor {
    upload_root: PathBuf,
}

impl AttachmentExtractor {
    pub fn new(upload_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
        }
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    /// Text to inline for `attachment`.
    ///
    /// `Ok(None)` when the file is gone. Read and parse failures become a
    /// `[Could not read file: ...]` placeholder; only a traversal attempt
    /// is an error.
    pub async fn extract(&self, attachment: &Attachment) -> Result<Option<String>> {
        let path = resolve_upload_path(&self.upload_root, &attachment.file_path)?;

        let kind = FileKind::of(attachment);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(path = %path.display(), "attachment file not found");
                return Ok(None);
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "cannot stat attachment");
                return Ok(Some(unreadable(attachment)));
            }
        }

        tracing::debug!(
            file_name = %attachment.file_name,
            file_type = %attachment.file_type,
            kind = kind.as_str(),
            "extracting attachment"
        );

        let extracted = match kind {
            FileKind::Text => read_text(&path).await,
            FileKind::Pdf => read_pdf(path).await,
            FileKind::Binary => Ok(format!("[Binary file: {}]", attachment.file_name)),
        };

        let content = match extracted {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    file_name = %attachment.file_name,
                    error = %e,
                    "failed to extract attachment"
                );
                unreadable(attachment)
            }
        };

        TraceEvent::AttachmentExtracted {
            file_name: attachment.file_name.clone(),
            kind: kind.as_str().into(),
            chars: content.chars().count(),
        }
        .emit();

        Ok(Some(content))
    }
}

fn unreadable(attachment: &Attachment) -> String {
    format!("[Could not read file: {}]", attachment.file_name)
}

async fn read_text(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parse on the blocking pool. The parser owns the document for the whole
/// call and drops it before returning, including when it panics on a
/// malformed file.
async fn read_pdf(path: PathBuf) -> Result<String> {
    let bytes = tokio::fs::read(&path).await?;
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| Error::Other(format!("pdf parser aborted: {e}")))?
        .map_err(|e| Error::Other(format!("pdf parse: {e}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str, file_type: &str, path: &str) -> Attachment {
        Attachment {
            file_name: name.into(),
            file_type: file_type.into(),
            file_path: path.into(),
            file_size: 0,
        }
    }

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("uploads/abc.txt"), Some("abc.txt"));
        assert_eq!(base_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(base_name("..\\..\\windows\\win.ini"), Some("win.ini"));
        assert_eq!(base_name("plain.md"), Some("plain.md"));
    }

    #[test]
    fn base_name_rejects_dot_segments() {
        assert_eq!(base_name(".."), None);
        assert_eq!(base_name("uploads/.."), None);
        assert_eq!(base_name("uploads/"), None);
        assert_eq!(base_name(""), None);
        assert_eq!(base_name("a\0b"), None);
    }

    #[test]
    fn resolve_keeps_plain_names_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let p = resolve_upload_path(dir.path(), "uploads/123-notes.txt").unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(p, root.join("123-notes.txt"));
    }

    #[test]
    fn resolve_confines_traversal_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let p = resolve_upload_path(dir.path(), "../../etc/passwd").unwrap();
        assert!(p.starts_with(dir.path().canonicalize().unwrap()));
        assert_eq!(p.file_name().unwrap(), "passwd");
    }

    #[test]
    fn resolve_rejects_parent_reference() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_upload_path(dir.path(), "uploads/..").unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlink_escaping_root() {
        let outside = tempfile::tempdir().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, "top secret").unwrap();

        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(&secret, root.path().join("link.txt")).unwrap();

        let err = resolve_upload_path(root.path(), "link.txt").unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let ex = AttachmentExtractor::new(dir.path());
        let got = ex
            .extract(&attachment("gone.txt", "text/plain", "uploads/gone.txt"))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn text_by_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1-notes"), "hello notes").unwrap();
        let ex = AttachmentExtractor::new(dir.path());
        let got = ex
            .extract(&attachment("notes", "text/plain", "uploads/1-notes"))
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("hello notes"));
    }

    #[tokio::test]
    async fn markdown_and_csv_by_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("6-notes"), "# Notes").unwrap();
        std::fs::write(dir.path().join("7-table"), "x,y\n").unwrap();
        let ex = AttachmentExtractor::new(dir.path());

        let md = ex
            .extract(&attachment("notes", "text/markdown", "uploads/6-notes"))
            .await
            .unwrap();
        assert_eq!(md.as_deref(), Some("# Notes"));

        let csv = ex
            .extract(&attachment("table", "text/csv", "uploads/7-table"))
            .await
            .unwrap();
        assert_eq!(csv.as_deref(), Some("x,y\n"));
    }

    #[tokio::test]
    async fn text_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2-data.csv"), "a,b\n1,2\n").unwrap();
        std::fs::write(dir.path().join("3-readme.md"), "# Title").unwrap();
        let ex = AttachmentExtractor::new(dir.path());

        let csv = ex
            .extract(&attachment("data.csv", "application/octet-stream", "2-data.csv"))
            .await
            .unwrap();
        assert_eq!(csv.as_deref(), Some("a,b\n1,2\n"));

        let md = ex
            .extract(&attachment("README.MD", "", "uploads/3-readme.md"))
            .await
            .unwrap();
        assert_eq!(md.as_deref(), Some("# Title"));
    }

    #[tokio::test]
    async fn unknown_type_gets_binary_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("4-photo.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        let ex = AttachmentExtractor::new(dir.path());
        let got = ex
            .extract(&attachment("photo.png", "image/png", "uploads/4-photo.png"))
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("[Binary file: photo.png]"));
    }

    #[tokio::test]
    async fn corrupt_pdf_gets_unreadable_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("5-doc.pdf"), b"this is not a pdf").unwrap();
        let ex = AttachmentExtractor::new(dir.path());
        let got = ex
            .extract(&attachment("doc.pdf", "application/pdf", "uploads/5-doc.pdf"))
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("[Could not read file: doc.pdf]"));
    }

    #[tokio::test]
    async fn stat_failure_is_unreadable_not_missing() {
        // An upload root that is a regular file makes every lookup under it
        // fail with something other than "not found".
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        std::fs::write(&root, "not a directory").unwrap();

        let ex = AttachmentExtractor::new(&root);
        let got = ex
            .extract(&attachment("notes.txt", "text/plain", "uploads/notes.txt"))
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("[Could not read file: notes.txt]"));
    }

    #[tokio::test]
    async fn traversal_is_access_denied() {
        let dir = tempfile::tempdir().unwrap();
        let ex = AttachmentExtractor::new(dir.path());
        let err = ex
            .extract(&attachment("x", "text/plain", "../.."))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
    }

    #[tokio::test]
    async fn traversal_never_reads_outside_root() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("passwd"), "root:x:0:0").unwrap();
        let root = outside.path().join("uploads");
        std::fs::create_dir(&root).unwrap();

        let ex = AttachmentExtractor::new(&root);
        let got = ex
            .extract(&attachment("passwd", "text/plain", "../passwd"))
            .await
            .unwrap();
        assert!(got.is_none());
    }
}
