//! Input loading: a local path or HTTP(S) URL → PDF bytes in memory.
//!
//! The whole file is held in memory for the run; pdfium opens it from the
//! byte slice. The `%PDF` magic is checked here so a wrong file fails with a
//! clear error instead of a pdfium parse failure.

use crate::error::Scan2TextError;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read `input` (path or URL) into memory and verify it is a PDF.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, Scan2TextError> {
    let bytes = if is_url(input) {
        download(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_magic(input, &bytes)?;
    Ok(bytes)
}

/// Reject anything that does not start with `%PDF`.
pub fn check_magic(input: &str, bytes: &[u8]) -> Result<(), Scan2TextError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    Err(Scan2TextError::NotAPdf {
        input: input.to_string(),
        magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
    })
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, Scan2TextError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(Scan2TextError::PermissionDenied { path }),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Scan2TextError::FileNotFound { path }),
        Err(e) => Err(Scan2TextError::Internal(format!("Failed to read '{}': {}", path.display(), e))),
    }
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, Scan2TextError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| Scan2TextError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            Scan2TextError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(classify)?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(classify)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn magic_check() {
        assert!(check_magic("a.pdf", b"%PDF-1.7\n...").is_ok());
        let err = check_magic("a.txt", b"hello").unwrap_err();
        assert!(matches!(err, Scan2TextError::NotAPdf { ref magic, .. } if magic == b"hell"));
        assert!(check_magic("empty", b"").is_err());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, Scan2TextError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_is_read_and_checked() {
        let mut pdf = tempfile::NamedTempFile::new().unwrap();
        pdf.write_all(b"%PDF-1.4\n%%EOF\n").unwrap();
        let bytes = load_input(pdf.path().to_str().unwrap(), 5).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let mut txt = tempfile::NamedTempFile::new().unwrap();
        txt.write_all(b"not a pdf").unwrap();
        let err = load_input(txt.path().to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Scan2TextError::NotAPdf { .. }));
    }
}
