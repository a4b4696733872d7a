//! Validation and optional persistence of uploaded query images.

use bytes::Bytes;
use std::path::PathBuf;
use visual_search::config::UploadConfig;
use visual_search::SearchError;

/// Reject uploads with a disallowed extension or over the size limit.
pub fn validate(config: &UploadConfig, filename: Option<&str>, bytes: &Bytes) -> Result<(), SearchError> {
    let filename = filename
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SearchError::bad_request("Uploaded image has no file name"))?;

    if !config.is_allowed_file(filename) {
        return Err(SearchError::bad_request(format!(
            "Unsupported image type; allowed: {}",
            config.allowed_extensions.join(", ")
        )));
    }
    if bytes.is_empty() {
        return Err(SearchError::bad_request("Uploaded image is empty"));
    }
    if bytes.len() > config.max_bytes {
        return Err(SearchError::bad_request(format!(
            "Image exceeds the {} upload limit",
            format_size(config.max_bytes)
        )));
    }
    Ok(())
}

fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Strip directories and anything outside `[A-Za-z0-9._-]` from a client file name.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Write the upload into the upload directory under a random prefix.
pub async fn persist(config: &UploadConfig, filename: &str, bytes: &Bytes) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(&config.dir).await?;
    let prefix = uuid::Uuid::new_v4().simple().to_string();
    let path = config
        .dir
        .join(format!("{}_{}", &prefix[..16], sanitize_filename(filename)));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
