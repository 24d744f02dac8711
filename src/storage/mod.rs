use chrono::Utc;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];

pub fn generate_human_code() -> String {
    format!(
        "TD-{}-{}",
        Utc::now().format("%Y%m%d"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

pub fn ensure_dirs(upload_folder: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(upload_folder)
}

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex"))
}

/// Strip directories and anything outside `[A-Za-z0-9._-]` from an upload name.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = unsafe_chars().replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn is_allowed_document(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Write an uploaded document as `<human_code>_<filename>` under `upload_folder`.
pub async fn save_document(
    upload_folder: &Path,
    human_code: &str,
    filename: &str,
    data: &[u8],
) -> std::io::Result<PathBuf> {
    let path = upload_folder.join(format!("{}_{}", human_code, filename));
    tokio::fs::write(&path, data).await?;
    Ok(path)
}
