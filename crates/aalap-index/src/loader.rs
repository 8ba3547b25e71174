//! Content extraction by file type.

use std::collections::BTreeMap;
use std::path::Path;

use aalap_store::ContentKind;
use serde::Deserialize;

use crate::error::{IndexError, Result};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const TEXT_EXTENSIONS: &[&str] = &["txt", "log", "csv"];
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

const CODE_LANGUAGES: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("java", "java"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("go", "go"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("kt", "kotlin"),
    ("scala", "scala"),
    ("sh", "shell"),
    ("sql", "sql"),
    ("toml", "toml"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
];

/// How to interpret file content. `Auto` goes by extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentHint {
    #[default]
    Auto,
    Text,
    Markdown,
    Code,
    Json,
    Pdf,
}

impl std::str::FromStr for ContentHint {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "text" => Ok(Self::Text),
            "markdown" => Ok(Self::Markdown),
            "code" => Ok(Self::Code),
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            other => Err(IndexError::Configuration(format!(
                "unknown content type: {other}"
            ))),
        }
    }
}

/// Text pulled out of a file plus extraction metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub kind: ContentKind,
    pub content: String,
    pub extra: BTreeMap<String, String>,
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn language_for(ext: &str) -> Option<&'static str> {
    CODE_LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
}

/// Content kind `path` resolves to under `hint`, or `None` when unsupported.
#[must_use]
pub fn resolve_kind(path: &Path, hint: ContentHint) -> Option<ContentKind> {
    match hint {
        ContentHint::Text => return Some(ContentKind::Text),
        ContentHint::Markdown => return Some(ContentKind::Markdown),
        ContentHint::Code => return Some(ContentKind::Code),
        ContentHint::Json => return Some(ContentKind::Json),
        ContentHint::Pdf => return cfg!(feature = "pdf").then_some(ContentKind::Pdf),
        ContentHint::Auto => {}
    }
    let ext = extension(path)?;
    let ext = ext.as_str();
    if TEXT_EXTENSIONS.contains(&ext) {
        Some(ContentKind::Text)
    } else if MARKDOWN_EXTENSIONS.contains(&ext) {
        Some(ContentKind::Markdown)
    } else if language_for(ext).is_some() {
        Some(ContentKind::Code)
    } else if ext == "json" {
        Some(ContentKind::Json)
    } else if ext == "pdf" && cfg!(feature = "pdf") {
        Some(ContentKind::Pdf)
    } else {
        None
    }
}

/// Read and extract `path`.
///
/// # Errors
///
/// Returns [`IndexError::Unsupported`] for unknown types, [`IndexError::FileTooLarge`]
/// above `max_size`, [`IndexError::Json`] for malformed JSON, or an I/O error.
pub async fn load(path: &Path, hint: ContentHint, max_size: u64) -> Result<Extracted> {
    let kind = resolve_kind(path, hint)
        .ok_or_else(|| IndexError::Unsupported(path.display().to_string()))?;

    let meta = tokio::fs::metadata(path).await?;
    if meta.len() > max_size {
        return Err(IndexError::FileTooLarge {
            size: meta.len(),
            limit: max_size,
        });
    }

    let mut extra = BTreeMap::new();
    let content = match kind {
        ContentKind::Pdf => extract_pdf(path).await?,
        _ => {
            let bytes = tokio::fs::read(path).await?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
    };

    let content = match kind {
        ContentKind::Markdown => {
            if let Some(title) = markdown_title(&content) {
                extra.insert("title".to_owned(), title.to_owned());
            }
            content
        }
        ContentKind::Code => {
            let language = extension(path)
                .as_deref()
                .and_then(language_for)
                .unwrap_or("unknown");
            extra.insert("language".to_owned(), language.to_owned());
            content
        }
        ContentKind::Json => {
            let value: serde_json::Value = serde_json::from_str(&content)?;
            serde_json::to_string_pretty(&value)?
        }
        _ => content,
    };

    Ok(Extracted {
        kind,
        content,
        extra,
    })
}

/// Text of the first level-one heading.
#[must_use]
pub fn markdown_title(content: &str) -> Option<&str> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(feature = "pdf")]
async fn extract_pdf(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text(&path).map_err(|e| IndexError::Pdf(e.to_string()))
    })
    .await?
}

#[cfg(not(feature = "pdf"))]
async fn extract_pdf(path: &Path) -> Result<String> {
    Err(IndexError::Unsupported(format!(
        "{} (built without the pdf feature)",
        path.display()
    )))
}
