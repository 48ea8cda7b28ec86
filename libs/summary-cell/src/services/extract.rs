use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::error::SummaryError;
use crate::models::AppointmentDocument;

pub const MISSING_FILE_PLACEHOLDER: &str = "Document file not found.";
pub const IMAGE_PLACEHOLDER: &str = "Image document - text extraction not yet implemented.";
pub const UNSUPPORTED_PLACEHOLDER: &str = "Unsupported file type.";

/// Turns a stored document into prompt text. Upload plumbing is external;
/// the pipeline only needs the extracted content.
#[async_trait]
pub trait DocumentTextExtractor: Send + Sync {
    async fn extract(&self, document: &AppointmentDocument) -> Result<String, SummaryError>;
}

/// Reads uploaded files from local storage. Plain-text files are used as-is;
/// images report a placeholder until an OCR service is wired in, and other
/// formats are declared unsupported. Placeholders are returned as content so
/// the caller can persist them as the document's summary, matching how a
/// missing file leaves the document usable instead of failing the cascade.
pub struct FileTextExtractor {
    storage_root: PathBuf,
}

impl FileTextExtractor {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }
}

#[async_trait]
impl DocumentTextExtractor for FileTextExtractor {
    async fn extract(&self, document: &AppointmentDocument) -> Result<String, SummaryError> {
        let full_path = self.storage_root.join(&document.file_path);

        if !full_path.exists() {
            error!("Document file not found: {}", full_path.display());
            return Ok(MISSING_FILE_PLACEHOLDER.to_string());
        }

        let extension = full_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "txt" | "text" | "md" => {
                let text = tokio::fs::read_to_string(&full_path)
                    .await
                    .map_err(|e| SummaryError::Storage(format!("{}: {}", full_path.display(), e)))?;
                Ok(text.trim().to_string())
            }
            "jpg" | "jpeg" | "png" => {
                warn!("Image OCR not yet implemented: {}", full_path.display());
                Ok(IMAGE_PLACEHOLDER.to_string())
            }
            _ => Ok(UNSUPPORTED_PLACEHOLDER.to_string()),
        }
    }
}
