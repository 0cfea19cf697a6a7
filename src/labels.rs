//! Stored-procedure results carrying label documents.
//!
//! The backend wraps every procedure result in an envelope:
//!
//! ```json
//! { "success": true, "data": [ { "result": "{\"pdfs\":[{\"pdf_base64\":\"...\"}],\"udm_count\":3}" } ] }
//! ```
//!
//! where `result` is itself a JSON document encoded as a string. Only the
//! first PDF of a print result is delivered, unmodified, under a filename
//! derived from the unit count.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::delivery::{DeliveryError, DeliveryRequest};

/// Error reading a stored-procedure response.
#[derive(Debug, Error)]
pub enum LabelsError {
    /// The response is not valid JSON of the expected shape.
    #[error("malformed procedure response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The backend reported failure.
    #[error("procedure failed: {0}")]
    Failed(String),

    /// The response has no result row.
    #[error("procedure response has no result")]
    MissingResult,
}

/// Envelope returned by the stored-procedure endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcedureResponse {
    /// Whether the call succeeded.
    #[serde(default)]
    pub success: bool,
    /// Result rows.
    #[serde(default)]
    pub data: Vec<ProcedureRow>,
    /// Error message from the backend, if any.
    #[serde(default)]
    pub error: Option<String>,
}

/// One result row; `result` holds JSON text.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcedureRow {
    /// JSON-encoded procedure result.
    #[serde(default)]
    pub result: Option<String>,
}

impl ProcedureResponse {
    /// Parse the first row's result as `T`.
    pub fn first_result<T: DeserializeOwned>(&self) -> Result<T, LabelsError> {
        if !self.success {
            return Err(LabelsError::Failed(
                self.error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let text = self
            .data
            .first()
            .and_then(|row| row.result.as_deref())
            .ok_or(LabelsError::MissingResult)?;
        Ok(serde_json::from_str(text)?)
    }
}

/// A label document as returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PdfDocument {
    /// Base64-encoded PDF.
    pub pdf_base64: String,
}

/// Result of the label printing procedure.
#[derive(Debug, Clone, Deserialize)]
pub struct PrintResult {
    /// Generated documents, first one is delivered.
    #[serde(default)]
    pub pdfs: Vec<PdfDocument>,
    /// Number of unit labels in the documents.
    #[serde(default)]
    pub udm_count: u32,
}

impl PrintResult {
    /// Parse either a full procedure envelope or a bare print result.
    pub fn from_json(text: &str) -> Result<Self, LabelsError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("data").is_some() || value.get("success").is_some() {
            let envelope: ProcedureResponse = serde_json::from_value(value)?;
            envelope.first_result()
        } else {
            Ok(serde_json::from_value(value)?)
        }
    }

    /// Filename the labels are delivered under.
    #[must_use]
    pub fn label_filename(&self) -> String {
        label_filename(self.udm_count)
    }

    /// Request delivering the first document.
    pub fn into_delivery_request(self) -> Result<DeliveryRequest, DeliveryError> {
        let filename = self.label_filename();
        let document = self
            .pdfs
            .into_iter()
            .next()
            .ok_or(DeliveryError::NoDocuments)?;
        Ok(DeliveryRequest::new(document.pdf_base64, filename))
    }
}

/// `Etichette_UDM_<count>_pezzi.pdf`
#[must_use]
pub fn label_filename(udm_count: u32) -> String {
    format!("Etichette_UDM_{udm_count}_pezzi.pdf")
}
