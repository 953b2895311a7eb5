//! Request and response types for the RAG service

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model label reported for answers produced by the RAG service
pub const RAG_MODEL: &str = "gemini-2.5-flash-rag";

/// Model label reported for degraded answers
pub const FALLBACK_MODEL: &str = "fallback";

/// Chat message from a parent, with conversation context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User message
    pub message: String,
    /// Authenticated user id
    pub user_id: String,
    /// Previous turns, forwarded verbatim
    #[serde(default)]
    pub conversation_history: Vec<Value>,
    /// Free-form user context (child profile, current procedure, ...)
    #[serde(default)]
    pub user_context: Option<Value>,
}

/// Body of `POST /api/chat/send`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagRequest {
    /// Prompt
    pub message: String,
    /// User id
    pub user_id: String,
    /// Previous turns
    pub conversation_history: Vec<Value>,
    /// User context, `{}` when absent
    pub user_context: Value,
}

impl From<&ChatRequest> for RagRequest {
    fn from(request: &ChatRequest) -> Self {
        Self {
            message: request.message.clone(),
            user_id: request.user_id.clone(),
            conversation_history: request.conversation_history.clone(),
            user_context: request
                .user_context
                .clone()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        }
    }
}

/// Answer returned by the RAG service
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RagResponse {
    /// Generated answer
    pub answer: Option<String>,
    /// Older field name for the answer
    pub response: Option<String>,
    /// Conversation id assigned by the service
    pub conversation_id: Option<String>,
    /// Server-side processing time in seconds
    pub processing_time: Option<f64>,
    /// Tokens consumed, when reported
    pub tokens_used: Option<u64>,
    /// Retrieved sources
    pub sources: Vec<Value>,
}

impl RagResponse {
    /// Answer text, whichever field carries it
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.answer
            .as_deref()
            .or(self.response.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Reply handed back to the chat feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    /// Answer shown to the user
    pub content: String,
    /// Conversation id
    pub conversation_id: String,
    /// Tokens consumed
    pub tokens: u64,
    /// Model label, [`FALLBACK_MODEL`] when degraded
    pub model: String,
    /// Retrieved sources
    pub sources: Vec<Value>,
    /// Server-side processing time in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

impl ChatReply {
    /// Whether this reply was produced without the RAG service
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.model == FALLBACK_MODEL
    }
}

/// Kind of document submitted for analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Medical report or certificate
    Medical,
    /// Administrative letter
    Administrative,
    /// MDPH file (disability office)
    Mdph,
    /// Anything else
    #[default]
    Other,
}

impl DocumentType {
    /// Lowercase label used in prompts and on the wire
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Medical => "medical",
            Self::Administrative => "administrative",
            Self::Mdph => "mdph",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medical" => Ok(Self::Medical),
            "administrative" => Ok(Self::Administrative),
            "mdph" => Ok(Self::Mdph),
            "other" => Ok(Self::Other),
            other => Err(format!(
                "unknown document type '{other}' (expected medical, administrative, mdph or other)"
            )),
        }
    }
}

/// Document submitted for analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnalysisRequest {
    /// Extracted document text
    pub document: String,
    /// User id
    pub user_id: String,
    /// Document kind
    #[serde(default)]
    pub document_type: DocumentType,
}

/// Dates, amounts and references found in an analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuredData {
    /// Dates written `d/m/yyyy`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<String>,
    /// Euro amounts
    #[serde(rename = "montants", skip_serializing_if = "Vec::is_empty")]
    pub amounts: Vec<String>,
    /// File or case references
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl StructuredData {
    /// Whether nothing was extracted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() && self.amounts.is_empty() && self.references.is_empty()
    }
}

/// Structured result of a document analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentAnalysis {
    /// Short summary
    pub summary: String,
    /// Extracted fields
    pub data: StructuredData,
    /// Next steps for the family
    pub suggestions: Vec<String>,
    /// Raw analysis text
    pub full_analysis: String,
    /// Retrieved sources
    pub sources: Vec<Value>,
    /// Whether this analysis was produced without the RAG service
    pub degraded: bool,
}
