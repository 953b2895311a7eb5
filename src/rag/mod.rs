//! Client for the PhoenixCare RAG/AI service
//!
//! Chat answers and document analyses both go through
//! `POST {base_url}/api/chat/send`. Both features share one circuit breaker:
//! they hit the same backend, so failures seen by one degrade the other.
//! Neither feature ever surfaces an error to its caller; when the service is
//! unreachable a pre-written degraded answer is returned instead.

pub mod analysis;
mod types;

pub use types::{
    ChatReply, ChatRequest, DocumentAnalysis, DocumentAnalysisRequest, DocumentType,
    FALLBACK_MODEL, RAG_MODEL, RagRequest, RagResponse, StructuredData,
};

use serde_json::json;
use tracing::{debug, error, instrument};

use crate::config::Config;
use crate::failsafe::{CircuitBreakerRegistry, Failsafe, predicates};
use crate::{Error, Result};

/// Answer shown when the assistant cannot reach the RAG service
pub const CHAT_FALLBACK_MESSAGE: &str = "Je rencontre une difficulté technique en ce moment. \
Je suis là pour vous aider - pouvez-vous reformuler votre question dans quelques instants ? \
En attendant, n'hésitez pas à consulter nos ressources d'aide d'urgence.";

const CHAT_PATH: &str = "/api/chat/send";

/// RAG service client with retries and a shared circuit breaker
#[derive(Debug, Clone)]
pub struct RagClient {
    http: reqwest::Client,
    endpoint: String,
    failsafe: Failsafe,
}

impl RagClient {
    /// Build a client; the breaker is taken from (or created in) `registry`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, registry: &CircuitBreakerRegistry) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.rag.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}{CHAT_PATH}", config.rag.base_url.trim_end_matches('/')),
            failsafe: Failsafe::new(registry, &config.rag.breaker_name, &config.failsafe),
        })
    }

    /// Failsafe guarding the service
    #[must_use]
    pub fn failsafe(&self) -> &Failsafe {
        &self.failsafe
    }

    /// Full URL of the chat endpoint
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One attempt against the service, without retries or breaker
    ///
    /// # Errors
    ///
    /// `Error::Status` for non-2xx answers, `Error::Http` for transport and
    /// decoding failures, `Error::Protocol` when the body has no answer.
    pub async fn send(&self, request: &RagRequest) -> Result<RagResponse> {
        debug!(endpoint = %self.endpoint, user_id = %request.user_id, "Sending RAG request");

        let response = self.http.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status"),
            ));
        }

        let body: RagResponse = response.json().await?;
        if body.text().is_none() {
            return Err(Error::Protocol("RAG response carries no answer".into()));
        }
        Ok(body)
    }

    /// Empathetic answer to a parent's message
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    pub async fn generate_response(&self, request: &ChatRequest) -> ChatReply {
        let rag_request = RagRequest::from(request);
        let user_id = request.user_id.as_str();

        self.failsafe
            .call_with_fallback(
                predicates::standard,
                || async {
                    let response = self.send(&rag_request).await?;
                    Ok::<_, Error>(chat_reply(response, user_id))
                },
                || async { Ok(fallback_reply(user_id)) },
            )
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "RAG chat failed without fallback");
                fallback_reply(user_id)
            })
    }

    /// Analyze a document and extract summary, data and suggestions
    #[instrument(skip_all, fields(user_id = %request.user_id, document_type = %request.document_type))]
    pub async fn analyze_document(&self, request: &DocumentAnalysisRequest) -> DocumentAnalysis {
        let rag_request = RagRequest {
            message: format!(
                "Analyse ce document de type {} et extrait les informations importantes:\n\n{}",
                request.document_type, request.document
            ),
            user_id: request.user_id.clone(),
            conversation_history: Vec::new(),
            user_context: json!({ "document_type": request.document_type }),
        };

        self.failsafe
            .call_with_fallback(
                predicates::standard,
                || async {
                    let response = self.send(&rag_request).await?;
                    Ok::<_, Error>(document_analysis(response))
                },
                || async { Ok(fallback_analysis()) },
            )
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "RAG analysis failed without fallback");
                fallback_analysis()
            })
    }
}

fn conversation_id(user_id: &str) -> String {
    format!("conv_{user_id}_{}", chrono::Utc::now().timestamp_millis())
}

fn chat_reply(response: RagResponse, user_id: &str) -> ChatReply {
    ChatReply {
        content: response.text().unwrap_or_default().to_string(),
        conversation_id: response
            .conversation_id
            .clone()
            .unwrap_or_else(|| conversation_id(user_id)),
        tokens: response.tokens_used.unwrap_or(0),
        model: RAG_MODEL.to_string(),
        sources: response.sources,
        processing_time: response.processing_time,
    }
}

fn fallback_reply(user_id: &str) -> ChatReply {
    ChatReply {
        content: CHAT_FALLBACK_MESSAGE.to_string(),
        conversation_id: conversation_id(user_id),
        tokens: 0,
        model: FALLBACK_MODEL.to_string(),
        sources: Vec::new(),
        processing_time: None,
    }
}

fn document_analysis(response: RagResponse) -> DocumentAnalysis {
    let text = response.text().unwrap_or_default().to_string();
    DocumentAnalysis {
        summary: analysis::extract_summary(&text),
        data: analysis::extract_structured_data(&text),
        suggestions: analysis::extract_suggestions(&text),
        full_analysis: text,
        sources: response.sources,
        degraded: false,
    }
}

fn fallback_analysis() -> DocumentAnalysis {
    DocumentAnalysis {
        summary: "Erreur lors de l'analyse du document".to_string(),
        data: StructuredData::default(),
        suggestions: vec!["Vérifiez le format du document et réessayez".to_string()],
        full_analysis: "Analyse indisponible via RAG".to_string(),
        sources: Vec::new(),
        degraded: true,
    }
}
