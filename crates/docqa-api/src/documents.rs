//! ---
//! docqa_section: "05-networking-external-interfaces"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Document upload, listing, deletion and question answering routes."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use docqa_authz::{Action, Resource, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::auth::CurrentActor;
use crate::error::ApiError;
use crate::index::{DocumentRecord, NewDocument};
use crate::{ApiState, MessageResponse};

pub(crate) fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route(
            "/documents",
            get(list_documents).post(upload_document).delete(clear_documents),
        )
        .route("/documents/:file_name", delete(delete_documents))
        .route("/question_answer", post(question_answer))
}

fn documents() -> Resource {
    Resource::of_type(ResourceType::Document)
}

#[derive(Debug, Serialize)]
struct DocumentList {
    message: &'static str,
    total_documents: usize,
    documents: Vec<DocumentRecord>,
}

#[derive(Debug, Deserialize)]
struct UploadRequest {
    file_name: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: &'static str,
    document_id: String,
    chunks_stored: usize,
    chunk_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionRequest {
    query: String,
}

#[derive(Debug, Serialize)]
struct SourceRef {
    document_id: String,
    file_name: String,
    chunk_id: String,
}

#[derive(Debug, Serialize)]
struct QuestionResponse {
    answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    sources: Vec<SourceRef>,
}

async fn list_documents(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<DocumentList>, ApiError> {
    state.authorize(&actor, Action::Read, &documents())?;
    let documents = state.index.list_documents()?;
    info!(count = documents.len(), "documents listed");
    Ok(Json(DocumentList {
        message: "Documents retrieved successfully",
        total_documents: documents.len(),
        documents,
    }))
}

async fn upload_document(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    state.authorize(&actor, Action::Write, &documents())?;

    let file_name = request.file_name.trim();
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let allowed = &state.documents.allowed_extensions;
    if !allowed.iter().any(|ext| ext.eq_ignore_ascii_case(&extension)) {
        return Err(ApiError::bad_request(format!(
            "File must be one of: {}",
            allowed.join(", ")
        )));
    }
    if request.content.len() > state.documents.max_document_bytes {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "document exceeds {} bytes",
                state.documents.max_document_bytes
            ),
        ));
    }

    let indexed = state.index.add_document(NewDocument {
        file_name: file_name.to_owned(),
        owner_id: actor.id.clone(),
        content: request.content,
    })?;
    info!(
        document = %indexed.record.document_id,
        chunks = indexed.chunk_ids.len(),
        "document processed"
    );
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Document processed successfully",
            document_id: indexed.record.document_id,
            chunks_stored: indexed.chunk_ids.len(),
            chunk_ids: indexed.chunk_ids,
        }),
    ))
}

async fn delete_documents(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Path(file_name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let matches = state.index.find(&file_name)?;
    // Ownership is not an allow path for documents; the instance only labels the audit trail.
    let resource = match matches.first() {
        Some(record) => Resource::instance(ResourceType::Document, record.owner_id.clone()),
        None => documents(),
    };
    state.authorize(&actor, Action::Delete, &resource)?;
    let chunks = state.index.delete_documents(&file_name)?;
    state.record(
        &actor,
        "document.delete",
        json!({ "file_name": file_name, "chunks": chunks }),
    );
    Ok(MessageResponse::new("Documents deleted successfully"))
}

async fn clear_documents(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<MessageResponse>, ApiError> {
    state.authorize(&actor, Action::Delete, &documents())?;
    let removed = state.index.clear()?;
    state.record(&actor, "document.clear", json!({ "documents": removed }));
    Ok(MessageResponse::new("Collection cleared successfully"))
}

async fn question_answer(
    State(state): State<Arc<ApiState>>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<QuestionResponse>, ApiError> {
    state.authorize(&actor, Action::Read, &documents())?;
    let Some(backend) = state.answers.clone() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "answer backend unavailable",
        ));
    };
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("query cannot be empty"));
    }

    let context = state.index.query(query, state.documents.query_results)?;
    if context.is_empty() {
        return Err(ApiError::not_found("no documents matched the query"));
    }
    let answer = backend.answer(query, &context).await.map_err(|err| {
        error!(error = %err, "answer generation failed");
        ApiError::internal(format!("Error generating answer: {err}"))
    })?;

    Ok(Json(QuestionResponse {
        answer: answer.answer,
        model: answer.model,
        sources: context
            .into_iter()
            .map(|chunk| SourceRef {
                document_id: chunk.document_id,
                file_name: chunk.file_name,
                chunk_id: chunk.chunk_id,
            })
            .collect(),
    }))
}
