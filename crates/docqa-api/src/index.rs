//! ---
//! docqa_section: "05-networking-external-interfaces"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Chunked document store backing upload, listing and retrieval."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use docqa_authz::ActorId;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Listing entry for one uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub owner_id: ActorId,
    pub chunk_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// Retrieval unit returned by [`DocumentIndex::query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub file_name: String,
    pub text: String,
}

/// Upload payload after validation.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_name: String,
    pub owner_id: ActorId,
    pub content: String,
}

/// Result of indexing a document.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedDocument {
    pub record: DocumentRecord,
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("no documents found with file name: {0}")]
    NotFound(String),
    #[error("document '{0}' contains no text")]
    Empty(String),
    #[error("document index failure: {0}")]
    Backend(String),
}

/// Storage seam for document chunks; the in-memory implementation is the default.
pub trait DocumentIndex: Send + Sync + fmt::Debug {
    fn add_document(&self, document: NewDocument) -> Result<IndexedDocument, IndexError>;

    fn list_documents(&self) -> Result<Vec<DocumentRecord>, IndexError>;

    /// Documents uploaded under `file_name`, oldest first.
    fn find(&self, file_name: &str) -> Result<Vec<DocumentRecord>, IndexError>;

    /// Remove every chunk of `file_name`; returns the number of chunks dropped.
    fn delete_documents(&self, file_name: &str) -> Result<usize, IndexError>;

    /// Remove everything; returns the number of documents dropped.
    fn clear(&self) -> Result<usize, IndexError>;

    fn query(&self, query: &str, n_results: usize) -> Result<Vec<Chunk>, IndexError>;
}

#[derive(Debug, Clone)]
struct StoredDocument {
    record: DocumentRecord,
    chunks: Vec<Chunk>,
}

/// Process-local index that splits text into overlapping character windows
/// and ranks chunks by query term overlap.
#[derive(Debug)]
pub struct InMemoryDocumentIndex {
    chunk_size: usize,
    chunk_overlap: usize,
    documents: RwLock<Vec<StoredDocument>>,
}

impl InMemoryDocumentIndex {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            documents: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryDocumentIndex {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl DocumentIndex for InMemoryDocumentIndex {
    fn add_document(&self, document: NewDocument) -> Result<IndexedDocument, IndexError> {
        let pieces = split_text(&document.content, self.chunk_size, self.chunk_overlap);
        if pieces.is_empty() {
            return Err(IndexError::Empty(document.file_name));
        }
        let document_id = Uuid::new_v4().to_string();
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .map(|text| Chunk {
                chunk_id: Uuid::new_v4().to_string(),
                document_id: document_id.clone(),
                file_name: document.file_name.clone(),
                text,
            })
            .collect();
        let record = DocumentRecord {
            document_id,
            file_type: file_type(&document.file_name),
            file_name: document.file_name,
            owner_id: document.owner_id,
            chunk_count: chunks.len(),
            uploaded_at: Utc::now(),
        };
        let chunk_ids = chunks.iter().map(|chunk| chunk.chunk_id.clone()).collect();
        debug!(document = %record.document_id, chunks = record.chunk_count, "document indexed");
        self.documents.write().push(StoredDocument {
            record: record.clone(),
            chunks,
        });
        Ok(IndexedDocument { record, chunk_ids })
    }

    fn list_documents(&self) -> Result<Vec<DocumentRecord>, IndexError> {
        Ok(self
            .documents
            .read()
            .iter()
            .map(|stored| stored.record.clone())
            .collect())
    }

    fn find(&self, file_name: &str) -> Result<Vec<DocumentRecord>, IndexError> {
        Ok(self
            .documents
            .read()
            .iter()
            .filter(|stored| stored.record.file_name == file_name)
            .map(|stored| stored.record.clone())
            .collect())
    }

    fn delete_documents(&self, file_name: &str) -> Result<usize, IndexError> {
        let mut documents = self.documents.write();
        let removed: usize = documents
            .iter()
            .filter(|stored| stored.record.file_name == file_name)
            .map(|stored| stored.chunks.len())
            .sum();
        if removed == 0 {
            return Err(IndexError::NotFound(file_name.to_owned()));
        }
        documents.retain(|stored| stored.record.file_name != file_name);
        Ok(removed)
    }

    fn clear(&self) -> Result<usize, IndexError> {
        let mut documents = self.documents.write();
        let count = documents.len();
        documents.clear();
        Ok(count)
    }

    fn query(&self, query: &str, n_results: usize) -> Result<Vec<Chunk>, IndexError> {
        let wanted = terms(query);
        if wanted.is_empty() || n_results == 0 {
            return Ok(Vec::new());
        }
        let documents = self.documents.read();
        let mut scored: Vec<(usize, &Chunk)> = documents
            .iter()
            .flat_map(|stored| stored.chunks.iter())
            .filter_map(|chunk| {
                let score = terms(&chunk.text).intersection(&wanted).count();
                (score > 0).then_some((score, chunk))
            })
            .collect();
        // stable: equal scores keep upload order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(n_results)
            .map(|(_, chunk)| chunk.clone())
            .collect())
    }
}

/// Split `text` into windows of `size` characters, each starting `size - overlap`
/// after the previous one. Whitespace-only input yields no chunks.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn file_type(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}
