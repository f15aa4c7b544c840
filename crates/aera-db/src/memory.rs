//! In-memory implementation of every persistence trait.
//!
//! Backs the HTTP test suite and local experiments without Postgres.
//! Similarity search ranks chunk, document, and image embeddings with
//! [`cosine_similarity`], mirroring the `match_documents` SQL function.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use aera_core::{
    cosine_similarity, ChatMessage, ChatRepository, ChatSession, ChunkEmbedding,
    CreateDocumentRequest, Document, DocumentAnalysisUpdate, DocumentMetadata,
    DocumentRepository, Error, ImageEmbedding, ListDocumentsRequest, NewChatMessage,
    ObjectStorage, Result, SearchMatch, SessionRepository, SimilaritySearch, Vector,
};

use crate::storage::{sign_path, validate_object_path};

const SIGNING_SECRET: &[u8] = b"in-memory-store";

#[derive(Default)]
struct State {
    documents: HashMap<Uuid, Document>,
    chunks: HashMap<Uuid, Vec<ChunkEmbedding>>,
    images: HashMap<(Uuid, i32), ImageEmbedding>,
    sessions: HashMap<Uuid, ChatSession>,
    messages: Vec<ChatMessage>,
    tokens: HashMap<String, Uuid>,
    objects: HashMap<String, (Vec<u8>, String)>,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_similarity: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("in-memory store lock poisoned".to_string()))
    }

    /// Make subsequent `match_documents` calls fail (or succeed again).
    pub fn set_similarity_failure(&self, fail: bool) {
        self.fail_similarity.store(fail, Ordering::SeqCst);
    }

    /// Register a bearer token for `user_id`.
    pub fn insert_token(&self, token: &str, user_id: Uuid) -> Result<()> {
        self.state()?.tokens.insert(token.to_string(), user_id);
        Ok(())
    }

    /// Chunk embeddings currently stored for a document.
    pub fn chunk_embeddings(&self, document_id: Uuid) -> Result<Vec<ChunkEmbedding>> {
        Ok(self
            .state()?
            .chunks
            .get(&document_id)
            .cloned()
            .unwrap_or_default())
    }

    pub fn image_embedding(&self, document_id: Uuid, frame_index: i32) -> Result<Option<ImageEmbedding>> {
        Ok(self.state()?.images.get(&(document_id, frame_index)).cloned())
    }

    /// Whether an object exists at `path`.
    pub fn has_object(&self, path: &str) -> Result<bool> {
        Ok(self.state()?.objects.contains_key(path))
    }
}

#[async_trait]
impl DocumentRepository for InMemoryStore {
    async fn insert(&self, req: CreateDocumentRequest) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let doc = Document {
            id,
            user_id: req.user_id,
            workspace_id: req.workspace_id,
            title: req.title,
            mime_type: req.mime_type,
            storage_path: req.storage_path,
            size_bytes: req.size_bytes,
            description: req.description,
            subject: req.subject,
            topic: req.topic,
            tags: Vec::new(),
            ai_summary: None,
            detailed_analysis: None,
            searchable_text: None,
            analysis_model: None,
            embedding: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state()?.documents.insert(id, doc);
        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Document> {
        self.state()?
            .documents
            .get(&id)
            .cloned()
            .ok_or(Error::DocumentNotFound(id))
    }

    async fn find_by_storage_path(&self, storage_path: &str) -> Result<Option<Document>> {
        Ok(self
            .state()?
            .documents
            .values()
            .find(|doc| doc.storage_path == storage_path)
            .cloned())
    }

    async fn list(&self, req: ListDocumentsRequest) -> Result<Vec<Document>> {
        let state = self.state()?;
        let mut docs: Vec<Document> = state
            .documents
            .values()
            .filter(|d| d.user_id == req.user_id)
            .filter(|d| req.workspace_id.map_or(true, |w| d.workspace_id == Some(w)))
            .filter(|d| req.kind.map_or(true, |k| d.kind() == k))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        docs.truncate(req.limit.unwrap_or(100).clamp(1, 1000) as usize);
        Ok(docs)
    }

    async fn apply_analysis(&self, id: Uuid, update: DocumentAnalysisUpdate) -> Result<()> {
        let mut state = self.state()?;
        let doc = state
            .documents
            .get_mut(&id)
            .ok_or(Error::DocumentNotFound(id))?;

        if let Some(v) = update.embedding {
            doc.embedding = Some(v);
        }
        if let Some(v) = update.description {
            doc.description = Some(v);
        }
        if let Some(v) = update.tags {
            doc.tags = v;
        }
        if let Some(v) = update.ai_summary {
            doc.ai_summary = Some(v);
        }
        if let Some(v) = update.detailed_analysis {
            doc.detailed_analysis = Some(v);
        }
        if let Some(v) = update.searchable_text {
            doc.searchable_text = Some(v);
        }
        if let Some(v) = update.analysis_model {
            doc.analysis_model = Some(v);
        }
        doc.processed_at = Some(update.processed_at);
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_chunk_embeddings(
        &self,
        document_id: Uuid,
        chunks: Vec<ChunkEmbedding>,
        _model: &str,
    ) -> Result<()> {
        let mut state = self.state()?;
        if !state.documents.contains_key(&document_id) {
            return Err(Error::DocumentNotFound(document_id));
        }
        state.chunks.insert(document_id, chunks);
        Ok(())
    }

    async fn upsert_image_embedding(&self, embedding: ImageEmbedding) -> Result<()> {
        let mut state = self.state()?;
        if !state.documents.contains_key(&embedding.document_id) {
            return Err(Error::DocumentNotFound(embedding.document_id));
        }
        state
            .images
            .insert((embedding.document_id, embedding.frame_index), embedding);
        Ok(())
    }

    async fn search_titles(
        &self,
        user_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let needle = query.to_lowercase();
        let state = self.state()?;
        let mut docs: Vec<Document> = state
            .documents
            .values()
            .filter(|d| d.user_id == user_id && d.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs.truncate(limit.max(0) as usize);
        Ok(docs)
    }

    async fn fetch_metadata(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, DocumentMetadata>> {
        let state = self.state()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.documents.get(id))
            .map(|d| {
                (
                    d.id,
                    DocumentMetadata {
                        id: d.id,
                        workspace_id: d.workspace_id,
                        title: d.title.clone(),
                        subject: d.subject.clone(),
                        topic: d.topic.clone(),
                        created_at: d.created_at,
                    },
                )
            })
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut state = self.state()?;
        state
            .documents
            .remove(&id)
            .ok_or(Error::DocumentNotFound(id))?;
        state.chunks.remove(&id);
        state.images.retain(|(doc_id, _), _| *doc_id != id);
        Ok(())
    }
}

#[async_trait]
impl SimilaritySearch for InMemoryStore {
    async fn match_documents(
        &self,
        query_embedding: &Vector,
        match_count: i64,
        user_id: Uuid,
    ) -> Result<Vec<SearchMatch>> {
        if self.fail_similarity.load(Ordering::SeqCst) {
            return Err(Error::Search("match_documents unavailable".to_string()));
        }

        let query = query_embedding.as_slice();
        let state = self.state()?;
        let mut matches = Vec::new();

        // Vectors of a different width are skipped, as pgvector would reject them.
        let mut push = |document_id: Uuid, content: &str, embedding: &Vector| {
            if let Ok(similarity) = cosine_similarity(query, embedding.as_slice()) {
                matches.push(SearchMatch {
                    document_id,
                    content: content.to_string(),
                    similarity,
                });
            }
        };

        for doc in state.documents.values().filter(|d| d.user_id == user_id) {
            if let Some(embedding) = &doc.embedding {
                let content = doc
                    .searchable_text
                    .as_deref()
                    .or(doc.description.as_deref())
                    .unwrap_or(&doc.title);
                push(doc.id, content, embedding);
            }
            for chunk in state.chunks.get(&doc.id).into_iter().flatten() {
                push(doc.id, &chunk.content, &chunk.embedding);
            }
        }
        for image in state.images.values() {
            let owned = state
                .documents
                .get(&image.document_id)
                .is_some_and(|d| d.user_id == user_id);
            if owned {
                push(image.document_id, &image.description, &image.embedding);
            }
        }

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(match_count.max(0) as usize);
        Ok(matches)
    }
}

#[async_trait]
impl ChatRepository for InMemoryStore {
    async fn create_session(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
        title: &str,
    ) -> Result<ChatSession> {
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::now_v7(),
            user_id,
            workspace_id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.state()?.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<ChatSession>> {
        Ok(self.state()?.sessions.get(&id).cloned())
    }

    async fn list_sessions(
        &self,
        user_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<ChatSession>> {
        let state = self.state()?;
        let mut sessions: Vec<ChatSession> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| workspace_id.map_or(true, |w| s.workspace_id == w))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        let mut state = self.state()?;
        state
            .sessions
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("Chat session {}", id)))?;
        state.messages.retain(|m| m.session_id != id);
        Ok(())
    }

    async fn append_message(&self, message: NewChatMessage) -> Result<ChatMessage> {
        let mut state = self.state()?;
        let now = Utc::now();
        let session = state
            .sessions
            .get_mut(&message.session_id)
            .ok_or_else(|| Error::NotFound(format!("Chat session {}", message.session_id)))?;
        session.updated_at = now;

        let record = ChatMessage {
            id: Uuid::now_v7(),
            session_id: message.session_id,
            role: message.role,
            content: message.content,
            context_document_ids: message.context_document_ids,
            created_at: now,
        };
        state.messages.push(record.clone());
        Ok(record)
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>> {
        Ok(self
            .state()?
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn resolve_token(&self, token: &str) -> Result<Option<Uuid>> {
        Ok(self.state()?.tokens.get(token).copied())
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStore {
    async fn upload(&self, path: &str, data: &[u8], content_type: &str) -> Result<()> {
        validate_object_path(path)?;
        self.state()?
            .objects
            .insert(path.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        self.state()?
            .objects
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| Error::NotFound(format!("Object {}", path)))
    }

    async fn create_signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String> {
        validate_object_path(path)?;
        if !self.state()?.objects.contains_key(path) {
            return Err(Error::NotFound(format!("Object {}", path)));
        }
        let expires = Utc::now().timestamp() + expires_in_secs as i64;
        let signature = sign_path(SIGNING_SECRET, path, expires)?;
        Ok(format!(
            "/api/storage/{}?expires={}&signature={}",
            path, expires, signature
        ))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.state()?
            .objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Object {}", path)))
    }

    async fn remove_many(&self, paths: &[String]) -> Result<()> {
        let mut state = self.state()?;
        for path in paths {
            state.objects.remove(path);
        }
        Ok(())
    }

    fn verify_signature(&self, path: &str, expires: i64, signature: &str) -> bool {
        expires >= Utc::now().timestamp()
            && sign_path(SIGNING_SECRET, path, expires).is_ok_and(|expected| expected == signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aera_core::{ChatRole, DocumentKind};

    fn create_req(user_id: Uuid, title: &str, mime: &str) -> CreateDocumentRequest {
        CreateDocumentRequest {
            user_id,
            workspace_id: None,
            title: title.to_string(),
            mime_type: mime.to_string(),
            storage_path: format!("{}/{}", user_id, title),
            size_bytes: 10,
            description: None,
            subject: None,
            topic: None,
        }
    }

    #[tokio::test]
    async fn test_apply_analysis_only_touches_written_fields() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let id = store.insert(create_req(user, "Report", "text/plain")).await.unwrap();

        let mut update = DocumentAnalysisUpdate::processed_now();
        update.tags = Some(vec!["finance".into()]);
        store.apply_analysis(id, update).await.unwrap();

        let mut update = DocumentAnalysisUpdate::processed_now();
        update.ai_summary = Some("Summary".into());
        store.apply_analysis(id, update).await.unwrap();

        let doc = store.fetch(id).await.unwrap();
        assert_eq!(doc.tags, vec!["finance"]);
        assert_eq!(doc.ai_summary.as_deref(), Some("Summary"));
        assert!(doc.processed_at.is_some());
        assert!(doc.embedding.is_none());
    }

    #[tokio::test]
    async fn test_find_by_storage_path() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let id = store.insert(create_req(user, "photo", "image/webp")).await.unwrap();

        let doc = store
            .find_by_storage_path(&format!("{}/photo", user))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.mime_type, "image/webp");
        assert!(store.find_by_storage_path("nobody/photo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_analysis_missing_document() {
        let store = InMemoryStore::new();
        let err = store
            .apply_analysis(Uuid::new_v4(), DocumentAnalysisUpdate::processed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_match_documents_ranks_and_scopes_by_user() {
        let store = InMemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let near = store.insert(create_req(alice, "near", "text/plain")).await.unwrap();
        let far = store.insert(create_req(alice, "far", "text/plain")).await.unwrap();
        let other = store.insert(create_req(bob, "bob", "text/plain")).await.unwrap();

        for (id, v) in [(near, vec![1.0, 0.1]), (far, vec![0.0, 1.0]), (other, vec![1.0, 0.0])] {
            let mut update = DocumentAnalysisUpdate::processed_now();
            update.embedding = Some(Vector::from(v));
            store.apply_analysis(id, update).await.unwrap();
        }

        let matches = store
            .match_documents(&Vector::from(vec![1.0, 0.0]), 5, alice)
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].document_id, near);
        assert_eq!(matches[1].document_id, far);
        assert!(matches[0].similarity > matches[1].similarity);
    }

    #[tokio::test]
    async fn test_match_documents_includes_chunks_and_images() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let text = store.insert(create_req(user, "notes", "text/plain")).await.unwrap();
        let image = store.insert(create_req(user, "photo", "image/png")).await.unwrap();

        store
            .replace_chunk_embeddings(
                text,
                vec![ChunkEmbedding {
                    chunk_index: 0,
                    content: "chunk zero".into(),
                    embedding: Vector::from(vec![0.0, 1.0]),
                }],
                "m",
            )
            .await
            .unwrap();
        store
            .upsert_image_embedding(ImageEmbedding {
                document_id: image,
                frame_index: 0,
                embedding: Vector::from(vec![1.0, 0.0]),
                description: "a red bicycle".into(),
                model: "m".into(),
            })
            .await
            .unwrap();

        let matches = store
            .match_documents(&Vector::from(vec![1.0, 0.0]), 10, user)
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].content, "a red bicycle");
        assert_eq!(matches[1].content, "chunk zero");
    }

    #[tokio::test]
    async fn test_similarity_failure_toggle() {
        let store = InMemoryStore::new();
        store.set_similarity_failure(true);
        let result = store
            .match_documents(&Vector::from(vec![1.0]), 5, Uuid::new_v4())
            .await;
        assert!(result.is_err());

        store.set_similarity_failure(false);
        assert!(store
            .match_documents(&Vector::from(vec![1.0]), 5, Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_search_titles_case_insensitive() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store.insert(create_req(user, "Quarterly Report", "text/plain")).await.unwrap();
        store.insert(create_req(user, "Holiday photo", "image/jpeg")).await.unwrap();

        let hits = store.search_titles(user, "REPORT", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Quarterly Report");
    }

    #[tokio::test]
    async fn test_list_filters_by_kind() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store.insert(create_req(user, "a", "image/png")).await.unwrap();
        store.insert(create_req(user, "b", "text/plain")).await.unwrap();

        let images = store
            .list(ListDocumentsRequest {
                user_id: user,
                kind: Some(DocumentKind::Image),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].title, "a");
    }

    #[tokio::test]
    async fn test_delete_cascades_embeddings() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let id = store.insert(create_req(user, "x", "image/png")).await.unwrap();
        store
            .upsert_image_embedding(ImageEmbedding {
                document_id: id,
                frame_index: 0,
                embedding: Vector::from(vec![1.0]),
                description: "d".into(),
                model: "m".into(),
            })
            .await
            .unwrap();

        store.delete(id).await.unwrap();
        assert!(store.image_embedding(id, 0).unwrap().is_none());
        assert!(matches!(
            store.fetch(id).await.unwrap_err(),
            Error::DocumentNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_chat_session_lifecycle() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let ws = Uuid::new_v4();
        let session = store.create_session(user, ws, "Q3").await.unwrap();

        store
            .append_message(NewChatMessage {
                session_id: session.id,
                role: ChatRole::User,
                content: "hi".into(),
                context_document_ids: vec![],
            })
            .await
            .unwrap();
        store
            .append_message(NewChatMessage {
                session_id: session.id,
                role: ChatRole::Assistant,
                content: "hello".into(),
                context_document_ids: vec![Uuid::nil()],
            })
            .await
            .unwrap();

        let messages = store.list_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].context_document_ids, vec![Uuid::nil()]);

        assert_eq!(store.list_sessions(user, Some(ws)).await.unwrap().len(), 1);
        store.delete_session(session.id).await.unwrap();
        assert!(store.list_messages(session.id).await.unwrap().is_empty());
        assert!(store.get_session(session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tokens_resolve() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_token("secret", user).unwrap();
        assert_eq!(store.resolve_token("secret").await.unwrap(), Some(user));
        assert_eq!(store.resolve_token("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_object_storage_round_trip() {
        let store = InMemoryStore::new();
        store.upload("u/a.txt", b"abc", "text/plain").await.unwrap();
        assert_eq!(store.download("u/a.txt").await.unwrap(), b"abc");
        let url = store.create_signed_url("u/a.txt", 60).await.unwrap();
        assert!(url.starts_with("/api/storage/u/a.txt?expires="));
        store.remove_many(&["u/a.txt".to_string()]).await.unwrap();
        assert!(!store.has_object("u/a.txt").unwrap());
    }
}
