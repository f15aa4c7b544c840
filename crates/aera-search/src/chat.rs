//! Chat over documents: retrieve, assemble context, answer.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use aera_core::{
    defaults, ChatRepository, ChatRole, DegradationReason, Error, NewChatMessage, Result,
    SearchType,
};

use crate::answer::AnswerSynthesizer;
use crate::context::assemble_context;
use crate::retriever::Retriever;

/// A document whose passage was placed in the prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextReference {
    pub document_id: Uuid,
    pub title: Option<String>,
    pub similarity: Option<f32>,
}

/// Answer to a chat question.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(rename = "contextUsed")]
    pub context_used: Vec<ContextReference>,
    /// Absent when retrieval failed outright.
    pub search_type: Option<SearchType>,
    pub degraded: bool,
    pub reason: Option<DegradationReason>,
}

/// Orchestrates retrieval and answer synthesis for one question.
#[derive(Clone)]
pub struct ChatService {
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    chat: Arc<dyn ChatRepository>,
    match_count: i64,
}

impl ChatService {
    pub fn new(
        retriever: Retriever,
        synthesizer: AnswerSynthesizer,
        chat: Arc<dyn ChatRepository>,
    ) -> Self {
        Self {
            retriever,
            synthesizer,
            chat,
            match_count: defaults::CHAT_MATCH_COUNT,
        }
    }

    /// Answer `question` for `user_id`, optionally scoped to a workspace.
    ///
    /// Retrieval failures degrade to an answer without context; generation
    /// failures propagate.
    #[instrument(skip_all, fields(
        subsystem = "search",
        component = "chat",
        op = "ask",
        user_id = %user_id,
    ))]
    pub async fn ask(
        &self,
        user_id: Uuid,
        question: &str,
        workspace_id: Option<Uuid>,
    ) -> Result<ChatAnswer> {
        let start = Instant::now();
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("Question must not be empty".to_string()));
        }

        // match_documents is user-wide; widen the net before narrowing to a workspace.
        let fetch_count = if workspace_id.is_some() {
            defaults::SEARCH_LIMIT_MAX.max(self.match_count)
        } else {
            self.match_count
        };

        let (context_used, snippets, search_type, reason) =
            match self.retriever.search(user_id, question, fetch_count).await {
                Ok(mut outcome) => {
                    if let Some(ws) = workspace_id {
                        outcome.restrict_to_workspace(ws, self.match_count as usize);
                    }
                    let mut refs: Vec<ContextReference> = Vec::new();
                    for result in &outcome.results {
                        if !refs.iter().any(|r| r.document_id == result.document_id) {
                            refs.push(ContextReference {
                                document_id: result.document_id,
                                title: result.title.clone(),
                                similarity: result.similarity,
                            });
                        }
                    }
                    let snippets: Vec<String> =
                        outcome.snippets().into_iter().map(str::to_string).collect();
                    (refs, snippets, Some(outcome.search_type), outcome.reason())
                }
                Err(e) => {
                    warn!(error = %e, "Retrieval failed, answering without context");
                    (
                        Vec::new(),
                        Vec::new(),
                        None,
                        Some(DegradationReason::RetrievalFailed),
                    )
                }
            };

        let context = assemble_context(&snippets);
        let answer = self.synthesizer.answer(question, &context).await?;

        info!(
            context_docs = context_used.len(),
            context_len = context.len(),
            degraded = reason.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat answer produced"
        );

        Ok(ChatAnswer {
            answer,
            context_used,
            search_type,
            degraded: reason.is_some(),
            reason,
        })
    }

    /// Answer inside a persisted session, recording both turns.
    ///
    /// The session must belong to `user_id`; its workspace scopes retrieval.
    pub async fn ask_in_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        question: &str,
    ) -> Result<ChatAnswer> {
        let session = self
            .chat
            .get_session(session_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| Error::NotFound(format!("Chat session {} not found", session_id)))?;

        if question.trim().is_empty() {
            return Err(Error::InvalidInput("Question must not be empty".to_string()));
        }

        self.chat
            .append_message(NewChatMessage {
                session_id,
                role: ChatRole::User,
                content: question.trim().to_string(),
                context_document_ids: Vec::new(),
            })
            .await?;

        let answer = self
            .ask(user_id, question, Some(session.workspace_id))
            .await?;

        self.chat
            .append_message(NewChatMessage {
                session_id,
                role: ChatRole::Assistant,
                content: answer.answer.clone(),
                context_document_ids: answer.context_used.iter().map(|r| r.document_id).collect(),
            })
            .await?;

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aera_core::{CreateDocumentRequest, DocumentAnalysisUpdate, DocumentRepository};
    use aera_db::InMemoryStore;
    use aera_inference::embed_query;
    use aera_inference::mock::MockInferenceBackend;

    fn service(store: &Arc<InMemoryStore>, backend: &Arc<MockInferenceBackend>) -> ChatService {
        let retriever = Retriever::new(backend.clone(), store.clone(), store.clone());
        ChatService::new(retriever, AnswerSynthesizer::new(backend.clone()), store.clone())
    }

    async fn indexed_doc(
        store: &InMemoryStore,
        backend: &MockInferenceBackend,
        user: Uuid,
        workspace: Uuid,
        title: &str,
        body: &str,
    ) -> Uuid {
        let id = store
            .insert(CreateDocumentRequest {
                user_id: user,
                workspace_id: Some(workspace),
                title: title.to_string(),
                mime_type: "text/plain".to_string(),
                storage_path: format!("{}/{}", user, Uuid::new_v4()),
                size_bytes: body.len() as i64,
                description: Some(body.to_string()),
                subject: None,
                topic: None,
            })
            .await
            .unwrap();
        let mut update = DocumentAnalysisUpdate::processed_now();
        update.embedding = Some(embed_query(backend, body).await.unwrap());
        store.apply_analysis(id, update).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_answer_without_documents() {
        let store = Arc::new(InMemoryStore::new());
        let backend = Arc::new(MockInferenceBackend::new().with_fixed_response("No idea."));
        let answer = service(&store, &backend)
            .ask(Uuid::new_v4(), "What quarter?", None)
            .await
            .unwrap();

        assert_eq!(answer.answer, "No idea.");
        assert!(answer.context_used.is_empty());
        assert_eq!(answer.search_type, Some(SearchType::Semantic));
        assert!(!answer.degraded);

        let calls = backend.get_calls();
        let prompt = &calls.last().unwrap().input;
        assert!(prompt.contains(defaults::NO_CONTEXT_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_answer_references_retrieved_documents() {
        let store = Arc::new(InMemoryStore::new());
        let backend = Arc::new(MockInferenceBackend::new().with_fixed_response("Q3."));
        let user = Uuid::new_v4();
        let workspace = Uuid::new_v4();
        let id = indexed_doc(&store, &backend, user, workspace, "Quarterly Report", "Q3 financial results").await;

        let answer = service(&store, &backend)
            .ask(user, "What quarter does this cover?", Some(workspace))
            .await
            .unwrap();

        assert_eq!(answer.context_used[0].document_id, id);
        assert_eq!(answer.context_used[0].title.as_deref(), Some("Quarterly Report"));
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["contextUsed"][0]["document_id"], id.to_string());

        let calls = backend.get_calls();
        let prompt = &calls.last().unwrap().input;
        assert!(prompt.contains("Q3 financial results"));
    }

    #[tokio::test]
    async fn test_other_workspace_documents_are_excluded() {
        let store = Arc::new(InMemoryStore::new());
        let backend = Arc::new(MockInferenceBackend::new());
        let user = Uuid::new_v4();
        indexed_doc(&store, &backend, user, Uuid::new_v4(), "Notes", "Q3 financial results").await;

        let answer = service(&store, &backend)
            .ask(user, "Q3 financial results", Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(answer.context_used.is_empty());
    }

    #[tokio::test]
    async fn test_workspace_match_ranked_below_other_workspaces_is_found() {
        let store = Arc::new(InMemoryStore::new());
        let backend = Arc::new(MockInferenceBackend::new());
        let user = Uuid::new_v4();
        let busy = Uuid::new_v4();
        let quiet = Uuid::new_v4();
        for i in 0..6 {
            let title = format!("Report {}", i);
            indexed_doc(&store, &backend, user, busy, &title, "Q3 financial results").await;
        }
        let target = indexed_doc(
            &store,
            &backend,
            user,
            quiet,
            "Board pack",
            "Q3 financial results and outlook",
        )
        .await;

        let svc = service(&store, &backend);
        let answer = svc
            .ask(user, "Q3 financial results", Some(quiet))
            .await
            .unwrap();
        let ids: Vec<Uuid> = answer.context_used.iter().map(|r| r.document_id).collect();
        assert_eq!(ids, vec![target]);

        let answer = svc
            .ask(user, "Q3 financial results", Some(busy))
            .await
            .unwrap();
        assert_eq!(answer.context_used.len(), defaults::CHAT_MATCH_COUNT as usize);
    }

    #[tokio::test]
    async fn test_degraded_retrieval_is_reported() {
        let store = Arc::new(InMemoryStore::new());
        store.set_similarity_failure(true);
        let backend = Arc::new(MockInferenceBackend::new());
        let answer = service(&store, &backend)
            .ask(Uuid::new_v4(), "anything", None)
            .await
            .unwrap();
        assert!(answer.degraded);
        assert_eq!(answer.reason, Some(DegradationReason::SemanticSearchFailed));
        assert_eq!(answer.search_type, Some(SearchType::Text));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let store = Arc::new(InMemoryStore::new());
        let backend = Arc::new(MockInferenceBackend::new().failing_generation());
        let result = service(&store, &backend)
            .ask(Uuid::new_v4(), "anything", None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_session_turns_are_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let backend = Arc::new(MockInferenceBackend::new().with_fixed_response("Q3."));
        let user = Uuid::new_v4();
        let workspace = Uuid::new_v4();
        let id = indexed_doc(&store, &backend, user, workspace, "Quarterly Report", "Q3 financial results").await;
        let session = store.create_session(user, workspace, "Finance").await.unwrap();

        let svc = service(&store, &backend);
        svc.ask_in_session(user, session.id, "Q3 financial results?")
            .await
            .unwrap();

        let messages = store.list_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].role, ChatRole::Assistant);
        assert_eq!(messages[1].context_document_ids, vec![id]);

        let err = svc
            .ask_in_session(Uuid::new_v4(), session.id, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
