//! The in-memory store is usable behind every persistence trait object.
use std::sync::Arc;

use aera_db::{
    ChatRepository, CreateDocumentRequest, DocumentRepository, InMemoryStore, ObjectStorage,
    SessionRepository, SimilaritySearch, Vector,
};
use uuid::Uuid;

#[tokio::test]
async fn test_shared_store_behind_trait_objects() {
    let store = Arc::new(InMemoryStore::new());
    let documents: Arc<dyn DocumentRepository> = store.clone();
    let similarity: Arc<dyn SimilaritySearch> = store.clone();
    let chat: Arc<dyn ChatRepository> = store.clone();
    let sessions: Arc<dyn SessionRepository> = store.clone();
    let objects: Arc<dyn ObjectStorage> = store.clone();

    let user = Uuid::new_v4();
    store.insert_token("tok", user).unwrap();
    assert_eq!(sessions.resolve_token("tok").await.unwrap(), Some(user));

    objects
        .upload("u/report.txt", b"Q3 financial results", "text/plain")
        .await
        .unwrap();
    let id = documents
        .insert(CreateDocumentRequest {
            user_id: user,
            workspace_id: None,
            title: "Quarterly Report".into(),
            mime_type: "text/plain".into(),
            storage_path: "u/report.txt".into(),
            size_bytes: 20,
            description: Some("Q3 financial results".into()),
            subject: None,
            topic: None,
        })
        .await
        .unwrap();

    let metadata = documents.fetch_metadata(&[id, Uuid::new_v4()]).await.unwrap();
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[&id].title, "Quarterly Report");

    // Nothing embedded yet.
    let matches = similarity
        .match_documents(&Vector::from(vec![1.0; 4]), 5, user)
        .await
        .unwrap();
    assert!(matches.is_empty());

    let session = chat.create_session(user, Uuid::new_v4(), "t").await.unwrap();
    assert_eq!(chat.list_sessions(user, None).await.unwrap()[0].id, session.id);
}
