//! Title fallback when the similarity function is unavailable.

use std::sync::Arc;

use aera_db::InMemoryStore;
use aera_inference::mock::MockInferenceBackend;
use aera_search::{
    CreateDocumentRequest, DegradationReason, DocumentRepository, Retriever, SearchType,
};
use uuid::Uuid;

async fn insert(store: &InMemoryStore, user: Uuid, title: &str) -> Uuid {
    store
        .insert(CreateDocumentRequest {
            user_id: user,
            workspace_id: None,
            title: title.to_string(),
            mime_type: "application/pdf".to_string(),
            storage_path: format!("{}/{}.pdf", user, Uuid::new_v4()),
            size_bytes: 10,
            description: None,
            subject: None,
            topic: None,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_failed_similarity_returns_only_title_matches() {
    let store = Arc::new(InMemoryStore::new());
    let user = Uuid::new_v4();
    let other_user = Uuid::new_v4();

    let budget = insert(&store, user, "Budget 2026").await;
    let budget_review = insert(&store, user, "budget review notes").await;
    insert(&store, user, "Vacation photos").await;
    insert(&store, other_user, "Budget of someone else").await;
    store.set_similarity_failure(true);

    let retriever = Retriever::new(
        Arc::new(MockInferenceBackend::new()),
        store.clone(),
        store.clone(),
    );
    let outcome = retriever.search(user, "BUDGET", 10).await.unwrap();

    assert_eq!(outcome.search_type, SearchType::Text);
    assert!(outcome.degraded());
    assert_eq!(outcome.reason(), Some(DegradationReason::SemanticSearchFailed));

    let mut ids = outcome.document_ids();
    ids.sort();
    let mut expected = vec![budget, budget_review];
    expected.sort();
    assert_eq!(ids, expected);
    for result in &outcome.results {
        let title = result.title.as_deref().unwrap().to_lowercase();
        assert!(title.contains("budget"));
    }

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["search_type"], "text");
    assert_eq!(json["degradation"]["reason"], "semantic_search_failed");
}
