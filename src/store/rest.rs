//! HTTP client for a PostgREST-style store
//!
//! Tables live under `/rest/v1/{table}`; semantic search is an edge function
//! at `/functions/v1/search` that embeds the query server-side.

use super::{
    ContextStore, MemoryKind, MemoryRecord, NewMessage, StoreError, StoreResult, StoredMessage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const MESSAGES_TABLE: &str = "messages";
const MEMORY_TABLE: &str = "memory";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct MemoryInsert<'a> {
    #[serde(rename = "type")]
    kind: MemoryKind,
    content: &'a str,
    deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct GoalCompletion {
    #[serde(rename = "type")]
    kind: MemoryKind,
    completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    table: &'a str,
    match_count: usize,
}

/// Store client speaking the PostgREST conventions
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> StoreResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Take the single row PostgREST returns for `return=representation`.
    async fn single_row(response: Response, context: &str) -> StoreResult<MemoryRecord> {
        let mut rows: Vec<MemoryRecord> = Self::check(response).await?.json().await?;
        if rows.is_empty() {
            return Err(StoreError::Malformed(format!("{} returned no rows", context)));
        }
        Ok(rows.swap_remove(0))
    }

    async fn select_memory(
        &self,
        kind: MemoryKind,
        order: &str,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>> {
        let request = self.client.get(self.table_url(MEMORY_TABLE)).query(&[
            ("type", format!("eq.{}", kind.as_str())),
            ("order", order.to_string()),
            ("limit", limit.to_string()),
        ]);
        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn search(&self, query: &str, limit: usize) -> StoreResult<Vec<StoredMessage>> {
        let url = format!("{}/functions/v1/search", self.base_url);
        let request = self.client.post(url).json(&SearchRequest {
            query,
            table: MESSAGES_TABLE,
            match_count: limit,
        });
        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ContextStore for RestStore {
    async fn health_check(&self) -> StoreResult<()> {
        let request = self
            .client
            .get(self.table_url(MESSAGES_TABLE))
            .query(&[("select", "id"), ("limit", "1")]);
        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn log_message(&self, message: NewMessage) -> StoreResult<()> {
        let request = self
            .client
            .post(self.table_url(MESSAGES_TABLE))
            .header("Prefer", "return=minimal")
            .json(&message);
        Self::check(self.authorize(request).send().await?).await?;
        debug!("Logged {} message to store", message.role);
        Ok(())
    }

    async fn insert_memory(
        &self,
        kind: MemoryKind,
        content: &str,
        deadline: Option<DateTime<Utc>>,
    ) -> StoreResult<MemoryRecord> {
        let request = self
            .client
            .post(self.table_url(MEMORY_TABLE))
            .header("Prefer", "return=representation")
            .json(&MemoryInsert {
                kind,
                content,
                deadline,
            });
        let response = self.authorize(request).send().await?;
        Self::single_row(response, "memory insert").await
    }

    async fn complete_goal(&self, id: &str) -> StoreResult<MemoryRecord> {
        let request = self
            .client
            .patch(self.table_url(MEMORY_TABLE))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&GoalCompletion {
                kind: MemoryKind::CompletedGoal,
                completed_at: Utc::now(),
            });
        let response = self.authorize(request).send().await?;
        match Self::single_row(response, "goal completion").await {
            Err(StoreError::Malformed(_)) => Err(StoreError::NotFound(id.to_string())),
            other => other,
        }
    }

    async fn list_memory(&self, kind: MemoryKind, limit: usize) -> StoreResult<Vec<MemoryRecord>> {
        let order = match kind {
            MemoryKind::Goal => "deadline.asc.nullslast,created_at.desc",
            MemoryKind::Fact | MemoryKind::CompletedGoal => "created_at.desc",
        };
        self.select_memory(kind, order, limit).await
    }

    async fn recent_memory(
        &self,
        kind: MemoryKind,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>> {
        self.select_memory(kind, "created_at.desc", limit).await
    }

    async fn search_messages(&self, query: &str, limit: usize) -> Vec<StoredMessage> {
        match self.search(query, limit).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Semantic search unavailable: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MessageRole;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record_json(id: &str, kind: &str, content: &str) -> serde_json::Value {
        json!({
            "id": id,
            "type": kind,
            "content": content,
            "deadline": null,
            "completed_at": null,
            "created_at": "2026-10-01T12:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_health_check_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .and(query_param("select", "id"))
            .and(query_param("limit", "1"))
            .and(header("apikey", "secret"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "secret").unwrap();
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_health_check_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "wrong").unwrap();
        match store.health_check().await {
            Err(StoreError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_log_message_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/messages"))
            .and(body_partial_json(json!({
                "role": "user",
                "content": "hello",
                "channel": "cli"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = RestStore::new(format!("{}/", server.uri()), "k").unwrap();
        store
            .log_message(NewMessage::new(MessageRole::User, "hello", "cli"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insert_memory_returns_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/memory"))
            .and(header("prefer", "return=representation"))
            .and(body_partial_json(json!({ "type": "goal", "content": "ship v1" })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!([record_json("7", "goal", "ship v1")])),
            )
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "k").unwrap();
        let record = store
            .insert_memory(MemoryKind::Goal, "ship v1", None)
            .await
            .unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.kind, MemoryKind::Goal);
    }

    #[tokio::test]
    async fn test_complete_goal_patches_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/memory"))
            .and(query_param("id", "eq.7"))
            .and(body_partial_json(json!({ "type": "completed_goal" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([record_json(
                "7",
                "completed_goal",
                "ship v1"
            )])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(query_param("id", "eq.404"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "k").unwrap();
        let record = store.complete_goal("7").await.unwrap();
        assert_eq!(record.kind, MemoryKind::CompletedGoal);
        assert!(matches!(
            store.complete_goal("404").await,
            Err(StoreError::NotFound(id)) if id == "404"
        ));
    }

    #[tokio::test]
    async fn test_list_goals_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/memory"))
            .and(query_param("type", "eq.goal"))
            .and(query_param("order", "deadline.asc.nullslast,created_at.desc"))
            .and(query_param("limit", "20"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([record_json("1", "goal", "a")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "k").unwrap();
        let goals = store.list_memory(MemoryKind::Goal, 20).await.unwrap();
        assert_eq!(goals.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_goals_ignore_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/memory"))
            .and(query_param("type", "eq.goal"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("limit", "100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([record_json("7", "goal", "b")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "k").unwrap();
        let goals = store.recent_memory(MemoryKind::Goal, 100).await.unwrap();
        assert_eq!(goals[0].id, "7");
    }

    #[tokio::test]
    async fn test_search_failure_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "k").unwrap();
        assert!(store.search_messages("sister", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/search"))
            .and(body_partial_json(json!({ "query": "sister", "table": "messages", "match_count": 3 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "role": "user", "content": "my sister visits friday", "similarity": 0.88 }
            ])))
            .mount(&server)
            .await;

        let store = RestStore::new(server.uri(), "k").unwrap();
        let results = store.search_messages("sister", 3).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "my sister visits friday");
    }
}
