//! In-process backend used by tests and offline runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Backend, BackendError, BackendErrorCode, BackendResult, Filter, Order, Row};

#[derive(Default)]
struct State {
    collections: HashMap<String, Vec<Row>>,
    unique: HashMap<String, HashSet<String>>,
    faults: VecDeque<BackendErrorCode>,
    insert_rules: Vec<InsertRule>,
}

/// Rejects inserts whose `column` equals `value`.
struct InsertRule {
    column: String,
    value: Value,
    code: BackendErrorCode,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `column` unique within `collection`.
    pub async fn with_unique(self, collection: &str, column: &str) -> Self {
        self.state
            .lock()
            .await
            .unique
            .entry(collection.to_string())
            .or_default()
            .insert(column.to_string());
        self
    }

    /// Fail the next call with `code`.
    pub async fn inject_fault(&self, code: BackendErrorCode) {
        self.inject_faults(code, 1).await;
    }

    /// Fail the next `count` calls with `code`.
    pub async fn inject_faults(&self, code: BackendErrorCode, count: usize) {
        let mut state = self.state.lock().await;
        state.faults.extend(std::iter::repeat_n(code, count));
    }

    /// Reject every insert whose `column` equals `value`.
    pub async fn reject_inserts_matching(
        &self,
        column: &str,
        value: impl Into<Value>,
        code: BackendErrorCode,
    ) {
        self.state.lock().await.insert_rules.push(InsertRule {
            column: column.to_string(),
            value: value.into(),
            code,
        });
    }

    /// Store rows as-is, bypassing faults and constraints.
    pub async fn seed(&self, collection: &str, rows: impl IntoIterator<Item = Row>) {
        self.state
            .lock()
            .await
            .collections
            .entry(collection.to_string())
            .or_default()
            .extend(rows);
    }

    /// Number of operations attempted, including injected failures.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.state
            .lock()
            .await
            .collections
            .get(collection)
            .map_or(0, Vec::len)
    }

    fn begin(&self, state: &mut State, op: &str, collection: &str) -> BackendResult<()> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        match state.faults.pop_front() {
            Some(code) => {
                tracing::debug!(op, collection, %code, "injected fault");
                Err(BackendError::new(code, format!("injected {code} on {op} {collection}")))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        order: &[Order],
    ) -> BackendResult<Vec<Row>> {
        let mut state = self.state.lock().await;
        self.begin(&mut state, "query", collection)?;

        let mut rows: Vec<Row> = state
            .collections
            .get(collection)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            order
                .iter()
                .map(|o| o.compare(a, b))
                .find(|ord| ord.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows)
    }

    async fn insert(&self, collection: &str, mut record: Row) -> BackendResult<Row> {
        let mut state = self.state.lock().await;
        self.begin(&mut state, "insert", collection)?;

        if let Some(rule) = state
            .insert_rules
            .iter()
            .find(|rule| record.get(&rule.column) == Some(&rule.value))
        {
            return Err(BackendError::new(
                rule.code,
                format!("insert rejected on {}={}", rule.column, rule.value),
            ));
        }

        let existing = state.collections.get(collection).map(Vec::as_slice).unwrap_or_default();
        if let Some(columns) = state.unique.get(collection) {
            for column in columns {
                let Some(value) = record.get(column) else {
                    continue;
                };
                if existing.iter().any(|row| row.get(column) == Some(value)) {
                    return Err(BackendError::new(
                        BackendErrorCode::Duplicate,
                        format!("duplicate key value violates unique constraint \"{collection}_{column}_key\""),
                    ));
                }
            }
        }

        record
            .entry("id")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        record
            .entry("created_at")
            .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));

        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(&self, collection: &str, id: &str, patch: Row) -> BackendResult<Row> {
        let mut state = self.state.lock().await;
        self.begin(&mut state, "update", collection)?;

        let row = state
            .collections
            .get_mut(collection)
            .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id)))
            .ok_or_else(|| BackendError::not_found(format!("{collection}/{id}")))?;
        for (key, value) in patch {
            if key != "id" {
                row.insert(key, value);
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        self.begin(&mut state, "delete", collection)?;

        let rows = state.collections.get_mut(collection);
        let position = rows
            .as_ref()
            .and_then(|rows| rows.iter().position(|row| row_id(row) == Some(id)));
        match (rows, position) {
            (Some(rows), Some(index)) => {
                rows.remove(index);
                Ok(())
            }
            _ => Err(BackendError::not_found(format!("{collection}/{id}"))),
        }
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_timestamp() {
        let backend = MemoryBackend::new();
        let inserted = backend
            .insert("agencies", row(json!({"name": "Acme Edu"})))
            .await
            .unwrap();

        let id = inserted["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(inserted["created_at"].as_str().unwrap()).is_ok());
        assert_eq!(backend.len("agencies").await, 1);
    }

    #[tokio::test]
    async fn unique_column_rejects_duplicates() {
        let backend = MemoryBackend::new().with_unique("agencies", "name").await;
        backend
            .insert("agencies", row(json!({"name": "Acme Edu"})))
            .await
            .unwrap();

        let err = backend
            .insert("agencies", row(json!({"name": "Acme Edu"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, BackendErrorCode::Duplicate);
        assert_eq!(backend.len("agencies").await, 1);
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                "agencies",
                [
                    row(json!({"id": "a", "name": "Beta", "trust_score": 40})),
                    row(json!({"id": "b", "name": "Alpha", "trust_score": 90})),
                    row(json!({"id": "c", "name": "Gamma", "trust_score": 70})),
                ],
            )
            .await;

        let filter = Filter::new().with("trust_score", crate::backend::FilterOp::Gte, 50);
        let rows = backend
            .query("agencies", &filter, &[Order::asc("name")])
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Alpha", "Gamma"]);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let backend = MemoryBackend::new();
        backend.inject_faults(BackendErrorCode::Timeout, 2).await;

        for _ in 0..2 {
            let err = backend.query("agencies", &Filter::new(), &[]).await.unwrap_err();
            assert_eq!(err.code, BackendErrorCode::Timeout);
        }
        assert!(backend.query("agencies", &Filter::new(), &[]).await.is_ok());
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn update_and_delete_missing_rows_are_not_found() {
        let backend = MemoryBackend::new();
        let inserted = backend
            .insert("reviews", row(json!({"status": "pending"})))
            .await
            .unwrap();
        let id = inserted["id"].as_str().unwrap().to_string();

        let updated = backend
            .update("reviews", &id, row(json!({"status": "approved", "id": "x"})))
            .await
            .unwrap();
        assert_eq!(updated["status"], "approved");
        assert_eq!(updated["id"], id.as_str());

        backend.delete("reviews", &id).await.unwrap();
        let err = backend.delete("reviews", &id).await.unwrap_err();
        assert_eq!(err.code, BackendErrorCode::NotFound);
        let err = backend
            .update("reviews", &id, Row::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, BackendErrorCode::NotFound);
    }

    #[tokio::test]
    async fn insert_rules_reject_matching_rows() {
        let backend = MemoryBackend::new();
        backend
            .reject_inserts_matching("name", "Blocked", BackendErrorCode::PermissionDenied)
            .await;

        let err = backend
            .insert("agencies", row(json!({"name": "Blocked"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, BackendErrorCode::PermissionDenied);
        assert!(backend.insert("agencies", row(json!({"name": "Open"}))).await.is_ok());
    }
}
