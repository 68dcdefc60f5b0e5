//! SPARQL 1.1 protocol client with backup-graph transactions.
//!
//! [`SparqlExecutor`] POSTs queries and updates to a remote triple store with Basic
//! auth. Transactions are emulated with store-side graph operations: `begin` copies
//! the primary graph to `<graph>.backup`, `commit` drops the backup, and `rollback`
//! drops the primary graph and moves the backup back in its place.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use crate::config::{SparqlConfig, SparqlEndpoint};
use crate::error::{Result, StoreError};

const SPARQL_QUERY_CONTENT_TYPE: &str = "application/sparql-query";
const SPARQL_UPDATE_CONTENT_TYPE: &str = "application/sparql-update";
const JSON_ACCEPT: &str = "application/json";

/// Longest slice of an error response body kept in [`StoreError::Connectivity`].
const MAX_ERROR_BODY: usize = 300;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Acknowledgement of a successful SPARQL update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateAck {
    /// HTTP status returned by the update endpoint (always 2xx).
    pub status: u16,
}

#[derive(Debug, Clone, Default)]
enum TransactionState {
    #[default]
    Idle,
    Active {
        id: String,
    },
}

/// Issues authenticated SPARQL requests and tracks the single open transaction.
pub struct SparqlExecutor {
    client: reqwest::Client,
    endpoint: SparqlEndpoint,
    graph_name: String,
    user: String,
    password: String,
    timeout: Duration,
    transaction: TransactionState,
    cleanup_failures: u64,
}

impl std::fmt::Debug for SparqlExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparqlExecutor")
            .field("endpoint", &self.endpoint)
            .field("graph_name", &self.graph_name)
            .field("user", &self.user)
            .field("timeout", &self.timeout)
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

impl SparqlExecutor {
    pub fn new(
        endpoint: SparqlEndpoint,
        graph_name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let graph_name = graph_name.into();
        validate_graph_name(&graph_name)?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            graph_name,
            user: user.into(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
            transaction: TransactionState::Idle,
            cleanup_failures: 0,
        })
    }

    pub fn from_config(config: &SparqlConfig) -> Result<Self> {
        Ok(Self::new(
            config.endpoint()?,
            &config.graph_name,
            &config.user,
            &config.password,
        )?
        .with_timeout(config.timeout()))
    }

    /// Default deadline for every request that does not pass its own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    /// Run a SPARQL query and return the parsed JSON result document.
    pub async fn execute_query(&self, query: &str) -> Result<Value> {
        self.execute_query_within(query, self.timeout).await
    }

    pub async fn execute_query_within(&self, query: &str, timeout: Duration) -> Result<Value> {
        let url = self.endpoint.query();
        tracing::debug!(endpoint = %url, query_len = query.len(), "executing SPARQL query");

        let body = self
            .post(url, "query", SPARQL_QUERY_CONTENT_TYPE, query, timeout)
            .await?
            .bytes()
            .await
            .map_err(|e| transport_error(url, "query", e))?;

        serde_json::from_slice(&body).map_err(|e| StoreError::Connectivity {
            endpoint: url.to_string(),
            operation: "query",
            status: None,
            message: format!("malformed JSON response: {e}"),
        })
    }

    /// Run a SPARQL update.
    pub async fn execute_update(&self, update: &str) -> Result<UpdateAck> {
        self.execute_update_within(update, self.timeout).await
    }

    pub async fn execute_update_within(
        &self,
        update: &str,
        timeout: Duration,
    ) -> Result<UpdateAck> {
        let url = self.endpoint.update();
        tracing::debug!(endpoint = %url, update_len = update.len(), "executing SPARQL update");

        let response = self
            .post(url, "update", SPARQL_UPDATE_CONTENT_TYPE, update, timeout)
            .await?;
        Ok(UpdateAck {
            status: response.status().as_u16(),
        })
    }

    async fn post(
        &self,
        url: &str,
        operation: &'static str,
        content_type: &'static str,
        body: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.user, Some(&self.password))
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT, JSON_ACCEPT)
            .timeout(timeout)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| transport_error(url, operation, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(StoreError::Connectivity {
            endpoint: url.to_string(),
            operation,
            status: Some(status.as_u16()),
            message: truncate(&text, MAX_ERROR_BODY),
        })
    }

    /// Confirm the query endpoint answers a trivial `ASK`.
    pub async fn verify(&self) -> Result<()> {
        self.execute_query("ASK { ?s ?p ?o }").await?;
        tracing::debug!(endpoint = %self.endpoint.query(), "SPARQL endpoint reachable");
        Ok(())
    }

    // ── Transactions ─────────────────────────────────────────────────────────

    /// Copy the primary graph to its backup and enter the transaction.
    ///
    /// Returns the transaction id. The id is only for log correlation; isolation
    /// comes from the backup graph alone.
    pub async fn begin_transaction(&mut self) -> Result<String> {
        if let TransactionState::Active { id } = &self.transaction {
            return Err(StoreError::Concurrency(format!(
                "transaction {id} already in progress"
            )));
        }

        let backup = self.backup_graph_name();
        self.execute_update(&format!(
            "COPY GRAPH <{}> TO GRAPH <{backup}>",
            self.graph_name
        ))
        .await?;

        // UUIDv7: millisecond timestamp followed by random bits.
        let id = uuid::Uuid::now_v7().to_string();
        tracing::info!(graph = %self.graph_name, transaction_id = %id, "transaction started");
        self.transaction = TransactionState::Active { id: id.clone() };
        Ok(id)
    }

    /// Drop the backup graph and leave the transaction.
    ///
    /// The writes already live in the primary graph, so a failed drop only leaves an
    /// orphaned backup behind. That failure is logged and counted in
    /// [`cleanup_failures`](Self::cleanup_failures); the transaction is closed either way.
    pub async fn commit_transaction(&mut self) -> Result<()> {
        let id = self.active_transaction("commit")?;

        let backup = self.backup_graph_name();
        let outcome = self
            .execute_update(&format!("DROP SILENT GRAPH <{backup}>"))
            .await;
        self.transaction = TransactionState::Idle;

        match outcome {
            Ok(_) => {
                tracing::info!(graph = %self.graph_name, transaction_id = %id, "transaction committed");
            }
            Err(e) => {
                self.cleanup_failures += 1;
                tracing::warn!(
                    graph = %self.graph_name,
                    backup = %backup,
                    transaction_id = %id,
                    error = %e,
                    "transaction committed but backup graph could not be dropped"
                );
            }
        }
        Ok(())
    }

    /// Replace the primary graph with its backup and leave the transaction.
    ///
    /// The transaction is closed even when the restore request fails, and the
    /// failure is returned: the primary graph may still hold the uncommitted writes.
    pub async fn rollback_transaction(&mut self) -> Result<()> {
        let id = self.active_transaction("rollback")?;

        let backup = self.backup_graph_name();
        let outcome = self
            .execute_update(&format!(
                "DROP SILENT GRAPH <{graph}> ;\nMOVE GRAPH <{backup}> TO GRAPH <{graph}>",
                graph = self.graph_name
            ))
            .await;
        self.transaction = TransactionState::Idle;

        match outcome {
            Ok(_) => {
                tracing::info!(graph = %self.graph_name, transaction_id = %id, "transaction rolled back");
                Ok(())
            }
            Err(e) => {
                self.cleanup_failures += 1;
                tracing::warn!(
                    graph = %self.graph_name,
                    backup = %backup,
                    transaction_id = %id,
                    error = %e,
                    "rollback request failed; transaction state reset anyway"
                );
                Err(e)
            }
        }
    }

    fn active_transaction(&self, operation: &str) -> Result<String> {
        match &self.transaction {
            TransactionState::Active { id } => Ok(id.clone()),
            TransactionState::Idle => Err(StoreError::Concurrency(format!(
                "cannot {operation}: no transaction in progress"
            ))),
        }
    }

    /// Roll back any open transaction. Call before dropping the executor.
    pub async fn dispose(&mut self) {
        if !self.is_in_transaction() {
            return;
        }
        tracing::warn!(graph = %self.graph_name, "disposing with an open transaction; rolling back");
        if let Err(e) = self.rollback_transaction().await {
            tracing::warn!(error = %e, "implicit rollback during dispose failed");
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn is_in_transaction(&self) -> bool {
        matches!(self.transaction, TransactionState::Active { .. })
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match &self.transaction {
            TransactionState::Active { id } => Some(id),
            TransactionState::Idle => None,
        }
    }

    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    pub fn endpoint(&self) -> &SparqlEndpoint {
        &self.endpoint
    }

    /// Name of the graph holding the pre-transaction copy. Not a stable contract.
    pub fn backup_graph_name(&self) -> String {
        format!("{}.backup", self.graph_name)
    }

    /// Number of commit/rollback cleanup requests that failed since construction.
    pub fn cleanup_failures(&self) -> u64 {
        self.cleanup_failures
    }
}

impl Drop for SparqlExecutor {
    fn drop(&mut self) {
        if let TransactionState::Active { id } = &self.transaction {
            tracing::warn!(
                graph = %self.graph_name,
                transaction_id = %id,
                "executor dropped with an open transaction; backup graph left in the store"
            );
        }
    }
}

fn validate_graph_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StoreError::Config("graph name must not be empty".into()));
    }
    if name.chars().any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}')) {
        return Err(StoreError::Config(format!(
            "graph name is not a valid IRI: {name}"
        )));
    }
    Ok(())
}

fn transport_error(url: &str, operation: &'static str, e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout {
            endpoint: url.to_string(),
            operation,
        }
    } else {
        StoreError::Connectivity {
            endpoint: url.to_string(),
            operation,
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
