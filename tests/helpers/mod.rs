#![allow(dead_code)]

//! In-process fake SPARQL 1.1 endpoint for integration tests.
//!
//! Understands exactly the requests this crate sends: `ASK`, the `SELECT ?s ?p ?o`
//! graph dump, `COPY`/`MOVE`/`DROP` graph management and `INSERT DATA`. Updates are
//! applied atomically per request. Requests must carry Basic auth for admin:admin
//! and the right content type.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use semstore::config::SparqlEndpoint;
use semstore::memory::{Interaction, SparqlMemoryStore};
use semstore::sparql::{CachedSparql, SparqlExecutor};
use serde_json::{json, Value};

pub const GRAPH: &str = "http://example.org/graph/memory";
pub const BACKUP_GRAPH: &str = "http://example.org/graph/memory.backup";
/// base64("admin:admin")
const EXPECTED_AUTH: &str = "Basic YWRtaW46YWRtaW4=";

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Iri(String),
    Literal { value: String, datatype: Option<String> },
}

pub type Triple = (String, String, Term);

#[derive(Default)]
pub struct FakeState {
    graphs: Mutex<HashMap<String, Vec<Triple>>>,
    queries: AtomicUsize,
    updates: AtomicUsize,
    fail_all: AtomicBool,
    delay_ms: AtomicU64,
    /// Updates containing this text fail with HTTP 500.
    fail_updates_containing: Mutex<Option<String>>,
    update_log: Mutex<Vec<String>>,
}

pub struct FakeStore {
    pub base_url: String,
    pub state: Arc<FakeState>,
}

impl FakeStore {
    pub async fn spawn() -> Self {
        let state = Arc::new(FakeState::default());
        let router = Router::new()
            .route("/query", post(handle_query))
            .route("/update", post(handle_update))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn endpoint(&self) -> SparqlEndpoint {
        SparqlEndpoint::new(
            format!("{}/query", self.base_url),
            format!("{}/update", self.base_url),
        )
        .unwrap()
    }

    pub fn executor(&self) -> SparqlExecutor {
        SparqlExecutor::new(self.endpoint(), GRAPH, "admin", "admin").unwrap()
    }

    pub fn cached(&self, ttl: Duration, max_size: usize) -> CachedSparql {
        CachedSparql::new(self.executor(), ttl, max_size)
    }

    pub fn memory_store(&self, dimension: usize) -> SparqlMemoryStore {
        SparqlMemoryStore::new(self.cached(Duration::from_secs(60), 100), dimension).unwrap()
    }

    pub fn query_count(&self) -> usize {
        self.state.queries.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.state.updates.load(Ordering::SeqCst)
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.state.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_updates_containing(&self, needle: Option<&str>) {
        *self.state.fail_updates_containing.lock().unwrap() = needle.map(str::to_string);
    }

    pub fn update_log(&self) -> Vec<String> {
        self.state.update_log.lock().unwrap().clone()
    }

    pub fn has_graph(&self, graph: &str) -> bool {
        self.state.graphs.lock().unwrap().contains_key(graph)
    }

    pub fn triple_count(&self, graph: &str) -> usize {
        self.state
            .graphs
            .lock()
            .unwrap()
            .get(graph)
            .map_or(0, Vec::len)
    }

    /// Put raw triples straight into a graph, bypassing the HTTP interface.
    pub fn seed(&self, graph: &str, triples: Vec<Triple>) {
        self.state
            .graphs
            .lock()
            .unwrap()
            .entry(graph.to_string())
            .or_default()
            .extend(triples);
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

fn check_request(
    state: &FakeState,
    headers: &HeaderMap,
    content_type: &str,
) -> Result<(), Response> {
    if state.fail_all.load(Ordering::SeqCst) {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "store offline").into_response());
    }
    let auth = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if auth != Some(EXPECTED_AUTH) {
        return Err((StatusCode::UNAUTHORIZED, "bad credentials").into_response());
    }
    let ct = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if ct != Some(content_type) {
        return Err((StatusCode::UNSUPPORTED_MEDIA_TYPE, "wrong content type").into_response());
    }
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    if !accept.is_some_and(|a| a.contains("application/json")) {
        return Err((StatusCode::NOT_ACCEPTABLE, "json only").into_response());
    }
    Ok(())
}

async fn delay(state: &FakeState) {
    let ms = state.delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

async fn handle_query(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.queries.fetch_add(1, Ordering::SeqCst);
    delay(&state).await;
    if let Err(resp) = check_request(&state, &headers, "application/sparql-query") {
        return resp;
    }

    let query = body.trim();
    if query.to_ascii_uppercase().starts_with("ASK") {
        return Json(json!({"head": {}, "boolean": true})).into_response();
    }
    if query.to_ascii_uppercase().starts_with("SELECT") {
        let Some(graph) = iris(query).into_iter().next() else {
            return (StatusCode::BAD_REQUEST, "no graph").into_response();
        };
        let graphs = state.graphs.lock().unwrap();
        let bindings: Vec<Value> = graphs
            .get(&graph)
            .map(|triples| triples.iter().map(binding).collect())
            .unwrap_or_default();
        return Json(json!({
            "head": {"vars": ["s", "p", "o"]},
            "results": {"bindings": bindings},
        }))
        .into_response();
    }
    (StatusCode::BAD_REQUEST, "unsupported query").into_response()
}

async fn handle_update(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.updates.fetch_add(1, Ordering::SeqCst);
    delay(&state).await;
    if let Err(resp) = check_request(&state, &headers, "application/sparql-update") {
        return resp;
    }
    if let Some(needle) = state.fail_updates_containing.lock().unwrap().as_deref() {
        if body.contains(needle) {
            return (StatusCode::INTERNAL_SERVER_ERROR, "injected failure").into_response();
        }
    }
    state.update_log.lock().unwrap().push(body.clone());

    let mut graphs = state.graphs.lock().unwrap();
    let mut next = graphs.clone();
    for statement in split_statements(&body) {
        if let Err(msg) = apply(&mut next, &statement) {
            return (StatusCode::BAD_REQUEST, msg).into_response();
        }
    }
    *graphs = next;
    StatusCode::NO_CONTENT.into_response()
}

fn binding((s, p, o): &Triple) -> Value {
    let object = match o {
        Term::Iri(iri) => json!({"type": "uri", "value": iri}),
        Term::Literal {
            value,
            datatype: Some(dt),
        } => json!({"type": "literal", "value": value, "datatype": dt}),
        Term::Literal { value, .. } => json!({"type": "literal", "value": value}),
    };
    json!({
        "s": {"type": "uri", "value": s},
        "p": {"type": "uri", "value": p},
        "o": object,
    })
}

// ── Update parsing ───────────────────────────────────────────────────────────

fn apply(graphs: &mut HashMap<String, Vec<Triple>>, statement: &str) -> Result<(), String> {
    let upper = statement.to_ascii_uppercase();
    if upper.starts_with("INSERT DATA") {
        let (graph, triples) = parse_insert_data(statement)?;
        graphs.entry(graph).or_default().extend(triples);
        return Ok(());
    }

    let names = iris(statement);
    if upper.starts_with("DROP") {
        let [graph] = names.as_slice() else {
            return Err(format!("bad DROP: {statement}"));
        };
        graphs.remove(graph);
    } else if upper.starts_with("COPY") {
        let [from, to] = names.as_slice() else {
            return Err(format!("bad COPY: {statement}"));
        };
        match graphs.get(from).cloned() {
            Some(triples) => graphs.insert(to.clone(), triples),
            None => graphs.remove(to),
        };
    } else if upper.starts_with("MOVE") {
        let [from, to] = names.as_slice() else {
            return Err(format!("bad MOVE: {statement}"));
        };
        match graphs.remove(from) {
            Some(triples) => graphs.insert(to.clone(), triples),
            None => graphs.remove(to),
        };
    } else {
        return Err(format!("unsupported update: {statement}"));
    }
    Ok(())
}

/// Split on `;` outside string literals and braces.
fn split_statements(update: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0i32;

    for c in update.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth -= 1;
                current.push(c);
            }
            ';' if depth == 0 => {
                statements.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    statements.push(current);
    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// All `<...>` IRIs outside string literals, in order.
fn iris(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut chars = text.chars();
    let mut in_string = false;
    let mut escaped = false;
    while let Some(c) = chars.next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '<' => found.push(chars.by_ref().take_while(|&c| c != '>').collect()),
            _ => {}
        }
    }
    found
}

fn parse_insert_data(statement: &str) -> Result<(String, Vec<Triple>), String> {
    let graph_pos = statement
        .find("GRAPH <")
        .ok_or("INSERT DATA without GRAPH")?;
    let after_graph = &statement[graph_pos + "GRAPH <".len()..];
    let close = after_graph.find('>').ok_or("unterminated graph IRI")?;
    let graph = after_graph[..close].to_string();

    let body_start = after_graph[close..].find('{').ok_or("missing triples block")? + close + 1;
    let body_end = after_graph.rfind('}').ok_or("missing closing brace")?;
    let inner = after_graph[body_start..body_end].trim_end();
    let inner = inner.strip_suffix('}').unwrap_or(inner);

    Ok((graph, parse_triples(inner)?))
}

fn parse_triples(text: &str) -> Result<Vec<Triple>, String> {
    let mut triples = Vec::new();
    let mut chars = text.chars().peekable();
    loop {
        skip_ws(&mut chars);
        if chars.peek().is_none() {
            break;
        }
        let s = match parse_term(&mut chars)? {
            Term::Iri(iri) => iri,
            other => return Err(format!("literal subject: {other:?}")),
        };
        skip_ws(&mut chars);
        let p = match parse_term(&mut chars)? {
            Term::Iri(iri) => iri,
            other => return Err(format!("literal predicate: {other:?}")),
        };
        skip_ws(&mut chars);
        let o = parse_term(&mut chars)?;
        skip_ws(&mut chars);
        if chars.next() != Some('.') {
            return Err("triple not terminated by '.'".into());
        }
        triples.push((s, p, o));
    }
    Ok(triples)
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn skip_ws(chars: &mut Chars<'_>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn parse_term(chars: &mut Chars<'_>) -> Result<Term, String> {
    match chars.next() {
        Some('<') => Ok(Term::Iri(chars.by_ref().take_while(|&c| c != '>').collect())),
        Some('"') => {
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some('n') => value.push('\n'),
                        Some('r') => value.push('\r'),
                        Some('t') => value.push('\t'),
                        Some(c) => value.push(c),
                        None => return Err("dangling escape".into()),
                    },
                    Some('"') => break,
                    Some(c) => value.push(c),
                    None => return Err("unterminated literal".into()),
                }
            }
            let datatype = if chars.peek() == Some(&'^') {
                chars.next();
                if chars.next() != Some('^') || chars.next() != Some('<') {
                    return Err("bad datatype".into());
                }
                Some(chars.by_ref().take_while(|&c| c != '>').collect())
            } else {
                None
            };
            Ok(Term::Literal { value, datatype })
        }
        other => Err(format!("unexpected token start: {other:?}")),
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// Deterministic embedding with a spike at `seed % dim`.
pub fn test_embedding(seed: usize, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    v[seed % dim] = 1.0;
    v
}

pub fn interaction(id: &str, output: &str, embedding: Vec<f32>, timestamp: i64) -> Interaction {
    let mut i = Interaction::new(format!("prompt for {id}"), output, embedding, vec!["test".into()]);
    i.id = id.to_string();
    i.timestamp = timestamp;
    i
}
