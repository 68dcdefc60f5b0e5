//! RDF encoding of interactions.
//!
//! Each interaction is one subject in the primary graph with a literal per field.
//! Embeddings, concepts and metadata are stored as JSON strings. Reads fetch the
//! whole graph as `?s ?p ?o` rows and regroup them by subject here.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::types::{Interaction, MemoryType};
use crate::error::{Result, StoreError};

/// Namespace of every predicate written by this crate.
pub const NS: &str = "http://semstore.dev/ns/memory#";

const SUBJECT_PREFIX: &str = "urn:semstore:interaction:";
const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// Interactions regrouped from a graph dump.
#[derive(Debug, Default)]
pub struct DecodedHistory {
    pub short_term: Vec<Interaction>,
    pub long_term: Vec<Interaction>,
    /// Subjects that could not be turned into an interaction.
    pub skipped: usize,
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// IRI of the subject for interaction `id`; anything outside the unreserved set
/// is percent-encoded.
pub fn subject_iri(id: &str) -> String {
    let mut iri = String::with_capacity(SUBJECT_PREFIX.len() + id.len());
    iri.push_str(SUBJECT_PREFIX);
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            iri.push(byte as char);
        } else {
            iri.push_str(&format!("%{byte:02X}"));
        }
    }
    iri
}

/// Escape a string for use inside a double-quoted SPARQL literal.
pub fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn plain(value: &str) -> String {
    format!("\"{}\"", escape_literal(value))
}

fn typed(value: impl std::fmt::Display, datatype: &str) -> String {
    format!("\"{value}\"^^<{datatype}>")
}

fn json_literal<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)
        .map_err(|e| StoreError::Decode(format!("failed to encode field as JSON: {e}")))?;
    Ok(plain(&json))
}

/// N-Triples-style lines for one interaction.
pub fn interaction_triples(interaction: &Interaction, memory_type: MemoryType) -> Result<String> {
    let subject = format!("<{}>", subject_iri(&interaction.id));
    let fields = [
        ("id", plain(&interaction.id)),
        ("prompt", plain(&interaction.prompt)),
        ("output", plain(&interaction.output)),
        ("embedding", json_literal(&interaction.embedding)?),
        ("timestamp", typed(interaction.timestamp, XSD_INTEGER)),
        ("accessCount", typed(interaction.access_count, XSD_INTEGER)),
        ("concepts", json_literal(&interaction.concepts)?),
        ("decayFactor", typed(interaction.decay_factor, XSD_DOUBLE)),
        ("metadata", json_literal(&interaction.metadata)?),
        ("memoryType", plain(memory_type.as_str())),
    ];

    let mut out = format!("    {subject} <{RDF_TYPE}> <{NS}Interaction> .\n");
    for (name, object) in fields {
        out.push_str(&format!("    {subject} <{NS}{name}> {object} .\n"));
    }
    Ok(out)
}

/// Update replacing the contents of `graph` with `records`.
pub fn replace_graph_update<'a>(
    graph: &str,
    records: impl IntoIterator<Item = (&'a Interaction, MemoryType)>,
) -> Result<String> {
    let mut triples = String::new();
    for (interaction, memory_type) in records {
        triples.push_str(&interaction_triples(interaction, memory_type)?);
    }

    let mut update = format!("DROP SILENT GRAPH <{graph}>");
    if !triples.is_empty() {
        update.push_str(&format!(
            " ;\nINSERT DATA {{\n  GRAPH <{graph}> {{\n{triples}  }}\n}}"
        ));
    }
    Ok(update)
}

/// Query returning every triple of `graph`.
pub fn select_graph_query(graph: &str) -> String {
    format!("SELECT ?s ?p ?o WHERE {{ GRAPH <{graph}> {{ ?s ?p ?o }} }}")
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Regroup SPARQL JSON `?s ?p ?o` bindings into interactions, ordered by timestamp
/// then id. Subjects with missing or malformed fields are skipped and counted.
pub fn decode_history(results: &Value) -> Result<DecodedHistory> {
    let bindings = results
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::Decode("response has no results.bindings array".into()))?;

    let mut subjects: BTreeMap<&str, HashMap<&str, &str>> = BTreeMap::new();
    for binding in bindings {
        let (Some(s), Some(p), Some(o)) = (
            binding.pointer("/s/value").and_then(Value::as_str),
            binding.pointer("/p/value").and_then(Value::as_str),
            binding.pointer("/o/value").and_then(Value::as_str),
        ) else {
            continue;
        };
        if let Some(field) = p.strip_prefix(NS) {
            subjects.entry(s).or_default().insert(field, o);
        }
    }

    let mut history = DecodedHistory::default();
    for (subject, fields) in subjects {
        match decode_record(&fields) {
            Ok((interaction, MemoryType::ShortTerm)) => history.short_term.push(interaction),
            Ok((interaction, MemoryType::LongTerm)) => history.long_term.push(interaction),
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "skipping stored interaction");
                history.skipped += 1;
            }
        }
    }

    let by_time = |a: &Interaction, b: &Interaction| {
        a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))
    };
    history.short_term.sort_by(by_time);
    history.long_term.sort_by(by_time);
    Ok(history)
}

fn decode_record(fields: &HashMap<&str, &str>) -> Result<(Interaction, MemoryType)> {
    let required = |name: &str| {
        fields
            .get(name)
            .map(|v| v.to_string())
            .ok_or_else(|| StoreError::Decode(format!("missing {name}")))
    };

    let memory_type: MemoryType = required("memoryType")?
        .parse()
        .map_err(StoreError::Decode)?;

    let interaction = Interaction {
        id: required("id")?,
        prompt: required("prompt")?,
        output: required("output")?,
        embedding: match fields.get("embedding") {
            Some(json) => decode_embedding(json)?,
            None => Vec::new(),
        },
        timestamp: parse_field(fields, "timestamp", 0)?,
        access_count: parse_field(fields, "accessCount", 0)?,
        concepts: json_field(fields, "concepts")?.unwrap_or_default(),
        decay_factor: parse_field(fields, "decayFactor", 1.0)?,
        metadata: json_field(fields, "metadata")?.unwrap_or_default(),
    };
    Ok((interaction, memory_type))
}

/// JSON has no NaN, so non-finite components come back as `null`.
fn decode_embedding(json: &str) -> Result<Vec<f32>> {
    let values: Vec<Option<f32>> = serde_json::from_str(json)
        .map_err(|e| StoreError::Decode(format!("bad embedding: {e}")))?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
}

fn parse_field<T: std::str::FromStr>(
    fields: &HashMap<&str, &str>,
    name: &str,
    default: T,
) -> Result<T> {
    match fields.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| StoreError::Decode(format!("bad {name}: {raw}"))),
        None => Ok(default),
    }
}

fn json_field<T: serde::de::DeserializeOwned>(
    fields: &HashMap<&str, &str>,
    name: &str,
) -> Result<Option<T>> {
    fields
        .get(name)
        .map(|raw| {
            serde_json::from_str(raw).map_err(|e| StoreError::Decode(format!("bad {name}: {e}")))
        })
        .transpose()
}
