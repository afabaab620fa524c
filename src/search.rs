//! Ranked lexical search over the retrieval index (§4.5).

use crate::error::Result;
use crate::store::Store;
use rusqlite::{types::Value as SqlValue, Row};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub source_type: Option<String>,
    pub exclude_conversations: bool,
    pub file_types: Vec<String>,
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub source_type: String,
    pub source_id: String,
    pub content: String,
    pub location: Value,
    pub relevance_score: f64,
    pub highlighted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: i64,
    pub query: String,
    pub limit: i64,
    pub offset: i64,
    pub execution_time_ms: u64,
}

/// Turn a raw query into a phrase literal: doubled internal quotes, trimmed, wrapped in `"..."`.
/// Neutralises FTS5's query operators (`AND`, `NOT`, `*`, column filters, ...).
pub fn escape_query(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "\"\"".to_string();
    }
    format!("\"{}\"", trimmed.replace('"', "\"\""))
}

fn highlight(content: &str, raw_query: &str) -> String {
    let needle = raw_query.trim();
    if needle.is_empty() {
        return content.to_string();
    }
    let lower_content = content.to_lowercase();
    let lower_needle = needle.to_lowercase();
    match lower_content.find(&lower_needle) {
        Some(pos) => {
            let end = pos + needle.len();
            format!("{}**{}**{}", &content[..pos], &content[pos..end], &content[end..])
        }
        None => content.to_string(),
    }
}

struct SearchHit {
    chunk_id: String,
    source_type: String,
    source_id: String,
    content: String,
    location: Value,
    rank: f64,
}

fn row_to_hit(row: &Row) -> rusqlite::Result<SearchHit> {
    let location_raw: String = row.get("location")?;
    Ok(SearchHit {
        chunk_id: row.get("chunk_id")?,
        source_type: row.get("source_type")?,
        source_id: row.get("source_id")?,
        content: row.get("content")?,
        location: serde_json::from_str(&location_raw).unwrap_or(Value::Null),
        rank: row.get("rank")?,
    })
}

pub async fn search(
    store: &Store,
    project_id: &str,
    query: &str,
    limit: i64,
    offset: i64,
    filters: SearchFilters,
) -> Result<SearchResponse> {
    let started = Instant::now();
    let limit = limit.clamp(1, 100);
    let escaped = escape_query(query);

    let project_id = project_id.to_string();
    let raw_query = query.to_string();
    let (where_clause, filter_params) = build_predicate(&filters);

    let sql_select = format!(
        "SELECT cc.id AS chunk_id, cc.source_type AS source_type, cc.source_id AS source_id,
                cc.content AS content, cc.location AS location, bm25(retrieval_index) AS rank
         FROM retrieval_index
         JOIN content_chunks cc ON cc.id = retrieval_index.chunk_id
         WHERE retrieval_index MATCH ? AND cc.project_id = ? {where_clause}
         ORDER BY rank ASC
         LIMIT ? OFFSET ?"
    );
    let sql_count = format!(
        "SELECT COUNT(*) FROM retrieval_index
         JOIN content_chunks cc ON cc.id = retrieval_index.chunk_id
         WHERE retrieval_index MATCH ? AND cc.project_id = ? {where_clause}"
    );

    let select_params: Vec<SqlValue> = std::iter::once(SqlValue::Text(escaped.clone()))
        .chain(std::iter::once(SqlValue::Text(project_id.clone())))
        .chain(filter_params.iter().cloned())
        .chain([SqlValue::Integer(limit), SqlValue::Integer(offset)])
        .collect();
    let count_params: Vec<SqlValue> = std::iter::once(SqlValue::Text(escaped.clone()))
        .chain(std::iter::once(SqlValue::Text(project_id.clone())))
        .chain(filter_params.iter().cloned())
        .collect();

    let rows = store
        .run(move |conn| {
            let mut stmt = conn.prepare(&sql_select)?;
            let mapped = stmt.query_map(rusqlite::params_from_iter(select_params.iter()), row_to_hit)?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await?;

    let total: i64 = store
        .run(move |conn| {
            conn.query_row(&sql_count, rusqlite::params_from_iter(count_params.iter()), |r| r.get(0))
        })
        .await?;

    let results = rows
        .into_iter()
        .map(|r| {
            let path = r.location.get("path").and_then(Value::as_str).map(str::to_string);
            let round_number = r.location.get("round_number").and_then(Value::as_i64);
            let speaker = r
                .location
                .get("speaker")
                .and_then(Value::as_str)
                .map(str::to_string);
            SearchResult {
                highlighted: highlight(&r.content, &raw_query),
                relevance_score: r.rank.abs(),
                chunk_id: r.chunk_id,
                source_type: r.source_type,
                source_id: r.source_id,
                content: r.content,
                location: r.location,
                path,
                round_number,
                speaker,
            }
        })
        .collect();

    Ok(SearchResponse {
        results,
        total,
        query: query.to_string(),
        limit,
        offset,
        execution_time_ms: started.elapsed().as_millis() as u64,
    })
}

fn build_predicate(filters: &SearchFilters) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(source_type) = &filters.source_type {
        clauses.push("cc.source_type = ?".to_string());
        params.push(SqlValue::Text(source_type.clone()));
    }
    if filters.exclude_conversations {
        clauses.push("cc.source_type != 'conversation_message'".to_string());
    }
    for suffix in &filters.file_types {
        clauses.push("cc.location LIKE ? ESCAPE '\\'".to_string());
        params.push(SqlValue::Text(format!(
            "%{}\"%",
            suffix.replace('%', "\\%").replace('_', "\\_")
        )));
    }
    for glob in &filters.paths {
        let like = glob.replace('%', "\\%").replace('_', "\\_").replace('*', "%");
        clauses.push("cc.location LIKE ? ESCAPE '\\'".to_string());
        params.push(SqlValue::Text(format!("%\"path\":\"{like}\"%")));
    }

    let joined = if clauses.is_empty() {
        String::new()
    } else {
        format!("AND {}", clauses.join(" AND "))
    };

    (joined, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_query_wraps_and_doubles_quotes() {
        assert_eq!(escape_query("hello world"), "\"hello world\"");
        assert_eq!(escape_query("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_query("   "), "\"\"");
        assert_eq!(escape_query(""), "\"\"");
    }

    #[test]
    fn highlight_marks_first_match_case_insensitively() {
        assert_eq!(highlight("Hello World", "world"), "Hello **World**");
        assert_eq!(highlight("no match here", "xyz"), "no match here");
    }
}
