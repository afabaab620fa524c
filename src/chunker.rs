//! Deterministic content chunking (§4.3). A pure function: same content in, same chunks out,
//! with character offsets that round-trip to the original text.

use serde_json::{json, Value};

/// Fixed-size line window.
const WINDOW_LINES: usize = 50;

pub struct Chunk {
    pub chunk_index: i64,
    pub content: String,
    pub location: Value,
    pub token_count: i64,
}

fn token_count(content: &str) -> i64 {
    ((content.len() as f64) / 4.0).ceil() as i64
}

/// Split file content into `WINDOW_LINES`-line windows. Concatenating the returned chunks'
/// `content` in order reproduces `content` exactly (save for a missing final trailing newline).
pub fn chunk_file(path: &str, content: &str) -> Vec<Chunk> {
    if content.is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let n = lines.len();
    let mut chunks = Vec::new();
    let mut start_char = 0usize;

    let mut k = 0i64;
    let mut line_idx = 0usize;
    while line_idx < n {
        let end_idx = (line_idx + WINDOW_LINES).min(n);
        let window = &lines[line_idx..end_idx];
        let window_text = window.join("\n");
        let is_last_window = end_idx == n;
        let end_char = start_char + window_text.len();

        chunks.push(Chunk {
            chunk_index: k,
            content: window_text,
            location: json!({
                "path": path,
                "start_line": line_idx + 1,
                "end_line": end_idx,
                "start_char": start_char,
                "end_char": end_char,
            }),
            token_count: token_count(&window_text),
        });

        // Account for the '\n' separator consumed between this window and the next.
        start_char = end_char + if is_last_window { 0 } else { 1 };
        line_idx = end_idx;
        k += 1;
    }

    chunks
}

/// A conversation message is always a single chunk.
pub fn chunk_message(round_number: i64, speaker: &str, content: &str) -> Vec<Chunk> {
    vec![Chunk {
        chunk_index: 0,
        content: content.to_string(),
        location: json!({ "round_number": round_number, "speaker": speaker }),
        token_count: token_count(content),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_window_for_short_file() {
        let content = "line1\nline2\nline3";
        let chunks = chunk_file("a.txt", content);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, content);
        assert_eq!(chunks[0].location["start_char"], 0);
        assert_eq!(chunks[0].location["end_char"], content.len());
    }

    #[test]
    fn multiple_windows_concatenate_to_original() {
        let lines: Vec<String> = (1..=120).map(|i| format!("line{i}")).collect();
        let content = lines.join("\n");
        let chunks = chunk_file("b.txt", &content);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].location["start_line"], 1);
        assert_eq!(chunks[0].location["end_line"], 50);
        assert_eq!(chunks[1].location["start_line"], 51);
        assert_eq!(chunks[2].location["end_line"], 120);

        let rebuilt = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(rebuilt, content);

        for c in &chunks {
            let start = c.location["start_char"].as_u64().unwrap() as usize;
            let end = c.location["end_char"].as_u64().unwrap() as usize;
            assert_eq!(&content[start..end], c.content);
        }
    }

    #[test]
    fn message_is_always_a_single_chunk() {
        let chunks = chunk_message(3, "agent:gpt", "hello there");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].location["round_number"], 3);
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        assert!(chunk_file("empty.txt", "").is_empty());
    }
}
