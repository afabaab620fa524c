//! Dotted-path configuration accessors (§9 Design Notes): a small path-expression type
//! (`[segment]*`) with get/set operations over a generic JSON tree. Used to read and write
//! nested `providerState` fields without hand-rolling a per-provider accessor for each one.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed path like `a.b[2].c`: a `.`-separated run of object keys, with `[N]` suffixes for
/// array indices.
#[derive(Debug, Clone)]
pub struct PathExpr(Vec<Segment>);

impl PathExpr {
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();

        for part in raw.split('.') {
            let mut rest = part;
            loop {
                match rest.find('[') {
                    None => {
                        if !rest.is_empty() {
                            segments.push(Segment::Key(rest.to_string()));
                        }
                        break;
                    }
                    Some(start) => {
                        if start > 0 {
                            segments.push(Segment::Key(rest[..start].to_string()));
                        }
                        let close = rest[start..].find(']').map(|e| start + e);
                        let Some(close) = close else {
                            segments.push(Segment::Key(rest[start..].to_string()));
                            break;
                        };
                        if let Ok(idx) = rest[start + 1..close].parse::<usize>() {
                            segments.push(Segment::Index(idx));
                        }
                        rest = &rest[close + 1..];
                    }
                }
            }
        }

        PathExpr(segments)
    }

    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.0 {
            current = match segment {
                Segment::Key(key) => current.get(key)?,
                Segment::Index(index) => current.get(index)?,
            };
        }
        Some(current)
    }

    /// Set the value at this path, creating intermediate objects/arrays as needed. An existing
    /// scalar in the path is overwritten with the container the next segment requires.
    pub fn set(&self, root: &mut Value, value: Value) {
        let mut current = root;
        for (i, segment) in self.0.iter().enumerate() {
            let is_last = i == self.0.len() - 1;
            match segment {
                Segment::Key(key) => {
                    if !current.is_object() {
                        *current = Value::Object(serde_json::Map::new());
                    }
                    let obj = current.as_object_mut().expect("just coerced to object");
                    if is_last {
                        obj.insert(key.clone(), value);
                        return;
                    }
                    current = obj.entry(key.clone()).or_insert(Value::Null);
                }
                Segment::Index(index) => {
                    if !current.is_array() {
                        *current = Value::Array(Vec::new());
                    }
                    let arr = current.as_array_mut().expect("just coerced to array");
                    while arr.len() <= *index {
                        arr.push(Value::Null);
                    }
                    if is_last {
                        arr[*index] = value;
                        return;
                    }
                    current = &mut arr[*index];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_resolves_nested_keys_and_indices() {
        let root = json!({ "a": { "b": [1, 2, { "c": "hit" }] } });
        let path = PathExpr::parse("a.b[2].c");
        assert_eq!(path.get(&root), Some(&json!("hit")));
    }

    #[test]
    fn get_returns_none_for_missing_segment() {
        let root = json!({ "a": {} });
        assert_eq!(PathExpr::parse("a.b.c").get(&root), None);
    }

    #[test]
    fn set_creates_missing_intermediates() {
        let mut root = json!({});
        PathExpr::parse("a.b[1].c").set(&mut root, json!(42));
        assert_eq!(root["a"]["b"][1]["c"], 42);
        assert_eq!(root["a"]["b"][0], Value::Null);
    }

    #[test]
    fn set_overwrites_existing_scalar() {
        let mut root = json!({ "a": 1 });
        PathExpr::parse("a.b").set(&mut root, json!("x"));
        assert_eq!(root["a"]["b"], "x");
    }
}
