//! Plain-text rendering of Cursor's `richText` field.
//!
//! The field holds a serialized Lexical editor state: a tree of typed nodes rooted at
//! `root`, where leaf nodes carry `text` and block nodes carry `children`.
//!
//! ```json
//! {"root": {"type": "root", "children": [
//!     {"type": "paragraph", "children": [{"type": "text", "text": "hello"}]}
//! ]}}
//! ```
//!
//! Flattening never fails: input that is not a tree comes back as its string form.
use serde::Deserialize;
use serde_json::{Map, Value};

/// Node types that end a line once their own text and children are written.
pub const BLOCK_NODE_TYPES: [&str; 3] = ["paragraph", "heading", "code"];

/// Flatten a `richText` value, either an already-parsed document or its JSON encoding.
pub fn flatten(input: Option<&Value>) -> String {
    match input {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(encoded)) => flatten_encoded(encoded),
        Some(Value::Object(document)) => flatten_document(document),
        Some(Value::Array(items)) if items.is_empty() => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Parse JSON without serde_json's nesting limit, growing the stack on demand.
pub fn parse_json(text: &str) -> serde_json::Result<Value> {
    let mut de = serde_json::Deserializer::from_str(text);
    de.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

/// Flatten a JSON-encoded document. Text that does not decode to an object is
/// returned unchanged.
pub fn flatten_encoded(encoded: &str) -> String {
    if encoded.trim().is_empty() {
        return String::new();
    }
    match parse_json(encoded) {
        Ok(Value::Object(document)) => flatten_document(&document),
        Ok(_) | Err(_) => encoded.to_string(),
    }
}

/// Flatten a parsed document. A document without a `root` node is empty.
pub fn flatten_document(document: &Map<String, Value>) -> String {
    match document.get("root") {
        Some(root @ Value::Object(_)) => walk(root).trim().to_string(),
        _ => String::new(),
    }
}

enum Step<'a> {
    Visit(&'a Value),
    LineBreak,
}

// Pre-order walk on an explicit stack so degenerate nesting cannot overflow.
fn walk(root: &Value) -> String {
    let mut out = String::new();
    let mut stack = vec![Step::Visit(root)];

    while let Some(step) = stack.pop() {
        let node = match step {
            Step::LineBreak => {
                out.push('\n');
                continue;
            }
            Step::Visit(node) => node,
        };
        let Some(node) = node.as_object() else {
            continue;
        };

        match node.get("text") {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => out.push_str(text),
            Some(other) => out.push_str(&other.to_string()),
        }

        let is_block = node
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| BLOCK_NODE_TYPES.contains(&t));
        if is_block {
            stack.push(Step::LineBreak);
        }

        if let Some(Value::Array(children)) = node.get("children") {
            stack.extend(children.iter().rev().map(Step::Visit));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_absent_and_empty_inputs() {
        assert_eq!(flatten(None), "");
        assert_eq!(flatten(Some(&Value::Null)), "");
        assert_eq!(flatten(Some(&json!({}))), "");
        assert_eq!(flatten(Some(&json!(""))), "");
        assert_eq!(flatten(Some(&json!([]))), "");
    }

    #[test]
    fn test_single_text_child_is_trimmed() {
        let doc = json!({"root": {"type": "root", "children": [
            {"type": "text", "text": "  just text \n"}
        ]}});
        assert_eq!(flatten(Some(&doc)), "just text");
    }

    #[test]
    fn test_paragraphs_end_lines() {
        let doc = json!({"root": {"type": "root", "children": [
            {"type": "paragraph", "text": "a"},
            {"type": "paragraph", "text": "b"}
        ]}});
        assert_eq!(flatten(Some(&doc)), "a\nb");
    }

    #[test]
    fn test_newline_follows_children_not_text() {
        let doc = json!({"root": {"type": "root", "children": [
            {"type": "heading", "children": [
                {"type": "text", "text": "Title"}
            ]},
            {"type": "paragraph", "children": [
                {"type": "text", "text": "one "},
                {"type": "text", "text": "two"}
            ]},
            {"type": "paragraph", "children": []},
            {"type": "code", "children": [
                {"type": "code-highlight", "text": "let x = 1;"}
            ]}
        ]}});
        assert_eq!(flatten(Some(&doc)), "Title\none two\n\nlet x = 1;");
    }

    #[test]
    fn test_interior_whitespace_is_preserved() {
        let doc = json!({"root": {"children": [
            {"type": "paragraph", "text": "  indented"},
            {"type": "text", "text": "\ttab"}
        ]}});
        assert_eq!(flatten(Some(&doc)), "indented\n\ttab");
    }

    #[test]
    fn test_encoded_document() {
        let encoded = r#"{"root":{"children":[{"type":"paragraph","children":[{"text":"hi"}]}]}}"#;
        assert_eq!(flatten(Some(&json!(encoded))), "hi");
    }

    #[test]
    fn test_non_tree_input_is_coerced() {
        assert_eq!(flatten(Some(&json!("not json at all"))), "not json at all");
        assert_eq!(flatten(Some(&json!("42"))), "42");
        assert_eq!(flatten(Some(&json!(7))), "7");
        assert_eq!(flatten(Some(&json!({"other": 1}))), "");
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut node = json!({"type": "text", "text": "deep"});
        for _ in 0..100_000 {
            node = json!({"type": "listitem", "children": [node]});
        }
        let doc = json!({"root": node});
        assert_eq!(flatten(Some(&doc)), "deep");
        // Dropping a 100k-deep `Value` recurses; leak it instead.
        std::mem::forget(doc);
    }

    fn nested_encoding(depth: usize) -> String {
        let mut encoded = r#"{"type":"text","text":"deep"}"#.to_string();
        for _ in 0..depth {
            encoded = format!(r#"{{"type":"paragraph","children":[{encoded}]}}"#);
        }
        format!(r#"{{"root":{encoded}}}"#)
    }

    #[test]
    fn test_deeply_nested_encoded_document() {
        let encoded = nested_encoding(300);
        assert_eq!(flatten(Some(&Value::String(encoded))), "deep");
    }

    #[test]
    fn test_parse_json_rejects_trailing_garbage() {
        assert!(parse_json(r#"{"a":1} x"#).is_err());
        assert_eq!(parse_json("[1]").unwrap(), json!([1]));
    }
}
