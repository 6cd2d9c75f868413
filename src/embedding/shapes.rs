//! Response shape matchers for embedding services.
//!
//! Services disagree on where the vector lives in the response body. Each
//! matcher below recognizes one layout and either returns a vector or falls
//! through; [`normalize`] tries them in the order of [`MATCHERS`].
//!
//! | Matcher | Layout |
//! |---------|--------|
//! | `embedding` | `{"embedding": [..]}` or `{"embedding": {"0": .., "1": ..}}` |
//! | `embeddings` | `{"embeddings": [[..], ..]}` or `{"embeddings": [..]}` |
//! | `data` | `{"data": [{"index": 0, "embedding": [..]}, ..]}` |
//! | `index_map` | `{"0": .., "1": .., ..}` |
//! | `bare` | `[..]` or `[[..], ..]` |

use serde_json::{Map, Value};

type Matcher = fn(&Value) -> Option<Vec<f32>>;

/// Matchers in priority order.
pub const MATCHERS: [(&str, Matcher); 5] = [
    ("embedding", match_embedding_field),
    ("embeddings", match_embeddings_field),
    ("data", match_data_objects),
    ("index_map", match_index_map),
    ("bare", match_bare_array),
];

/// Normalize a response body into one vector, or `None` if no layout fits.
pub fn normalize(body: &Value) -> Option<Vec<f32>> {
    MATCHERS.iter().find_map(|(_, matcher)| matcher(body))
}

/// Name of the first matcher that accepts `body`.
pub fn matched_shape(body: &Value) -> Option<&'static str> {
    MATCHERS
        .iter()
        .find(|(_, matcher)| matcher(body).is_some())
        .map(|(name, _)| *name)
}

/// A non-empty array of numbers.
fn numeric_vector(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// An object keyed by stringified indices, reordered into a vector.
fn index_keyed(map: &Map<String, Value>) -> Option<Vec<f32>> {
    if map.is_empty() {
        return None;
    }
    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        let idx: usize = key.parse().ok()?;
        pairs.push((idx, value.as_f64()? as f32));
    }
    pairs.sort_by_key(|(idx, _)| *idx);
    Some(pairs.into_iter().map(|(_, v)| v).collect())
}

fn match_embedding_field(body: &Value) -> Option<Vec<f32>> {
    let field = body.get("embedding")?;
    match field {
        Value::Array(_) => numeric_vector(field),
        Value::Object(map) => index_keyed(map),
        _ => None,
    }
}

fn match_embeddings_field(body: &Value) -> Option<Vec<f32>> {
    let field = body.get("embeddings")?;
    let first = field.as_array()?.first()?;
    if first.is_array() {
        numeric_vector(first)
    } else {
        numeric_vector(field)
    }
}

fn match_data_objects(body: &Value) -> Option<Vec<f32>> {
    let data = body.get("data")?.as_array()?;
    data.iter()
        .filter_map(|item| {
            let index = item.get("index").and_then(Value::as_u64).unwrap_or(0);
            numeric_vector(item.get("embedding")?).map(|v| (index, v))
        })
        .min_by_key(|(index, _)| *index)
        .map(|(_, v)| v)
}

fn match_index_map(body: &Value) -> Option<Vec<f32>> {
    index_keyed(body.as_object()?)
}

fn match_bare_array(body: &Value) -> Option<Vec<f32>> {
    let first = body.as_array()?.first()?;
    if first.is_array() {
        numeric_vector(first)
    } else {
        numeric_vector(body)
    }
}
