use serde_json::{Map, Value};

/// Tag on the first line of every canonical string. Bump it whenever the
/// field list or its encoding changes.
pub const CANONICAL_VERSION: &str = "embed-sso-v1";

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json_string(value: &Value) -> String {
    fn stable(v: &Value) -> Value {
        match v {
            Value::Object(m) => {
                let mut keys: Vec<_> = m.keys().cloned().collect();
                keys.sort();
                let mut out = Map::new();
                for k in keys {
                    out.insert(k.clone(), stable(&m[&k]));
                }
                Value::Object(out)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(stable).collect()),
            _ => v.clone(),
        }
    }
    stable(value).to_string()
}

/// Builds the string that gets signed: the version tag, the host origin, the
/// embed path, then each signed value, one per line.
pub fn canonical_string<'a, I>(origin: &str, embed_path: &str, values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut lines = vec![
        CANONICAL_VERSION.to_string(),
        escape_line(origin),
        escape_line(embed_path),
    ];
    lines.extend(values.into_iter().map(escape_line));
    lines.join("\n")
}

// `\` and newline are the only characters that could make two different value
// lists produce the same joined string.
fn escape_line(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}
