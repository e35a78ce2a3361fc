use chrono::{DateTime, Utc};

/// Format used for the persisted `build_date` column
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Upper bound, in bytes, on each captured output stream
pub const MAX_STREAM_BYTES: usize = 64 * 1024;

/// Extract the `owner/name` identifier from a repository URL
pub fn repo_identifier(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    let path = trimmed
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map(|(_, p)| p).unwrap_or(""))
        .or_else(|| trimmed.split_once(':').map(|(_, p)| p))
        .unwrap_or(trimmed);

    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let name = segments.next()?;
    let owner = segments.next()?;
    Some(format!("{}/{}", owner, name))
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Substitute `{key}` placeholders in every argument of a command template.
/// Each argument is scanned once, so substituted values are never expanded
/// again. Unknown placeholders are left as written.
pub fn render_args(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template.iter().map(|arg| render_one(arg, vars)).collect()
}

fn render_one(arg: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Keep the tail of an oversized stream
pub fn truncate_output(text: String) -> String {
    if text.len() <= MAX_STREAM_BYTES {
        return text;
    }
    let mut start = text.len() - MAX_STREAM_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...truncated...\n{}", &text[start..])
}
