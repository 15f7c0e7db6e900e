//! Attribute-list scanning for HLS tag lines.
//!
//! Tags such as `#EXT-X-KEY:METHOD=AES-128,URI="key.bin",IV=0x1` carry a
//! comma-separated `NAME=VALUE` list after the colon. Quoted values may
//! contain commas. Only what rewriting needs is parsed; the line itself is
//! never re-serialized, so untouched attributes keep their exact bytes.

/// Location of one attribute value inside a tag line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpan<'a> {
    /// Value with surrounding quotes removed
    pub value: &'a str,
    /// Byte offset where the raw value starts (the opening quote, if quoted)
    pub start: usize,
    /// Byte offset one past the raw value (past the closing quote, if quoted)
    pub end: usize,
    pub quoted: bool,
}

/// Find attribute `name` in a tag line. Names match exactly, so `BANDWIDTH`
/// does not match `AVERAGE-BANDWIDTH`.
pub fn find_attribute<'a>(line: &'a str, name: &str) -> Option<AttributeSpan<'a>> {
    let list_start = line.find(':')? + 1;
    let bytes = line.as_bytes();
    let mut pos = list_start;

    while pos < line.len() {
        let eq = pos + line[pos..].find('=')?;
        let key = line[pos..eq].trim();
        let value_start = eq + 1;

        let (span, next) = if bytes.get(value_start) == Some(&b'"') {
            let close = value_start + 1 + line[value_start + 1..].find('"')?;
            let span = AttributeSpan {
                value: &line[value_start + 1..close],
                start: value_start,
                end: close + 1,
                quoted: true,
            };
            // Skip anything up to the separating comma
            let next = line[close + 1..]
                .find(',')
                .map_or(line.len(), |i| close + 1 + i + 1);
            (span, next)
        } else {
            let end = line[value_start..]
                .find(',')
                .map_or(line.len(), |i| value_start + i);
            let span = AttributeSpan {
                value: line[value_start..end].trim(),
                start: value_start,
                end,
                quoted: false,
            };
            (span, (end + 1).min(line.len()))
        };

        if key == name {
            return Some(span);
        }
        if next <= pos {
            break;
        }
        pos = next;
    }

    None
}

/// Extract the quoted `URI` value from a tag line.
///
/// Returns the URI and the byte range of the quoted section (quotes
/// included), or `None` when the line has no non-empty quoted URI.
pub fn extract_quoted_uri(line: &str) -> Option<(String, usize, usize)> {
    let span = find_attribute(line, "URI")?;
    if !span.quoted || span.value.is_empty() {
        return None;
    }
    Some((span.value.to_string(), span.start, span.end))
}

/// Replace the quoted `URI` value of a tag line via `rewrite`.
///
/// Lines without a quoted URI come back unchanged.
pub fn rewrite_quoted_uri(line: &str, rewrite: impl FnOnce(&str) -> String) -> String {
    let Some((uri, quote_start, quote_end)) = extract_quoted_uri(line) else {
        return line.to_string();
    };

    let new_uri = rewrite(&uri);
    let mut result = String::with_capacity(line.len() + new_uri.len());
    result.push_str(&line[..quote_start]);
    result.push('"');
    result.push_str(&new_uri);
    result.push('"');
    result.push_str(&line[quote_end..]);
    result
}

/// Numeric `BANDWIDTH` of a stream declaration, 0 when absent or invalid.
pub fn bandwidth(line: &str) -> u64 {
    find_attribute(line, "BANDWIDTH")
        .and_then(|span| span.value.parse().ok())
        .unwrap_or(0)
}
