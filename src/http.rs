//! Line-oriented HTTP/1.1 parsing — just deep enough to drive caching
//! decisions. Does not validate full HTTP grammar; extracts exactly what
//! the request engine needs, tolerating malformed lines rather than
//! rejecting them outright.

use std::collections::HashMap;

use crate::error::ProxyError;

/// Parses the header section of a request or response buffer into a
/// name → value map. Header names are stored verbatim (case-sensitive);
/// callers needing case-insensitive lookup should go through
/// [`header_value`]. Stops at the first empty line (`CRLF CRLF`); a line
/// without the first `": "` separator is ignored rather than rejected.
pub fn parse_headers(data: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(data);
    let mut headers = HashMap::new();
    for raw_line in text.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() {
            break;
        }
        if let Some(idx) = line.find(": ") {
            let key = &line[..idx];
            let value = &line[idx + 2..];
            headers.insert(key.to_string(), value.to_string());
        }
    }
    headers
}

/// Case-insensitive lookup into a header map produced by [`parse_headers`].
/// `parse_headers` itself keeps names verbatim; normalising happens here,
/// at the point of lookup, for the handful of headers the engine cares
/// about (ETag, Last-Modified, Cache-Control, Content-Length,
/// Transfer-Encoding, Host).
pub fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Tokenises a `Cache-Control` header value on `,`, trimming surrounding
/// whitespace and splitting each token on the first `=` (directives
/// without a value map to the empty string). Strips `\r`/`\n` first.
/// `parse_cache_control("")` yields an empty map.
pub fn parse_cache_control(value: &str) -> HashMap<String, String> {
    let cleaned: String = value.chars().filter(|&c| c != '\r' && c != '\n').collect();
    let mut result = HashMap::new();
    if cleaned.trim().is_empty() {
        return result;
    }
    for token in cleaned.split(',') {
        let token = token.trim();
        match token.find('=') {
            Some(pos) => {
                result.insert(token[..pos].to_string(), token[pos + 1..].to_string());
            }
            None => {
                result.insert(token.to_string(), String::new());
            }
        }
    }
    result
}

/// True iff the response's `Cache-Control` header contains `no-store`.
pub fn has_no_store(response: &[u8]) -> bool {
    let headers = parse_headers(response);
    let cache_control = header_value(&headers, "Cache-Control").unwrap_or("");
    parse_cache_control(cache_control).contains_key("no-store")
}

/// Appends conditional-request headers (`If-None-Match` from `ETag`,
/// `If-Modified-Since` from `Last-Modified`) built from `cached_response`
/// into `current_request`. If the request already has its terminating
/// blank line, the new headers are spliced in just before it rather than
/// appended after — appending after the terminator would produce a
/// malformed request.
pub fn make_revalidate_request(current_request: &mut String, cached_response: &[u8]) {
    let headers = parse_headers(cached_response);

    let mut extra = String::new();
    if let Some(etag) = header_value(&headers, "ETag") {
        extra.push_str("If-None-Match: ");
        extra.push_str(etag);
        extra.push_str("\r\n");
    }
    if let Some(last_modified) = header_value(&headers, "Last-Modified") {
        extra.push_str("If-Modified-Since: ");
        extra.push_str(last_modified);
        extra.push_str("\r\n");
    }

    if extra.is_empty() {
        return;
    }

    match current_request.find("\r\n\r\n") {
        Some(pos) => current_request.insert_str(pos + 2, &extra),
        None => current_request.push_str(&extra),
    }
}

/// Parses the status code from a status line (`HTTP/1.x <code> ...`).
/// Returns `-1` on any parse failure.
pub fn get_status_code(response: &[u8]) -> i32 {
    let text = String::from_utf8_lossy(response);
    let Some(prefix_start) = text.find("HTTP/1.") else {
        return -1;
    };
    let start = prefix_start + 9;
    if start > text.len() {
        return -1;
    }
    match text[start..].find(' ') {
        Some(rel_end) => text[start..start + rel_end].parse::<i32>().unwrap_or(-1),
        None => -1,
    }
}

/// Extracts `(host, port)` from the request's `Host:` header, searched
/// case-insensitively. Defaults the port to `"80"` when the authority has
/// no `:<digits>` suffix. Fails when no `Host:` header is present.
pub fn extract_host_and_port(request: &[u8]) -> Result<(String, String), ProxyError> {
    let text = String::from_utf8_lossy(request);
    for raw_line in text.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.len() >= 5 && line[..5].eq_ignore_ascii_case("host:") {
            let value = line[5..].trim();
            if let Some(colon_idx) = value.rfind(':') {
                let port_part = &value[colon_idx + 1..];
                if !port_part.is_empty() && port_part.chars().all(|c| c.is_ascii_digit()) {
                    return Ok((value[..colon_idx].to_string(), port_part.to_string()));
                }
            }
            return Ok((value.to_string(), "80".to_string()));
        }
    }
    Err(ProxyError::MalformedRequest("missing Host header"))
}

/// Extracts the method token before the first space on the first line.
pub fn extract_http_method(request: &[u8]) -> Result<String, ProxyError> {
    let text = String::from_utf8_lossy(request);
    let first_line = text.lines().next().unwrap_or("");
    match first_line.find(' ') {
        Some(idx) => Ok(first_line[..idx].to_string()),
        None => Err(ProxyError::MalformedRequest("missing HTTP method")),
    }
}

/// The first line of `bytes`, up to but not including the first newline
/// (and its preceding `\r`, if present).
pub fn get_request_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let line = match text.find('\n') {
        Some(idx) => &text[..idx],
        None => &text[..],
    };
    line.strip_suffix('\r').unwrap_or(line).to_string()
}

/// Builds a minimal `HTTP/1.1 <code> <text>` response with
/// `Content-Type: text/plain`, a correct `Content-Length`, and
/// `Connection: close`.
pub fn make_error_response(code: u16, text: &str) -> String {
    format!(
        "HTTP/1.1 {code} {text}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{text}",
        text.len()
    )
}

/// Parses the `Content-Length` header value as an integer. Returns `-1`
/// when the header section is unterminated, or the header is absent or
/// malformed.
pub fn get_content_length(request: &[u8]) -> i64 {
    let text = String::from_utf8_lossy(request);
    if !text.contains("\r\n\r\n") {
        return -1;
    }
    let headers = parse_headers(request);
    match header_value(&headers, "Content-Length") {
        Some(value) => value.trim().parse::<i64>().unwrap_or(-1),
        None => -1,
    }
}
