//! Minimal multipart/form-data parsing for the enrollment endpoint.
//!
//! Handles the subset browsers send for a two-field form: CRLF line
//! endings, quoted `name`/`filename` parameters, binary part bodies.

use anyhow::{anyhow, Result};

pub(crate) struct Part {
    pub name: String,
    pub data: Vec<u8>,
}

/// Extract the boundary parameter from a Content-Type header value.
pub(crate) fn boundary(content_type: &str) -> Option<String> {
    let mut segments = content_type.split(';');
    let mime = segments.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    for segment in segments {
        if let Some((key, value)) = segment.trim().split_once('=') {
            if key.eq_ignore_ascii_case("boundary") {
                return Some(value.trim_matches('"').to_string());
            }
        }
    }
    None
}

/// Split a multipart body into its parts.
pub(crate) fn parse(body: &[u8], boundary: &str) -> Result<Vec<Part>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut offset = find_subslice(body, delimiter)
        .ok_or_else(|| anyhow!("missing opening boundary"))?
        + delimiter.len();

    let mut parts = Vec::new();
    loop {
        if body[offset..].starts_with(b"--") {
            break;
        }
        if body[offset..].starts_with(b"\r\n") {
            offset += 2;
        }

        let rest = &body[offset..];
        let next = find_subslice(rest, delimiter).ok_or_else(|| anyhow!("unterminated part"))?;
        parts.push(parse_part(&rest[..next])?);
        offset += next + delimiter.len();
    }

    Ok(parts)
}

fn parse_part(segment: &[u8]) -> Result<Part> {
    let header_end = find_subslice(segment, b"\r\n\r\n")
        .ok_or_else(|| anyhow!("part missing header terminator"))?;
    let headers = String::from_utf8_lossy(&segment[..header_end]);

    let mut data = segment[header_end + 4..].to_vec();
    // The CRLF before the next boundary belongs to the framing, not the data.
    if data.ends_with(b"\r\n") {
        data.truncate(data.len() - 2);
    }

    let mut name = None;
    for line in headers.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("content-disposition") {
            continue;
        }
        for param in value.split(';') {
            if let Some((k, v)) = param.trim().split_once('=') {
                if k.trim().eq_ignore_ascii_case("name") {
                    name = Some(v.trim_matches('"').to_string());
                }
            }
        }
    }

    Ok(Part {
        name: name.ok_or_else(|| anyhow!("part missing field name"))?,
        data,
    })
}

pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
