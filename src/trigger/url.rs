//! URL normalization applied when URL triggers are constructed and when
//! visitor URLs are compared against them.

/// Strips a leading `http://` or `https://` (ASCII case-insensitive).
#[must_use]
pub fn strip_scheme(url: &str) -> &str {
    let url = url.trim();
    for scheme in ["https://", "http://"] {
        if let Some(prefix) = url.get(..scheme.len()) {
            if prefix.eq_ignore_ascii_case(scheme) {
                return &url[scheme.len()..];
            }
        }
    }
    url
}

/// Normal form for `UrlContains`: scheme removed.
#[must_use]
pub fn normalize_fragment(url: &str) -> String {
    strip_scheme(url).to_string()
}

/// Normal form for `UrlEquals`: scheme and a single trailing slash removed.
#[must_use]
pub fn normalize_exact(url: &str) -> String {
    let stripped = strip_scheme(url);
    stripped.strip_suffix('/').unwrap_or(stripped).to_string()
}
