use tracing::debug;

/// File served when a directory is requested.
pub const DEFAULT_INDEX_NAME: &str = "index.html";

/// Characters that end the path part of a request target. Anything after them is dropped.
const STOP_SYMBOLS: &[char] = &['&', ';', '?'];

/// Turn a request target like "/foo/bar?x=1" into a path relative to the root directory.
///
/// Returns None if the target is invalid or unsafe: it must start with a slash and must not
/// contain ".." or any percent-encoding. Directory targets resolve to their index file.
pub fn sanitize_uri(uri: &str) -> Option<String> {
    // URLs not starting with a slash are illegal.
    if !uri.starts_with('/') || uri.contains("..") {
        debug!("invalid URI \"{}\"", uri);
        return None;
    }

    // Percent-encoded URIs are rejected rather than decoded.
    if uri.contains('%') {
        debug!("percent-encoded URI \"{}\" is not supported", uri);
        return None;
    }

    let mut path: String = uri[1..]
        .chars()
        .take_while(|c| !STOP_SYMBOLS.contains(c))
        .collect();

    if path.is_empty() || path.ends_with('/') {
        path.push_str(DEFAULT_INDEX_NAME);
    }
    Some(path)
}
