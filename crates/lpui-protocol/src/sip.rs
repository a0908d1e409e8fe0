//! SIP URI helpers.

/// Marker preceding the user part of a bracketed SIP URI.
const BRACKETED_SIP: &str = "<sip:";

/// Scheme prefix of a bare SIP URI.
const BARE_SIP: &str = "sip:";

/// Extracts the user part (usually a phone number) from a peer description.
///
/// Handles both display-name form (`"Alice" <sip:alice@host>`) and bare
/// URIs (`sip:bob@host`). Whenever the user part cannot be located the input
/// is returned unchanged, so this never fails.
///
/// # Example
///
/// ```
/// use lpui_protocol::extract_identity;
///
/// assert_eq!(extract_identity("\"Alice\" <sip:alice@host>"), "alice");
/// assert_eq!(extract_identity("sip:bob@host"), "bob");
/// assert_eq!(extract_identity("garbage"), "garbage");
/// ```
pub fn extract_identity(peer: &str) -> String {
    let start = if peer.contains('<') && peer.contains('>') {
        peer.find(BRACKETED_SIP).map(|pos| pos + BRACKETED_SIP.len())
    } else if peer.starts_with(BARE_SIP) {
        Some(BARE_SIP.len())
    } else {
        None
    };

    start
        .and_then(|start| user_part(peer, start))
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}

/// Returns the non-empty text between `start` and the next `@`.
fn user_part(peer: &str, start: usize) -> Option<&str> {
    let rest = peer.get(start..)?;
    let end = rest.find('@')?;
    rest.get(..end).filter(|user| !user.is_empty())
}
