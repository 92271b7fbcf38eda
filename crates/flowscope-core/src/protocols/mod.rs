//! Application-protocol fingerprints.
//!
//! Byte signatures over the first transport payload of a conversation, used
//! by the analysis engine to promote a bare transport label. These are
//! deliberately shallow: a handful of prefix checks, not packet inspection.

/// TLS record layer: handshake record (0x16) for TLS 1.x with a ClientHello
/// handshake type at the start of the fragment.
pub(crate) fn is_tls_client_hello(payload: &[u8]) -> bool {
    payload.len() >= 6 && payload[0] == 0x16 && payload[1] == 0x03 && payload[5] == 0x01
}

const HTTP_PREAMBLES: [&[u8]; 5] = [b"GET ", b"POST", b"HEAD", b"PUT ", b"HTTP"];

/// Request line of the common HTTP methods, or a status line (`HTTP`).
pub(crate) fn is_http_preamble(payload: &[u8]) -> bool {
    payload.len() >= 4
        && HTTP_PREAMBLES
            .iter()
            .any(|preamble| payload.starts_with(preamble))
}

/// SSH protocol version exchange banner.
pub(crate) fn is_ssh_banner(payload: &[u8]) -> bool {
    payload.starts_with(b"SSH-")
}
