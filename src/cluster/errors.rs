//! Cluster error replies.
//!
//! The codec leaves error replies as data. The router turns the ones that
//! carry routing meaning into typed errors:
//! - `MOVED <slot> <host>:<port>` - Permanent redirect
//! - `ASK <slot> <host>:<port>` - Temporary redirect during migration
//! - `CLUSTERDOWN` - Cluster is unavailable
//! - `CROSSSLOT` - Keys of one request span several slots

use crate::core::Error;
use crate::proto::frame::ServerError;

/// Converts a cluster error reply into a typed error.
///
/// Replies that are not cluster-specific, or redirects whose arguments do
/// not parse, become [`Error::Server`].
pub(crate) fn classify(reply: &ServerError) -> Error {
    let msg = reply.message().trim();
    let rest = msg[reply.kind().len()..].trim_start();

    match reply.kind() {
        "MOVED" => match parse_redirect(rest) {
            Some((slot, address)) => Error::Moved { slot, address },
            None => server(msg),
        },
        "ASK" => match parse_redirect(rest) {
            Some((slot, address)) => Error::Ask { slot, address },
            None => server(msg),
        },
        "CLUSTERDOWN" => Error::ClusterDown,
        "CROSSSLOT" => Error::CrossSlot,
        _ => server(msg),
    }
}

fn server(msg: &str) -> Error {
    Error::Server {
        message: msg.to_string(),
    }
}

/// Parses redirect arguments: "<slot> <host>:<port>"
fn parse_redirect(args: &str) -> Option<(u16, String)> {
    let mut parts = args.split_whitespace();
    let slot: u16 = parts.next()?.parse().ok()?;
    let address = parts.next()?.to_string();
    if parts.next().is_some() {
        return None;
    }
    Some((slot, address))
}
