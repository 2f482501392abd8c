//! Fake RESP servers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use shardwire::core::connection::Connection;
use shardwire::core::transport::Transport;
use shardwire::proto::codec::{Decoder, Encoder};
use shardwire::{Frame, NodeAddr, ServerError};
use tokio::net::TcpListener;

/// Binds a listener on a free local port.
pub async fn bind() -> (TcpListener, NodeAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, NodeAddr::new("127.0.0.1", port))
}

/// An address nothing listens on.
pub async fn unreachable() -> NodeAddr {
    let (listener, node) = bind().await;
    drop(listener);
    node
}

/// Serves every accepted connection with `handler`, which receives each
/// command along with the previous command on the same connection.
pub fn serve<F>(listener: TcpListener, handler: F)
where
    F: Fn(&[String], Option<&[String]>) -> Frame + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    tokio::spawn(async move {
        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let mut conn = Connection::new(socket, peer.to_string());
                let decoder = Decoder::new();
                let mut previous: Option<Vec<String>> = None;
                loop {
                    let args = match decoder.decode(&mut conn).await {
                        Ok(frame) => command_args(frame),
                        Err(_) => return,
                    };
                    let reply = handler(&args, previous.as_deref());
                    let mut encoder = Encoder::new();
                    encoder.encode(&reply);
                    if conn.write_bytes(&encoder.take()).await.is_err() {
                        return;
                    }
                    previous = Some(args);
                }
            });
        }
    });
}

/// Answers the first command of a single connection with `reply`, then
/// goes away for good: the listener is closed before the reply is sent.
pub fn serve_once(listener: TcpListener, reply: Frame) {
    tokio::spawn(async move {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(_) => return,
        };
        drop(listener);
        let mut conn = Connection::new(socket, peer.to_string());
        if Decoder::new().decode(&mut conn).await.is_ok() {
            let mut encoder = Encoder::new();
            encoder.encode(&reply);
            let _ = conn.write_bytes(&encoder.take()).await;
        }
    });
}

/// Accepts connections and closes them at once.
pub fn serve_closing(listener: TcpListener) {
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
}

fn command_args(frame: Frame) -> Vec<String> {
    frame
        .into_array()
        .unwrap_or_default()
        .iter()
        .filter_map(|arg| arg.as_bytes())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}

/// Case-insensitive match of the command verb and arguments.
pub fn is(args: &[String], expected: &[&str]) -> bool {
    args.len() == expected.len()
        && args
            .iter()
            .zip(expected)
            .all(|(arg, want)| arg.eq_ignore_ascii_case(want))
}

pub fn bulk(s: &str) -> Frame {
    Frame::BulkString(Bytes::from(s.to_string()))
}

pub fn ok() -> Frame {
    Frame::SimpleString(Bytes::from("OK"))
}

pub fn error(message: &str) -> Frame {
    Frame::Error(ServerError::new(message))
}

/// `CLUSTER SLOTS` reply for `(start, end, owner)` ranges.
pub fn cluster_slots(ranges: &[(u16, u16, &NodeAddr)]) -> Frame {
    Frame::Array(
        ranges
            .iter()
            .map(|(start, end, node)| {
                Frame::Array(vec![
                    Frame::Integer(i64::from(*start)),
                    Frame::Integer(i64::from(*end)),
                    Frame::Array(vec![
                        bulk(node.host()),
                        Frame::Integer(i64::from(node.port())),
                    ]),
                ])
            })
            .collect(),
    )
}

/// `SENTINEL get-master-addr-by-name` reply.
pub fn master_addr(node: &NodeAddr) -> Frame {
    Frame::Array(vec![bulk(node.host()), bulk(&node.port().to_string())])
}

/// `SENTINEL slaves` reply, RESP2 form.
pub fn replicas(nodes: &[(&NodeAddr, &str)]) -> Frame {
    Frame::Array(
        nodes
            .iter()
            .map(|(node, flags)| {
                Frame::Array(vec![
                    bulk("ip"),
                    bulk(node.host()),
                    bulk("port"),
                    bulk(&node.port().to_string()),
                    bulk("flags"),
                    bulk(flags),
                ])
            })
            .collect(),
    )
}
