//! TCP listener: newline-terminated command lines.
//!
//! One task per accepted connection. The connection task owns the
//! socket and selects between incoming command lines and the client's
//! outbound message queue (replies are written inline; pub/sub
//! deliveries arrive through the queue).

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::db::Db;
use crate::dispatch::dispatch;
use crate::pubsub::TcpSink;

/// Runs the accept loop forever.
pub async fn run(db: Arc<Db>, listener: TcpListener) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "tcp listener ready");
    }
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let db = db.clone();
                tokio::spawn(async move {
                    debug!(%peer, "client connected");
                    if let Err(e) = handle(db, stream).await {
                        debug!(%peer, "connection closed: {e}");
                    }
                });
            }
            Err(e) => error!("accept failed: {e}"),
        }
    }
}

/// Drives one client connection to completion. Client state is torn
/// down on every exit path, including write failures.
async fn handle(db: Arc<Db>, stream: TcpStream) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let client = db.register_client(Arc::new(TcpSink::new(tx)));

    let result = loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let quit = line
                            .split_whitespace()
                            .next()
                            .is_some_and(|t| t.eq_ignore_ascii_case("QUIT"));

                        let mut reply = dispatch(&db, client, line);
                        reply.push_str("\r\n");
                        if let Err(e) = write_half.write_all(reply.as_bytes()).await {
                            break Err(e);
                        }
                        if quit {
                            break Ok(());
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                }
            }
            message = rx.recv() => {
                // the sender lives in the sink registry for the whole
                // connection, so recv only yields Some here; the sink
                // already framed the message with CRLF
                if let Some(message) = message {
                    if let Err(e) = write_half.write_all(message.as_bytes()).await {
                        break Err(e);
                    }
                }
            }
        }
    };

    db.unregister_client(client);
    result
}
