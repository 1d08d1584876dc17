//! Shared utilities for integration testing.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// What the mock proxy does with each connection.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum Script {
    /// Send the response, then echo every tunnel byte back.
    AcceptAndEcho(&'static str),
    /// Send the response, then read until the client goes away.
    Respond(&'static str),
    /// Read the request and never answer.
    Silent,
    /// Read the request and close the connection.
    Hangup,
}

/// Start a scripted proxy on an ephemeral port. Every CONNECT request head
/// it receives is forwarded on the returned channel.
pub async fn start_mock_proxy(script: Script) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(serve(socket, script, tx));
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

async fn serve(mut socket: TcpStream, script: Script, tx: mpsc::UnboundedSender<String>) {
    let Some(request) = read_head(&mut socket).await else {
        return;
    };
    let _ = tx.send(request);

    match script {
        Script::AcceptAndEcho(response) => {
            if socket.write_all(response.as_bytes()).await.is_err() {
                return;
            }
            let (mut rd, mut wr) = socket.split();
            let _ = tokio::io::copy(&mut rd, &mut wr).await;
        }
        Script::Respond(response) => {
            let _ = socket.write_all(response.as_bytes()).await;
            drain(&mut socket).await;
        }
        Script::Silent => drain(&mut socket).await,
        Script::Hangup => {}
    }
}

async fn read_head(socket: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return None,
        }
    }
    String::from_utf8(head).ok()
}

async fn drain(socket: &mut TcpStream) {
    let mut buf = [0u8; 1024];
    while let Ok(n) = socket.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
}
