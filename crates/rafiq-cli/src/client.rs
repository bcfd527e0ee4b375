//! Thin WebSocket client for the node's client endpoint
//!
//! One connection per command. The node always sends the full store
//! dump first; commands skip past it and wait for the event that
//! answers them, with a local deadline so a dead node fails fast.

use std::time::Duration;

use anyhow::{bail, Context};
use futures::{SinkExt, StreamExt};
use rafiq_core::types::{ClientEvent, ClientRequest};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long a command waits for its answer before giving up
const REPLY_DEADLINE: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub async fn put(url: &str, key: &str, value: &str) -> anyhow::Result<()> {
    // Accept raw JSON, fall back to treating the argument as a string
    let value: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    let mut socket = connect(url).await?;
    send(
        &mut socket,
        &ClientRequest::Put {
            key: key.to_string(),
            value,
        },
    )
    .await?;

    let event = wait_for(&mut socket, |ev| {
        matches!(ev,
            ClientEvent::Update { key: k, .. } if k == key)
            || matches!(ev, ClientEvent::Rejected { .. })
    })
    .await?;

    match event {
        ClientEvent::Update { key, value } => println!("{} = {}", key, value),
        ClientEvent::Rejected { reason } => bail!("put rejected: {}", reason),
        _ => unreachable!(),
    }
    Ok(())
}

pub async fn get(url: &str, key: &str) -> anyhow::Result<()> {
    let mut socket = connect(url).await?;
    send(
        &mut socket,
        &ClientRequest::Get {
            key: key.to_string(),
        },
    )
    .await?;

    let event = wait_for(&mut socket, |ev| {
        matches!(ev, ClientEvent::Value { key: k, .. } if k == key)
    })
    .await?;

    if let ClientEvent::Value { value, .. } = event {
        match value {
            Some(v) => println!("{}", v),
            None => println!("(absent)"),
        }
    }
    Ok(())
}

pub async fn delete(url: &str, key: &str) -> anyhow::Result<()> {
    let mut socket = connect(url).await?;
    send(
        &mut socket,
        &ClientRequest::Delete {
            key: key.to_string(),
        },
    )
    .await?;

    let event = wait_for(&mut socket, |ev| {
        matches!(ev, ClientEvent::Deleted { key: k } if k == key)
            || matches!(ev, ClientEvent::Rejected { .. })
    })
    .await?;

    match event {
        ClientEvent::Deleted { key } => println!("deleted {}", key),
        ClientEvent::Rejected { reason } => bail!("delete rejected: {}", reason),
        _ => unreachable!(),
    }
    Ok(())
}

/// Print the initial store, then every change, until interrupted.
pub async fn watch(url: &str) -> anyhow::Result<()> {
    let mut socket = connect(url).await?;

    loop {
        let Some(event) = next_event(&mut socket).await? else {
            bail!("connection closed");
        };
        match event {
            ClientEvent::Store { data } => {
                println!("--- store ({} keys) ---", data.len());
                let mut keys: Vec<_> = data.keys().collect();
                keys.sort();
                for k in keys {
                    println!("{} = {}", k, data[k]);
                }
            }
            ClientEvent::Update { key, value } => println!("update {} = {}", key, value),
            ClientEvent::Deleted { key } => println!("deleted {}", key),
            ClientEvent::Value { .. } | ClientEvent::Rejected { .. } => {}
        }
    }
}

async fn connect(url: &str) -> anyhow::Result<Socket> {
    let (socket, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {}", url))?;
    Ok(socket)
}

async fn send(socket: &mut Socket, request: &ClientRequest) -> anyhow::Result<()> {
    let text = serde_json::to_string(request)?;
    socket.send(Message::Text(text)).await?;
    Ok(())
}

/// Read events until one matches `accept`, skipping the store dump and
/// unrelated notifications.
async fn wait_for(
    socket: &mut Socket,
    accept: impl Fn(&ClientEvent) -> bool,
) -> anyhow::Result<ClientEvent> {
    let deadline = tokio::time::sleep(REPLY_DEADLINE);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => bail!("no reply within {:?}", REPLY_DEADLINE),
            event = next_event(socket) => {
                let Some(event) = event? else {
                    bail!("connection closed before reply");
                };
                if accept(&event) {
                    return Ok(event);
                }
            }
        }
    }
}

async fn next_event(socket: &mut Socket) -> anyhow::Result<Option<ClientEvent>> {
    while let Some(frame) = socket.next().await {
        match frame? {
            Message::Text(text) => {
                let event = serde_json::from_str(&text).context("malformed server frame")?;
                return Ok(Some(event));
            }
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}
