//! Per-connection handler
//!
//! Drives one client from accept to teardown: negotiate a unique name,
//! register it, then run the session's receive and send loops as a pair
//! under [`concurrently`]. The receive loop forwards raw lines onto the
//! client's own queue; the send loop gives a pending kick priority over
//! the queue, interprets dequeued messages, and writes replies. Teardown
//! is drop-driven, so the registry entry is removed exactly once on every
//! exit path.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::client::Client;
use crate::error::{AlreadyExists, AppError};
use crate::message::Message;
use crate::registry::Registry;
use crate::session::concurrently;
use crate::types::ConnId;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `/quit`
    Quit,
    /// Another client kicked this one
    Kicked,
    /// The connection reached end of stream
    Disconnected,
}

/// Handle one client connection, from name negotiation to teardown.
///
/// Generic over the stream halves so tests can drive sessions through an
/// in-memory duplex pipe; `main` passes the split halves of a `TcpStream`.
pub async fn handle_connection<R, W>(
    reader: R,
    writer: W,
    registry: Registry,
) -> Result<(), AppError>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let conn_id = ConnId::new();
    debug!("Connection {} negotiating a name", conn_id);

    let mut reader = BufReader::new(reader);
    let mut writer = writer;

    let Some(client) = negotiate(&mut reader, &mut writer, &registry).await? else {
        debug!("Connection {} closed before registering", conn_id);
        return Ok(());
    };
    let Client {
        name,
        commands,
        queue,
        kick,
        guard,
    } = client;
    info!("Connection {} registered as '{}'", conn_id, name);

    let end = concurrently(
        recv_loop(reader, commands),
        send_loop(registry.clone(), name.clone(), writer, queue, kick),
    )
    .await;

    // Both tasks have stopped; the guard now removes the registry entry
    // and announces the departure.
    drop(guard);

    let end = end?;
    info!("Session '{}' ended: {:?}", name, end);
    Ok(())
}

/// Prompt for a name until one registers, the client gives up, or I/O
/// fails.
///
/// Returns `None` if the connection closed during negotiation. Blank
/// names re-prompt; taken names get the in-use reply and re-prompt.
async fn negotiate<R, W>(
    reader: &mut BufReader<R>,
    writer: &mut W,
    registry: &Registry,
) -> Result<Option<Client>, AppError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        write_line(writer, "What is your name?").await?;
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        match registry.try_register(name) {
            // No await between the successful insert and the caller owning
            // the guard, so cancellation cannot strand a registry entry.
            Ok(client) => return Ok(Some(client)),
            Err(AlreadyExists(taken)) => {
                write_line(
                    writer,
                    &format!("The name {taken} is in use, please choose another"),
                )
                .await?;
            }
        }
    }
}

/// Read lines from the connection and forward each as a raw command on
/// this client's own queue. Performs no interpretation and touches no
/// other client's state.
async fn recv_loop<R>(
    mut reader: BufReader<R>,
    commands: mpsc::UnboundedSender<Message>,
) -> Result<SessionEnd, AppError>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(SessionEnd::Disconnected);
        }
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        if commands.send(Message::Command(command)).is_err() {
            return Err(AppError::QueueClosed);
        }
    }
}

/// Drain the client's queue, giving a pending kick priority over queued
/// messages. A message already being interpreted runs to completion; the
/// kick is observed at the next iteration.
async fn send_loop<W>(
    registry: Registry,
    name: String,
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<Message>,
    mut kick: watch::Receiver<Option<String>>,
) -> Result<SessionEnd, AppError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            // kick outranks anything still waiting in the queue
            biased;
            changed = kick.changed() => {
                if changed.is_err() {
                    return Err(AppError::QueueClosed);
                }
                let reason = kick.borrow_and_update().clone();
                if let Some(reason) = reason {
                    write_line(&mut writer, &format!("You have been kicked: {reason}")).await?;
                    return Ok(SessionEnd::Kicked);
                }
            }
            msg = queue.recv() => {
                let Some(msg) = msg else {
                    return Err(AppError::QueueClosed);
                };
                match interpret(&registry, &name, msg, &mut writer).await? {
                    Flow::Continue => {}
                    Flow::Stop => return Ok(SessionEnd::Quit),
                }
            }
        }
    }
}

/// Whether the send loop keeps going after a message
enum Flow {
    Continue,
    Stop,
}

/// Interpret one dequeued message: deliverable messages are written out,
/// raw command lines are dispatched.
async fn interpret<W>(
    registry: &Registry,
    name: &str,
    message: Message,
    writer: &mut W,
) -> Result<Flow, AppError>
where
    W: AsyncWrite + Unpin,
{
    match message {
        Message::Command(line) => run_command(registry, name, &line, writer).await,
        deliverable => {
            if let Some(rendered) = deliverable.render() {
                write_line(writer, &rendered).await?;
            }
            Ok(Flow::Continue)
        }
    }
}

/// Dispatch one raw line from the client.
///
/// `/quit` stops the session; `/kick` and `/tell` go through the registry;
/// other `/`-prefixed lines (including `/kick` or `/tell` with missing
/// arguments) are echoed back as unrecognised; everything else is a
/// public broadcast.
async fn run_command<W>(
    registry: &Registry,
    name: &str,
    line: &str,
    writer: &mut W,
) -> Result<Flow, AppError>
where
    W: AsyncWrite + Unpin,
{
    if line == "/quit" {
        return Ok(Flow::Stop);
    }
    if let Some(target) = line.strip_prefix("/kick ") {
        let target = target.trim();
        if !target.is_empty() {
            // an unknown target is dropped silently
            let _ = registry.set_kicked(target, name);
            return Ok(Flow::Continue);
        }
    } else if let Some(rest) = line.strip_prefix("/tell ") {
        if let Some((target, text)) = rest.split_once(' ') {
            if !target.is_empty() && !text.is_empty() {
                let tell = Message::Tell {
                    from: name.to_string(),
                    text: text.to_string(),
                };
                if registry.send_to(target, tell).is_err() {
                    write_line(writer, &format!("*** No such user: {target}")).await?;
                }
                return Ok(Flow::Continue);
            }
        }
    }
    if line.starts_with('/') {
        write_line(writer, &format!("Unrecognised command: {line}")).await?;
        return Ok(Flow::Continue);
    }
    registry.broadcast(Message::Broadcast {
        from: name.to_string(),
        text: line.to_string(),
    });
    Ok(Flow::Continue)
}

/// Write one newline-terminated line and flush it.
async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
