//! Runs a single component as a Storm multilang subprocess.

use crate::core::component::{Component, ComponentInstance};
use crate::core::protocol::{Command, Message, PidReply};
use crate::core::serializer::{MessageReader, MessageWriter, Serializer};
use crate::utils::error::{Result, SparseError};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

/// Handshake, initialize, then serve messages until Storm closes the stream.
///
/// Component errors and unreadable messages after the handshake are
/// reported to Storm with an `error` command before being returned.
pub async fn run_component<R, W>(
    name: &str,
    component: Component,
    serializer: Serializer,
    reader: R,
    writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send,
{
    let mut reader = MessageReader::with_serializer(reader, serializer);
    let mut writer = MessageWriter::with_serializer(writer, serializer);

    let handshake = match reader.read_message().await? {
        Some(Message::Handshake(handshake)) => handshake,
        Some(other) => {
            return Err(SparseError::protocol(format!(
                "expected handshake, got a {} message",
                other.kind()
            )))
        }
        None => {
            return Err(SparseError::protocol(
                "Storm closed the connection before the handshake",
            ))
        }
    };

    let pid = std::process::id();
    write_pid_file(&handshake.pid_dir, pid)?;
    writer.send_message(&PidReply { pid }).await?;

    let mut instance = ComponentInstance::new(name, component);
    if let Err(e) = instance
        .initialize(&handshake.conf, &handshake.context)
        .await
    {
        report_error(&mut writer, &e).await;
        return Err(e);
    }
    tracing::info!(
        "Component {} initialized as task {} ({} serializer)",
        name,
        handshake.context.task_id,
        serializer
    );

    let (tx, mut rx) = mpsc::channel(64);
    let reader_task = tokio::spawn(async move {
        loop {
            let message = reader.read_message().await;
            let done = !matches!(message, Ok(Some(_)));
            if tx.send(message).await.is_err() || done {
                break;
            }
        }
    });

    let mut timer = instance.timer_interval().map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let result = loop {
        let step = tokio::select! {
            message = rx.recv() => match message {
                Some(Ok(Some(message))) => instance.handle(message).await,
                Some(Ok(None)) | None => {
                    tracing::info!("Storm closed the connection, shutting down {}", name);
                    break Ok(());
                }
                Some(Err(e)) => Err(e),
            },
            _ = next_tick(&mut timer) => instance.fire_timer().await,
        };

        if let Err(e) = flush(&mut instance, &mut writer).await {
            break Err(e);
        }
        if let Err(e) = step {
            report_error(&mut writer, &e).await;
            break Err(e);
        }
    };

    reader_task.abort();
    result
}

fn write_pid_file(pid_dir: &str, pid: u32) -> Result<()> {
    if pid_dir.is_empty() {
        return Ok(());
    }
    let path = Path::new(pid_dir).join(pid.to_string());
    std::fs::File::create(&path)?;
    tracing::debug!("Wrote pid file {}", path.display());
    Ok(())
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn flush<W: AsyncWrite + Unpin>(
    instance: &mut ComponentInstance,
    writer: &mut MessageWriter<W>,
) -> Result<()> {
    for command in instance.drain() {
        writer.send_message(&command).await?;
    }
    Ok(())
}

async fn report_error<W: AsyncWrite + Unpin>(writer: &mut MessageWriter<W>, error: &SparseError) {
    let command = Command::Error {
        msg: error.to_string(),
    };
    if let Err(e) = writer.send_message(&command).await {
        tracing::warn!("Could not report error to Storm: {}", e);
    }
}
