use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use ottwatch_monitor::{ControlSurface, MonitorEvent};

/// One operator command per input line, e.g. `{"command":"pause"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub(crate) enum ControlCommand {
    Pause,
    Resume,
    Rotate,
    Status,
}

impl ControlCommand {
    fn name(self) -> &'static str {
        match self {
            ControlCommand::Pause => "pause",
            ControlCommand::Resume => "resume",
            ControlCommand::Rotate => "rotate",
            ControlCommand::Status => "status",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Reply {
    Ack { ok: bool, command: &'static str },
    Error { error: &'static str, message: String },
}

/// Run the stdio adapter: NDJSON commands from stdin, the live event
/// stream as NDJSON on stdout.
pub async fn start(control: ControlSurface, cancel: CancellationToken) -> anyhow::Result<()> {
    serve(control, tokio::io::stdin(), tokio::io::stdout(), cancel).await
}

/// Closing the input does not stop the adapter; only `cancel` does.
/// Events still buffered at cancellation are written out first.
pub(crate) async fn serve<R, W>(
    control: ControlSurface,
    input: R,
    mut output: W,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut events = control.subscribe();
    let mut lines = BufReader::new(input).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line(), if input_open => match line? {
                Some(line) => handle_line(&control, &line, &mut output).await?,
                None => {
                    tracing::debug!("Control input closed");
                    input_open = false;
                }
            },
            item = events.recv() => match item {
                Ok(event) => write_line(&mut output, &event).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged, oldest events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    while let Ok(event) = events.try_recv() {
        write_line(&mut output, &event).await?;
    }
    output.flush().await?;
    Ok(())
}

async fn handle_line<W>(control: &ControlSurface, line: &str, output: &mut W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    let command = match serde_json::from_str::<ControlCommand>(line) {
        Ok(command) => command,
        Err(e) => {
            let reply = Reply::Error {
                error: "parse_error",
                message: format!("Invalid command: {e}"),
            };
            return write_line(output, &reply).await;
        }
    };
    tracing::debug!(command = command.name(), "Control command");

    match command {
        ControlCommand::Pause => control.pause().await,
        ControlCommand::Resume => control.resume().await,
        ControlCommand::Rotate => control.force_rotate().await,
        ControlCommand::Status => {
            let status = control.status().await;
            return write_line(output, &MonitorEvent::Status(status)).await;
        }
    }

    let reply = Reply::Ack {
        ok: true,
        command: command.name(),
    };
    write_line(output, &reply).await
}

async fn write_line<W, T>(output: &mut W, value: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    output.write_all(json.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}
