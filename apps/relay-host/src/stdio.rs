use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use relay_bus::transport::{Transport, TransportError};
use relay_bus::{BusEvent, Envelope, Failure, FailureKind};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Writes each event as one JSON envelope per line.
pub struct LineTransport<W> {
    writer: Mutex<W>,
}

pub type StdoutTransport = LineTransport<tokio::io::Stdout>;

impl<W> LineTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl StdoutTransport {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> Transport for LineTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, event: &BusEvent) -> Result<(), TransportError> {
        let mut line =
            serde_json::to_vec(&event.to_envelope()).map_err(anyhow::Error::from)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(anyhow::Error::from)?;
        writer.flush().await.map_err(anyhow::Error::from)?;
        Ok(())
    }
}

/// Parses one input line, or returns the `error` event to report instead.
pub fn parse_line(line: &str) -> Result<Envelope, BusEvent> {
    serde_json::from_str::<Envelope>(line)
        .map_err(|err| invalid_input(format!("malformed envelope: {err}")))
}

fn invalid_input(message: String) -> BusEvent {
    BusEvent::Error {
        id: None,
        error: Failure::new(FailureKind::InvalidAction, message),
    }
}

/// Feeds envelopes read from `reader` into `sink` until end of input or until
/// the bus stops listening. Blank lines are skipped; malformed ones, including
/// lines that are not UTF-8, are answered on `transport`.
pub async fn read_envelopes<R, T>(
    mut reader: R,
    transport: Arc<T>,
    sink: UnboundedSender<Envelope>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    T: Transport + ?Sized,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let parsed = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => parse_line(line.trim()),
            Err(err) => Err(invalid_input(format!("input line is not UTF-8: {err}"))),
        };
        match parsed {
            Ok(envelope) => {
                if sink.unbounded_send(envelope).is_err() {
                    debug!("bus stopped accepting input");
                    break;
                }
            }
            Err(event) => {
                warn!("malformed input line");
                transport.emit(&event).await?;
            }
        }
    }
    Ok(())
}
