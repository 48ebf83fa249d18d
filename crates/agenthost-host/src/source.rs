use std::path::Path;

use agenthost_models::Tick;
use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use crate::error::HostError;

/// Where the host pulls ticks from. `Ok(None)` means the source is exhausted.
#[async_trait]
pub trait TickSource: Send {
    async fn next_tick(&mut self) -> Result<Option<Tick>, HostError>;
}

/// Reads one JSON tick per line. Blank lines are ignored; malformed lines
/// are logged and skipped.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl JsonLinesSource<BufReader<File>> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let file = File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl JsonLinesSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TickSource for JsonLinesSource<R> {
    async fn next_tick(&mut self) -> Result<Option<Tick>, HostError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Tick>(line) {
                Ok(tick) => return Ok(Some(tick)),
                Err(e) => {
                    tracing::warn!(line = self.line_no, error = %e, "Skipping malformed tick");
                }
            }
        }
        Ok(None)
    }
}

/// Ticks pushed in-process through an mpsc channel. Exhausted once every
/// sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<Tick>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Tick>) -> Self {
        Self { rx }
    }

    pub fn channel(capacity: usize) -> (mpsc::Sender<Tick>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl TickSource for ChannelSource {
    async fn next_tick(&mut self) -> Result<Option<Tick>, HostError> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skips_blank_and_malformed_lines() {
        let input = "\
{\"pair\":\"USDJPY\",\"bid\":110.0,\"ask\":110.02,\"timestamp\":\"2024-01-02T03:04:05Z\"}

not json
{\"pair\":\"EURUSD\",\"bid\":1.1,\"ask\":1.1002,\"timestamp\":\"2024-01-02T03:04:06Z\"}
";
        let mut source = JsonLinesSource::new(input.as_bytes());

        let first = source.next_tick().await.unwrap().unwrap();
        assert_eq!(first.pair, "USDJPY");
        let second = source.next_tick().await.unwrap().unwrap();
        assert_eq!(second.pair, "EURUSD");
        assert_eq!(source.line_no, 4);
        assert!(source.next_tick().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn channel_source_ends_when_senders_drop() {
        let (tx, mut source) = ChannelSource::channel(4);
        let tick = Tick::new("USDJPY", 110.0, 110.02, chrono::Utc::now());
        tx.send(tick.clone()).await.unwrap();
        drop(tx);

        assert_eq!(source.next_tick().await.unwrap(), Some(tick));
        assert_eq!(source.next_tick().await.unwrap(), None);
    }
}
