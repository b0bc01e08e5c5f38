//! Producer side of the ingestion wire contract.
//!
//! Each sample goes out as one JSON object with digit-string payloads, e.g.
//! `{"Time":"12","Signal_0":"7"}`. When the listener acknowledges reads, the sender
//! waits for the 4-byte acknowledgment after every record so each record arrives in
//! its own read.

use super::listener::ACK_PAYLOAD;
use crate::record::StructuredRecord;
use crate::store::{ChannelId, Sample};
use std::io::{Error, ErrorKind};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// TCP client streaming samples to an ingestion listener.
#[derive(Debug)]
pub struct SignalSender {
    stream: TcpStream,
    peer: SocketAddr,
    expect_ack: bool,
    records_sent: u64,
}

impl SignalSender {
    /// Connect to a listener.
    pub async fn connect(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(%peer, "sender connected");
        Ok(Self {
            stream,
            peer,
            expect_ack: false,
            records_sent: 0,
        })
    }

    /// Wait for the listener's acknowledgment after each record.
    pub fn expect_ack(mut self, expect_ack: bool) -> Self {
        self.expect_ack = expect_ack;
        self
    }

    /// Listener address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Records written so far.
    pub fn records_sent(&self) -> u64 {
        self.records_sent
    }

    /// Send one sample for `channel`.
    pub async fn send_sample(&mut self, channel: &ChannelId, sample: Sample) -> std::io::Result<()> {
        let record = StructuredRecord::from_sample(channel, sample);
        self.send_record(&record).await
    }

    /// Send one prepared record.
    pub async fn send_record(&mut self, record: &StructuredRecord) -> std::io::Result<()> {
        self.stream.write_all(record.to_json().as_bytes()).await?;
        self.records_sent += 1;
        if self.expect_ack {
            self.read_ack().await?;
        }
        Ok(())
    }

    /// Write raw bytes without framing or acknowledgment handling.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Give up the sender and keep the raw stream.
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }

    /// Close the write side so the listener sees end of stream.
    pub async fn finish(mut self) -> std::io::Result<()> {
        self.stream.shutdown().await
    }

    async fn read_ack(&mut self) -> std::io::Result<()> {
        let mut ack = [0u8; 4];
        self.stream.read_exact(&mut ack).await?;
        if &ack != ACK_PAYLOAD {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("unexpected acknowledgment {:?}", ack),
            ));
        }
        Ok(())
    }
}
