//! Destinations for encoded packets

use crate::backend::PictureType;
use crate::error::SinkError;
use crossbeam::channel::{self, Receiver, Sender};
use std::io::Write;

/// Encoded output of one submitted frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub frame_index: u64,
    pub timestamp: u64,
    pub picture_type: PictureType,
    pub data: Vec<u8>,
}

impl EncodedPacket {
    pub fn is_keyframe(&self) -> bool {
        self.picture_type == PictureType::Idr
    }
}

/// Receives packets on the drain worker, in submission order
pub trait BitstreamSink: Send {
    fn write_packet(&mut self, packet: EncodedPacket) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Forwards packets over a crossbeam channel
pub struct ChannelSink {
    tx: Sender<EncodedPacket>,
}

impl ChannelSink {
    pub fn unbounded() -> (Self, Receiver<EncodedPacket>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }

    /// Blocks the drain worker while `capacity` packets are unread
    pub fn bounded(capacity: usize) -> (Self, Receiver<EncodedPacket>) {
        let (tx, rx) = channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl BitstreamSink for ChannelSink {
    fn write_packet(&mut self, packet: EncodedPacket) -> Result<(), SinkError> {
        self.tx.send(packet).map_err(|_| SinkError::Disconnected)
    }
}

/// Appends raw packet bytes to a writer, e.g. an elementary stream file
pub struct WriterSink<W: Write + Send> {
    writer: W,
    bytes_written: u64,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> BitstreamSink for WriterSink<W> {
    fn write_packet(&mut self, packet: EncodedPacket) -> Result<(), SinkError> {
        self.writer.write_all(&packet.data)?;
        self.bytes_written += packet.data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(frame_index: u64, data: &[u8]) -> EncodedPacket {
        EncodedPacket {
            frame_index,
            timestamp: frame_index * 1000,
            picture_type: PictureType::P,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (mut sink, rx) = ChannelSink::unbounded();
        sink.write_packet(packet(0, b"a")).unwrap();
        sink.write_packet(packet(1, b"b")).unwrap();

        let indices: Vec<u64> = rx.try_iter().map(|p| p.frame_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_channel_sink_reports_disconnect() {
        let (mut sink, rx) = ChannelSink::bounded(1);
        drop(rx);
        assert!(matches!(
            sink.write_packet(packet(0, b"a")),
            Err(SinkError::Disconnected)
        ));
    }

    #[test]
    fn test_writer_sink_concatenates() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_packet(packet(0, b"\x00\x00\x01")).unwrap();
        sink.write_packet(packet(1, b"\x65")).unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.bytes_written(), 4);
        assert_eq!(sink.into_inner(), b"\x00\x00\x01\x65");
    }
}
