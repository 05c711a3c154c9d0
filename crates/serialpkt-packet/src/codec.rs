use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::engine::{EngineEvent, PacketizingEngine};

/// `tokio_util` decoder that runs a [`PacketizingEngine`] over an `AsyncRead`.
///
/// Every byte read is consumed immediately; buffering happens inside the
/// engine's per-descriptor receive buffers. Items are the engine's events, so
/// overflows and evaluation failures reach the stream consumer too.
pub struct PacketCodec<U = ()> {
    engine: PacketizingEngine<U>,
    pending: VecDeque<EngineEvent<U>>,
}

impl<U> PacketCodec<U> {
    pub fn new(engine: PacketizingEngine<U>) -> Self {
        Self {
            engine,
            pending: VecDeque::new(),
        }
    }

    pub fn engine(&self) -> &PacketizingEngine<U> {
        &self.engine
    }

    /// Mutable access, e.g. to register descriptors while the stream runs.
    pub fn engine_mut(&mut self) -> &mut PacketizingEngine<U> {
        &mut self.engine
    }

    pub fn into_engine(self) -> PacketizingEngine<U> {
        self.engine
    }
}

impl<U> Decoder for PacketCodec<U> {
    type Item = EngineEvent<U>;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let chunk = src.split();
        self.pending.extend(self.engine.process(&chunk));
        Ok(self.pending.pop_front())
    }
}
