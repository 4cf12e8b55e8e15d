//! Wire framing shared by both IPC channels: a 4-byte big-endian length
//! prefix followed by a UTF-8 JSON body (C12).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Envelope carried over either transport: fast channel or durable queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: Value,
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(message_type: &str, payload: Value, timestamp: i64) -> Self {
        Envelope {
            id: Uuid::new_v4(),
            message_type: message_type.to_string(),
            payload,
            timestamp,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let body = serde_json::to_vec(self)?;
        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Synchronous framing for the blocking fast channel: used directly from
/// worker threads, never inside a tokio reactor.
pub mod blocking {
    use std::io::{self, Read, Write};

    pub fn write_frame<W: Write>(w: &mut W, body: &[u8]) -> io::Result<()> {
        w.write_all(&(body.len() as u32).to_be_bytes())?;
        w.write_all(body)?;
        w.flush()
    }

    pub fn read_frame<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        r.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        r.read_exact(&mut body)?;
        Ok(body)
    }
}

/// Async framing for the persistence process's socket listener.
pub async fn read_frame_async<R: AsyncReadExt + Unpin>(r: &mut R) -> std::io::Result<Vec<u8>> {
    let len = r.read_u32().await?;
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body).await?;
    Ok(body)
}

pub async fn write_frame_async<W: AsyncWriteExt + Unpin>(
    w: &mut W,
    body: &[u8],
) -> std::io::Result<()> {
    w.write_u32(body.len() as u32).await?;
    w.write_all(body).await?;
    w.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips_through_encode_decode() {
        let env = Envelope::new("candle_closed", json!({"symbol": "BTCUSDT"}), 1_000);
        let framed = env.encode().unwrap();

        let len = u32::from_be_bytes(framed[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, framed.len() - 4);

        let decoded = Envelope::decode(&framed[4..]).unwrap();
        assert_eq!(decoded.message_type, "candle_closed");
        assert_eq!(decoded.payload["symbol"], "BTCUSDT");
    }

    #[test]
    fn blocking_frame_round_trips_over_a_cursor() {
        let mut buf = Vec::new();
        blocking::write_frame(&mut buf, b"hello").unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let body = blocking::read_frame(&mut cursor).unwrap();
        assert_eq!(body, b"hello");
    }
}
