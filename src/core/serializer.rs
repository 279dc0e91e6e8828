use crate::core::protocol::Message;
use crate::utils::error::{Result, SparseError};
use serde::Serialize;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const END_MARKER: &str = "end";

/// Serializers this crate can speak on the multilang channel.
pub const SUPPORTED_SERIALIZERS: &[&str] = &["json", "msgpack"];

/// Wire format of the multilang channel, picked by `--serializer`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Serializer {
    /// JSON bodies, each followed by an `end` line.
    #[default]
    Json,
    /// Back-to-back msgpack maps with no extra framing.
    Msgpack,
}

impl Serializer {
    pub fn name(&self) -> &'static str {
        match self {
            Serializer::Json => "json",
            Serializer::Msgpack => "msgpack",
        }
    }
}

impl fmt::Display for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Serializer {
    type Err = SparseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Serializer::Json),
            "msgpack" => Ok(Serializer::Msgpack),
            other => Err(SparseError::InvalidConfigValueError {
                field: "serializer".to_string(),
                value: other.to_string(),
                reason: format!("Supported serializers: {}", SUPPORTED_SERIALIZERS.join(", ")),
            }),
        }
    }
}

/// Reads multilang messages in either wire format.
pub struct MessageReader<R> {
    reader: R,
    serializer: Serializer,
    line: String,
    pending: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_serializer(reader, Serializer::Json)
    }

    pub fn with_serializer(reader: R, serializer: Serializer) -> Self {
        Self {
            reader,
            serializer,
            line: String::new(),
            pending: Vec::new(),
        }
    }

    /// `Ok(None)` means the stream closed between messages.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        match self.serializer {
            Serializer::Json => self.read_json().await,
            Serializer::Msgpack => self.read_msgpack().await,
        }
    }

    async fn read_json(&mut self) -> Result<Option<Message>> {
        let mut body = String::new();

        loop {
            self.line.clear();
            let read = self.reader.read_line(&mut self.line).await?;
            if read == 0 {
                if body.trim().is_empty() {
                    return Ok(None);
                }
                return Err(SparseError::protocol(
                    "stream closed in the middle of a message",
                ));
            }

            let line = self.line.trim_end_matches(|c| c == '\r' || c == '\n');
            if line == END_MARKER {
                break;
            }
            if body.is_empty() && line.trim().is_empty() {
                continue;
            }
            body.push_str(line);
            body.push('\n');
        }

        if body.trim().is_empty() {
            return Err(SparseError::protocol("received an empty message"));
        }

        let message = serde_json::from_str(&body).map_err(|e| {
            SparseError::protocol(format!("invalid message {:?}: {}", body.trim(), e))
        })?;
        Ok(Some(message))
    }

    async fn read_msgpack(&mut self) -> Result<Option<Message>> {
        loop {
            if !self.pending.is_empty() {
                let mut cursor = Cursor::new(self.pending.as_slice());
                match rmp_serde::from_read::<_, Message>(&mut cursor) {
                    Ok(message) => {
                        let used = cursor.position() as usize;
                        self.pending.drain(..used);
                        return Ok(Some(message));
                    }
                    Err(e) if is_truncated(&e) => {}
                    Err(e) => {
                        return Err(SparseError::protocol(format!(
                            "invalid msgpack message: {}",
                            e
                        )))
                    }
                }
            }

            let chunk = self.reader.fill_buf().await?;
            if chunk.is_empty() {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Err(SparseError::protocol(
                    "stream closed in the middle of a message",
                ));
            }
            let read = chunk.len();
            self.pending.extend_from_slice(chunk);
            self.reader.consume(read);
        }
    }
}

fn is_truncated(error: &rmp_serde::decode::Error) -> bool {
    use rmp_serde::decode::Error;
    match error {
        Error::InvalidMarkerRead(e) | Error::InvalidDataRead(e) => {
            e.kind() == std::io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

/// Writes multilang messages in either wire format.
pub struct MessageWriter<W> {
    writer: W,
    serializer: Serializer,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_serializer(writer, Serializer::Json)
    }

    pub fn with_serializer(writer: W, serializer: Serializer) -> Self {
        Self { writer, serializer }
    }

    pub async fn send_message<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let frame = match self.serializer {
            Serializer::Json => {
                let mut frame = serde_json::to_vec(message)?;
                frame.extend_from_slice(b"\nend\n");
                frame
            }
            // Storm reads maps keyed by field name
            Serializer::Msgpack => rmp_serde::to_vec_named(message).map_err(|e| {
                SparseError::protocol(format!("cannot encode msgpack message: {}", e))
            })?,
        };
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{Command, PidReply};
    use serde_json::json;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reads_multiline_messages() {
        let input = "\n{\"command\":\n\"next\"}\nend\n{\"command\":\"ack\",\"id\":3}\nend\n";
        let mut reader = MessageReader::new(BufReader::new(input.as_bytes()));

        let first = reader.read_message().await.unwrap();
        assert_eq!(first, Some(Message::Command(Command::Next)));

        let second = reader.read_message().await.unwrap();
        assert_eq!(second, Some(Message::Command(Command::Ack { id: 3.into() })));

        assert_eq!(reader.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_message_is_an_error() {
        let mut reader = MessageReader::new(BufReader::new("{\"command\":\"next\"}\n".as_bytes()));
        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, SparseError::ProtocolError { .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_an_error() {
        let mut reader = MessageReader::new(BufReader::new("{not json\nend\n".as_bytes()));
        assert!(reader.read_message().await.is_err());
    }

    #[tokio::test]
    async fn test_writer_frames_messages() {
        let mock = tokio_test::io::Builder::new()
            .write(b"{\"pid\":42}\nend\n")
            .write(b"{\"command\":\"sync\"}\nend\n")
            .build();
        let mut writer = MessageWriter::new(mock);

        writer.send_message(&PidReply { pid: 42 }).await.unwrap();
        writer.send_message(&Command::Sync).await.unwrap();
    }

    #[test]
    fn test_serializer_names() {
        assert_eq!("json".parse::<Serializer>().unwrap(), Serializer::Json);
        assert_eq!("MsgPack".parse::<Serializer>().unwrap(), Serializer::Msgpack);
        assert!(matches!(
            "pickle".parse::<Serializer>(),
            Err(SparseError::InvalidConfigValueError { .. })
        ));
        for name in SUPPORTED_SERIALIZERS {
            assert_eq!(name.parse::<Serializer>().unwrap().name(), *name);
        }
    }

    #[tokio::test]
    async fn test_reads_back_to_back_msgpack_messages() {
        let mut input = rmp_serde::to_vec_named(&json!({"command": "next"})).unwrap();
        input.extend(
            rmp_serde::to_vec_named(&json!({
                "id": 7, "comp": "word_spout", "stream": "default", "task": 1, "tuple": ["cat"]
            }))
            .unwrap(),
        );
        // a tiny buffer makes every message arrive in pieces
        let reader = BufReader::with_capacity(4, input.as_slice());
        let mut reader = MessageReader::with_serializer(reader, Serializer::Msgpack);

        let first = reader.read_message().await.unwrap();
        assert_eq!(first, Some(Message::Command(Command::Next)));

        match reader.read_message().await.unwrap() {
            Some(Message::Tuple(tup)) => {
                assert_eq!(tup.id, Some(7.into()));
                assert_eq!(tup.tuple, vec![json!("cat")]);
            }
            other => panic!("expected a tuple, got {:?}", other),
        }
        assert_eq!(reader.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_msgpack_is_an_error() {
        let mut input = rmp_serde::to_vec_named(&json!({"command": "ack", "id": 3})).unwrap();
        input.pop();
        let mut reader =
            MessageReader::with_serializer(BufReader::new(input.as_slice()), Serializer::Msgpack);
        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, SparseError::ProtocolError { .. }));
    }

    #[tokio::test]
    async fn test_msgpack_writer_uses_named_fields() {
        let mut writer = MessageWriter::with_serializer(Vec::new(), Serializer::Msgpack);
        writer.send_message(&Command::Ack { id: 3.into() }).await.unwrap();
        writer.send_message(&PidReply { pid: 42 }).await.unwrap();

        let bytes = writer.into_inner();
        let mut cursor = std::io::Cursor::new(bytes.as_slice());
        let ack: serde_json::Value = rmp_serde::from_read(&mut cursor).unwrap();
        let pid: serde_json::Value = rmp_serde::from_read(&mut cursor).unwrap();
        assert_eq!(ack, json!({"command": "ack", "id": 3}));
        assert_eq!(pid, json!({"pid": 42}));
    }
}
