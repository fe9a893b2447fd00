//! Display client socket protocol.
//!
//! Every request starts with a two-byte ASCII header: the client kind
//! (`A` webserver, `B` appserver) followed by a command code. A custom
//! message request continues with a three-digit decimal length and the
//! message body `<type><duration code><text>`.
//!
//! Appserver clients read line by line, so every reply to them ends in `\n`.

use std::time::Duration;

use annunciator_core::{DisplayCode, DisplaySnapshot, DrumState};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown client code {0:?}")]
    UnknownClient(char),

    #[error("invalid message length field {0:?}")]
    BadLength(String),

    #[error("invalid custom message: {0}")]
    BadMessage(String),

    #[error("unknown duration code {0:?}")]
    BadDurationCode(char),

    #[error("request read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// Raw replies
    Webserver,
    /// Newline-terminated replies, `DONE` after message queries
    Appserver,
}

impl ClientKind {
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            b'A' => Ok(ClientKind::Webserver),
            b'B' => Ok(ClientKind::Appserver),
            other => Err(ProtocolError::UnknownClient(char::from(other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DisplayCustomMessage,
    DisplayDefault,
    QueryDisplay,
    Unknown(u8),
}

impl Command {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'1' => Command::DisplayCustomMessage,
            b'2' => Command::DisplayDefault,
            b'3' => Command::QueryDisplay,
            other => Command::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub client: ClientKind,
    pub command: Command,
}

impl CommandHeader {
    pub fn parse(bytes: [u8; 2]) -> Result<Self, ProtocolError> {
        Ok(Self {
            client: ClientKind::from_byte(bytes[0])?,
            command: Command::from_byte(bytes[1]),
        })
    }

    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut bytes = [0u8; 2];
        reader.read_exact(&mut bytes).await?;
        Self::parse(bytes)
    }
}

/// Everything the server ever writes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Nak,
    Busy,
    Alert,
    PowerCycle,
    Done,
    Text(String),
}

impl Reply {
    pub fn as_str(&self) -> &str {
        match self {
            Reply::Ack => "ACK",
            Reply::Nak => "NAK",
            Reply::Busy => "BUSY",
            Reply::Alert => "ALERT",
            Reply::PowerCycle => "POWERCYCLE",
            Reply::Done => "DONE",
            Reply::Text(text) => text,
        }
    }

    /// Bytes to write for `client`; `None` means the client kind was not
    /// recognised and the reply goes out raw.
    pub fn encode(&self, client: Option<ClientKind>) -> Vec<u8> {
        let mut bytes = self.as_str().as_bytes().to_vec();
        if client == Some(ClientKind::Appserver) {
            bytes.push(b'\n');
        }
        bytes
    }
}

/// Display time for a custom message duration code.
pub fn duration_for_code(code: char) -> Result<Duration, ProtocolError> {
    let minutes = match code {
        '0' => 5,
        '1' => 10,
        '2' => 30,
        other => return Err(ProtocolError::BadDurationCode(other)),
    };
    Ok(Duration::from_secs(minutes * 60))
}

/// Body of a display-custom-message request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomMessage {
    pub display: DisplayCode,
    pub duration: Duration,
    pub text: String,
}

impl CustomMessage {
    /// Parse `<type><duration code><text>`.
    pub fn parse(body: &str) -> Result<Self, ProtocolError> {
        let mut chars = body.chars();
        let (Some(kind), Some(duration)) = (chars.next(), chars.next()) else {
            return Err(ProtocolError::BadMessage(format!("body too short: {body:?}")));
        };

        let display = kind
            .to_digit(10)
            .and_then(|digit| u8::try_from(digit).ok())
            .and_then(DisplayCode::from_code)
            .filter(|display| display.is_custom_message())
            .ok_or_else(|| ProtocolError::BadMessage(format!("unknown message type {kind:?}")))?;

        Ok(Self {
            display,
            duration: duration_for_code(duration)?,
            text: chars.as_str().to_string(),
        })
    }

    /// Read the three-digit length and the body that follows the header.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut len_field = [0u8; 3];
        reader.read_exact(&mut len_field).await?;
        let len_text = String::from_utf8_lossy(&len_field).into_owned();
        let len: usize = len_text
            .trim()
            .parse()
            .map_err(|_| ProtocolError::BadLength(len_text.clone()))?;

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        let body = String::from_utf8(body)
            .map_err(|e| ProtocolError::BadMessage(format!("body is not UTF-8: {e}")))?;
        Self::parse(&body)
    }
}

/// Query reply for the drums display: each position's stage code, or
/// `kind,start,duration,details` while a timer is active, joined by `_`.
pub fn drum_summary(drums: &[DrumState]) -> String {
    drums
        .iter()
        .map(|drum| {
            if drum.timer.is_active() {
                format!(
                    "{},{},{},{}",
                    drum.timer.kind.code(),
                    drum.timer.start_text(),
                    drum.timer.duration_minutes,
                    drum.timer.details
                )
            } else {
                drum.stage.code().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Full reply sequence for a query-current-display request.
pub fn query_replies(client: ClientKind, snapshot: &DisplaySnapshot) -> Vec<Reply> {
    let mut replies = vec![Reply::Text(snapshot.display.code().to_string())];
    if snapshot.display == DisplayCode::Drums {
        replies.push(Reply::Text(drum_summary(&snapshot.drums)));
    } else {
        replies.push(Reply::Text(snapshot.message.clone()));
        if client == ClientKind::Appserver {
            replies.push(Reply::Done);
        }
    }
    replies
}
