// This is the JACKIE wire protocol: one space-separated text line per message,
// `JACKIE <ACTION> <args...>\n`, sharing the listening port with HTTP.
// Every message goes out on a fresh TCP connection that is closed right after.

use crate::core::{Block, Blockchain, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{decode_b64_json, encode_b64_json, trim_nul};
use log::debug;
use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

pub const PROTOCOL_TAG: &str = "JACKIE";
/// Size of the first read used to tell HTTP and JACKIE apart.
pub const FIRST_CHUNK_SIZE: usize = 1024;
/// Largest JACKIE frame accepted; a full chain download must fit.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
const TCP_WRITE_TIMEOUT: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Connect,
    ConnectOk,
    ConnectLoopback,
    Disconnect,
    Message,
    TxApprobation,
    TxApprobationOk,
    TxApprobationFail,
    DownloadBlockchain,
    DownloadBlockchainOk,
    SyncUptime,
    SyncUptimeOk,
    BlockApprobation,
}

impl Action {
    pub const ALL: [Action; 13] = [
        Action::Connect,
        Action::ConnectOk,
        Action::ConnectLoopback,
        Action::Disconnect,
        Action::Message,
        Action::TxApprobation,
        Action::TxApprobationOk,
        Action::TxApprobationFail,
        Action::DownloadBlockchain,
        Action::DownloadBlockchainOk,
        Action::SyncUptime,
        Action::SyncUptimeOk,
        Action::BlockApprobation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Connect => "CONNECT",
            Action::ConnectOk => "CONNECT_OK",
            Action::ConnectLoopback => "CONNECT_LOOPBACK",
            Action::Disconnect => "DISCONNECT",
            Action::Message => "MESSAGE",
            Action::TxApprobation => "TX_APPROBATION",
            Action::TxApprobationOk => "TX_APPROBATION_OK",
            Action::TxApprobationFail => "TX_APPROBATION_FAIL",
            Action::DownloadBlockchain => "DOWNLOAD_BLOCKCHAIN",
            Action::DownloadBlockchainOk => "DOWNLOAD_BLOCKCHAIN_OK",
            Action::SyncUptime => "SYNC_UPTIME",
            Action::SyncUptimeOk => "SYNC_UPTIME_OK",
            Action::BlockApprobation => "BLOCK_APPROBATION",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<Self> {
        let s = trim_nul(s);
        Action::ALL
            .iter()
            .find(|action| action.as_str() == s)
            .copied()
            .ok_or_else(|| BlockchainError::Protocol(format!("Unknown action: {s}")))
    }
}

/// A decoded protocol message. Payload arguments are already parsed out of
/// their base64 JSON form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Connect { id: String, host: String, port: u16 },
    ConnectOk { id: String },
    ConnectLoopback { id: String, host: String, port: u16 },
    Disconnect { id: String },
    Text { text: String },
    TxApprobation { id: String, tx: Transaction },
    TxApprobationOk { jury: String, tx: Transaction },
    TxApprobationFail { jury: String, tx: Transaction },
    DownloadBlockchain { id: String },
    DownloadBlockchainOk { id: String, chain: Blockchain },
    SyncUptime { id: String },
    SyncUptimeOk { id: String, uptime: u64 },
    BlockApprobation { id: String, block: Block },
}

impl Message {
    pub fn action(&self) -> Action {
        match self {
            Message::Connect { .. } => Action::Connect,
            Message::ConnectOk { .. } => Action::ConnectOk,
            Message::ConnectLoopback { .. } => Action::ConnectLoopback,
            Message::Disconnect { .. } => Action::Disconnect,
            Message::Text { .. } => Action::Message,
            Message::TxApprobation { .. } => Action::TxApprobation,
            Message::TxApprobationOk { .. } => Action::TxApprobationOk,
            Message::TxApprobationFail { .. } => Action::TxApprobationFail,
            Message::DownloadBlockchain { .. } => Action::DownloadBlockchain,
            Message::DownloadBlockchainOk { .. } => Action::DownloadBlockchainOk,
            Message::SyncUptime { .. } => Action::SyncUptime,
            Message::SyncUptimeOk { .. } => Action::SyncUptimeOk,
            Message::BlockApprobation { .. } => Action::BlockApprobation,
        }
    }

    fn args(&self) -> Result<Vec<String>> {
        let args = match self {
            Message::Connect { id, host, port } | Message::ConnectLoopback { id, host, port } => {
                vec![id.clone(), host.clone(), port.to_string()]
            }
            Message::ConnectOk { id }
            | Message::Disconnect { id }
            | Message::DownloadBlockchain { id }
            | Message::SyncUptime { id } => vec![id.clone()],
            Message::Text { text } => vec![text.clone()],
            Message::TxApprobation { id, tx }
            | Message::TxApprobationOk { jury: id, tx }
            | Message::TxApprobationFail { jury: id, tx } => {
                vec![id.clone(), encode_b64_json(tx)?]
            }
            Message::DownloadBlockchainOk { id, chain } => vec![id.clone(), encode_b64_json(chain)?],
            Message::SyncUptimeOk { id, uptime } => vec![id.clone(), uptime.to_string()],
            Message::BlockApprobation { id, block } => vec![id.clone(), encode_b64_json(block)?],
        };
        Ok(args)
    }

    /// The full frame, newline included.
    pub fn encode(&self) -> Result<String> {
        let mut frame = format!("{PROTOCOL_TAG} {}", self.action());
        for arg in self.args()? {
            frame.push(' ');
            frame.push_str(&arg);
        }
        frame.push('\n');
        Ok(frame)
    }

    pub fn decode(frame: &str) -> Result<Message> {
        let line = trim_nul(frame).trim_end_matches(['\r', '\n']);
        let rest = line
            .strip_prefix(PROTOCOL_TAG)
            .filter(|rest| rest.is_empty() || rest.starts_with(' '))
            .ok_or_else(|| BlockchainError::Protocol("Not a JACKIE message".to_string()))?
            .trim_start();

        let (action, rest) = match rest.split_once(' ') {
            Some((action, rest)) => (action, rest),
            None => (rest, ""),
        };
        let action = Action::from_str(action)?;

        // Free text keeps its spacing, everything else is whitespace separated
        let args: Vec<&str> = rest.split_whitespace().map(trim_nul).collect();
        let arg = |index: usize| -> Result<String> {
            args.get(index).map(|arg| arg.to_string()).ok_or_else(|| {
                BlockchainError::Protocol(format!(
                    "{action} expects at least {} arguments, got {}",
                    index + 1,
                    args.len()
                ))
            })
        };
        let port = |index: usize| -> Result<u16> {
            arg(index)?
                .parse::<u16>()
                .map_err(|e| BlockchainError::Protocol(format!("Invalid port for {action}: {e}")))
        };

        let message = match action {
            Action::Connect => Message::Connect {
                id: arg(0)?,
                host: arg(1)?,
                port: port(2)?,
            },
            Action::ConnectLoopback => Message::ConnectLoopback {
                id: arg(0)?,
                host: arg(1)?,
                port: port(2)?,
            },
            Action::ConnectOk => Message::ConnectOk { id: arg(0)? },
            Action::Disconnect => Message::Disconnect { id: arg(0)? },
            Action::TxApprobation => Message::TxApprobation {
                id: arg(0)?,
                tx: decode_b64_json(&arg(1)?)?,
            },
            Action::TxApprobationOk => Message::TxApprobationOk {
                jury: arg(0)?,
                tx: decode_b64_json(&arg(1)?)?,
            },
            Action::TxApprobationFail => Message::TxApprobationFail {
                jury: arg(0)?,
                tx: decode_b64_json(&arg(1)?)?,
            },
            Action::DownloadBlockchain => Message::DownloadBlockchain { id: arg(0)? },
            Action::DownloadBlockchainOk => Message::DownloadBlockchainOk {
                id: arg(0)?,
                chain: decode_b64_json(&arg(1)?)?,
            },
            Action::SyncUptime => Message::SyncUptime { id: arg(0)? },
            Action::SyncUptimeOk => Message::SyncUptimeOk {
                id: arg(0)?,
                uptime: arg(1)?.parse::<u64>().map_err(|e| {
                    BlockchainError::Protocol(format!("Invalid uptime for {action}: {e}"))
                })?,
            },
            Action::BlockApprobation => Message::BlockApprobation {
                id: arg(0)?,
                block: decode_b64_json(&arg(1)?)?,
            },
            Action::Message => Message::Text {
                text: rest.to_string(),
            },
        };
        Ok(message)
    }
}

/// Whether the first chunk of a connection starts with an HTTP request line
/// (`METHOD SP TARGET SP HTTP/x.y`).
pub fn is_http(chunk: &[u8]) -> bool {
    let end = chunk
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(chunk.len());
    let line = match std::str::from_utf8(&chunk[..end]) {
        Ok(line) => line.trim_end_matches('\r'),
        Err(_) => return false,
    };

    let mut parts = line.split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version), None) => {
            !method.is_empty()
                && method.bytes().all(|b| b.is_ascii_uppercase())
                && !target.is_empty()
                && version.starts_with("HTTP/")
        }
        _ => false,
    }
}

/// Take the opening bytes of a connection off the socket: at least up to
/// the first newline, at most `FIRST_CHUNK_SIZE` bytes, or whatever arrived
/// before EOF. A request line split over several TCP segments comes back
/// whole, so `is_http` sees all of it.
pub fn read_opening<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut opening = Vec::with_capacity(FIRST_CHUNK_SIZE);
    let mut buf = [0u8; FIRST_CHUNK_SIZE];
    while opening.len() < FIRST_CHUNK_SIZE && !opening.contains(&b'\n') {
        let room = FIRST_CHUNK_SIZE - opening.len();
        let read = reader.read(&mut buf[..room])?;
        if read == 0 {
            break;
        }
        opening.extend_from_slice(&buf[..read]);
    }
    Ok(opening)
}

/// Read the rest of a JACKIE frame after `first` was already taken off the
/// socket. Stops at the first newline or at EOF.
pub fn read_frame<R: Read>(reader: &mut R, first: &[u8]) -> Result<String> {
    let mut frame = first.to_vec();
    let mut buf = [0u8; FIRST_CHUNK_SIZE];
    while !frame.contains(&b'\n') {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(BlockchainError::Protocol(format!(
                "Frame exceeds {MAX_FRAME_SIZE} bytes"
            )));
        }
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        frame.extend_from_slice(&buf[..read]);
    }

    if let Some(end) = frame.iter().position(|b| *b == b'\n') {
        frame.truncate(end + 1);
    }
    String::from_utf8(frame)
        .map_err(|e| BlockchainError::Protocol(format!("Frame is not valid UTF-8: {e}")))
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))?
        .next()
        .ok_or_else(|| BlockchainError::Network(format!("Address {addr} did not resolve")))
}

/// Deliver one message on a new connection and close it.
pub fn send(addr: &str, message: &Message) -> Result<()> {
    let socket_addr = resolve(addr)?;
    let frame = message.encode()?;
    debug!("Sending {} to {addr} ({} bytes)", message.action(), frame.len());

    let mut stream =
        TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_WRITE_TIMEOUT))
            .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;

    stream
        .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;

    stream
        .write_all(frame.as_bytes())
        .map_err(|e| BlockchainError::Network(format!("Failed to send data to {addr}: {e}")))?;
    let _ = stream.flush();
    let _ = stream.shutdown(Shutdown::Write);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TXOutput;
    use crate::wallet::Wallet;
    use std::io::Cursor;

    // Hands out at most `step` bytes per read, like a request split over
    // several TCP segments
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn trickle(data: &[u8], step: usize) -> Trickle {
        Trickle {
            data: data.to_vec(),
            pos: 0,
            step,
        }
    }

    fn signed_tx() -> Transaction {
        let alice = Wallet::new().unwrap();
        let input = TXOutput::new(&alice.get_address(), 5).unwrap().to_input();
        let outputs = vec![TXOutput::new("bob", 5).unwrap()];
        Transaction::new_signed_transaction(&alice, vec![input], outputs).unwrap()
    }

    #[test]
    fn test_action_names() {
        for action in Action::ALL {
            assert_eq!(Action::from_str(action.as_str()).unwrap(), action);
        }
        assert!(matches!(
            Action::from_str("PING"),
            Err(BlockchainError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_connect() {
        let message = Message::decode("JACKIE CONNECT abc 127.0.0.1 3000\n").unwrap();
        assert_eq!(
            message,
            Message::Connect {
                id: "abc".to_string(),
                host: "127.0.0.1".to_string(),
                port: 3000
            }
        );
    }

    #[test]
    fn test_decode_trims_nul_padding() {
        let mut raw = b"JACKIE DISCONNECT abc".to_vec();
        raw.resize(FIRST_CHUNK_SIZE, 0);
        let frame = String::from_utf8(raw).unwrap();

        assert_eq!(
            Message::decode(&frame).unwrap(),
            Message::Disconnect {
                id: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_decode_free_text_keeps_spacing() {
        let message = Message::decode("JACKIE MESSAGE node-1: hello  there\n").unwrap();
        assert_eq!(
            message,
            Message::Text {
                text: "node-1: hello  there".to_string()
            }
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(Message::decode("HELLO CONNECT a b 1").is_err());
        assert!(Message::decode("JACKIEX CONNECT a b 1").is_err());
        assert!(matches!(
            Message::decode("JACKIE UNKNOWN a"),
            Err(BlockchainError::Protocol(_))
        ));
        assert!(matches!(
            Message::decode("JACKIE CONNECT only-id"),
            Err(BlockchainError::Protocol(_))
        ));
        assert!(matches!(
            Message::decode("JACKIE CONNECT id host not-a-port"),
            Err(BlockchainError::Protocol(_))
        ));
        assert!(matches!(
            Message::decode("JACKIE TX_APPROBATION id %%%"),
            Err(BlockchainError::Serialization(_))
        ));
    }

    #[test]
    fn test_payload_messages_survive_encoding() {
        let tx = signed_tx();
        let mut chain = Blockchain::new(1, 10);
        let block = chain.mine_block("M").unwrap();

        let messages = vec![
            Message::TxApprobation {
                id: "a".to_string(),
                tx: tx.clone(),
            },
            Message::TxApprobationFail {
                jury: "b".to_string(),
                tx,
            },
            Message::DownloadBlockchainOk {
                id: "a".to_string(),
                chain,
            },
            Message::BlockApprobation {
                id: "a".to_string(),
                block,
            },
            Message::SyncUptimeOk {
                id: "a".to_string(),
                uptime: 42,
            },
        ];
        for message in messages {
            let frame = message.encode().unwrap();
            assert!(frame.ends_with('\n'));
            assert_eq!(frame.matches('\n').count(), 1);
            assert_eq!(Message::decode(&frame).unwrap(), message);
        }
    }

    #[test]
    fn test_is_http() {
        assert!(is_http(b"GET /chain HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert!(is_http(b"POST /transactions HTTP/1.0\r\n"));
        assert!(!is_http(b"JACKIE CONNECT a 127.0.0.1 3000\n"));
        assert!(!is_http(b"GET /chain\r\n"));
        assert!(!is_http(b""));
    }

    #[test]
    fn test_read_frame_past_first_chunk() {
        let mut chain = Blockchain::new(0, 10);
        for _ in 0..20 {
            chain.mine_block("M").unwrap();
        }
        let message = Message::DownloadBlockchainOk {
            id: "a".to_string(),
            chain,
        };
        let encoded = message.encode().unwrap();
        assert!(encoded.len() > FIRST_CHUNK_SIZE);

        let bytes = encoded.as_bytes();
        let (first, rest) = bytes.split_at(FIRST_CHUNK_SIZE);
        let frame = read_frame(&mut Cursor::new(rest.to_vec()), first).unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), message);
    }

    #[test]
    fn test_read_frame_accepts_eof_without_newline() {
        let frame = read_frame(&mut Cursor::new(b" abc".to_vec()), b"JACKIE CONNECT_OK").unwrap();
        assert_eq!(
            Message::decode(&frame).unwrap(),
            Message::ConnectOk {
                id: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_read_opening_gathers_split_request_line() {
        let mut reader = trickle(b"GET /chain HTTP/1.1\r\nHost: x\r\n\r\n", 7);
        let opening = read_opening(&mut reader).unwrap();

        assert!(opening.starts_with(b"GET /chain HTTP/1.1\r\n"));
        assert!(is_http(&opening));
    }

    #[test]
    fn test_read_opening_then_frame() {
        let mut reader = trickle(b"JACKIE DISCONNECT node-a\n", 3);
        let opening = read_opening(&mut reader).unwrap();
        assert!(!is_http(&opening));

        let frame = read_frame(&mut reader, &opening).unwrap();
        assert_eq!(
            Message::decode(&frame).unwrap(),
            Message::Disconnect {
                id: "node-a".to_string()
            }
        );
    }

    #[test]
    fn test_read_opening_stops_at_chunk_size() {
        let long = vec![b'x'; FIRST_CHUNK_SIZE * 2];
        let opening = read_opening(&mut Cursor::new(long)).unwrap();
        assert_eq!(opening.len(), FIRST_CHUNK_SIZE);
        assert!(read_opening(&mut Cursor::new(vec![])).unwrap().is_empty());
    }
}
