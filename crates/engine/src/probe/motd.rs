//! MOTD probe — queries the game server over UDP and looks for the
//! verification token in its message of the day.
//!
//! Wire format (little-endian):
//!
//! ```text
//! request:  "HYQUERY\0" | type (1 byte, 0x00 = info)
//! response: "HYREPLY\0" | type (1 byte)
//!           | name: u16 len + utf8 | motd: u16 len + utf8
//!           | online: i32 | max: i32 | port: i32
//!           | version: u16 len + utf8
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use holist_core::host::strip_port;
use holist_core::VerificationMethod;
use holist_storage::{ServerRecord, UserRecord};

use super::{Probe, ProbeFailure, ProbeOutcome};

const QUERY_MAGIC: &[u8; 8] = b"HYQUERY\0";
const REPLY_MAGIC: &[u8; 8] = b"HYREPLY\0";
const TYPE_INFO: u8 = 0x00;
const MAX_REPLY_BYTES: usize = 2048;

/// Fields of an info reply the probe cares about.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct InfoReply {
    pub name: String,
    pub motd: String,
    pub online: i32,
    pub max: i32,
    pub port: i32,
    pub version: String,
}

pub(crate) fn build_info_query() -> [u8; 9] {
    let mut query = [0u8; 9];
    query[..8].copy_from_slice(QUERY_MAGIC);
    query[8] = TYPE_INFO;
    query
}

fn read_string<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a str, String> {
    let len_end = pos
        .checked_add(2)
        .filter(|end| *end <= buf.len())
        .ok_or("truncated string length")?;
    let len = u16::from_le_bytes([buf[*pos], buf[*pos + 1]]) as usize;
    *pos = len_end;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or("truncated string payload")?;
    let s = std::str::from_utf8(&buf[*pos..end]).map_err(|_| "string is not utf-8")?;
    *pos = end;
    Ok(s)
}

fn read_i32(buf: &[u8], pos: &mut usize) -> Result<i32, String> {
    let end = pos
        .checked_add(4)
        .filter(|end| *end <= buf.len())
        .ok_or("truncated integer field")?;
    let value = i32::from_le_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos = end;
    Ok(value)
}

pub(crate) fn parse_info_reply(buf: &[u8]) -> Result<InfoReply, String> {
    if buf.len() < 9 {
        return Err("reply shorter than header".to_string());
    }
    if &buf[..8] != REPLY_MAGIC {
        return Err("bad reply magic".to_string());
    }
    if buf[8] != TYPE_INFO {
        return Err(format!("unexpected reply type {:#04x}", buf[8]));
    }
    let mut pos = 9;
    let name = read_string(buf, &mut pos)?.to_string();
    let motd = read_string(buf, &mut pos)?.to_string();
    let online = read_i32(buf, &mut pos)?;
    let max = read_i32(buf, &mut pos)?;
    let port = read_i32(buf, &mut pos)?;
    let version = read_string(buf, &mut pos)?.to_string();
    Ok(InfoReply {
        name,
        motd,
        online,
        max,
        port,
        version,
    })
}

/// Probe that reads the server's live MOTD over the query protocol.
pub struct MotdProbe {
    timeout: Duration,
}

impl MotdProbe {
    pub fn new(timeout_secs: u64) -> Self {
        MotdProbe {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    async fn query_motd(&self, host: &str, port: u16) -> Result<InfoReply, ProbeOutcome> {
        let unreachable = |e: std::io::Error| ProbeOutcome::Failed {
            reason: ProbeFailure::NetworkUnreachable,
            message: format!("could not reach {}:{}: {}", host, port, e),
        };

        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(unreachable)?;
        socket.connect((host, port)).await.map_err(unreachable)?;
        socket
            .send(&build_info_query())
            .await
            .map_err(unreachable)?;

        let mut buf = [0u8; MAX_REPLY_BYTES];
        let n = match tokio::time::timeout(self.timeout, socket.recv(&mut buf)).await {
            Err(_) => {
                return Err(ProbeOutcome::Failed {
                    reason: ProbeFailure::Timeout,
                    message: format!(
                        "no query reply from {}:{} within {}s",
                        host,
                        port,
                        self.timeout.as_secs()
                    ),
                })
            }
            Ok(Err(e)) => return Err(unreachable(e)),
            Ok(Ok(n)) => n,
        };

        parse_info_reply(&buf[..n]).map_err(|e| ProbeOutcome::Failed {
            reason: ProbeFailure::ProtocolError,
            message: format!("malformed query reply from {}:{}: {}", host, port, e),
        })
    }
}

#[async_trait]
impl Probe for MotdProbe {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::Motd
    }

    fn unavailable_reason(
        &self,
        _server: &ServerRecord,
        _user: Option<&UserRecord>,
    ) -> Option<String> {
        // Any listed server can be queried.
        None
    }

    async fn probe(&self, server: &ServerRecord, token: &str) -> ProbeOutcome {
        let host = strip_port(&server.host);
        let reply = match self.query_motd(&host, server.port).await {
            Ok(reply) => reply,
            Err(outcome) => return outcome,
        };

        // The token may be embedded in either advertised string; some
        // server software only exposes the name for editing.
        if reply.motd.contains(token) || reply.name.contains(token) {
            ProbeOutcome::Verified {
                message: "verification token found in the server MOTD".to_string(),
            }
        } else {
            ProbeOutcome::Failed {
                reason: ProbeFailure::TokenMismatch,
                message: "the server answered but its MOTD does not contain the verification token"
                    .to_string(),
            }
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn push_string(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    fn reply(name: &str, motd: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(REPLY_MAGIC);
        buf.push(TYPE_INFO);
        push_string(&mut buf, name);
        push_string(&mut buf, motd);
        buf.extend_from_slice(&12i32.to_le_bytes());
        buf.extend_from_slice(&100i32.to_le_bytes());
        buf.extend_from_slice(&5520i32.to_le_bytes());
        push_string(&mut buf, "0.9.3");
        buf
    }

    #[test]
    fn info_query_wire_shape() {
        let query = build_info_query();
        assert_eq!(&query[..8], b"HYQUERY\0");
        assert_eq!(query[8], 0x00);
    }

    #[test]
    fn parses_well_formed_reply() {
        let buf = reply("Skyfall", "Welcome! hol-ABC123");
        let info = parse_info_reply(&buf).unwrap();
        assert_eq!(info.name, "Skyfall");
        assert_eq!(info.motd, "Welcome! hol-ABC123");
        assert_eq!(info.online, 12);
        assert_eq!(info.max, 100);
        assert_eq!(info.port, 5520);
        assert_eq!(info.version, "0.9.3");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = reply("s", "m");
        buf[0] = b'X';
        assert!(parse_info_reply(&buf).is_err());
    }

    #[test]
    fn rejects_unexpected_type() {
        let mut buf = reply("s", "m");
        buf[8] = 0x7f;
        assert!(parse_info_reply(&buf).is_err());
    }

    #[test]
    fn rejects_truncated_reply() {
        let buf = reply("Skyfall", "long motd text here");
        for cut in [0, 5, 9, 10, buf.len() - 8] {
            assert!(parse_info_reply(&buf[..cut]).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn rejects_length_overflow() {
        let mut buf = Vec::new();
        buf.extend_from_slice(REPLY_MAGIC);
        buf.push(TYPE_INFO);
        buf.extend_from_slice(&u16::MAX.to_le_bytes());
        buf.extend_from_slice(b"short");
        assert!(parse_info_reply(&buf).is_err());
    }

    #[tokio::test]
    async fn live_probe_round_trip() {
        // Stand up a fake game server on a loopback UDP socket.
        let server_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server_sock.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (n, peer) = server_sock.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &build_info_query());
            server_sock
                .send_to(&reply("Skyfall", "MOTD with tok-XYZ"), peer)
                .await
                .unwrap();
        });

        let server = ServerRecord {
            id: "s1".to_string(),
            name: "Skyfall".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            website_url: None,
            owner_id: None,
            owner_username: None,
            verified_at: None,
            verification_method: None,
            version: 0,
        };

        let probe = MotdProbe::new(2);
        match probe.probe(&server, "tok-XYZ").await {
            ProbeOutcome::Verified { .. } => {}
            other => panic!("expected Verified, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn live_probe_accepts_token_in_server_name() {
        let server_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server_sock.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, peer) = server_sock.recv_from(&mut buf).await.unwrap();
            server_sock
                .send_to(&reply("Skyfall tok-XYZ", "plain motd"), peer)
                .await
                .unwrap();
        });

        let server = ServerRecord {
            id: "s1".to_string(),
            name: "Skyfall".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            website_url: None,
            owner_id: None,
            owner_username: None,
            verified_at: None,
            verification_method: None,
            version: 0,
        };

        let probe = MotdProbe::new(2);
        match probe.probe(&server, "tok-XYZ").await {
            ProbeOutcome::Verified { .. } => {}
            other => panic!("expected Verified, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn live_probe_token_mismatch() {
        let server_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server_sock.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, peer) = server_sock.recv_from(&mut buf).await.unwrap();
            server_sock
                .send_to(&reply("Skyfall", "no token here"), peer)
                .await
                .unwrap();
        });

        let server = ServerRecord {
            id: "s1".to_string(),
            name: "Skyfall".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            website_url: None,
            owner_id: None,
            owner_username: None,
            verified_at: None,
            verification_method: None,
            version: 0,
        };

        let probe = MotdProbe::new(2);
        match probe.probe(&server, "tok-XYZ").await {
            ProbeOutcome::Failed {
                reason: ProbeFailure::TokenMismatch,
                ..
            } => {}
            other => panic!("expected TokenMismatch, got {:?}", other),
        }
    }
}
