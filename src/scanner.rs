// scanner.rs — Malware gate backed by clamd.
//
// Speaks the clamd wire protocol directly: null-terminated z-commands, and
// INSTREAM chunks framed with a 4-byte big-endian length (zero-length chunk
// terminates the stream). Connects to the local unix socket first, then
// falls back to TCP, mirroring the usual clamd client setup.

use std::fs::File;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use crate::config;
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanVerdict {
    pub infected_files: u32,
}

impl ScanVerdict {
    pub fn is_clean(&self) -> bool {
        self.infected_files == 0
    }
}

pub trait Screener {
    /// Scan a repository's local artifact. An unreachable scanner is an
    /// error, never a clean verdict.
    fn scan(&self, repo_id: &str, artifact: &Path) -> Result<ScanVerdict>;

    /// Availability probe.
    fn ping(&self) -> Result<()>;
}

trait Stream: Read + Write {}
impl<T: Read + Write> Stream for T {}

pub struct ClamdScreener;

impl ClamdScreener {
    pub fn new() -> Self {
        Self
    }

    fn connect() -> Result<Box<dyn Stream>> {
        let timeout = Some(Duration::from_secs(config::scanner::IO_TIMEOUT_SECS));

        #[cfg(unix)]
        {
            use std::os::unix::net::UnixStream;
            match UnixStream::connect(config::scanner::CLAMD_UNIX_SOCKET) {
                Ok(stream) => {
                    stream.set_read_timeout(timeout).map_err(scanner_io)?;
                    stream.set_write_timeout(timeout).map_err(scanner_io)?;
                    return Ok(Box::new(stream));
                }
                Err(e) => {
                    log::debug!(
                        "clamd unix socket {} unavailable: {e}",
                        config::scanner::CLAMD_UNIX_SOCKET
                    );
                }
            }
        }

        let stream =
            TcpStream::connect(config::scanner::CLAMD_TCP_ADDR).map_err(|e| {
                SyncError::ScannerUnavailable {
                    message: format!(
                        "cannot reach clamd at {} or {}: {e}",
                        config::scanner::CLAMD_UNIX_SOCKET,
                        config::scanner::CLAMD_TCP_ADDR
                    ),
                }
            })?;
        stream.set_read_timeout(timeout).map_err(scanner_io)?;
        stream.set_write_timeout(timeout).map_err(scanner_io)?;
        Ok(Box::new(stream))
    }
}

impl Screener for ClamdScreener {
    fn scan(&self, repo_id: &str, artifact: &Path) -> Result<ScanVerdict> {
        let mut conn = Self::connect()?;
        conn.write_all(b"zINSTREAM\0").map_err(scanner_io)?;

        let mut file = File::open(artifact).map_err(|e| SyncError::io(artifact, e))?;
        let mut buffer = vec![0u8; config::scanner::INSTREAM_CHUNK_BYTES];
        loop {
            let n = file.read(&mut buffer).map_err(|e| SyncError::io(artifact, e))?;
            if n == 0 {
                break;
            }
            conn.write_all(&(n as u32).to_be_bytes()).map_err(scanner_io)?;
            conn.write_all(&buffer[..n]).map_err(scanner_io)?;
        }
        // Zero-length chunk ends the stream.
        conn.write_all(&0u32.to_be_bytes()).map_err(scanner_io)?;
        conn.flush().map_err(scanner_io)?;

        let reply = read_reply(&mut conn)?;
        let infected_files = parse_scan_reply(&reply)?;
        if infected_files > 0 {
            log::warn!("clamd flagged {repo_id}: {}", reply.trim());
        }
        Ok(ScanVerdict { infected_files })
    }

    fn ping(&self) -> Result<()> {
        let mut conn = Self::connect()?;
        conn.write_all(b"zPING\0").map_err(scanner_io)?;
        conn.flush().map_err(scanner_io)?;

        let reply = read_reply(&mut conn)?;
        if reply.trim() == "PONG" {
            Ok(())
        } else {
            Err(SyncError::ScannerUnavailable {
                message: format!("unexpected PING reply: {reply:?}"),
            })
        }
    }
}

fn scanner_io(e: std::io::Error) -> SyncError {
    SyncError::ScannerUnavailable {
        message: format!("clamd I/O failed: {e}"),
    }
}

// Replies are terminated with NUL for z-commands; read up to that or EOF.
fn read_reply<R: Read>(conn: &mut R) -> Result<String> {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match conn.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                if byte[0] == 0 {
                    break;
                }
                raw.push(byte[0]);
            }
            Err(e) => {
                return Err(SyncError::ScannerUnavailable {
                    message: format!("failed reading clamd reply: {e}"),
                })
            }
        }
    }
    String::from_utf8(raw).map_err(|e| SyncError::ScannerUnavailable {
        message: format!("clamd reply is not UTF-8: {e}"),
    })
}

/// INSTREAM replies: `stream: OK`, `stream: <signature> FOUND`, or an
/// `ERROR` line. An ERROR reply is a scanner failure, not a verdict.
fn parse_scan_reply(reply: &str) -> Result<u32> {
    let reply = reply.trim();
    if reply.ends_with("OK") {
        return Ok(0);
    }
    if reply.ends_with("FOUND") {
        return Ok(1);
    }
    Err(SyncError::ScannerUnavailable {
        message: format!("clamd error reply: {reply}"),
    })
}
