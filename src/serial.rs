//! Serial link to the lock controller.
//!
//! The controller is a line-oriented serial device: it emits newline-
//! terminated event tokens (motion) and accepts newline-terminated command
//! tokens (servo). The device node is opened as a plain file in
//! non-blocking mode; line speed is left to the platform (`stty`). All I/O
//! is best-effort: an absent or failing link degrades to logged no-ops,
//! never to an error surfaced at an endpoint.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

const UNLOCK_COMMAND: &[u8] = b"SERVO_ON\n";
const LOCK_COMMAND: &[u8] = b"SERVO_LOCK\n";

/// Line-oriented event input from the serial controller.
pub trait MotionPort: Send {
    /// Read one newline-terminated token if buffered input is available.
    ///
    /// `Ok(None)` means no complete line is pending; the caller polls again
    /// later.
    fn poll_line(&mut self) -> Result<Option<String>>;
}

/// Open serial connection, read side.
///
/// Buffers raw bytes and hands out complete lines; a partial line stays
/// buffered until its terminator arrives.
pub struct SerialLink {
    file: File,
    buffer: Vec<u8>,
}

impl SerialLink {
    /// Open the serial device read/write, non-blocking.
    pub fn open<P: AsRef<Path>>(device: P) -> Result<Self> {
        let device = device.as_ref();
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NONBLOCK);
        }
        let file = options
            .open(device)
            .with_context(|| format!("failed to open serial device {}", device.display()))?;
        Ok(Self {
            file,
            buffer: Vec::new(),
        })
    }

    /// Clone the underlying handle for the command (write) side.
    pub fn writer(&self) -> Result<File> {
        self.file
            .try_clone()
            .context("failed to clone serial handle")
    }
}

impl MotionPort for SerialLink {
    fn poll_line(&mut self) -> Result<Option<String>> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line).trim().to_string();
                if text.is_empty() {
                    continue;
                }
                return Ok(Some(text));
            }

            match self.file.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(err).context("read serial device"),
            }
        }
    }
}

/// Command (write) side of the lock controller.
///
/// Cloneable handle around the shared serial writer. Commands are
/// fire-and-forget single tokens; there is no acknowledgment protocol, and
/// writes from different triggers are not ordered against each other.
#[derive(Clone)]
pub struct DoorLock {
    port: Arc<Mutex<Option<File>>>,
}

impl DoorLock {
    pub fn new(port: File) -> Self {
        Self {
            port: Arc::new(Mutex::new(Some(port))),
        }
    }

    /// A lock with no serial link; every command is a logged no-op.
    pub fn disconnected() -> Self {
        Self {
            port: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub fn unlock(&self) {
        self.send(UNLOCK_COMMAND, "unlock");
    }

    pub fn lock(&self) {
        self.send(LOCK_COMMAND, "lock");
    }

    fn send(&self, command: &[u8], action: &str) {
        let mut guard = match self.port.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("serial port lock poisoned, {action} command dropped");
                return;
            }
        };
        let Some(port) = guard.as_mut() else {
            log::warn!("serial link absent, {action} command dropped");
            return;
        };
        match port.write_all(command).and_then(|_| port.flush()) {
            Ok(()) => log::info!("{action} command sent to lock controller"),
            Err(err) => log::error!("failed to send {action} command: {err}"),
        }
    }
}
