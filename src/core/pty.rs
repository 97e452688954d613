//! PTY handle
//!
//! Owns one pseudo-terminal pair and the attached child process: raw byte
//! write, resize, exit polling, and a dedicated reader thread draining child
//! output into a bounded channel.

use std::io::Read;
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;

/// Capacity of the per-session output channel, in read chunks. A session
/// whose output is not being drained (e.g. while unobserved in grid mode and
/// the terminal writer stalls) blocks its own reader thread here instead of
/// growing without bound or stalling the process.
const OUTPUT_CHANNEL_CHUNKS: usize = 128;

const READ_BUF_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to resize PTY: {0}")]
    Resize(String),
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// A pseudo-terminal pair with an attached child process.
///
/// Dropping the handle terminates the child if still alive, closes the PTY,
/// and joins the reader thread — release is guaranteed on every exit path,
/// including unwinding.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn std::io::Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    output_rx: Option<Receiver<Vec<u8>>>,
    reader_thread: Option<JoinHandle<()>>,
    rows: u16,
    cols: u16,
}

impl PtyHandle {
    /// Allocate a PTY and spawn `command args...` attached to its slave side.
    pub fn open(
        command: &str,
        args: &[String],
        cwd: &Path,
        rows: u16,
        cols: u16,
    ) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Spawn(format!("openpty: {e}")))?;

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);
        cmd.cwd(cwd);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn(format!("{command}: {e}")))?;
        // The slave side lives on inside the child
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Spawn(format!("clone reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Spawn(format!("take writer: {e}")))?;

        let (tx, rx) = sync_channel::<Vec<u8>>(OUTPUT_CHANNEL_CHUNKS);
        let reader_thread = thread::spawn(move || Self::reader_loop(&mut reader, tx));

        Ok(Self {
            master: pair.master,
            writer,
            child,
            output_rx: Some(rx),
            reader_thread: Some(reader_thread),
            rows,
            cols,
        })
    }

    /// Blocking drain loop run on the per-session reader thread. Exits on
    /// child EOF, read error, or the receiving side going away.
    fn reader_loop(reader: &mut (dyn Read + Send), tx: SyncSender<Vec<u8>>) {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }

    /// Forward bytes verbatim to the child's input.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Propagate a window-size change to the child. No-op at the same size.
    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        if (rows, cols) == (self.rows, self.cols) {
            return Ok(());
        }
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Resize(format!("{e}")))?;
        self.rows = rows;
        self.cols = cols;
        Ok(())
    }

    pub fn size(&self) -> (u16, u16) {
        (self.rows, self.cols)
    }

    /// Drain all currently pending output chunks without blocking.
    ///
    /// Finite per call and restartable; returns an empty vec when no data is
    /// pending. Chunks preserve the order the child produced them.
    pub fn drain_chunks(&mut self) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        if let Some(rx) = &self.output_rx {
            loop {
                match rx.try_recv() {
                    Ok(bytes) => chunks.push(bytes),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
        }
        chunks
    }

    /// Check whether the child has exited, without blocking.
    pub fn poll_exit(&mut self) -> Option<u32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!("try_wait failed: {err}");
                None
            }
        }
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        // Unblock a reader stuck on a full channel, then wait for it; the
        // read itself unblocks via child death / PTY EOF.
        drop(self.output_rx.take());
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn collect_output(pty: &mut PtyHandle, deadline: Duration) -> Vec<u8> {
        let start = Instant::now();
        let mut out = Vec::new();
        while start.elapsed() < deadline {
            for chunk in pty.drain_chunks() {
                out.extend_from_slice(&chunk);
            }
            if pty.poll_exit().is_some() {
                // One final drain after exit
                for chunk in pty.drain_chunks() {
                    out.extend_from_slice(&chunk);
                }
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        out
    }

    #[test]
    #[cfg(unix)]
    fn test_spawn_echo_and_reap() {
        let cwd = std::env::current_dir().unwrap();
        let mut pty =
            PtyHandle::open("echo", &["hi".to_string()], &cwd, 24, 80).expect("spawn echo");

        let out = collect_output(&mut pty, Duration::from_secs(10));
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("hi"), "output was: {text:?}");

        // The child exited; polling keeps reporting it
        let start = Instant::now();
        let code = loop {
            if let Some(code) = pty.poll_exit() {
                break code;
            }
            assert!(start.elapsed() < Duration::from_secs(10));
            thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(code, 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_spawn_failure_is_not_fatal() {
        let cwd = std::env::current_dir().unwrap();
        let result = PtyHandle::open("definitely-not-a-real-binary-xyz", &[], &cwd, 24, 80);
        // portable-pty may fail at spawn or at first wait depending on
        // platform; either way no panic and no session
        if let Ok(mut pty) = result {
            let start = Instant::now();
            while pty.poll_exit().is_none() && start.elapsed() < Duration::from_secs(10) {
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    #[test]
    fn test_resize_same_size_is_noop() {
        let cwd = std::env::current_dir().unwrap();
        if let Ok(mut pty) = PtyHandle::open("sleep", &["5".to_string()], &cwd, 24, 80) {
            assert!(pty.resize(24, 80).is_ok());
            assert_eq!(pty.size(), (24, 80));
            assert!(pty.resize(30, 100).is_ok());
            assert_eq!(pty.size(), (30, 100));
        }
    }
}
