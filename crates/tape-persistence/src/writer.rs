//! CSV log writer for trade and liquidation records.
//!
//! Files are opened in append mode and never truncated, so rows written
//! before a restart (process or connection) are kept as-is. The header row
//! is written only when the file does not exist yet.

use crate::error::{PersistenceError, PersistenceResult};
use std::future::Future;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tape_core::{CsvRecord, LiquidationRecord, TradeRecord};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// How far back a torn tail is searched for the last complete line.
const TAIL_WINDOW: u64 = 4096;

/// A log file and the header it starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub path: PathBuf,
    pub header: String,
}

impl LogTarget {
    pub fn new(path: impl Into<PathBuf>, header: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            header: header.into(),
        }
    }

    /// Target for record kind `R` inside `dir`.
    pub fn for_record<R: CsvRecord>(dir: &Path) -> Self {
        Self::new(dir.join(R::FILE_NAME), R::HEADER)
    }
}

/// Make sure the log exists with its header.
///
/// Existence is the only check: a present file is never inspected or
/// rewritten. Returns `true` when the file was created by this call.
pub async fn ensure_log(target: &LogTarget) -> PersistenceResult<bool> {
    if tokio::fs::try_exists(&target.path)
        .await
        .map_err(|e| PersistenceError::io(&target.path, e))?
    {
        return Ok(false);
    }

    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target.path)
        .await
    {
        Ok(file) => file,
        // Someone else created it between the check and the open.
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(PersistenceError::io(&target.path, e)),
    };

    finish_create(&target.path, write_line(&mut file, &target.header)).await?;

    info!(path = %target.path.display(), header = %target.header, "Created log file");
    Ok(true)
}

/// Append one line to the log. The newline is added here.
///
/// This opens the file for every call; use [`CsvLog`] when appending from
/// more than one task.
pub async fn append(target: &LogTarget, line: &str) -> PersistenceResult<()> {
    let mut file = open_append(&target.path).await?;
    write_line(&mut file, line)
        .await
        .map_err(|e| PersistenceError::io(&target.path, e))
}

/// Await the header write of a freshly created log. On failure the file is
/// removed again, so the next [`ensure_log`] starts from scratch instead of
/// finding a headerless log.
async fn finish_create<F>(path: &Path, header_write: F) -> PersistenceResult<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = header_write.await {
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            warn!(?remove_err, path = %path.display(), "Failed to remove log after header write failed");
        }
        return Err(PersistenceError::io(path, e));
    }
    Ok(())
}

async fn open_append(path: &Path) -> PersistenceResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| PersistenceError::io(path, e))
}

async fn write_line(file: &mut File, line: &str) -> std::io::Result<()> {
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    file.write_all(buf.as_bytes()).await?;
    file.flush().await
}

/// Cut a partial last line left behind by a failed write.
///
/// Everything after the last `\n` in the final [`TAIL_WINDOW`] bytes is
/// removed. A file with no newline in that window is left alone. Returns the
/// number of bytes cut.
async fn truncate_torn_tail(path: &Path) -> std::io::Result<u64> {
    let mut file = OpenOptions::new().read(true).write(true).open(path).await?;
    let len = file.metadata().await?.len();
    let window = len.min(TAIL_WINDOW);
    if window == 0 {
        return Ok(0);
    }

    file.seek(SeekFrom::Start(len - window)).await?;
    let mut tail = vec![0u8; window as usize];
    file.read_exact(&mut tail).await?;

    let Some(last_newline) = tail.iter().rposition(|b| *b == b'\n') else {
        return Ok(0);
    };
    let keep = len - window + last_newline as u64 + 1;
    if keep < len {
        file.set_len(keep).await?;
        file.flush().await?;
    }
    Ok(len - keep)
}

/// A single log target with serialized appends.
///
/// Appends take an async lock, so lines land in the order the calls were
/// made and never interleave. The file handle stays open between appends
/// and is dropped after a failed write so the next append reopens it. A
/// failed write may leave part of a line behind; the next append trims it
/// before writing.
pub struct CsvLog {
    target: LogTarget,
    state: Mutex<LogState>,
    lines_written: AtomicU64,
}

#[derive(Default)]
struct LogState {
    file: Option<File>,
    /// The last write failed and may have left a partial line.
    torn: bool,
}

impl CsvLog {
    pub fn new(target: LogTarget) -> Self {
        Self {
            target,
            state: Mutex::new(LogState::default()),
            lines_written: AtomicU64::new(0),
        }
    }

    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    /// See [`ensure_log`].
    pub async fn ensure(&self) -> PersistenceResult<bool> {
        ensure_log(&self.target).await
    }

    pub async fn append(&self, line: &str) -> PersistenceResult<()> {
        let mut state = self.state.lock().await;

        if state.torn {
            match truncate_torn_tail(&self.target.path).await {
                Ok(0) => {}
                Ok(cut) => {
                    warn!(path = %self.target.path.display(), bytes = cut, "Trimmed partial line");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(PersistenceError::io(&self.target.path, e)),
            }
            state.torn = false;
        }

        let mut file = match state.file.take() {
            Some(file) => file,
            None => open_append(&self.target.path).await?,
        };

        match write_line(&mut file, line).await {
            Ok(()) => {
                state.file = Some(file);
                self.lines_written.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                state.torn = true;
                Err(PersistenceError::io(&self.target.path, e))
            }
        }
    }

    /// Lines appended through this handle (headers excluded).
    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }
}

/// Both record logs under one output directory.
pub struct RecordWriter {
    trades: CsvLog,
    liquidations: CsvLog,
}

impl RecordWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        let dir = output_dir.as_ref();
        Self {
            trades: CsvLog::new(LogTarget::for_record::<TradeRecord>(dir)),
            liquidations: CsvLog::new(LogTarget::for_record::<LiquidationRecord>(dir)),
        }
    }

    /// Ensure both logs exist. Safe to call on every start.
    ///
    /// Each log is handled on its own: a failure is logged and the other log
    /// is still ensured. Returns how many logs failed. Appends create a
    /// missing file anyway, so a failure here only risks a missing header.
    pub async fn ensure_all(&self) -> usize {
        let mut failed = 0;
        for log in [&self.trades, &self.liquidations] {
            match log.ensure().await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(path = %log.target().path.display(), "Appending to existing log")
                }
                Err(e) => {
                    failed += 1;
                    error!(error = %e, path = %log.target().path.display(), "Failed to prepare log");
                }
            }
        }
        failed
    }

    pub async fn write_trade(&self, trade: &TradeRecord) -> PersistenceResult<()> {
        self.trades.append(&trade.csv_line()).await
    }

    pub async fn write_liquidation(&self, liq: &LiquidationRecord) -> PersistenceResult<()> {
        self.liquidations.append(&liq.csv_line()).await
    }

    pub fn trades(&self) -> &CsvLog {
        &self.trades
    }

    pub fn liquidations(&self) -> &CsvLog {
        &self.liquidations
    }

    /// Flush and release open handles.
    pub async fn close(&self) {
        for log in [&self.trades, &self.liquidations] {
            if let Some(mut file) = log.state.lock().await.file.take() {
                if let Err(e) = file.flush().await {
                    warn!(?e, path = %log.target().path.display(), "Failed to flush log on close");
                }
            }
            info!(
                path = %log.target().path.display(),
                lines = log.lines_written(),
                "Closed log"
            );
        }
    }
}
