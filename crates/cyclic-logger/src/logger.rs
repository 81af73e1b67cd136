//! 异步轮转文件日志器
//!
//! # 设计
//!
//! - **Bounded Queue**：`bounded(20000)`，生产者 `try_send`，队列满时丢弃最新记录并计数
//! - **单写线程**：批量取出记录（最多 4096 条），拼接后一次写入 256 KiB 的 `BufWriter`
//! - **惰性轮转**：追加记录前检查 `bytes_written >= max_file_size`，
//!   单文件最多超出一条记录，也不会产生空的尾文件
//! - **文件只由写线程打开/关闭**：`start()` 等待写线程报告第一个文件的打开结果
//!
//! 记录在 `start()` 之前入队也会保留，写线程启动后依次写出。

use crate::config::{LoggerConfig, NamePattern, RotationMode};
use crate::error::LoggerError;
use crate::hex::write_hex;
use crate::naming;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 队列容量
pub const LOG_QUEUE_SIZE: usize = 20_000;
/// 单批最多记录数
const MAX_BATCH_RECORDS: usize = 4096;
/// 批量拼接缓冲区预留
const BATCH_BUFFER_RESERVE_BYTES: usize = 256 * 1024;
/// 文件写缓冲
const FILE_STREAM_BUFFER_BYTES: usize = 256 * 1024;
/// 写线程空闲刷新间隔
const WRITER_LOOP_INTERVAL: Duration = Duration::from_millis(100);

/// 生产者与写线程共享的状态
#[derive(Debug, Default)]
struct LoggerStatus {
    dropped: AtomicU64,
    degraded: AtomicBool,
    last_error: Mutex<Option<String>>,
    current_path: Mutex<Option<PathBuf>>,
}

impl LoggerStatus {
    fn set_last_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    fn count_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }
}

/// 入队一条记录（非阻塞）
fn enqueue(tx: &Sender<Vec<u8>>, status: &LoggerStatus, record: Vec<u8>) {
    if status.degraded.load(Ordering::Relaxed) {
        status.count_dropped(1);
        return;
    }

    match tx.try_send(record) {
        Ok(()) => {},
        Err(TrySendError::Full(_)) => {
            let dropped = status.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 {
                warn!("Log queue overflow (capacity {}), dropping records", LOG_QUEUE_SIZE);
            }
            status.set_last_error(format!(
                "log queue overflow: {dropped} records dropped (capacity {LOG_QUEUE_SIZE})"
            ));
        },
        // 接收端由日志器自己持有，不会断开
        Err(TrySendError::Disconnected(_)) => status.count_dropped(1),
    }
}

/// 写线程句柄
struct Worker {
    handle: JoinHandle<()>,
    shutdown: Sender<()>,
}

/// 异步轮转文件日志器
///
/// # Example
///
/// ```no_run
/// use cyclic_logger::AsyncLogger;
///
/// let logger = AsyncLogger::new();
/// logger.set_config("--baseFileName UDS_Log --logDir ./logs --logTag ECU").unwrap();
/// logger.start().unwrap();
///
/// logger.log("session started");                 // "[ECU] session started\n"
/// logger.log_hex("TX: ", &[0x02, 0x10, 0x01]);    // "[ECU] TX: 02 10 01\n"
///
/// logger.stop();
/// ```
pub struct AsyncLogger {
    config: RwLock<LoggerConfig>,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    status: Arc<LoggerStatus>,
    running: AtomicBool,
    worker: Mutex<Option<Worker>>,
}

impl AsyncLogger {
    /// 使用默认配置创建（不创建线程、不打开文件）
    pub fn new() -> Self {
        let (tx, rx) = bounded(LOG_QUEUE_SIZE);
        Self {
            config: RwLock::new(LoggerConfig::default()),
            tx,
            rx,
            status: Arc::new(LoggerStatus::default()),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    /// 使用给定配置创建
    pub fn with_config(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;
        let logger = Self::new();
        *logger.config.write() = config;
        Ok(logger)
    }

    /// 应用配置命令字符串
    ///
    /// 失败时记录到 `last_error()`，配置保持不变。
    pub fn set_config(&self, command: &str) -> Result<(), LoggerError> {
        if self.is_running() {
            return Err(self.fail(LoggerError::Busy));
        }
        let config = self
            .config
            .read()
            .apply_command(command)
            .map_err(|e| self.fail(e))?;
        *self.config.write() = config;
        Ok(())
    }

    /// 替换整个配置
    pub fn configure(&self, config: LoggerConfig) -> Result<(), LoggerError> {
        if self.is_running() {
            return Err(self.fail(LoggerError::Busy));
        }
        config.validate().map_err(|e| self.fail(e))?;
        *self.config.write() = config;
        Ok(())
    }

    /// 当前配置
    pub fn config(&self) -> LoggerConfig {
        self.config.read().clone()
    }

    /// 启动写线程并打开第一个文件（已在运行时为空操作）
    ///
    /// # 错误
    ///
    /// - [`LoggerError::Io`]：创建目录或打开文件失败
    /// - [`LoggerError::Spawn`]：写线程创建失败
    pub fn start(&self) -> Result<(), LoggerError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let config = self.config();
        fs::create_dir_all(&config.log_dir).map_err(|e| self.fail(LoggerError::Io(e)))?;
        self.status.degraded.store(false, Ordering::Relaxed);

        let (ready_tx, ready_rx) = bounded::<io::Result<PathBuf>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let rx = self.rx.clone();
        let status = Arc::clone(&self.status);

        let handle = thread::Builder::new()
            .name("async-logger".into())
            .spawn(move || {
                let timestamp = naming::current_timestamp();
                match LogFiles::open(config, timestamp, Arc::clone(&status)) {
                    Ok(files) => {
                        let _ = ready_tx.send(Ok(files.path.clone()));
                        writer_loop(files, rx, shutdown_rx, status);
                    },
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    },
                }
            })
            .map_err(|e| self.fail(LoggerError::Spawn(e)))?;

        match ready_rx.recv() {
            Ok(Ok(path)) => {
                info!("Async logger started: {}", path.display());
                self.running.store(true, Ordering::Release);
                *worker = Some(Worker {
                    handle,
                    shutdown: shutdown_tx,
                });
                Ok(())
            },
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(self.fail(LoggerError::Io(e)))
            },
            Err(_) => {
                let _ = handle.join();
                Err(self.fail(LoggerError::Io(io::Error::other(
                    "log writer exited before opening a file",
                ))))
            },
        }
    }

    /// 停止：写出队列中剩余的记录，刷新并关闭文件（幂等）
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        let _ = worker.shutdown.send(());
        if worker.handle.join().is_err() {
            error!("Log writer thread terminated abnormally");
        }
        info!("Async logger stopped");
    }

    /// 是否在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 一行文本：`[tag] text\n`（tag 为空时无前缀）
    pub fn log(&self, text: &str) {
        let mut record = self.tagged_record(text.len() + 1);
        record.extend_from_slice(text.as_bytes());
        record.push(b'\n');
        self.push(record);
    }

    /// 一行文本，不加 tag
    pub fn log_data(&self, text: &str) {
        let mut record = Vec::with_capacity(text.len() + 1);
        record.extend_from_slice(text.as_bytes());
        record.push(b'\n');
        self.push(record);
    }

    /// 原样写入
    pub fn log_raw(&self, bytes: &[u8]) {
        self.push(bytes.to_vec());
    }

    /// `[tag] prefix` + 大写十六进制（单空格分隔）+ 换行
    pub fn log_hex(&self, prefix: &str, bytes: &[u8]) {
        let mut record = self.tagged_record(prefix.len() + bytes.len() * 3 + 1);
        record.extend_from_slice(prefix.as_bytes());
        write_hex(&mut record, bytes);
        record.push(b'\n');
        self.push(record);
    }

    /// 十六进制 + 换行，不加 tag
    pub fn log_data_hex(&self, bytes: &[u8]) {
        let mut record = Vec::with_capacity(bytes.len() * 3 + 1);
        write_hex(&mut record, bytes);
        record.push(b'\n');
        self.push(record);
    }

    /// `io::Write` 句柄，写入的数据原样入队
    ///
    /// 可以作为 `tracing-subscriber` 的 writer：
    /// `fmt().with_writer(move || logger.writer())`
    pub fn writer(&self) -> LogWriter {
        LogWriter {
            tx: self.tx.clone(),
            status: Arc::clone(&self.status),
        }
    }

    /// 当前输出文件
    pub fn current_log_path(&self) -> Option<PathBuf> {
        self.status.current_path.lock().clone()
    }

    /// 最近一次错误
    pub fn last_error(&self) -> Option<String> {
        self.status.last_error.lock().clone()
    }

    /// 丢弃的记录数（队列溢出或降级）
    pub fn dropped(&self) -> u64 {
        self.status.dropped.load(Ordering::Relaxed)
    }

    /// 是否因连续 IO 失败进入降级状态（记录被丢弃）
    pub fn is_degraded(&self) -> bool {
        self.status.degraded.load(Ordering::Relaxed)
    }

    /// 队列中等待写出的记录数
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    fn tagged_record(&self, payload_len: usize) -> Vec<u8> {
        let config = self.config.read();
        let tag = &config.log_tag;
        if tag.is_empty() {
            return Vec::with_capacity(payload_len);
        }
        let mut record = Vec::with_capacity(tag.len() + 3 + payload_len);
        record.push(b'[');
        record.extend_from_slice(tag.as_bytes());
        record.extend_from_slice(b"] ");
        record
    }

    fn push(&self, record: Vec<u8>) {
        enqueue(&self.tx, &self.status, record);
    }

    fn fail(&self, error: LoggerError) -> LoggerError {
        self.status.set_last_error(error.to_string());
        error
    }
}

impl Default for AsyncLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AsyncLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AsyncLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncLogger")
            .field("running", &self.is_running())
            .field("current_log_path", &self.current_log_path())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// 写入 [`AsyncLogger`] 队列的 `io::Write` 句柄
///
/// 写入永远不会阻塞也不会失败；队列满时数据被丢弃并计入 `dropped()`。
#[derive(Clone)]
pub struct LogWriter {
    tx: Sender<Vec<u8>>,
    status: Arc<LoggerStatus>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !buf.is_empty() {
            enqueue(&self.tx, &self.status, buf.to_vec());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 写线程私有的文件状态
struct LogFiles {
    config: LoggerConfig,
    timestamp: String,
    status: Arc<LoggerStatus>,
    out: Option<BufWriter<File>>,
    path: PathBuf,
    index: u32,
    bytes_written: u64,
    /// INCREMENTING 模式下目录中属于本配置的文件（含之前运行留下的），最旧的在前
    history: VecDeque<PathBuf>,
    batch: Vec<u8>,
    /// `batch` 中尚未写出的记录数
    batch_records: usize,
}

impl LogFiles {
    fn open(config: LoggerConfig, timestamp: String, status: Arc<LoggerStatus>) -> io::Result<Self> {
        let mut files = Self {
            config,
            timestamp,
            status,
            out: None,
            path: PathBuf::new(),
            index: 0,
            bytes_written: 0,
            history: VecDeque::new(),
            batch: Vec::with_capacity(BATCH_BUFFER_RESERVE_BYTES),
            batch_records: 0,
        };
        let first = if files.tracks_history() { files.scan_existing()? } else { 1 };
        files.open_index(first)?;
        Ok(files)
    }

    /// 把目录中已有的同名系列文件放进历史，返回本次运行的起始序号
    ///
    /// 只有同一时间戳（`BASE_INDEX_EXT` 下即全部）的文件会推高起始序号，
    /// 重启后不会截断上一次运行的文件。
    fn scan_existing(&mut self) -> io::Result<u32> {
        let mut existing: Vec<(String, u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.config.log_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Some((stamp, index)) = naming::parse_file_name(&self.config, name) {
                existing.push((stamp, index, path));
            }
        }
        existing.sort();

        let last = existing
            .iter()
            .filter(|(stamp, _, _)| stamp.is_empty() || *stamp == self.timestamp)
            .map(|(_, index, _)| *index)
            .max()
            .unwrap_or(0);
        if !existing.is_empty() {
            debug!(
                "Found {} existing log files in {}",
                existing.len(),
                self.config.log_dir.display()
            );
        }
        self.history = existing.into_iter().map(|(_, _, path)| path).collect();
        Ok(last.saturating_add(1))
    }

    fn open_index(&mut self, index: u32) -> io::Result<()> {
        let path = naming::file_path(&self.config, &self.timestamp, index);
        // 先记下尝试的序号：打开失败后 recover() 从下一个序号继续
        self.index = index;
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        self.out = Some(BufWriter::with_capacity(FILE_STREAM_BUFFER_BYTES, file));
        self.bytes_written = 0;
        self.path = path.clone();
        *self.status.current_path.lock() = Some(path.clone());
        debug!("Log file opened: {}", path.display());

        if self.tracks_history() {
            self.history.retain(|known| *known != path);
            self.history.push_back(path);
            while self.history.len() > self.config.max_files {
                if let Some(oldest) = self.history.pop_front() {
                    remove_log_file(&oldest);
                }
            }
        }
        Ok(())
    }

    fn tracks_history(&self) -> bool {
        self.config.rotation_mode == RotationMode::Incrementing
            && self.config.name_pattern != NamePattern::BaseExt
    }

    fn next_index(&self) -> u32 {
        match (self.config.name_pattern, self.config.rotation_mode) {
            (NamePattern::BaseExt, _) => self.index,
            (_, RotationMode::Incrementing) => self.index.saturating_add(1),
            (_, RotationMode::Rolling) => {
                if self.index as usize >= self.config.max_files {
                    1
                } else {
                    self.index + 1
                }
            },
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.flush()?;
        self.out = None;
        self.open_index(self.next_index())
    }

    fn append(&mut self, record: &[u8]) -> io::Result<()> {
        if self.bytes_written >= self.config.max_file_size {
            self.rotate()?;
        }
        self.batch.extend_from_slice(record);
        self.batch_records += 1;
        self.bytes_written += record.len() as u64;
        Ok(())
    }

    /// 写出批次；失败时批次保留，由 recover() 计入丢弃
    fn write_batch(&mut self) -> io::Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| io::Error::other("no log file open"))?;
        out.write_all(&self.batch)?;
        self.batch.clear();
        self.batch_records = 0;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_batch()?;
        if let Some(out) = self.out.as_mut() {
            out.flush()?;
        }
        Ok(())
    }

    /// 写出一批记录；降级后只计数
    fn write_records(&mut self, records: &mut Vec<Vec<u8>>) {
        if self.status.degraded.load(Ordering::Relaxed) {
            self.status.count_dropped(records.len() as u64);
            records.clear();
            return;
        }

        for record in records.drain(..) {
            if self.status.degraded.load(Ordering::Relaxed) {
                self.status.count_dropped(1);
                continue;
            }
            if let Err(e) = self.append(&record) {
                self.recover(e);
                // 换到新文件后重试失败的那条记录
                if self.status.degraded.load(Ordering::Relaxed) || self.append(&record).is_err() {
                    self.status.count_dropped(1);
                }
            }
        }
        if self.status.degraded.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = self.write_batch() {
            self.recover(e);
        }
    }

    fn flush_or_recover(&mut self) {
        if self.status.degraded.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = self.flush() {
            self.recover(e);
        }
    }

    /// IO 失败：记录错误并换到下一个文件；仍然失败则降级
    fn recover(&mut self, e: io::Error) {
        let message = format!("log write failed on {}: {}", self.path.display(), e);
        error!("{}", message);
        self.status.set_last_error(message);

        if self.batch_records > 0 {
            warn!("Dropping {} unwritten log records", self.batch_records);
            self.status.count_dropped(self.batch_records as u64);
        }
        self.batch.clear();
        self.batch_records = 0;
        self.out = None;
        let next = self.next_index();
        if let Err(e) = self.open_index(next) {
            let message = format!("log rotation failed, logger degraded: {e}");
            error!("{}", message);
            self.status.set_last_error(message);
            self.status.degraded.store(true, Ordering::Relaxed);
        }
    }
}

fn remove_log_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed old log file: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => warn!("Failed to remove old log file {}: {}", path.display(), e),
    }
}

enum WriterEvent {
    Record(Vec<u8>),
    Idle,
    Shutdown,
}

/// 非阻塞地取出记录，直到批次满或队列空
fn drain_into(rx: &Receiver<Vec<u8>>, pending: &mut Vec<Vec<u8>>) {
    while pending.len() < MAX_BATCH_RECORDS {
        match rx.try_recv() {
            Ok(record) => pending.push(record),
            Err(_) => break,
        }
    }
}

/// 写线程主循环
fn writer_loop(
    mut files: LogFiles,
    rx: Receiver<Vec<u8>>,
    shutdown: Receiver<()>,
    status: Arc<LoggerStatus>,
) {
    let mut pending: Vec<Vec<u8>> = Vec::with_capacity(MAX_BATCH_RECORDS);

    loop {
        let event = select! {
            recv(rx) -> msg => match msg {
                Ok(record) => WriterEvent::Record(record),
                Err(_) => WriterEvent::Shutdown,
            },
            recv(shutdown) -> _ => WriterEvent::Shutdown,
            default(WRITER_LOOP_INTERVAL) => WriterEvent::Idle,
        };

        match event {
            WriterEvent::Record(first) => {
                pending.push(first);
                drain_into(&rx, &mut pending);
                files.write_records(&mut pending);
            },
            WriterEvent::Idle => files.flush_or_recover(),
            WriterEvent::Shutdown => break,
        }
    }

    // 写出停止时已在队列中的记录
    let mut remaining = rx.len();
    while remaining > 0 {
        drain_into(&rx, &mut pending);
        if pending.is_empty() {
            break;
        }
        remaining = remaining.saturating_sub(pending.len());
        files.write_records(&mut pending);
    }
    files.flush_or_recover();

    debug!(
        "Log writer exiting ({} records dropped in total)",
        status.dropped.load(Ordering::Relaxed)
    );
}
