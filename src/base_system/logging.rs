//! 日志系统：控制台 + `logs/latest.log` 双输出。
//!
//! 控制台只显示本程序自己的日志目标；文件里额外保留 HTTP 库的警告。
//! 程序退出（正常结束、Ctrl+C、panic）时把 latest.log 打包成 zip。

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, panic, thread, time::Duration};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

/// 本程序使用的日志目标。
const APP_TARGETS: [&str; 6] = ["startup", "download", "network", "cache", "pdf", "config"];
const LATEST_LOG: &str = "latest.log";
const ROTATE_BYTES: u64 = 8 * 1024 * 1024;
// 等待 non_blocking 写线程把剩余日志刷盘
const FLUSH_WAIT: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    pub console: bool,
}

/// 日志目录与当前日志文件。
#[derive(Debug, Clone)]
struct LogPaths {
    dir: PathBuf,
    latest: PathBuf,
}

impl LogPaths {
    fn under(base_dir: Option<&Path>) -> Self {
        let dir = base_dir.unwrap_or(Path::new(".")).join("logs");
        let latest = dir.join(LATEST_LOG);
        Self { dir, latest }
    }

    /// 上次运行遗留的大日志先归档，避免无限增长。
    fn rotate_if_large(&self) -> Result<(), LogError> {
        match fs::metadata(&self.latest) {
            Ok(meta) if meta.len() >= ROTATE_BYTES => self.archive().map(|_| ()),
            _ => Ok(()),
        }
    }

    /// 把 latest.log 压缩成 `pdf-downloader_<时间>.zip` 并删除原文件。空日志直接删除。
    fn archive(&self) -> Result<Option<PathBuf>, LogError> {
        let len = match fs::metadata(&self.latest) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if len == 0 {
            fs::remove_file(&self.latest)?;
            return Ok(None);
        }

        let stamp = OffsetDateTime::now_utc().format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;
        let zip_path = self.dir.join(format!("pdf-downloader_{stamp}.zip"));

        let mut writer = zip::ZipWriter::new(File::create(&zip_path)?);
        writer.start_file(
            format!("pdf-downloader_{stamp}.log"),
            FileOptions::default().compression_method(CompressionMethod::Deflated),
        )?;
        {
            let mut log = File::open(&self.latest)?;
            io::copy(&mut log, &mut writer)?;
        }
        writer.finish()?;
        fs::remove_file(&self.latest)?;

        info!(target: "startup", path = %zip_path.display(), "日志已归档");
        Ok(Some(zip_path))
    }
}

fn console_filter(debug: bool) -> Targets {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    APP_TARGETS
        .iter()
        .fold(Targets::new(), |t, target| t.with_target(*target, level))
}

fn file_filter() -> Targets {
    APP_TARGETS
        .iter()
        .fold(Targets::new().with_default(LevelFilter::WARN), |t, target| {
            t.with_target(*target, LevelFilter::DEBUG)
        })
}

pub struct LogSystem {
    shutdown: Arc<Shutdown>,
}

impl LogSystem {
    pub fn init_with_base(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let paths = LogPaths::under(base_dir);
        fs::create_dir_all(&paths.dir)?;
        paths.rotate_if_large()?;

        let (file_writer, guard) = non_blocking::NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&paths.dir, LATEST_LOG));

        let console_writer = if options.console {
            BoxMakeWriter::new(io::stderr)
        } else {
            BoxMakeWriter::new(io::sink)
        };
        let console_layer = fmt::layer()
            .with_target(false)
            .with_ansi(options.use_color)
            .with_writer(console_writer)
            .with_filter(console_filter(options.debug));
        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(file_filter());

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| {
                if e.to_string().contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        let shutdown = Arc::new(Shutdown {
            paths,
            guard: Mutex::new(Some(guard)),
            done: AtomicBool::new(false),
            archive: options.archive_on_exit,
        });
        shutdown.on_ctrlc();
        shutdown.on_panic();

        Ok(Self { shutdown })
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shutdown.run();
    }
}

/// 退出时只执行一次：刷盘并按需归档。
struct Shutdown {
    paths: LogPaths,
    guard: Mutex<Option<WorkerGuard>>,
    done: AtomicBool,
    archive: bool,
}

impl Shutdown {
    fn on_ctrlc(self: &Arc<Self>) {
        let me = Arc::clone(self);
        let _ = ctrlc::set_handler(move || {
            me.run();
            std::process::exit(130);
        });
    }

    fn on_panic(self: &Arc<Self>) {
        let me = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            error!(target: "startup", "程序崩溃: {info}");
            me.run();
            previous(info);
        }));
    }

    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.guard.lock() {
            guard.take();
        }
        if self.archive {
            thread::sleep(FLUSH_WAIT);
            if let Err(err) = self.paths.archive() {
                eprintln!("日志归档失败: {err}");
            }
        }
    }
}
