//! eSchool 电子书 PDF 下载器。
//!
//! 输入 myeschoolhome 电子书链接，逐页抓取页面图片并按页序拼成一个 PDF。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/链接解析等基础设施
//! - `network_parser`：经中转服务的 HTTP 请求
//! - `download`：下载流程编排（书本信息、抓图、缓存、进度）
//! - `book_parser`：图片处理与 PDF 生成
//! - `ui`：无 UI 命令行交互

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

mod base_system;
mod book_parser;
mod download;
mod network_parser;
mod ui;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "eschool-pdf-downloader")]
#[command(about = "Download myeschoolhome eBooks as PDF")]
struct Cli {
    /// 电子书链接；留空进入交互模式
    url: Option<String>,

    /// 起始页（默认为书本起始页）
    #[arg(long)]
    first: Option<u32>,

    /// 结束页（默认为最后一页）
    #[arg(long)]
    last: Option<u32>,

    /// 跳过下载确认
    #[arg(short = 'y', long, default_value_t = false)]
    yes: bool,

    /// 只显示书本信息，不下载
    #[arg(long, default_value_t = false)]
    info: bool,

    /// 清理图片缓存
    #[arg(long, default_value_t = false)]
    clear_cache: bool,

    /// PDF 保存目录（覆盖配置中的 save_path）
    #[arg(short, long)]
    output: Option<String>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml、logs 和图片缓存）
    #[arg(long)]
    data_dir: Option<String>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("eSchool PDF Downloader v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let _log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let config = load_config(data_dir, cli.output.as_deref())?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("创建异步运行时失败")?;

    if cli.clear_cache {
        rt.block_on(download::cache::clear_cache(&config));
        if cli.url.is_none() {
            println!("图片缓存已清理");
            return Ok(());
        }
    }

    let Some(url) = cli.url.as_deref() else {
        return ui::noui::run(&config, &rt);
    };

    let opts = ui::noui::OneShot {
        first: cli.first,
        last: cli.last,
        yes: cli.yes,
        info_only: cli.info,
    };
    if let Some(path) = ui::noui::run_once(&config, &rt, url, &opts)? {
        println!("已保存到 {}", path.display());
    }
    Ok(())
}

/// 读取 `config.yml`，并用命令行的保存目录覆盖配置。
fn load_config(data_dir: Option<&Path>, output: Option<&str>) -> Result<Config> {
    let mut config = load_or_create::<Config>(data_dir)
        .context("加载配置失败")?
        .with_data_dir(data_dir.map(PathBuf::from));
    if let Some(output) = output {
        config.save_path = output.trim().to_string();
    }
    Ok(config)
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: debug,
    };
    LogSystem::init_with_base(opts, base_dir).context("初始化日志失败")
}
