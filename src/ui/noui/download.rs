//! 单本书的下载交互：展示书本信息、选择页码范围、确认、下载并保存。

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tokio::runtime::Runtime;

use crate::base_system::context::Config;
use crate::download::downloader::{BookSession, save_document};
use crate::download::models::{BookMetadata, PageRange};
use crate::download::progress::CombinedProgress;

/// 命令行一次性下载的参数。
#[derive(Debug, Clone, Default)]
pub struct OneShot {
    pub first: Option<u32>,
    pub last: Option<u32>,
    pub yes: bool,
    pub info_only: bool,
}

/// 交互式：解析链接后提示页码范围并确认。返回 `None` 表示用户取消。
pub(super) fn download_book(
    session: &mut BookSession,
    link: &str,
    config: &Config,
    rt: &Runtime,
) -> Result<Option<PathBuf>> {
    let meta = rt
        .block_on(session.load(link))
        .with_context(|| format!("获取书本信息失败: {}", link))?
        .clone();
    print_book_info(session, &meta);
    meta.ensure_accessible()?;

    let Some(range) = prompt_range(&meta)? else {
        return Ok(None);
    };
    if !confirm(&range)? {
        return Ok(None);
    }
    fetch_and_save(session, range, config, rt).map(Some)
}

/// 非交互：按命令行参数下载一本书。
pub fn run_once(config: &Config, rt: &Runtime, link: &str, opts: &OneShot) -> Result<Option<PathBuf>> {
    let mut session = BookSession::new(config)?;
    let meta = rt
        .block_on(session.load(link))
        .with_context(|| format!("获取书本信息失败: {}", link))?
        .clone();
    print_book_info(&session, &meta);
    if opts.info_only {
        return Ok(None);
    }
    meta.ensure_accessible()?;

    let first = opts.first.unwrap_or_else(|| meta.start_page.max(1));
    let last = opts.last.unwrap_or(meta.total_page_count);
    let range = PageRange::new(first, last, &meta)?;
    if !opts.yes && !confirm(&range)? {
        return Ok(None);
    }
    fetch_and_save(&session, range, config, rt).map(Some)
}

fn fetch_and_save(
    session: &BookSession,
    range: PageRange,
    config: &Config,
    rt: &Runtime,
) -> Result<PathBuf> {
    let start_time = Instant::now();
    let name = session
        .document_name()
        .ok_or_else(|| anyhow!("当前没有已加载的书本"))?;

    println!("\n开始下载 {} 页...", range.len());
    let progress = CombinedProgress::new(None, true);
    let result = rt.block_on(session.download(range, &progress));
    progress.finish();
    let doc = result?;

    let path = save_document(
        &doc,
        &name,
        &config.default_save_dir(),
        config.allow_overwrite_files,
    )?;
    println!(
        "下载完成！共 {} 页，用时 {:.1} 秒",
        doc.page_count,
        start_time.elapsed().as_secs_f32()
    );
    Ok(path)
}

fn print_book_info(session: &BookSession, meta: &BookMetadata) {
    let title = if meta.title.trim().is_empty() {
        "(无标题)"
    } else {
        meta.title.trim()
    };
    println!("\n书名: {}", title);
    println!("页数: {}", meta.total_page_count);
    if meta.start_page > 1 {
        println!("起始页: {}", meta.start_page);
    }
    if meta.is_right_to_left() {
        println!("排版: 从右到左");
    }
    if let Some(target) = session.target() {
        println!("链接: {}", target.reference_url());
    }
    if let Some(cover) = session.cover_url() {
        println!("封面: {}", cover);
    }
    if !meta.accessible {
        println!("该书本不可访问，无法下载");
    }
}

fn prompt_range(meta: &BookMetadata) -> Result<Option<PageRange>> {
    loop {
        let prompt = format!(
            "输入页码范围 形如 1~{} (留空表示全部，q取消): ",
            meta.total_page_count
        );
        let Some(text) = super::read_line(&prompt)? else {
            return Ok(None);
        };
        let text = text.trim();
        if text.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        match parse_range(text, meta) {
            Ok(range) => {
                println!("已选择页码范围: {}~{}", range.first_page(), range.last_page());
                return Ok(Some(range));
            }
            Err(msg) => println!("{}", msg),
        }
    }
}

/// 解析 `a~b`；单个数字表示只下载该页，留空表示全部。
fn parse_range(text: &str, meta: &BookMetadata) -> Result<PageRange, String> {
    let text = text.trim();
    if text.is_empty() {
        return PageRange::full(meta).map_err(|e| e.to_string());
    }
    let (a, b) = text.split_once('~').unwrap_or((text, text));
    let first = a
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("范围解析失败: {}，应为 a~b", text))?;
    let last = b
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("范围解析失败: {}，应为 a~b", text))?;
    PageRange::new(first, last, meta).map_err(|_| {
        format!(
            "范围无效: {}~{}，可选范围 1~{}",
            first, last, meta.total_page_count
        )
    })
}

fn confirm(range: &PageRange) -> Result<bool> {
    let prompt = format!(
        "确认下载第 {}~{} 页（共 {} 页）？[Y/n]: ",
        range.first_page(),
        range.last_page(),
        range.len()
    );
    let Some(ans) = super::read_line(&prompt)? else {
        return Ok(false);
    };
    Ok(super::is_yes(&ans, true))
}
