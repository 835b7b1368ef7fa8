//! 无 UI 交互入口。
//!
//! 使用标准输入输出进行交互：输入链接 → 查看书本信息 → 选择页码范围 → 确认后下载。

use std::io::{self, BufRead, Write};

use anyhow::Result;
use tokio::runtime::Runtime;

use crate::base_system::context::Config;
use crate::download::cache::clear_cache;
use crate::download::downloader::BookSession;

mod download;

pub use download::{OneShot, run_once};

pub fn run(config: &Config, rt: &Runtime) -> Result<()> {
    println!(
        "欢迎使用 eSchool 电子书 PDF 下载器! v{}\n\
支持链接: https://www.myeschoolhome.com/mEBook.html?name=<书本标识>\n\
命令：c 清理图片缓存 | r 重置当前书本 | q 退出\n",
        env!("CARGO_PKG_VERSION")
    );

    let mut session = BookSession::new(config)?;
    loop {
        let prompt = format!(
            "请输入电子书链接（输入c清理缓存 / r重置 / q退出，默认保存到 {}）：",
            config.default_save_dir().display()
        );
        let Some(input) = read_line(&prompt)? else {
            break;
        };
        let text = input.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("q") {
            println!("已退出。");
            break;
        }
        if text.eq_ignore_ascii_case("c") {
            if !session.uses_cache() {
                println!("未启用图片缓存\n");
                continue;
            }
            let ans = read_line("确定要删除已缓存的图片吗？[y/N]: ")?;
            if ans.as_deref().is_some_and(|a| is_yes(a, false)) {
                rt.block_on(clear_cache(config));
                println!("图片缓存已清理\n");
            } else {
                println!("已取消\n");
            }
            continue;
        }
        if text.eq_ignore_ascii_case("r") {
            session.reset();
            println!("已重置\n");
            continue;
        }

        match download::download_book(&mut session, text, config, rt) {
            Ok(Some(path)) => println!("已保存到 {}\n", path.display()),
            Ok(None) => println!("已取消\n"),
            Err(err) => println!("下载失败: {:#}\n", err),
        }
    }

    Ok(())
}

/// 读取一行输入；标准输入关闭时返回 `None`。
fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let mut line = String::new();
    let n = io::stdin().lock().read_line(&mut line)?;
    Ok((n > 0).then_some(line))
}

/// 解析 y/n 回答；留空时取 `default`。
fn is_yes(answer: &str, default: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::is_yes;

    #[rstest]
    #[case("", false, false)]
    #[case("\n", true, true)]
    #[case("y", false, true)]
    #[case(" Yes ", false, true)]
    #[case("n", true, false)]
    #[case("x", false, false)]
    fn yes_no_answers(#[case] answer: &str, #[case] default: bool, #[case] expected: bool) {
        assert_eq!(is_yes(answer, default), expected);
    }
}
