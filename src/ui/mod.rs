//! 交互层入口（无 UI 命令行交互）。

pub mod noui;
