//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`      — 数据模型（ResolvedTarget / BookMetadata / PageRange 等）
//! - `errors`      — 错误分类
//! - `metadata`    — 书本信息获取与二次解析
//! - `acquire`     — 图片抓取（缓存 / 重新编码两种策略）
//! - `cache`       — 磁盘图片缓存
//! - `join`        — 保序并发汇合
//! - `progress`    — 两阶段进度汇总与 CLI 进度条
//! - `downloader`  — 下载主流程编排

pub(crate) mod acquire;
pub mod cache;
pub mod downloader;
pub mod errors;
pub(crate) mod join;
pub(crate) mod metadata;
pub mod models;
pub mod progress;
