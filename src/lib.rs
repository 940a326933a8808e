//! Hive - Rust 对话智能体运行时
//!
//! 把识别出的意图变成有序动作计划并执行，结果写回会话上下文。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、主控循环（Hive）、优雅关闭
//! - **session**: 带过期的会话上下文、参数模板、会话表
//! - **capability**: 能力与动作契约、能力注册表、内置能力（log / giphy）
//! - **dispatch**: 反射调度（按实参类别解析并调用操作）
//! - **orchestration**: 意图 -> 动作计划规则表与 TOML 加载
//! - **recognition**: 意图识别契约与关键词识别器
//! - **execution**: 串行执行引擎（重试、回退、排空）
//! - **ingress**: 控制台入口

pub mod capability;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod execution;
pub mod ingress;
pub mod observability;
pub mod orchestration;
pub mod recognition;
pub mod session;

pub use crate::core::{ActionError, Hive, HiveError};
