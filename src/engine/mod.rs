//! 通知引擎 - 活动触发的群聊监控核心
//!
//! # 设计目标
//! 1. 有界缓冲：每个会话只保留最近 N 条消息，内存恒定
//! 2. 突发触发：窗口内消息数达到阈值才送分析，零散消息不打扰
//! 3. 串行分析：同一会话同时最多一个分析在飞，重复触发直接合并
//! 4. 冷却抑制：同一话题在冷却期内只通知一次
//!
//! 数据流：
//! 入站消息 → `NotificationEngine::on_message` → 缓冲追加 → 触发判定
//! →（命中时）后台 `AnalysisCoordinator::analyze` → 相关性分析
//! → 冷却检查 → 发送通知 → 记录冷却并清空缓冲
//!
//! 所有状态（缓冲、分析锁、冷却账本）都归引擎实例所有，不落盘，
//! 进程重启即丢弃。

pub mod buffer;
pub mod cooldown;
pub mod coordinator;
pub mod format;
pub mod notifier;
pub mod trigger;

pub use buffer::{BufferedMessage, MessageBuffers};
pub use cooldown::CooldownTracker;
pub use coordinator::AnalysisCoordinator;
pub use format::HistoryFormatter;
pub use notifier::NotificationEngine;
pub use trigger::TriggerPolicy;
