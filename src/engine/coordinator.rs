//! 分析协调器 - 串行化每个会话的 分析→判定→通知 流水线
//!
//! 同一会话同时最多一个分析在飞。并发门用每会话一把
//! `tokio::sync::Mutex` 的 `try_lock` 实现：拿不到锁的触发直接丢弃
//! （合并语义，不排队），RAII guard 保证任何退出路径都释放。
//!
//! 状态变更规则：
//! - 分析失败 / 超时 / 不相关 / 冷却抑制 / 发送失败：缓冲和冷却账本都不动，
//!   同一批消息还能参与下一次触发
//! - 发送成功：记录冷却，清空缓冲

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::buffer::MessageBuffers;
use super::cooldown::CooldownTracker;
use super::format::{notification_text, HistoryFormatter};
use crate::ai::classifier::{RelevanceClassifier, RelevanceResult};
use crate::transport::ChatTransport;

/// 分析协调器
pub struct AnalysisCoordinator {
    buffers: Arc<MessageBuffers>,
    cooldowns: Arc<CooldownTracker>,
    classifier: Arc<dyn RelevanceClassifier>,
    transport: Arc<dyn ChatTransport>,
    formatter: HistoryFormatter,
    /// conversation_id -> 分析槽位（单槽互斥）
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// 通知接收人
    recipient_id: String,
    /// 观察者兴趣列表
    interests: Vec<String>,
    /// conversation_id -> 群聊展示名
    chat_names: HashMap<String, String>,
    /// 分析调用超时
    classifier_timeout: Duration,
}

impl AnalysisCoordinator {
    /// 创建协调器
    pub fn new(
        buffers: Arc<MessageBuffers>,
        cooldowns: Arc<CooldownTracker>,
        classifier: Arc<dyn RelevanceClassifier>,
        transport: Arc<dyn ChatTransport>,
        recipient_id: String,
        interests: Vec<String>,
        chat_names: HashMap<String, String>,
        classifier_timeout: Duration,
    ) -> Self {
        let formatter = HistoryFormatter::new(Arc::clone(&transport));
        Self {
            buffers,
            cooldowns,
            classifier,
            transport,
            formatter,
            slots: Mutex::new(HashMap::new()),
            recipient_id,
            interests,
            chat_names,
            classifier_timeout,
        }
    }

    /// 获取或创建会话的分析槽位
    fn slot_for(&self, conversation_id: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// 分析一个会话的缓冲内容，命中时通知观察者
    ///
    /// 在后台任务中调用；内部吞掉所有错误，只记日志，绝不向摄入路径传播。
    pub async fn analyze(&self, conversation_id: &str) {
        let slot = self.slot_for(conversation_id);
        // 单槽互斥：已有分析在飞时本次触发直接合并掉
        let _guard = match slot.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(conversation = %conversation_id, "Analysis already in flight, trigger coalesced");
                return;
            }
        };

        let snapshot = self.buffers.snapshot(conversation_id);
        if snapshot.is_empty() {
            debug!(conversation = %conversation_id, "Buffer empty, nothing to analyze");
            return;
        }

        let chat_name = self
            .chat_names
            .get(conversation_id)
            .cloned()
            .unwrap_or_else(|| "Unknown Group".to_string());

        info!(
            conversation = %conversation_id,
            chat = %chat_name,
            messages = snapshot.len(),
            "Analyzing conversation burst"
        );

        let history = self.formatter.format_history(&snapshot).await;

        let analysis = match tokio::time::timeout(
            self.classifier_timeout,
            self.classifier.analyze(&history, &self.interests),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                // 瞬时错误：缓冲保留，下次触发重试
                warn!(conversation = %conversation_id, error = %e, "Relevance analysis failed, buffer kept for retry");
                return;
            }
            Err(_) => {
                warn!(
                    conversation = %conversation_id,
                    timeout_secs = self.classifier_timeout.as_secs(),
                    "Relevance analysis timed out, buffer kept for retry"
                );
                return;
            }
        };

        let (topic, summary) = match analysis {
            RelevanceResult::Relevant { topic, summary } => (topic, summary),
            RelevanceResult::NotRelevant => {
                debug!(conversation = %conversation_id, "Conversation not relevant to watcher interests");
                return;
            }
        };

        if !self
            .cooldowns
            .is_allowed(&self.recipient_id, &topic, Utc::now())
        {
            info!(
                conversation = %conversation_id,
                topic = %topic,
                "Notification suppressed by cooldown"
            );
            return;
        }

        let text = notification_text(&chat_name, &topic, &summary);
        match self.transport.send(&self.recipient_id, &text).await {
            Ok(()) => {
                self.cooldowns.record(&self.recipient_id, &topic, Utc::now());
                // 清空缓冲，同一波消息不再重复告警
                self.buffers.clear(conversation_id);
                info!(
                    conversation = %conversation_id,
                    topic = %topic,
                    recipient = %self.recipient_id,
                    "Notification sent"
                );
            }
            Err(e) => {
                // 不记冷却、不清缓冲，下次触发重试
                warn!(
                    conversation = %conversation_id,
                    error = %e,
                    "Failed to send notification, will retry on next trigger"
                );
            }
        }
    }
}
