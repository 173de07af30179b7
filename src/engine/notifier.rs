//! 通知引擎门面 - 唯一的消息摄入入口
//!
//! `on_message` 同步返回，绝不等待分析：触发命中时把分析扔进
//! 后台任务，任务内部自行处理全部错误。多个引擎实例互不干扰，
//! 所有状态都挂在实例上。

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::buffer::{BufferedMessage, MessageBuffers};
use super::cooldown::CooldownTracker;
use super::coordinator::AnalysisCoordinator;
use super::trigger::TriggerPolicy;
use crate::ai::classifier::RelevanceClassifier;
use crate::config::{ChatInfo, EngineSettings, WatcherConfig};
use crate::processing::MessageProcessor;
use crate::transport::{ChatTransport, InboundMessage};

/// 活动触发的通知引擎
pub struct NotificationEngine {
    buffers: Arc<MessageBuffers>,
    trigger: TriggerPolicy,
    coordinator: Arc<AnalysisCoordinator>,
    /// conversation_id -> 群聊展示名（监控白名单）
    monitored: HashMap<String, String>,
}

impl NotificationEngine {
    /// 组装引擎
    pub fn new(
        settings: &EngineSettings,
        chats: &[ChatInfo],
        watcher: &WatcherConfig,
        classifier: Arc<dyn RelevanceClassifier>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let buffers = Arc::new(MessageBuffers::new(settings.buffer_capacity));
        let cooldowns = Arc::new(CooldownTracker::new(settings.cooldown()));
        let monitored: HashMap<String, String> = chats
            .iter()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();

        let coordinator = Arc::new(AnalysisCoordinator::new(
            Arc::clone(&buffers),
            cooldowns,
            classifier,
            transport,
            watcher.recipient_id.clone(),
            watcher.interests.clone(),
            monitored.clone(),
            settings.classifier_timeout(),
        ));

        info!(
            chats = monitored.len(),
            recipient = %watcher.recipient_id,
            threshold = settings.trigger_threshold,
            window_secs = settings.trigger_window_secs,
            cooldown_secs = settings.cooldown_secs,
            "Notification engine initialized"
        );

        Self {
            buffers,
            trigger: TriggerPolicy::new(settings.trigger_threshold, settings.trigger_window()),
            coordinator,
            monitored,
        }
    }

    /// 摄入一条消息
    ///
    /// 需要在 tokio runtime 内调用；触发命中时 spawn 分析任务后立即返回。
    pub fn on_message(&self, message: &InboundMessage) {
        // 只监控白名单内的群聊
        if !message.is_group() || !self.monitored.contains_key(&message.conversation_id) {
            return;
        }

        self.buffers.append(
            &message.conversation_id,
            BufferedMessage {
                sender_id: message.sender_id.clone(),
                text: message.text.clone(),
                sent_at: message.sent_at,
            },
        );

        let snapshot = self.buffers.snapshot(&message.conversation_id);
        let now = Utc::now();
        if !self.trigger.should_trigger(&snapshot, now) {
            debug!(
                conversation = %message.conversation_id,
                buffered = snapshot.len(),
                in_window = self.trigger.count_in_window(&snapshot, now),
                "Below trigger threshold"
            );
            return;
        }

        info!(
            conversation = %message.conversation_id,
            in_window = self.trigger.count_in_window(&snapshot, now),
            "Activity burst detected, scheduling analysis"
        );

        let coordinator = Arc::clone(&self.coordinator);
        let conversation_id = message.conversation_id.clone();
        tokio::spawn(async move {
            coordinator.analyze(&conversation_id).await;
        });
    }

    /// 缓冲快照（观测和测试用）
    pub fn buffered(&self, conversation_id: &str) -> Vec<BufferedMessage> {
        self.buffers.snapshot(conversation_id)
    }
}

#[async_trait]
impl MessageProcessor for NotificationEngine {
    fn name(&self) -> &str {
        "notifier"
    }

    async fn process(&self, message: &InboundMessage) -> Result<()> {
        self.on_message(message);
        Ok(())
    }
}
