//! 摘要处理器 - 私聊 `!summary -N` 按需生成群聊摘要
//!
//! 流程：命令解析 → 群成员校验 → 限流 → 拉取历史 → 生成摘要 → 回复。
//! 限流为滑动窗口（每用户 24 小时内 3 次），防止滥刷模型调用。
//! 只响应私聊，群里发 `!summary` 不理。

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use super::MessageProcessor;
use crate::ai::classifier::ChatSummarizer;
use crate::config::ChatInfo;
use crate::engine::buffer::BufferedMessage;
use crate::engine::format::HistoryFormatter;
use crate::store::MessageStore;
use crate::transport::{ChatTransport, InboundMessage};

/// 每用户 24 小时内的最大请求数
const MAX_REQUESTS_PER_DAY: usize = 3;

/// 限流窗口
const RATE_LIMIT_WINDOW_HOURS: i64 = 24;

/// 单次摘要的最大小时数（一周）
const MAX_HOURS: i64 = 168;

/// 摘要处理器
pub struct SummaryProcessor {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn MessageStore>,
    summarizer: Arc<dyn ChatSummarizer>,
    formatter: HistoryFormatter,
    /// 摘要的目标群聊
    target_chat: ChatInfo,
    /// user_id -> 请求时间戳（滑动窗口限流）
    request_log: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    command: Regex,
}

impl SummaryProcessor {
    /// 创建处理器，`target_chat` 为摘要的目标群聊
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn MessageStore>,
        summarizer: Arc<dyn ChatSummarizer>,
        target_chat: ChatInfo,
    ) -> Self {
        let formatter = HistoryFormatter::new(Arc::clone(&transport));
        Self {
            transport,
            store,
            summarizer,
            formatter,
            target_chat,
            request_log: Mutex::new(HashMap::new()),
            // 摘要命令格式：!summary -24
            command: Regex::new(r"^!summary\s+-(\d+)$").unwrap(),
        }
    }

    /// 滑动窗口限流检查，顺手清理过期时间戳
    fn is_rate_limited(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let mut log = self
            .request_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let window = Duration::hours(RATE_LIMIT_WINDOW_HOURS);
        let requests = log.entry(user_id.to_string()).or_default();
        requests.retain(|t| now.signed_duration_since(*t) < window);
        requests.len() >= MAX_REQUESTS_PER_DAY
    }

    /// 记录一次请求
    fn record_request(&self, user_id: &str, now: DateTime<Utc>) {
        let mut log = self
            .request_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        log.entry(user_id.to_string()).or_default().push(now);
    }

    async fn reply(&self, user_id: &str, text: &str) -> Result<()> {
        self.transport.send(user_id, text).await
    }

    async fn handle_command(&self, user_id: &str, hours: i64) -> Result<()> {
        let chat_name = &self.target_chat.name;

        // 隐私校验：只有群成员才能要这个群的摘要
        let is_member = match self
            .transport
            .is_member(user_id, &self.target_chat.id)
            .await
        {
            Ok(member) => member,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Membership check failed, denying summary");
                false
            }
        };
        if !is_member {
            self.reply(
                user_id,
                &format!(
                    "Sorry, you don't seem to be a member of the '{}' group I'm configured to summarize.",
                    chat_name
                ),
            )
            .await?;
            return Ok(());
        }

        let now = Utc::now();
        if self.is_rate_limited(user_id, now) {
            self.reply(
                user_id,
                "You have reached your summary limit for today (3 requests per 24 hours). Please try again tomorrow.",
            )
            .await?;
            return Ok(());
        }

        self.reply(
            user_id,
            &format!(
                "Got it! Generating a summary for the '{}' group for the last {} hours. This might take a moment...",
                chat_name, hours
            ),
        )
        .await?;
        self.record_request(user_id, now);

        let since = now - Duration::hours(hours);
        let messages = self
            .store
            .messages_since(&self.target_chat.id, since)
            .await?;

        if messages.is_empty() {
            self.reply(
                user_id,
                &format!(
                    "No messages found in the '{}' group in the last {} hours.",
                    chat_name, hours
                ),
            )
            .await?;
            return Ok(());
        }

        info!(
            user = %user_id,
            chat = %chat_name,
            messages = messages.len(),
            hours = hours,
            "Generating on-demand summary"
        );

        let buffered: Vec<BufferedMessage> = messages
            .iter()
            .map(|m| BufferedMessage {
                sender_id: m.sender_id.clone(),
                text: m.text.clone(),
                sent_at: m.sent_at,
            })
            .collect();
        let history = self.formatter.format_history(&buffered).await;

        match self.summarizer.summarize(&history).await {
            Ok(summary) => {
                self.reply(
                    user_id,
                    &format!(
                        "📋 *Summary for '{}' - last {} hours*\n\n{}",
                        chat_name, hours, summary
                    ),
                )
                .await?;
            }
            Err(e) => {
                warn!(user = %user_id, error = %e, "Summary generation failed");
                self.reply(
                    user_id,
                    "Sorry, I encountered an error while generating your summary. Please try again later.",
                )
                .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for SummaryProcessor {
    fn name(&self) -> &str {
        "summary"
    }

    async fn process(&self, message: &InboundMessage) -> Result<()> {
        // 只接受私聊命令
        if !message.is_direct() {
            return Ok(());
        }
        let text = message.text.trim();
        if !text.starts_with("!summary") {
            return Ok(());
        }

        let user_id = message.conversation_id.as_str();

        let hours = match self.command.captures(text) {
            Some(captures) => captures[1].parse::<i64>().unwrap_or(0),
            None => {
                self.reply(
                    user_id,
                    "Invalid format. Please use !summary -24 for the last 24 hours.",
                )
                .await?;
                return Ok(());
            }
        };

        if hours <= 0 || hours > MAX_HOURS {
            self.reply(
                user_id,
                "Please specify a number between 1 and 168 hours (1 week maximum).",
            )
            .await?;
            return Ok(());
        }

        self.handle_command(user_id, hours).await
    }
}
