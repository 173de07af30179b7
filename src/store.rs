//! 消息存储 - 本地 JSONL 文件读写
//!
//! 供 `!summary` 等旁路功能使用，通知引擎本身不读取存储。
//! 每行一条 JSON 记录，追加时加独占文件锁，读取时逐行解析并跳过坏行。

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use crate::transport::InboundMessage;

/// 存储的消息记录（JSONL 格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// 会话 ID
    pub conversation_id: String,
    /// 发送者 ID
    pub sender_id: String,
    /// 消息文本
    pub text: String,
    /// 发送时间
    pub sent_at: DateTime<Utc>,
}

impl From<&InboundMessage> for StoredMessage {
    fn from(msg: &InboundMessage) -> Self {
        Self {
            conversation_id: msg.conversation_id.clone(),
            sender_id: msg.sender_id.clone(),
            text: msg.text.clone(),
            sent_at: msg.sent_at,
        }
    }
}

/// 消息历史存储能力
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 追加一条消息记录
    async fn append(&self, record: StoredMessage) -> Result<()>;

    /// 读取指定会话在 `since` 之后的消息（按时间升序）
    async fn messages_since(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredMessage>>;
}

/// JSONL 文件存储
pub struct JsonlMessageStore {
    path: PathBuf,
}

impl JsonlMessageStore {
    /// 创建存储实例，文件在首次追加时创建
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Vec<StoredMessage> {
        if !self.path.exists() {
            return Vec::new();
        }

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let reader = BufReader::new(file);
        reader
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect()
    }
}

#[async_trait]
impl MessageStore for JsonlMessageStore {
    async fn append(&self, record: StoredMessage) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;
        let mut file = file;
        let result = writeln!(file, "{}", serde_json::to_string(&record)?);
        file.unlock()?;
        result?;

        Ok(())
    }

    async fn messages_since(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredMessage>> {
        let mut records: Vec<StoredMessage> = self
            .read_all()
            .into_iter()
            .filter(|r| r.conversation_id == conversation_id && r.sent_at >= since)
            .collect();
        records.sort_by_key(|r| r.sent_at);
        Ok(records)
    }
}
