//! 滚动消息缓冲 - 每个会话一个固定容量的消息窗口
//!
//! 缓冲在首条消息到达时惰性创建，超出容量时从头部逐出，
//! 逐出只发生在追加时。外层映射用读写锁，每个会话的缓冲
//! 各自持锁，避免一个会话的操作阻塞其他会话。

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// 缓冲中的一条消息，追加后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedMessage {
    /// 发送者 ID
    pub sender_id: String,
    /// 消息文本
    pub text: String,
    /// 发送时间
    pub sent_at: DateTime<Utc>,
}

/// 单个会话的缓冲
struct ConversationBuffer {
    messages: VecDeque<BufferedMessage>,
    last_activity: DateTime<Utc>,
}

impl ConversationBuffer {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            last_activity: Utc::now(),
        }
    }
}

/// 按会话分组的滚动缓冲集合
pub struct MessageBuffers {
    capacity: usize,
    inner: RwLock<HashMap<String, Arc<Mutex<ConversationBuffer>>>>,
}

impl MessageBuffers {
    /// 创建缓冲集合，`capacity` 为每个会话保留的消息条数
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// 获取或创建指定会话的缓冲
    fn buffer_for(&self, conversation_id: &str) -> Arc<Mutex<ConversationBuffer>> {
        // 读锁快路径
        {
            let map = self
                .inner
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(buffer) = map.get(conversation_id) {
                return Arc::clone(buffer);
            }
        }

        let mut map = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ConversationBuffer::new()))),
        )
    }

    /// 追加消息，超出容量时逐出最旧的一条
    pub fn append(&self, conversation_id: &str, message: BufferedMessage) {
        let buffer = self.buffer_for(conversation_id);
        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);

        buffer.messages.push_back(message);
        buffer.last_activity = Utc::now();

        while buffer.messages.len() > self.capacity {
            buffer.messages.pop_front();
        }
    }

    /// 只读快照，按到达顺序返回；不存在的会话返回空
    pub fn snapshot(&self, conversation_id: &str) -> Vec<BufferedMessage> {
        let map = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match map.get(conversation_id) {
            Some(buffer) => {
                let buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                buffer.messages.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// 清空指定会话的缓冲（成功通知后调用，避免同一波消息重复告警）
    pub fn clear(&self, conversation_id: &str) {
        let map = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(buffer) = map.get(conversation_id) {
            let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
            buffer.messages.clear();
        }
    }

    /// 最近活动时间，不存在的会话返回 None
    pub fn last_activity(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        let map = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        map.get(conversation_id).map(|buffer| {
            buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last_activity
        })
    }
}
