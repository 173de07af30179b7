//! 通知冷却账本 - 按接收人、按话题的抑制窗口
//!
//! 同一话题在冷却期内只通知一次。话题是精确字符串匹配，
//! 不做模糊或语义比较。过期条目不会阻塞任何通知，
//! `record` 时顺手清理，正确性不依赖清理。

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// 冷却账本
pub struct CooldownTracker {
    /// 冷却时长
    period: Duration,
    /// recipient_id -> topic -> 上次通知时间
    inner: Mutex<HashMap<String, HashMap<String, DateTime<Utc>>>>,
}

impl CooldownTracker {
    /// 创建账本
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// 是否允许就该话题通知该接收人
    ///
    /// 仅当同一 `(recipient_id, topic)` 的上次通知仍在冷却期内时返回 false。
    pub fn is_allowed(&self, recipient_id: &str, topic: &str, now: DateTime<Utc>) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner
            .get(recipient_id)
            .and_then(|topics| topics.get(topic))
        {
            Some(last_notified) => now.signed_duration_since(*last_notified) >= self.period,
            None => true,
        }
    }

    /// 记录一次通知（upsert），并清理该接收人的过期条目
    pub fn record(&self, recipient_id: &str, topic: &str, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let topics = inner.entry(recipient_id.to_string()).or_default();
        topics.insert(topic.to_string(), now);

        let period = self.period;
        let before = topics.len();
        topics.retain(|_, last| now.signed_duration_since(*last) < period);
        if topics.len() < before {
            debug!(
                recipient = %recipient_id,
                pruned = before - topics.len(),
                "Pruned expired cooldown entries"
            );
        }
    }

    /// 当前记录的条目数（测试用）
    #[cfg(test)]
    fn entry_count(&self, recipient_id: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.get(recipient_id).map(|t| t.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_topic_is_allowed() {
        let tracker = CooldownTracker::new(Duration::hours(1));
        assert!(tracker.is_allowed("user", "startups", Utc::now()));
    }

    #[test]
    fn test_cooldown_monotonicity() {
        let tracker = CooldownTracker::new(Duration::hours(1));
        let now = Utc::now();
        tracker.record("user", "startups", now);

        // 冷却期内任意时刻都被抑制
        assert!(!tracker.is_allowed("user", "startups", now));
        assert!(!tracker.is_allowed("user", "startups", now + Duration::minutes(5)));
        assert!(!tracker.is_allowed("user", "startups", now + Duration::minutes(59)));

        // 冷却期满恢复
        assert!(tracker.is_allowed("user", "startups", now + Duration::hours(1)));
        assert!(tracker.is_allowed("user", "startups", now + Duration::hours(2)));
    }

    #[test]
    fn test_topics_are_independent() {
        let tracker = CooldownTracker::new(Duration::hours(1));
        let now = Utc::now();
        tracker.record("user", "startups", now);

        assert!(!tracker.is_allowed("user", "startups", now));
        // 其他话题不受影响
        assert!(tracker.is_allowed("user", "hackathons", now));
    }

    #[test]
    fn test_recipients_are_independent() {
        let tracker = CooldownTracker::new(Duration::hours(1));
        let now = Utc::now();
        tracker.record("user-a", "startups", now);

        assert!(!tracker.is_allowed("user-a", "startups", now));
        assert!(tracker.is_allowed("user-b", "startups", now));
    }

    #[test]
    fn test_topic_match_is_exact() {
        let tracker = CooldownTracker::new(Duration::hours(1));
        let now = Utc::now();
        tracker.record("user", "startups", now);

        // 精确字符串匹配，大小写或近义词都算不同话题
        assert!(tracker.is_allowed("user", "Startups", now));
        assert!(tracker.is_allowed("user", "startup", now));
    }

    #[test]
    fn test_record_updates_existing_entry() {
        let tracker = CooldownTracker::new(Duration::hours(1));
        let now = Utc::now();
        tracker.record("user", "startups", now);
        tracker.record("user", "startups", now + Duration::minutes(90));

        // 以最新记录为准
        assert!(!tracker.is_allowed("user", "startups", now + Duration::minutes(100)));
        assert!(tracker.is_allowed("user", "startups", now + Duration::minutes(151)));
    }

    #[test]
    fn test_expired_entries_pruned_on_record() {
        let tracker = CooldownTracker::new(Duration::hours(1));
        let now = Utc::now();
        tracker.record("user", "old-topic", now - Duration::hours(3));
        tracker.record("user", "fresh-topic", now);

        assert_eq!(tracker.entry_count("user"), 1);
        assert!(tracker.is_allowed("user", "old-topic", now));
    }
}
