//! 触发判定 - 决定一段近期活动是否值得送去分析
//!
//! 采用尾随时间窗口而不是"累计 N 条"：几小时内零散的 N 条消息
//! 永远不会触发，短时间内的密集往来才会，近似"这个群聊刚刚热起来"。
//! 判定是纯函数，`now` 由调用方显式传入，单测无需伪造时钟。

use chrono::{DateTime, Duration, Utc};

use super::buffer::BufferedMessage;

/// 触发策略
#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    /// 窗口内消息数阈值
    threshold: usize,
    /// 尾随窗口时长
    window: Duration,
}

impl TriggerPolicy {
    /// 创建触发策略
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self { threshold, window }
    }

    /// 统计快照中落在 `[now - window, now]` 内的消息数
    ///
    /// 边界按闭区间处理；`sent_at` 晚于 `now` 的消息不计入。
    pub fn count_in_window(&self, snapshot: &[BufferedMessage], now: DateTime<Utc>) -> usize {
        snapshot
            .iter()
            .filter(|m| {
                let age = now.signed_duration_since(m.sent_at);
                age >= Duration::zero() && age <= self.window
            })
            .count()
    }

    /// 窗口内消息数达到阈值时返回 true
    pub fn should_trigger(&self, snapshot: &[BufferedMessage], now: DateTime<Utc>) -> bool {
        self.count_in_window(snapshot, now) >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_at(sent_at: DateTime<Utc>) -> BufferedMessage {
        BufferedMessage {
            sender_id: "1@c.us".to_string(),
            text: "hello".to_string(),
            sent_at,
        }
    }

    fn policy() -> TriggerPolicy {
        TriggerPolicy::new(3, Duration::seconds(120))
    }

    #[test]
    fn test_triggers_on_burst_within_window() {
        let now = Utc::now();
        let snapshot = vec![
            message_at(now - Duration::seconds(10)),
            message_at(now - Duration::seconds(5)),
            message_at(now - Duration::seconds(1)),
        ];
        assert!(policy().should_trigger(&snapshot, now));
    }

    #[test]
    fn test_below_threshold_does_not_trigger() {
        let now = Utc::now();
        let snapshot = vec![
            message_at(now - Duration::seconds(10)),
            message_at(now - Duration::seconds(5)),
        ];
        assert!(!policy().should_trigger(&snapshot, now));
    }

    #[test]
    fn test_old_messages_do_not_count() {
        let now = Utc::now();
        // 累计 3 条，但只有 1 条在窗口内
        let snapshot = vec![
            message_at(now - Duration::minutes(10)),
            message_at(now - Duration::minutes(3)),
            message_at(now - Duration::seconds(30)),
        ];
        assert_eq!(policy().count_in_window(&snapshot, now), 1);
        assert!(!policy().should_trigger(&snapshot, now));
    }

    #[test]
    fn test_is_pure_same_input_same_output() {
        let now = Utc::now();
        let snapshot = vec![
            message_at(now - Duration::seconds(10)),
            message_at(now - Duration::seconds(5)),
            message_at(now - Duration::seconds(1)),
        ];
        let policy = policy();
        let first = policy.should_trigger(&snapshot, now);
        for _ in 0..10 {
            assert_eq!(policy.should_trigger(&snapshot, now), first);
        }
    }

    #[test]
    fn test_inserting_stale_message_does_not_change_count() {
        let now = Utc::now();
        let mut snapshot = vec![
            message_at(now - Duration::seconds(10)),
            message_at(now - Duration::seconds(5)),
        ];
        let policy = policy();
        let before = policy.count_in_window(&snapshot, now);

        snapshot.push(message_at(now - Duration::hours(2)));
        assert_eq!(policy.count_in_window(&snapshot, now), before);
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let now = Utc::now();
        let snapshot = vec![
            message_at(now - Duration::seconds(120)),
            message_at(now - Duration::seconds(60)),
            message_at(now),
        ];
        // 恰好在窗口边缘和恰好为 now 的消息都算在内
        assert_eq!(policy().count_in_window(&snapshot, now), 3);
        assert!(policy().should_trigger(&snapshot, now));
    }

    #[test]
    fn test_future_messages_do_not_count() {
        let now = Utc::now();
        let snapshot = vec![
            message_at(now + Duration::seconds(30)),
            message_at(now - Duration::seconds(5)),
            message_at(now - Duration::seconds(1)),
        ];
        assert_eq!(policy().count_in_window(&snapshot, now), 2);
        assert!(!policy().should_trigger(&snapshot, now));
    }
}
