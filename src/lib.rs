//! Group Chat Monitor - 监控群聊并在话题命中观察者兴趣时主动通知

pub mod ai;
pub mod config;
pub mod engine;
pub mod processing;
pub mod store;
pub mod transport;

pub use ai::{
    ChatSummarizer, GeminiClassifier, GeminiClient, GeminiConfig, RelevanceClassifier,
    RelevanceResult,
};
pub use config::{AppConfig, ChatInfo, EngineSettings, GatewayConfig, WatcherConfig};
pub use engine::{
    AnalysisCoordinator, BufferedMessage, CooldownTracker, HistoryFormatter, MessageBuffers,
    NotificationEngine, TriggerPolicy,
};
pub use processing::{
    MessageProcessor, MessageRouter, PingProcessor, StoreProcessor, SummaryProcessor,
};
pub use store::{JsonlMessageStore, MessageStore, StoredMessage};
pub use transport::{
    ChatTransport, DryRunTransport, GatewayTransport, InboundMessage, PolledMessages,
};
