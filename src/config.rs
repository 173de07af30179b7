//! 配置模块 - 监控目标、观察者与引擎参数
//!
//! 配置读取优先级：
//! 1. `--config` 指定的路径
//! 2. `~/.config/group-chat-monitor/config.json`
//!
//! 环境变量 `GCM_GATEWAY_URL` / `GCM_GATEWAY_TOKEN` 可覆盖网关字段，
//! Gemini API Key 由 `ai::client::GeminiConfig` 单独加载。
//! 配置在启动后不可变，引擎不支持热更新。

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 监控的群聊信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatInfo {
    /// 会话 ID（如 `120363359504745590@g.us`）
    pub id: String,
    /// 展示名称
    pub name: String,
}

/// 观察者配置 - 通知的接收人及其兴趣列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// 接收通知的联系人 ID（如 `447927612815@c.us`）
    pub recipient_id: String,
    /// 兴趣关键词，供相关性分析使用
    #[serde(default)]
    pub interests: Vec<String>,
}

/// 引擎调优参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// 每个会话保留的消息条数
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// 触发分析所需的窗口内消息数
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: usize,
    /// 触发窗口时长（秒）
    #[serde(default = "default_trigger_window_secs")]
    pub trigger_window_secs: u64,
    /// 同一话题的通知冷却时长（秒）
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// 相关性分析调用超时（秒）
    #[serde(default = "default_classifier_timeout_secs")]
    pub classifier_timeout_secs: u64,
}

fn default_buffer_capacity() -> usize {
    20
}

fn default_trigger_threshold() -> usize {
    3
}

fn default_trigger_window_secs() -> u64 {
    120
}

fn default_cooldown_secs() -> u64 {
    3600
}

fn default_classifier_timeout_secs() -> u64 {
    30
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            trigger_threshold: default_trigger_threshold(),
            trigger_window_secs: default_trigger_window_secs(),
            cooldown_secs: default_cooldown_secs(),
            classifier_timeout_secs: default_classifier_timeout_secs(),
        }
    }
}

impl EngineSettings {
    /// 触发窗口时长
    pub fn trigger_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.trigger_window_secs as i64)
    }

    /// 冷却时长
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    /// 分析调用超时
    pub fn classifier_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.classifier_timeout_secs)
    }
}

/// 网关配置 - 与聊天桥接服务通信
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway URL（如 `http://localhost:8090`）
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// 认证 token
    #[serde(default)]
    pub token: String,
    /// 请求超时（秒）
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
    /// 拉取消息的轮询间隔（秒）
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_gateway_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    2
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            token: String::new(),
            timeout_secs: default_gateway_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 运行环境标识（development / production）
    #[serde(default = "default_environment")]
    pub environment: String,
    /// 监控的群聊列表（白名单，不在列表中的会话被忽略）
    pub target_chats: Vec<ChatInfo>,
    /// 观察者配置
    pub watcher: WatcherConfig,
    /// 引擎调优参数
    #[serde(default)]
    pub engine: EngineSettings,
    /// 网关配置
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// 消息存储文件路径（缺省为 `~/.config/group-chat-monitor/messages.jsonl`）
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_environment() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("group-chat-monitor")
            .join("config.json")
    }

    /// 默认消息存储路径
    pub fn default_store_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("group-chat-monitor")
            .join("messages.jsonl")
    }

    /// 加载配置，`path` 为 None 时使用默认路径
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config file: {}", path.display()))?;
        let mut config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        // 环境变量覆盖网关字段
        if let Ok(url) = std::env::var("GCM_GATEWAY_URL") {
            if !url.is_empty() {
                debug!("Using gateway url from GCM_GATEWAY_URL");
                config.gateway.url = url;
            }
        }
        if let Ok(token) = std::env::var("GCM_GATEWAY_TOKEN") {
            if !token.is_empty() {
                debug!("Using gateway token from GCM_GATEWAY_TOKEN");
                config.gateway.token = token;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// 校验配置完整性
    pub fn validate(&self) -> Result<()> {
        if self.target_chats.is_empty() {
            return Err(anyhow!("Config requires at least one entry in target_chats"));
        }
        if self.watcher.recipient_id.is_empty() {
            return Err(anyhow!("Config requires watcher.recipient_id"));
        }
        if self.engine.buffer_capacity == 0 {
            return Err(anyhow!("engine.buffer_capacity must be greater than 0"));
        }
        if self.engine.trigger_threshold == 0 {
            return Err(anyhow!("engine.trigger_threshold must be greater than 0"));
        }
        Ok(())
    }

    /// 根据会话 ID 查找群聊名称
    pub fn chat_name(&self, conversation_id: &str) -> Option<&str> {
        self.target_chats
            .iter()
            .find(|c| c.id == conversation_id)
            .map(|c| c.name.as_str())
    }

    /// 消息存储路径（带缺省值）
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(Self::default_store_path)
    }
}
