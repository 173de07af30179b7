//! Group Chat Monitor CLI
//!
//! 监控群聊活动，在话题命中观察者兴趣时主动发送通知

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use group_chat_monitor::{
    AppConfig, ChatTransport, DryRunTransport, GatewayTransport, GeminiClassifier,
    JsonlMessageStore, MessageProcessor, MessageRouter, NotificationEngine, PingProcessor,
    StoreProcessor, SummaryProcessor,
};

#[derive(Parser)]
#[command(name = "gcm")]
#[command(about = "Group Chat Monitor - 监控群聊并主动通知观察者")]
#[command(version)]
struct Cli {
    /// 配置文件路径 (默认: ~/.config/group-chat-monitor/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动监控循环
    Start {
        /// 不实际发送消息，只打印到终端
        #[arg(long)]
        dry_run: bool,
    },
    /// 列出配置的监控群聊
    Chats {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 校验网关连通性与群聊配置
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Start { dry_run } => handle_start(config, dry_run).await,
        Commands::Chats { json } => handle_chats(&config, json),
        Commands::Check => handle_check(&config).await,
    }
}

async fn handle_start(config: AppConfig, dry_run: bool) -> Result<()> {
    let gateway = Arc::new(GatewayTransport::new(config.gateway.clone())?);
    let transport: Arc<dyn ChatTransport> = if dry_run {
        Arc::new(DryRunTransport::new(
            Arc::clone(&gateway) as Arc<dyn ChatTransport>
        ))
    } else {
        Arc::clone(&gateway) as Arc<dyn ChatTransport>
    };

    let classifier = Arc::new(GeminiClassifier::from_config()?);
    let store = Arc::new(JsonlMessageStore::new(config.store_path()));
    let monitored: HashSet<String> = config.target_chats.iter().map(|c| c.id.clone()).collect();

    let engine = Arc::new(NotificationEngine::new(
        &config.engine,
        &config.target_chats,
        &config.watcher,
        Arc::clone(&classifier) as _,
        Arc::clone(&transport),
    ));

    let processors: Vec<Arc<dyn MessageProcessor>> = vec![
        Arc::new(StoreProcessor::new(Arc::clone(&store) as _, monitored)),
        Arc::new(PingProcessor::new(Arc::clone(&transport))),
        Arc::new(SummaryProcessor::new(
            Arc::clone(&transport),
            Arc::clone(&store) as _,
            Arc::clone(&classifier) as _,
            config.target_chats[0].clone(),
        )),
        engine,
    ];
    let router = MessageRouter::new(processors);

    println!("✅ Group chat monitor started");
    println!("Running in {} mode.", config.environment);
    println!(
        "Targeting chats: {}",
        config
            .target_chats
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if dry_run {
        println!("[DRY-RUN] Outgoing messages will be printed, not sent");
    }

    let interval = Duration::from_secs(config.gateway.poll_interval_secs);
    let mut cursor: Option<String> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n🔄 Shutting down gracefully...");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                match gateway.poll_messages(cursor.as_deref()).await {
                    Ok(polled) => {
                        if polled.cursor.is_some() {
                            cursor = polled.cursor;
                        }
                        for message in &polled.messages {
                            router.handle(message).await;
                        }
                    }
                    Err(e) => {
                        // 网关抖动只记日志，下一轮继续
                        warn!(error = %e, "Polling gateway failed, will retry");
                    }
                }
            }
        }
    }

    info!("Monitor stopped");
    Ok(())
}

fn handle_chats(config: &AppConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&config.target_chats)?);
        return Ok(());
    }

    println!("Monitored chats ({}):", config.target_chats.len());
    for chat in &config.target_chats {
        println!("  {} ({})", chat.name, chat.id);
    }
    println!("\nWatcher: {}", config.watcher.recipient_id);
    println!("Interests: {}", config.watcher.interests.join(", "));
    Ok(())
}

async fn handle_check(config: &AppConfig) -> Result<()> {
    let gateway = GatewayTransport::new(config.gateway.clone())?;

    print!("Gateway {} ... ", config.gateway.url);
    match gateway.ping().await {
        Ok(()) => println!("✅ reachable"),
        Err(e) => {
            println!("❌ {}", e);
            return Err(e);
        }
    }

    let mut ok = 0;
    let mut failed = 0;
    for chat in &config.target_chats {
        match gateway.chat_exists(&chat.id).await {
            Ok(true) => {
                println!("✅ Found chat: {} ({})", chat.name, chat.id);
                ok += 1;
            }
            Ok(false) => {
                println!("❌ Chat not found: {} ({})", chat.name, chat.id);
                failed += 1;
            }
            Err(e) => {
                println!("❌ Error checking chat {}: {}", chat.name, e);
                failed += 1;
            }
        }
    }

    println!("\n📊 Chat validation complete:");
    println!("✅ Successful: {}/{}", ok, config.target_chats.len());
    if failed > 0 {
        println!("❌ Failed: {}/{}", failed, config.target_chats.len());
    }
    Ok(())
}
