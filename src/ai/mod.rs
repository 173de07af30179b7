//! AI 模块 - Gemini 客户端与相关性分析

pub mod classifier;
pub mod client;

pub use classifier::{ChatSummarizer, GeminiClassifier, RelevanceClassifier, RelevanceResult};
pub use client::{GeminiClient, GeminiConfig};
