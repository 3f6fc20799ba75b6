//! LLM provider cascade: unified generation with ordered failover.

pub mod cascade;
pub mod gigachat;
pub mod huggingface;
pub mod openrouter;
pub mod provider;
pub mod types;
pub mod yandexgpt;

use std::sync::Arc;

use crate::config::Config;
use crate::services::http::HttpGateway;

pub use cascade::{LlmCascade, TextGenerator};
pub use provider::LlmProvider;
pub use types::{GenerationOutcome, GenerationParams, JsonOutcome, LlmError, LlmRequest, LlmResult};

/// Build the production cascade in its fixed failover order.
pub fn build_cascade(config: &Config, gateway: Arc<HttpGateway>) -> LlmCascade {
    let keys = &config.keys;
    LlmCascade::new(vec![
        Arc::new(openrouter::OpenRouterProvider::new(
            gateway.clone(),
            keys.openrouter_key.clone(),
        )),
        Arc::new(huggingface::HuggingFaceProvider::new(
            gateway.clone(),
            keys.huggingface_key.clone(),
        )),
        Arc::new(gigachat::GigaChatProvider::new(
            gateway.clone(),
            keys.gigachat_key.clone(),
        )),
        Arc::new(yandexgpt::YandexGptProvider::new(
            gateway,
            keys.yandex_key.clone(),
            keys.yandex_folder_id.clone(),
        )),
    ])
}
