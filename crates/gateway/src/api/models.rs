use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

/// One selectable model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub free: bool,
    pub context_length: u32,
    pub supports_vision: bool,
}

pub const MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo {
        id: "openrouter/free",
        name: "Free Models Router",
        description: "Automatically picks from available free models",
        free: true,
        context_length: 128_000,
        supports_vision: true,
    },
    ModelInfo {
        id: "openai/gpt-oss-120b:free",
        name: "GPT-OSS 120B",
        description: "OpenAI open-source 120B model",
        free: true,
        context_length: 128_000,
        supports_vision: false,
    },
    ModelInfo {
        id: "qwen/qwen3-coder:free",
        name: "Qwen3 Coder 480B",
        description: "Large coding-focused model by Qwen",
        free: true,
        context_length: 65_536,
        supports_vision: false,
    },
    ModelInfo {
        id: "nvidia/nemotron-nano-12b-v2-vl:free",
        name: "Nemotron Nano 12B VL",
        description: "NVIDIA vision-language model",
        free: true,
        context_length: 32_768,
        supports_vision: true,
    },
    ModelInfo {
        id: "google/gemma-3n-e2b-it:free",
        name: "Gemma 3n 2B",
        description: "Lightweight Google model",
        free: true,
        context_length: 32_768,
        supports_vision: false,
    },
    ModelInfo {
        id: "openrouter/auto",
        name: "Auto (Smart Routing)",
        description: "Picks the best model (may cost credits)",
        free: false,
        context_length: 128_000,
        supports_vision: true,
    },
];

pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    MODEL_CATALOG.iter().find(|m| m.id == id)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/models
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "models": MODEL_CATALOG,
        "default": state.config.llm.default_model,
    }))
}
