pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod frontend;
pub mod llm_providers;
pub mod llm_service;
pub mod logging;
pub mod models;
pub mod pdf_extractor;
pub mod quiz_service;

pub use auth::{CurrentUser, Identity, IdentityVerifier, JwtVerifier};
pub use database::Database;
pub use errors::*;
pub use llm_providers::{
    CompletionProvider, JsonResponseParser, LLMProvider, LLMProviderFactory, LLMProviderType,
    MockProvider,
};
pub use llm_service::LLMService;
pub use models::*;
pub use quiz_service::QuizService;
