pub mod config;
pub mod credential_store;
pub mod error;
pub mod gemini_client;
pub mod planner_repository;
pub mod settings_store;
pub mod storage;
