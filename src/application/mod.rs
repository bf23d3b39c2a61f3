pub mod ai_workflow;
pub mod bootstrap;
pub mod commands;
pub mod fallback;
pub mod prompts;
pub mod response_parser;
pub mod targets;

#[cfg(test)]
mod test_support;
