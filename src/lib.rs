//! roundtable: a multi-agent conversational orchestrator. Fans a user turn out to several
//! provider adapters concurrently, projects each agent's view of the shared conversation, and
//! persists the result in a project-scoped transcript and retrieval store.

pub mod chunker;
pub mod config;
pub mod error;
pub mod filestore;
pub mod indexer;
pub mod orchestrator;
pub mod path_expr;
pub mod provider;
pub mod search;
pub mod server;
pub mod store;
pub mod transcript;
pub mod view_builder;
