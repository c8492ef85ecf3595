//! # docbox
//!
//! A document-grounded chat service. Users upload documents into isolated
//! namespaces, then chat with them: uploads are chunked, embedded, and
//! indexed in a hosted vector index; questions are answered by a completion
//! model grounded in the most similar chunks. Chat history, landing-page
//! generation, agent-memory conversations, and plain/multimodal inference
//! ride on the same authentication layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────┐   ┌────────────┐
//! │  Upload  │──▶│ Chunk + Embed     │──▶│ Vector idx │
//! └──────────┘   └───────────────────┘   └─────┬──────┘
//!                                              │ top-K ≥ 0.7
//! ┌──────────┐   ┌───────────────────┐   ┌─────▼──────┐
//! │   Chat   │──▶│ Embed query       │──▶│  Grounded  │──▶ Completion
//! └──────────┘   └───────────────────┘   │   prompt   │
//!                                        └────────────┘
//! ```
//!
//! SQLite (via sqlx) holds users, namespaces, chats, and messages. The
//! embedding, completion, and vector-index collaborators are consumed over
//! HTTP behind trait seams.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`result`] | Uniform action result/error type |
//! | [`chunk`] | Overlapping-window text chunking |
//! | [`extract`] | PDF/DOCX/plain-text extraction |
//! | [`embedding`] | Embedding collaborator |
//! | [`completion`] | Completion collaborator |
//! | [`vector`] | Vector index collaborator |
//! | [`upload`] | Document upload pipeline |
//! | [`answer`] | Retrieval-augmented answering |
//! | [`converse`] | Send-message orchestration |
//! | [`auth`] | Registration, login, identity |
//! | [`ratelimit`] | Store-backed login rate limiting |
//! | [`namespaces`] / [`chats`] / [`messages`] | Owner-scoped stores |
//! | [`memory`] | Agent-memory conversations |
//! | [`landing`] | Landing-page generation |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod auth;
pub mod chats;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod converse;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod landing;
pub mod memory;
pub mod messages;
pub mod migrate;
pub mod models;
pub mod namespaces;
pub mod ratelimit;
pub mod result;
pub mod server;
pub mod upload;
pub mod vector;
