#![deny(missing_docs)]

//! Core library for the docgraph summarization server.

/// HTTP routing and REST handlers.
pub mod api;
/// Redis-backed summary cache adapter.
pub mod cache;
/// Token-aware semantic chunking helpers.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Language model clients and map-reduce summarization.
pub mod llm;
/// PDF download and text extraction.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// The orchestration graph and its supporting machinery.
pub mod pipeline;
/// Capability ports decoupling the graph from concrete backends.
pub mod ports;
/// Qdrant vector store integration.
pub mod vectordb;
/// Web search adapter for retrieval augmentation.
pub mod websearch;
