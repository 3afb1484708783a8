//! # Bookshelf
//!
//! Topic-driven learning resources: web search, LLM curation, and caching
//! behind a small HTTP API.
//!
//! Give it a list of topics ("binary search", "recursion") and it returns a
//! ranked shelf of articles, videos and books for each, with quality scores
//! and one-line summaries when a text-generation model is configured.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   miss   ┌──────────────┐   ┌─────────────┐
//! │ Result cache │────────▶│   Search     │──▶│  Curation   │
//! │  (S3, JSON)  │          │ Tavily/Exa/  │   │ score, type │
//! └──────▲───────┘          │ DuckDuckGo   │   │ summarize   │
//!        │                  │ + query cache│   └──────┬──────┘
//!        └──────────────────┴──────────────┴──────────┘
//!                         write-through
//!
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │ (shelf)  │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf init                                  # create database
//! shelf search "merge sort" --limit 3         # raw search hits
//! shelf bookshelf recursion arrays            # curated shelf
//! shelf prewarm                               # warm caches for demo topics
//! shelf serve                                 # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Resource and cache types |
//! | [`search`] | Search backends and the per-process query cache |
//! | [`query_cache`] | Bounded insert-only query memo |
//! | [`result_cache`] | Object-store cache of curated shelves |
//! | [`llm`] | Text generation (Amazon Bedrock) |
//! | [`curate`] | Scoring, classification and summaries |
//! | [`bookshelf`] | Orchestration across caches, search and curation |
//! | [`speech`] | Text-to-speech |
//! | [`posts`] | Blog posts CRUD |
//! | [`server`] | HTTP server |
//! | [`sigv4`] | AWS Signature Version 4 |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod bookshelf;
pub mod config;
pub mod curate;
pub mod db;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod posts;
pub mod query_cache;
pub mod result_cache;
pub mod search;
pub mod server;
pub mod sigv4;
pub mod speech;
