//! Semantic matching of operator free text against the knowledge graph.
//!
//! The engine never interprets text itself. A [`Matcher`] turns a message
//! into scored phenomenon, root-cause and ticket matches; [`HttpMatcher`]
//! talks to a remote matching service.

mod client;
mod types;


pub use client::HttpMatcher;
pub use types::*;

use async_trait::async_trait;

use crate::error::MatcherResult;

/// Resolves free text to knowledge graph entities.
#[async_trait]
pub trait Matcher: Send + Sync {
    /// Match one operator message.
    async fn match_text(&self, request: &MatchRequest) -> MatcherResult<MatchResult>;
}
