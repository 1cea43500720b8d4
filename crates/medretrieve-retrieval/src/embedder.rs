//! Query embedding boundary. The embedding model itself is out of scope
//! (spec §1 Non-goals); this trait is the seam an external model service
//! plugs into. Without one configured, search degrades gracefully to the
//! lexical leg of the hybrid score.

use async_trait::async_trait;
use medretrieve_common::Result;

#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>>;
}

/// No embedding model configured: every query is lexical-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmbedder;

#[async_trait]
impl QueryEmbedder for NullEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }
}
