//! Generation trait.
//!
//! The generative model is an opaque collaborator that turns an assembled
//! prompt into prose. Concrete HTTP implementations live in the app crate.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.5-flash"`).
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}
