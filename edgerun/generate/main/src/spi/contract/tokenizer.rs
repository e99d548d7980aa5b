use crate::api::error::TokenizerResult;
use crate::api::types::TokenId;

/// Tokenizer interface consumed by the generation core.
///
/// Implementations must be deterministic and stateless from the caller's view.
pub trait Tokenizer: Send + Sync {
    /// Encode text to token IDs.
    fn encode(&self, text: &str) -> TokenizerResult<Vec<TokenId>>;
    /// Decode a single token to its text fragment.
    fn decode(&self, token: TokenId) -> TokenizerResult<String>;
    /// Vocabulary size.
    fn vocab_size(&self) -> usize;
    /// Beginning-of-sequence token, if the vocabulary has one.
    fn bos_token_id(&self) -> Option<TokenId> {
        None
    }
    /// Tokens that end generation.
    fn eos_token_ids(&self) -> &[TokenId] {
        &[]
    }
}
