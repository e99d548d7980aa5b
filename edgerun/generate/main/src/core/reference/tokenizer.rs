//! Byte-level tokenizer

use crate::api::error::{TokenizerError, TokenizerResult};
use crate::api::types::TokenId;
use crate::spi::contract::Tokenizer;

/// Byte-level tokenizer. Maps each byte to its value as a token ID, with
/// two extra ids for BOS and EOS.
pub struct ByteTokenizer;

impl ByteTokenizer {
    pub const BOS: TokenId = 256;
    pub const EOS: TokenId = 257;
    pub const VOCAB_SIZE: usize = 258;
}

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> TokenizerResult<Vec<TokenId>> {
        Ok(text.bytes().map(|b| b as TokenId).collect())
    }

    fn decode(&self, token: TokenId) -> TokenizerResult<String> {
        match token {
            0..=255 => Ok(String::from_utf8_lossy(&[token as u8]).into_owned()),
            Self::BOS | Self::EOS => Ok(String::new()),
            _ => Err(TokenizerError::UnknownToken(token)),
        }
    }

    fn vocab_size(&self) -> usize {
        Self::VOCAB_SIZE
    }

    fn bos_token_id(&self) -> Option<TokenId> {
        Some(Self::BOS)
    }

    fn eos_token_ids(&self) -> &[TokenId] {
        &[Self::EOS]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_bytes() {
        assert_eq!(ByteTokenizer.encode("Hi!").unwrap(), vec![72, 105, 33]);
        assert!(ByteTokenizer.encode("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_pieces() {
        let text: String = ByteTokenizer
            .encode("hello world")
            .unwrap()
            .into_iter()
            .map(|t| ByteTokenizer.decode(t).unwrap())
            .collect();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_special_tokens_decode_empty() {
        assert_eq!(ByteTokenizer.decode(ByteTokenizer::BOS).unwrap(), "");
        assert_eq!(ByteTokenizer.decode(ByteTokenizer::EOS).unwrap(), "");
        assert!(ByteTokenizer.decode(300).is_err());
    }
}
