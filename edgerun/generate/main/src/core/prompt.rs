//! Prompt assembly: system prompt, user prompt, and BOS handling.

use crate::api::error::GenerateResult;
use crate::api::types::{PromptFormat, TokenId};
use crate::spi::contract::Tokenizer;

/// Combine the system prompt and user prompt into the text fed to the tokenizer.
pub fn format_prompt(format: PromptFormat, system_prompt: &str, prompt: &str) -> String {
    let system = system_prompt.trim();
    match format {
        PromptFormat::Raw => {
            if system.is_empty() {
                prompt.to_string()
            } else {
                format!("{}\n{}", system, prompt)
            }
        }
        PromptFormat::Llama2 => {
            if system.is_empty() {
                format!("[INST] {} [/INST]", prompt.trim())
            } else {
                format!("[INST] <<SYS>>\n{}\n<</SYS>>\n\n{} [/INST]", system, prompt.trim())
            }
        }
        PromptFormat::Llama3 => {
            let mut text = String::new();
            if !system.is_empty() {
                text.push_str("<|start_header_id|>system<|end_header_id|>\n\n");
                text.push_str(system);
                text.push_str("<|eot_id|>");
            }
            text.push_str("<|start_header_id|>user<|end_header_id|>\n\n");
            text.push_str(prompt.trim());
            text.push_str("<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n");
            text
        }
    }
}

/// Format and encode a prompt, prepending BOS when requested and available.
pub fn encode_prompt(
    tokenizer: &dyn Tokenizer,
    format: PromptFormat,
    system_prompt: &str,
    prompt: &str,
    add_bos: bool,
) -> GenerateResult<Vec<TokenId>> {
    let text = format_prompt(format, system_prompt, prompt);
    let mut tokens = Vec::new();
    if add_bos {
        if let Some(bos) = tokenizer.bos_token_id() {
            tokens.push(bos);
        }
    }
    tokens.extend(tokenizer.encode(&text)?);
    Ok(tokens)
}
