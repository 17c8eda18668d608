//! OpenTelemetry GenAI Semantic Convention attribute names and values.
//!
//! `tracing` field names must be literal identifiers, so spans spell the
//! dotted names inline (`gen_ai.request.model = ...`). The constants here
//! are the canonical values for those fields and for span names.
//!
//! Span naming convention: `"gen_ai.{operation}"` (e.g., `"gen_ai.chat"`).

/// The name of the operation being performed (e.g., "chat").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The name of the GenAI provider (e.g., "openrouter").
pub const GEN_AI_SYSTEM: &str = "gen_ai.system";

/// The model ID requested (e.g., "openai/gpt-4o-mini").
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";

pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";

pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

/// Parley-specific: the conversation the call belongs to.
pub const PARLEY_SESSION_ID: &str = "parley.session.id";

// --- Operation name values ---

/// Primary streaming exchange for a user turn.
pub const OP_CHAT: &str = "chat";

/// Topic derivation for a session.
pub const OP_GENERATE_TITLE: &str = "generate_title";

/// Rolling-summary regeneration.
pub const OP_SUMMARIZE_CONTEXT: &str = "summarize_context";

// --- Provider name values ---

pub const PROVIDER_OPENROUTER: &str = "openrouter";

/// Span name for an operation, following the `gen_ai.{operation}` convention.
pub fn span_name(operation: &str) -> String {
    format!("gen_ai.{operation}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_names_follow_convention() {
        assert_eq!(span_name(OP_CHAT), "gen_ai.chat");
        assert_eq!(span_name(OP_SUMMARIZE_CONTEXT), "gen_ai.summarize_context");
        assert_eq!(span_name(OP_GENERATE_TITLE), "gen_ai.generate_title");
    }

    #[test]
    fn attribute_names_share_namespace() {
        for name in [
            GEN_AI_OPERATION_NAME,
            GEN_AI_SYSTEM,
            GEN_AI_REQUEST_MODEL,
            GEN_AI_REQUEST_TEMPERATURE,
            GEN_AI_USAGE_INPUT_TOKENS,
            GEN_AI_USAGE_OUTPUT_TOKENS,
        ] {
            assert!(name.starts_with("gen_ai."), "{name}");
        }
    }
}
