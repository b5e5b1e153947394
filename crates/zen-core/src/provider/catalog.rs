//! Provider defaults and the OpenCode Zen model catalog

/// Provider name for OpenCode Zen
pub const ZEN_PROVIDER: &str = "zen";

/// Provider name for any other OpenAI-compatible endpoint (key optional)
pub const OPENAI_COMPATIBLE_PROVIDER: &str = "openai_compatible";

pub const ZEN_BASE_URL: &str = "https://api.opencode.com/v1";
pub const ZEN_BASE_URL_ENV: &str = "OPENCODE_ZEN_BASE_URL";
pub const ZEN_API_KEY_ENV: &str = "OPENCODE_ZEN_API_KEY";

/// Models served free of charge on OpenCode Zen
pub const FREE_MODELS: &[&str] = &["minimax-m2.5-free", "kimi-k2.5-free", "big-pickle"];

pub const DEFAULT_MODEL: &str = FREE_MODELS[0];

pub fn is_free_model(model: &str) -> bool {
    FREE_MODELS.contains(&model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_models() {
        assert_eq!(DEFAULT_MODEL, "minimax-m2.5-free");
        assert!(is_free_model("big-pickle"));
        assert!(!is_free_model("gpt-4o"));
    }
}
