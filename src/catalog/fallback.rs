use super::{ModelConfig, Pricing};
use crate::llm::ProviderKind;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

struct Entry {
    id: &'static str,
    provider: ProviderKind,
    display_name: &'static str,
    pricing: (f64, f64),
    context_window: u32,
    max_tokens: u32,
    capabilities: &'static [&'static str],
    use_cases: &'static [&'static str],
    recommended: bool,
}

const GEMINI_CAPS: &[&str] = &["text-generation", "system-instructions", "json-mode", "multimodal"];
const GEMMA_CAPS: &[&str] = &["text-generation"];
const OPENAI_CAPS: &[&str] = &["text-generation", "system-instructions", "json-mode", "function-calling"];

const ENTRIES: &[Entry] = &[
    Entry {
        id: "gemini-2.5-flash",
        provider: ProviderKind::Gemini,
        display_name: "Gemini 2.5 Flash",
        pricing: (0.30, 2.50),
        context_window: 1_048_576,
        max_tokens: 8192,
        capabilities: GEMINI_CAPS,
        use_cases: &["business-analysis", "content-creation", "email-generation", "text-generation"],
        recommended: true,
    },
    Entry {
        id: "gemini-2.5-flash-8b",
        provider: ProviderKind::Gemini,
        display_name: "Gemini 2.5 Flash 8B",
        pricing: (0.0375, 0.15),
        context_window: 1_048_576,
        max_tokens: 8192,
        capabilities: GEMINI_CAPS,
        use_cases: &["categorization", "contact-scoring"],
        recommended: false,
    },
    Entry {
        id: "gemma-2-27b-it",
        provider: ProviderKind::Gemini,
        display_name: "Gemma 2 27B Instruct",
        pricing: (0.10, 0.10),
        context_window: 8192,
        max_tokens: 8192,
        capabilities: GEMMA_CAPS,
        use_cases: &["content-creation", "market-analysis"],
        recommended: false,
    },
    Entry {
        id: "gemma-2-9b-it",
        provider: ProviderKind::Gemini,
        display_name: "Gemma 2 9B Instruct",
        pricing: (0.05, 0.05),
        context_window: 8192,
        max_tokens: 8192,
        capabilities: GEMMA_CAPS,
        use_cases: &["email-generation", "lead-qualification", "meeting-summarization"],
        recommended: true,
    },
    Entry {
        id: "gemma-2-2b-it",
        provider: ProviderKind::Gemini,
        display_name: "Gemma 2 2B Instruct",
        pricing: (0.02, 0.02),
        context_window: 8192,
        max_tokens: 4096,
        capabilities: GEMMA_CAPS,
        use_cases: &["categorization", "contact-scoring"],
        recommended: false,
    },
    Entry {
        id: "gemini-1.5-flash",
        provider: ProviderKind::Gemini,
        display_name: "Gemini 1.5 Flash",
        pricing: (0.075, 0.30),
        context_window: 1_000_000,
        max_tokens: 8192,
        capabilities: GEMINI_CAPS,
        use_cases: &["contact-analysis", "contact-enrichment"],
        recommended: false,
    },
    Entry {
        id: "gemini-1.5-pro",
        provider: ProviderKind::Gemini,
        display_name: "Gemini 1.5 Pro",
        pricing: (1.25, 5.00),
        context_window: 2_000_000,
        max_tokens: 8192,
        capabilities: GEMINI_CAPS,
        use_cases: &["relationship-analysis", "sales-forecasting"],
        recommended: false,
    },
    Entry {
        id: "gpt-4o",
        provider: ProviderKind::OpenAi,
        display_name: "GPT-4o",
        pricing: (2.50, 10.00),
        context_window: 128_000,
        max_tokens: 16_384,
        capabilities: OPENAI_CAPS,
        use_cases: &["relationship-analysis", "market-analysis"],
        recommended: false,
    },
    Entry {
        id: "gpt-4o-mini",
        provider: ProviderKind::OpenAi,
        display_name: "GPT-4o mini",
        pricing: (0.15, 0.60),
        context_window: 128_000,
        max_tokens: 16_384,
        capabilities: OPENAI_CAPS,
        use_cases: &["contact-analysis", "contact-enrichment"],
        recommended: true,
    },
];

impl Entry {
    fn to_config(&self) -> ModelConfig {
        ModelConfig {
            id: self.id.to_owned(),
            provider: self.provider,
            model_name: self.id.to_owned(),
            display_name: self.display_name.to_owned(),
            description: None,
            pricing: Some(Pricing {
                input_per_1m_tokens: self.pricing.0,
                output_per_1m_tokens: self.pricing.1,
            }),
            context_window: self.context_window,
            max_tokens: Some(self.max_tokens),
            capabilities: self.capabilities.iter().map(|c| (*c).to_owned()).collect(),
            use_cases: self.use_cases.iter().map(|u| (*u).to_owned()).collect(),
            is_recommended: self.recommended,
            is_active: true,
        }
    }
}

pub fn fallback_model(id: &str) -> Option<ModelConfig> {
    ENTRIES.iter().find(|e| e.id == id).map(Entry::to_config)
}

pub fn fallback_models() -> Vec<ModelConfig> {
    ENTRIES.iter().map(Entry::to_config).collect()
}
