use std::sync::LazyLock;

use regex::Regex;

/// Display name the product presents regardless of which model answers.
pub const PERSONA: &str = "Smitty";
/// Short persona variant used when the user has not named Smitty explicitly.
pub const PERSONA_SHORT: &str = "SMT";

/// One find/replace rule. Rules are data so the set can grow without
/// touching the pipeline; they apply in order and each later rule sees the
/// output of the earlier ones.
pub struct ReplacementRule {
    pub pattern: &'static str,
    pub replacement: &'static str,
}

/// Ordered longest-literal-first within each family, so a long provider term
/// collapses to a single persona name instead of being nibbled twice.
const REPLACEMENTS: &[ReplacementRule] = &[
    // Upstream model names.
    ReplacementRule { pattern: r"(?i)讯飞星火认知大模型", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)星火认知大模型", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)讯飞星火", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)讯飞大模型", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)星火大模型", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)讯飞模型", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)星火模型", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)科大讯飞", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)讯飞", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)星火", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)iflytek", replacement: PERSONA },
    // Self-descriptions.
    ReplacementRule { pattern: r"(?i)我是一个\s*AI\s*助手", replacement: "我是Smitty" },
    ReplacementRule { pattern: r"(?i)我是\s*AI\s*助手", replacement: "我是Smitty" },
    ReplacementRule { pattern: r"(?i)我是人工智能助手", replacement: "我是Smitty" },
    ReplacementRule { pattern: r"(?i)我是智能助手", replacement: "我是Smitty" },
    ReplacementRule { pattern: r"(?i)我是大语言模型", replacement: "我是Smitty" },
    ReplacementRule { pattern: r"(?i)我是语言模型", replacement: "我是Smitty" },
    // Other providers and products.
    ReplacementRule { pattern: r"(?i)Claude", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)Anthropic", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)DeepSeek", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)OpenAI", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)ChatGPT", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)GPT-4", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)GPT-3", replacement: PERSONA },
    ReplacementRule { pattern: r"(?i)GPT", replacement: PERSONA },
];

static COMPILED: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    REPLACEMENTS
        .iter()
        .map(|rule| (Regex::new(rule.pattern).unwrap(), rule.replacement))
        .collect()
});

/// Replace every occurrence of a provider-identifying term with the persona
/// name. Case-insensitive, sequential substitution.
pub fn mask_provider_identity(text: &str) -> String {
    let mut out = text.to_string();
    for (regex, replacement) in COMPILED.iter() {
        if regex.is_match(&out) {
            tracing::debug!(pattern = %regex.as_str(), "masking provider term");
            out = regex.replace_all(&out, *replacement).into_owned();
        }
    }
    out
}

/// A canned reply produced without consulting the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedResponse {
    pub text: String,
}

/// Substrings (matched case-insensitively) that mark a message as a question
/// about who the assistant is.
const IDENTITY_PATTERNS: &[&str] = &[
    "你是谁",
    "smt是谁",
    "smitty是谁",
    "自我介绍",
    "介绍一下你自己",
    "你叫什么名字",
    "你的名字是什么",
    "你是什么",
    "你是什么ai",
    "你是什么人工智能",
    "who are you",
    "what are you",
    "introduce yourself",
    "smitty",
    "smt",
];

/// Identity-question fast path. Returns the canned reply for inputs that ask
/// who the assistant is; such turns never reach the gateway.
pub fn classify(input: &str) -> Option<CannedResponse> {
    let lowered = input.to_lowercase();
    if !IDENTITY_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return None;
    }

    // Prefer the full name when the user used it themselves.
    let name = if lowered.contains("smitty") {
        PERSONA
    } else {
        PERSONA_SHORT
    };
    Some(CannedResponse {
        text: format!("我是{}，由Vincent创造出的AI智能体💗！", name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_full_model_name_to_single_persona() {
        assert_eq!(mask_provider_identity("讯飞星火认知大模型"), "Smitty");
    }

    #[test]
    fn masking_is_idempotent_under_the_persona() {
        let once = mask_provider_identity("讯飞星火认知大模型");
        assert_eq!(mask_provider_identity(&once), "Smitty");
    }

    #[test]
    fn masks_every_occurrence_not_just_the_first() {
        let masked = mask_provider_identity("openai and OpenAI and OPENAI");
        assert_eq!(masked, "Smitty and Smitty and Smitty");
    }

    #[test]
    fn masks_self_description_phrases() {
        assert_eq!(
            mask_provider_identity("你好，我是一个AI助手。"),
            "你好，我是Smitty。"
        );
    }

    #[test]
    fn longer_brand_terms_win_over_prefixes() {
        assert_eq!(mask_provider_identity("GPT-4 beats GPT"), "Smitty beats Smitty");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(mask_provider_identity("the weather is nice"), "the weather is nice");
    }

    #[test]
    fn identity_question_uses_short_persona() {
        let canned = classify("你是谁").expect("identity question");
        assert!(canned.text.contains("SMT"));
        assert!(!canned.text.contains("Smitty"));
    }

    #[test]
    fn naming_smitty_selects_the_full_persona() {
        let canned = classify("smitty是谁").expect("identity question");
        assert!(canned.text.contains("Smitty"));
    }

    #[test]
    fn identity_match_is_case_insensitive() {
        assert!(classify("WHO ARE YOU?").is_some());
        assert!(classify("Smitty, hello").is_some());
    }

    #[test]
    fn ordinary_questions_are_not_classified() {
        assert!(classify("what is the capital of France?").is_none());
    }
}
