use crate::config::{PersonaConfig, DEFAULT_FALLBACK_REPLY};

/// The in-character apology sent when no generated reply is available.
/// Never empty, even if the persona's configured reply is blank.
pub fn fallback_text(persona: &PersonaConfig) -> &str {
    if persona.fallback_reply.trim().is_empty() {
        DEFAULT_FALLBACK_REPLY
    } else {
        &persona.fallback_reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_reply() {
        let persona = PersonaConfig {
            fallback_reply: "Still warming up, please try again!".to_string(),
            ..PersonaConfig::default()
        };
        assert_eq!(fallback_text(&persona), "Still warming up, please try again!");
    }

    #[test]
    fn test_default_reply() {
        assert_eq!(fallback_text(&PersonaConfig::default()), DEFAULT_FALLBACK_REPLY);
    }

    #[test]
    fn test_blank_reply_never_used() {
        for blank in ["", " ", "\n\t"] {
            let persona = PersonaConfig {
                fallback_reply: blank.to_string(),
                ..PersonaConfig::default()
            };
            assert_eq!(fallback_text(&persona), DEFAULT_FALLBACK_REPLY);
        }
    }
}
