//! Prompt composition for the realtime model.

use crate::types::Theme;

const SUBJECT_INSTRUCTIONS: &str = "Transform only the sketched object in the center. \
No extra scene or environment. Preserve overall silhouette from the sketch.";

/// Build the outbound prompt from a style phrase and the current theme.
pub fn compose_prompt(style_prompt: &str, theme: Theme) -> String {
    let background_hint = if theme.is_light() {
        "Keep a pure white background unchanged."
    } else {
        "Keep a pure black background unchanged."
    };
    format!("{style_prompt}. {background_hint} {SUBJECT_INSTRUCTIONS}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dark_theme_prompt() {
        let prompt = compose_prompt("carved stone object", Theme::Dark);
        assert_eq!(
            prompt,
            "carved stone object. Keep a pure black background unchanged. \
             Transform only the sketched object in the center. No extra scene or environment. \
             Preserve overall silhouette from the sketch."
        );
    }

    #[test]
    fn test_light_theme_prompt() {
        let prompt = compose_prompt("neon glow", Theme::Light);
        assert!(prompt.starts_with("neon glow. Keep a pure white background unchanged."));
        assert!(!prompt.contains("black"));
    }
}
