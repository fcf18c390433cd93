//! Style presets merged into the outbound prompt.

use std::collections::BTreeMap;

/// Preset used when none is selected or the selected id is unknown.
pub const DEFAULT_PRESET: &str = "studio";

const BUILTIN_PRESETS: &[(&str, &str)] = &[
    ("studio", "premium product render, modern industrial design object, clean lighting, realistic material"),
    ("toy", "cute collectible designer toy, smooth plastic body, playful proportions"),
    ("ceramic", "handcrafted ceramic object, matte glaze, subtle imperfections, gallery product shot"),
    ("plush", "soft plush fabric object, stitched seams, cozy toy aesthetic"),
    ("wood", "carved wooden object, natural wood grain texture, warm studio lighting, realistic product shot"),
    ("metal", "brushed metal object, high-end industrial product, clean reflections"),
    ("stone", "carved stone object, smooth sculpture, soft shadows, museum lighting"),
    ("anime", "anime-inspired stylized object, clean cel shading, bold shape language, playful cartoon look"),
    ("neon", "neon glow, dark background, vibrant cyan and magenta lines, cyberpunk"),
    ("glass", "translucent borosilicate glass, caustics, elegant minimal form"),
    ("ink", "Japanese ink wash painting, sumi-e, expressive brush strokes, minimal"),
];

/// Lookup table from preset id to descriptive phrase.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    presets: BTreeMap<String, String>,
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PresetCatalog {
    pub fn builtin() -> Self {
        let presets = BUILTIN_PRESETS
            .iter()
            .map(|(id, phrase)| (id.to_string(), phrase.to_string()))
            .collect();
        Self { presets }
    }

    /// Built-in presets with extra or replacement phrases layered on top.
    pub fn with_overrides<'a>(overrides: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let mut catalog = Self::builtin();
        for (id, phrase) in overrides {
            catalog.presets.insert(id.clone(), phrase.clone());
        }
        catalog
    }

    pub fn contains(&self, id: &str) -> bool {
        self.presets.contains_key(id)
    }

    /// Phrase for `id`, falling back to the default preset.
    pub fn phrase(&self, id: &str) -> &str {
        self.presets
            .get(id)
            .or_else(|| self.presets.get(DEFAULT_PRESET))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.presets.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_presets() {
        let catalog = PresetCatalog::builtin();
        assert_eq!(catalog.len(), 11);
        assert!(catalog.phrase("ink").starts_with("Japanese ink wash"));
    }

    #[test]
    fn test_unknown_falls_back_to_studio() {
        let catalog = PresetCatalog::builtin();
        assert_eq!(catalog.phrase("nope"), catalog.phrase(DEFAULT_PRESET));
    }

    #[test]
    fn test_overrides() {
        let extra = BTreeMap::from([
            ("paper".to_string(), "folded paper origami".to_string()),
            ("ink".to_string(), "calligraphy ink".to_string()),
        ]);
        let catalog = PresetCatalog::with_overrides(&extra);
        assert_eq!(catalog.len(), 12);
        assert_eq!(catalog.phrase("paper"), "folded paper origami");
        assert_eq!(catalog.phrase("ink"), "calligraphy ink");
    }
}
