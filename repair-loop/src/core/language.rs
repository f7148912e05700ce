//! Language profile: the few facts about the target language the loop needs.

use serde::{Deserialize, Serialize};

/// How the loop talks about, fences and recognizes source in the target language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LanguageProfile {
    /// Coding standard named in the repair prompt (e.g. "PHP 8.4").
    pub standard: String,
    /// Info string of code fences in prompts and oracle responses.
    pub fence_tag: String,
    /// Marker every complete source file starts with. Empty disables raw-response acceptance.
    pub prologue: String,
    /// Extension (without dot) of files collected from a directory target.
    pub extension: String,
    /// Extra requirement bullets for the repair prompt.
    pub requirements: Vec<String>,
}

impl Default for LanguageProfile {
    fn default() -> Self {
        Self {
            standard: "PHP 8.4".to_string(),
            fence_tag: "php".to_string(),
            prologue: "<?php".to_string(),
            extension: "php".to_string(),
            requirements: vec![
                "Use declare(strict_types=1);".to_string(),
                "Use PHP 8.4 features where possible (constructor promotion, readonly, enums)"
                    .to_string(),
            ],
        }
    }
}

impl LanguageProfile {
    /// Delimiter line placed before each member file of a directory target.
    pub fn file_marker(&self, path: &str) -> String {
        format!("// FILE: {path}")
    }
}
