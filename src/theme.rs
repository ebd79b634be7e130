//! Theme System - Brand Kits
//!
//! A theme is resolved once per document and handed, unchanged, to every
//! page render.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::draw::Color;

#[derive(Debug, Error, PartialEq)]
pub enum ThemeError {
    #[error("Invalid {0} color: {1}")]
    InvalidColor(&'static str, String),

    #[error("Font name for {0} must not be empty")]
    EmptyFont(&'static str),

    #[error("Logo is not valid base64: {0}")]
    InvalidLogo(String),
}

/// Where the active theme came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeSource {
    /// Built-in defaults
    #[default]
    System,
    /// A user brand kit merged over the defaults
    Brand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeColors {
    pub primary: Color,
    pub secondary: Color,
    pub accent: Color,
    pub text: Color,
    #[serde(alias = "bg")]
    pub background: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeFonts {
    pub heading: String,
    pub body: String,
}

/// Logo image bytes, base64 encoded (PNG or JPEG).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Logo {
    pub data_base64: String,
}

impl Logo {
    pub fn decode(&self) -> Result<Vec<u8>, ThemeError> {
        base64::engine::general_purpose::STANDARD
            .decode(self.data_base64.trim())
            .map_err(|e| ThemeError::InvalidLogo(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default)]
    pub source: ThemeSource,
    pub colors: ThemeColors,
    pub fonts: ThemeFonts,
    #[serde(default)]
    pub logo: Option<Logo>,
}

impl Default for Theme {
    fn default() -> Self {
        let c = Color::literal;
        Self {
            source: ThemeSource::System,
            colors: ThemeColors {
                primary: c("0066CC"),
                secondary: c("00AA00"),
                accent: c("FF6600"),
                text: c("333333"),
                background: c("FFFFFF"),
            },
            fonts: ThemeFonts {
                heading: "Arial".to_string(),
                body: "Arial".to_string(),
            },
            logo: None,
        }
    }
}

/// Partial brand kit as stored by the surrounding application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandKit {
    #[serde(default)]
    pub colors: BrandColors,
    #[serde(default)]
    pub fonts: BrandFonts,
    #[serde(default)]
    pub logo_base64: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandColors {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub accent: Option<String>,
    pub text: Option<String>,
    #[serde(alias = "bg")]
    pub background: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandFonts {
    pub heading: Option<String>,
    pub body: Option<String>,
}

impl Theme {
    /// Merge a brand kit over the defaults, validating every override.
    pub fn from_brand(kit: &BrandKit) -> Result<Self, ThemeError> {
        let mut theme = Theme::default();
        theme.source = ThemeSource::Brand;

        let overrides = [
            ("primary", &kit.colors.primary, &mut theme.colors.primary),
            ("secondary", &kit.colors.secondary, &mut theme.colors.secondary),
            ("accent", &kit.colors.accent, &mut theme.colors.accent),
            ("text", &kit.colors.text, &mut theme.colors.text),
            ("background", &kit.colors.background, &mut theme.colors.background),
        ];
        for (name, value, slot) in overrides {
            if let Some(raw) = value {
                *slot = Color::parse(raw).ok_or_else(|| ThemeError::InvalidColor(name, raw.clone()))?;
            }
        }

        for (name, value, slot) in [
            ("heading", &kit.fonts.heading, &mut theme.fonts.heading),
            ("body", &kit.fonts.body, &mut theme.fonts.body),
        ] {
            if let Some(font) = value {
                if font.trim().is_empty() {
                    return Err(ThemeError::EmptyFont(name));
                }
                *slot = font.trim().to_string();
            }
        }

        if let Some(data) = &kit.logo_base64 {
            let logo = Logo { data_base64: data.clone() };
            logo.decode()?;
            theme.logo = Some(logo);
        }

        Ok(theme)
    }

    /// The read-only view a render program sees as `theme`.
    pub fn to_program_value(&self) -> Value {
        json!({
            "colors": {
                "primary": self.colors.primary.as_str(),
                "secondary": self.colors.secondary.as_str(),
                "accent": self.colors.accent.as_str(),
                "text": self.colors.text.as_str(),
                "background": self.colors.background.as_str(),
            },
            "fonts": {
                "heading": self.fonts.heading,
                "body": self.fonts.body,
            },
            "hasLogo": self.logo.is_some(),
        })
    }
}
