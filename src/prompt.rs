//! Rendering instruction builder
//!
//! Produces the text handed to the backdrop renderer: a solid-backdrop
//! instruction for the selected chromakey color, hints derived from the
//! image analysis, and fixed quality requirements.

use crate::{analysis::ImageAnalysis, selector::ChromakeySelection};

const QUALITY_REQUIREMENTS: &str = "maintain natural lighting, clean cutout, high precision";

const LOW_LIGHT_BRIGHTNESS: f64 = 100.0;
const HIGHLIGHT_BRIGHTNESS: f64 = 200.0;

/// Builder for renderer instructions
pub struct PromptBuilder;

impl PromptBuilder {
    /// Full instruction tailored to the analysis
    ///
    /// ```rust
    /// use chroma_bgremove::{ChromakeySelection, ImageAnalysis, PromptBuilder};
    ///
    /// let mut analysis = ImageAnalysis::failed("demo");
    /// analysis.has_hair = true;
    /// let prompt = PromptBuilder::build_prompt(&analysis, &ChromakeySelection::fallback());
    /// assert!(prompt.contains("RGB(0, 255, 0)"));
    /// assert!(prompt.contains("hair"));
    /// ```
    #[must_use]
    pub fn build_prompt(analysis: &ImageAnalysis, selection: &ChromakeySelection) -> String {
        let mut prompt = Self::backdrop_instruction(selection);

        if analysis.has_hair {
            prompt.push_str("preserve detailed hair strands with soft edges, avoid halos, ");
        }
        if analysis.has_transparent_objects {
            prompt.push_str("keep glass reflections and realistic transparency, ");
        }
        if analysis.has_motion_blur {
            prompt.push_str("preserve motion blur and smooth edges, ");
        }

        if analysis.brightness < LOW_LIGHT_BRIGHTNESS {
            prompt.push_str("enhance subject in low light, ");
        } else if analysis.brightness > HIGHLIGHT_BRIGHTNESS {
            prompt.push_str("preserve highlights and bright areas, ");
        }

        prompt.push_str(QUALITY_REQUIREMENTS);
        prompt
    }

    /// Instruction without analysis hints
    #[must_use]
    pub fn build_simple_prompt(selection: &ChromakeySelection) -> String {
        format!("{}{}", Self::backdrop_instruction(selection), QUALITY_REQUIREMENTS)
    }

    /// User requirements followed by the full instruction
    #[must_use]
    pub fn build_custom_prompt(
        user_requirements: &str,
        analysis: &ImageAnalysis,
        selection: &ChromakeySelection,
    ) -> String {
        let base = Self::build_prompt(analysis, selection);
        let user = user_requirements.trim().trim_end_matches('.');
        if user.is_empty() {
            base
        } else {
            format!("{}. {}", user, base)
        }
    }

    fn backdrop_instruction(selection: &ChromakeySelection) -> String {
        format!(
            "Replace the background completely with a flat, evenly lit, solid {} color {} ({}) \
             with no gradients, shadows or texture, do not use this color anywhere on the subject, ",
            selection.name,
            selection.color,
            selection.color.to_hex()
        )
    }
}
