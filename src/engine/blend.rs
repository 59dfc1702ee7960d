//! Blender: fixed convex combination of provider and AI temperatures.

use super::EngineConfig;

/// Output of `blend`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendedSeries {
    pub values: Vec<f64>,
    /// `false` when no AI series was supplied and `values` is the provider
    /// series unchanged.
    pub overlay_applied: bool,
}

/// Blend the provider series with the AI series.
///
/// `blended[i] = provider_weight · provider[i] + ai_weight · ai[i]` over the
/// common prefix of both series. Without an AI series the provider series is
/// returned as-is.
pub fn blend(config: &EngineConfig, provider: &[f64], ai: Option<&[f64]>) -> BlendedSeries {
    let Some(ai) = ai else {
        return BlendedSeries {
            values: provider.to_vec(),
            overlay_applied: false,
        };
    };

    let values = provider
        .iter()
        .zip(ai.iter())
        .map(|(&p, &a)| config.provider_weight * p + config.ai_weight * a)
        .collect();

    BlendedSeries {
        values,
        overlay_applied: true,
    }
}
