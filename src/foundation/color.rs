/// How wide a gamut the content of a frame needs.
///
/// Ordered so that `max` picks the most demanding usage across surfaces.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ContentColorUsage {
    /// Plain sRGB content.
    #[default]
    Srgb,
    /// Wide color gamut content (e.g. Display P3).
    WideColorGamut,
    /// High dynamic range content.
    Hdr,
}

/// Output color space of the display for a given content usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    /// sRGB with the sRGB transfer function.
    #[default]
    Srgb,
    /// Display P3 primaries, sRGB transfer function.
    DisplayP3,
    /// Extended-range linear sRGB (scRGB).
    ExtendedSrgbLinear,
    /// BT.2020 primaries with the PQ transfer function.
    Pq,
    /// BT.2020 primaries with the HLG transfer function.
    Hlg,
}

impl ColorSpace {
    /// Whether blending can happen directly in this space.
    ///
    /// PQ and HLG are non-linear HDR encodings; blending in them produces visibly wrong results,
    /// so content must be composited elsewhere and converted in a final pass.
    pub fn is_suitable_for_blending(self) -> bool {
        !matches!(self, ColorSpace::Pq | ColorSpace::Hlg)
    }
}

/// Output color spaces the display uses per content usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DisplayColorSpaces {
    /// Space used for sRGB content.
    pub srgb: ColorSpace,
    /// Space used for wide color gamut content.
    pub wide_color_gamut: ColorSpace,
    /// Space used for opaque HDR content.
    pub hdr_opaque: ColorSpace,
    /// Space used for HDR content that needs an alpha channel.
    pub hdr_transparent: ColorSpace,
}

impl DisplayColorSpaces {
    /// Pick the output space for the root pass given its color usage.
    pub fn output_color_space(
        &self,
        usage: ContentColorUsage,
        has_transparent_background: bool,
    ) -> ColorSpace {
        match usage {
            ContentColorUsage::Srgb => self.srgb,
            ContentColorUsage::WideColorGamut => self.wide_color_gamut,
            ContentColorUsage::Hdr if has_transparent_background => self.hdr_transparent,
            ContentColorUsage::Hdr => self.hdr_opaque,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/color.rs"]
mod tests;
