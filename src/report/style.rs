use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Cell colours
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const GREY: Rgb = Rgb(0xbf, 0xbf, 0xbf);

    /// `#rrggbb`, as spreadsheet writers expect.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> Rgb {
    let hsl = Hsl::new(hue, saturation, lightness);
    let rgb: Srgb = hsl.into_color();
    Rgb(
        (rgb.red.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0).round() as u8,
    )
}

/// Visual treatment hint for one report cell. The renderer decides how to
/// apply it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellStyle {
    pub background: Option<Rgb>,
    pub bold: bool,
}

// ---------------------------------------------------------------------------
// Distance → style mapping
// ---------------------------------------------------------------------------

/// Maps signed distances to fills: one hue below the range, another above,
/// darker the further out. In-range cells get no fill, NaN cells grey.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StylePalette {
    pub below_hue: f32,
    pub above_hue: f32,
    pub saturation: f32,
    pub missing: Rgb,
}

impl Default for StylePalette {
    fn default() -> Self {
        StylePalette {
            below_hue: 210.0,
            above_hue: 0.0,
            saturation: 0.75,
            missing: Rgb::GREY,
        }
    }
}

impl StylePalette {
    /// `scale` is the distance treated as fully saturated, typically the
    /// width of the target range.
    pub fn style_for(&self, distance: f64, scale: f64) -> CellStyle {
        if distance.is_nan() {
            return CellStyle {
                background: Some(self.missing),
                bold: false,
            };
        }
        if distance == 0.0 {
            return CellStyle::default();
        }
        let severity = if scale > 0.0 && scale.is_finite() {
            (distance.abs() / scale).clamp(0.0, 1.0) as f32
        } else {
            1.0
        };
        let hue = if distance < 0.0 {
            self.below_hue
        } else {
            self.above_hue
        };
        CellStyle {
            background: Some(hsl_to_rgb(hue, self.saturation, 0.85 - 0.35 * severity)),
            bold: severity >= 1.0,
        }
    }
}
