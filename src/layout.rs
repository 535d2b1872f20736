use bevy::math::{EulerRot, Quat, Vec2, Vec3};
use bevy_log::warn;

use crate::{
    glyph::GlyphRecord,
    registry::GlyphRegistry,
    session::TextOptions,
    tokenizer::{Token, TokenizedLine, TokenizedText},
};

/// Horizontal placement of each line relative to the text origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HorizontalAlignment {
    /// Lines start at the origin.
    #[default]
    Leading,
    /// Lines are centered on the origin.
    Center,
    /// Lines end at the origin.
    Trailing,
}

impl HorizontalAlignment {
    pub fn offset(self, line_width: f32) -> f32 {
        match self {
            HorizontalAlignment::Leading => 0.0,
            HorizontalAlignment::Center => -line_width * 0.5,
            HorizontalAlignment::Trailing => -line_width,
        }
    }
}

/// Vertical placement of the block of lines relative to the text origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VerticalAlignment {
    /// The first line sits on the origin and the block grows downwards.
    Top,
    /// The block is centered on the origin.
    Middle,
    /// The block sits above the origin.
    #[default]
    Bottom,
}

impl VerticalAlignment {
    pub fn offset(self, total_height: f32, line_index: usize, line_height: f32) -> f32 {
        let line_offset = line_index as f32 * line_height;
        match self {
            VerticalAlignment::Top => -line_offset,
            VerticalAlignment::Middle => total_height * 0.5 - line_offset,
            VerticalAlignment::Bottom => total_height - line_offset,
        }
    }
}

/// Spacing and transform metrics shared by every text of one font.
#[derive(Clone, Debug, PartialEq)]
pub struct FontMetrics {
    pub character_spacing: f32,
    pub whitespace_width: f32,
    pub line_height: f32,
    pub monospaced_width: f32,
    pub text_scale: Vec3,
    /// Euler XYZ angles in degrees applied to every glyph instance.
    pub rotation: Vec3,
    /// Shift each glyph mesh by its negated half extents.
    pub recenter: bool,
    /// Extra mesh offset as a fraction of the glyph size, in tenths.
    pub pivot: Vec3,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            character_spacing: 0.0375,
            whitespace_width: 0.1,
            line_height: 0.06,
            monospaced_width: 0.075,
            text_scale: Vec3::ONE,
            rotation: Vec3::ZERO,
            recenter: true,
            pivot: Vec3::new(0.0, 0.5, 0.0),
        }
    }
}

/// Everything the layout pass reads: font metrics plus per-text options.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutSettings {
    pub character_spacing: f32,
    pub whitespace_width: f32,
    pub line_height: f32,
    pub monospaced_width: f32,
    pub text_scale: Vec3,
    pub rotation: Vec3,
    pub recenter: bool,
    pub pivot: Vec3,
    pub size_multiplier: f32,
    pub horizontal_alignment: HorizontalAlignment,
    pub vertical_alignment: VerticalAlignment,
    pub monospaced: bool,
}

impl LayoutSettings {
    pub fn new(metrics: &FontMetrics, options: &TextOptions) -> Self {
        Self {
            character_spacing: metrics.character_spacing,
            whitespace_width: metrics.whitespace_width,
            line_height: metrics.line_height,
            monospaced_width: metrics.monospaced_width,
            text_scale: metrics.text_scale,
            rotation: metrics.rotation,
            recenter: metrics.recenter,
            pivot: metrics.pivot,
            size_multiplier: options.size_multiplier,
            horizontal_alignment: options.horizontal_alignment,
            vertical_alignment: options.vertical_alignment,
            monospaced: options.monospaced,
        }
    }

    /// Per-axis multiplier applied to every width, height and instance.
    pub fn scale(&self) -> Vec3 {
        self.text_scale * self.size_multiplier
    }

    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        )
    }

    /// Offset of a glyph mesh inside its instance, in unscaled mesh units.
    pub fn mesh_offset(&self, glyph: &GlyphRecord) -> Vec3 {
        let recenter = if self.recenter {
            -glyph.extents()
        } else {
            Vec3::ZERO
        };
        recenter + glyph.size() * self.pivot * 0.1
    }

    /// Scaled height of one line.
    pub fn scaled_line_height(&self) -> f32 {
        self.line_height * self.scale().y
    }
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self::new(&FontMetrics::default(), &TextOptions::default())
    }
}

/// Positions for one text buffer, indexed by `char` offset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutResult {
    /// One entry per character of the text. `None` for whitespace, newlines,
    /// escape continuation characters and glyphs missing from the registry.
    pub positions: Vec<Option<Vec3>>,
    pub line_widths: Vec<f32>,
    /// `line_height * line count`, scaled.
    pub total_height: f32,
    /// Widest line and total height.
    pub size: Vec2,
    /// Token count of the longest line; the column count of the monospaced grid.
    pub columns: usize,
}

impl LayoutResult {
    pub fn position(&self, slot: usize) -> Option<Vec3> {
        self.positions.get(slot).copied().flatten()
    }

    pub fn line_count(&self) -> usize {
        self.line_widths.len()
    }
}

/// Lay out tokenized text.
///
/// Each line is measured, then placed with a cursor starting at `x = 0` one
/// line height below the previous line, and finally shifted by the alignment
/// offsets. A missing glyph is logged and
/// contributes nothing to the line.
pub fn compute_positions(
    text: &TokenizedText,
    registry: &GlyphRegistry,
    settings: &LayoutSettings,
) -> LayoutResult {
    let scale = settings.scale();
    let line_height = settings.scaled_line_height();
    let total_height = line_height * text.lines.len() as f32;

    let mut positions: Vec<Option<Vec3>> = vec![None; text.char_count];
    let mut line_widths = Vec::with_capacity(text.lines.len());
    let mut columns = 0;

    for (line_index, line) in text.lines.iter().enumerate() {
        let line_width = measure_line(line, registry, settings) * scale.x;

        let mut glyph_widths: Vec<(usize, f32)> = Vec::with_capacity(line.tokens.len());
        // The alignment offset below adds a second line step on top of this one.
        let cursor_y = -(line_index as f32) * line_height;
        let mut cursor_x = 0.0;
        let last = line.tokens.len().saturating_sub(1);
        for (i, token) in line.tokens.iter().enumerate() {
            if let Token::Glyph { key, .. } = token
                && let Some(record) = registry.lookup(key.as_str())
            {
                let slot = line.start + token.start();
                positions[slot] = Some(Vec3::new(cursor_x, cursor_y, 0.0));
                glyph_widths.push((slot, record.width()));
            }
            cursor_x += advance(token, i == last, registry, settings) * scale.x;
        }

        let offset = Vec3::new(
            settings.horizontal_alignment.offset(line_width),
            settings
                .vertical_alignment
                .offset(total_height, line_index, line_height),
            0.0,
        );
        for (slot, glyph_width) in glyph_widths {
            let mut shift = offset;
            if settings.monospaced {
                shift.x += scale.x * 0.5 * (settings.monospaced_width - glyph_width);
            }
            if let Some(position) = positions[slot].as_mut() {
                *position += shift;
            }
        }

        columns = columns.max(line.tokens.len());
        line_widths.push(line_width);
    }

    let widest = line_widths.iter().copied().fold(0.0f32, f32::max);
    LayoutResult {
        positions,
        line_widths,
        total_height,
        size: Vec2::new(widest, total_height),
        columns,
    }
}

/// Tokenize `text` and lay it out in one call.
pub fn layout_text(
    text: &str,
    registry: &GlyphRegistry,
    settings: &LayoutSettings,
) -> LayoutResult {
    compute_positions(&TokenizedText::new(text), registry, settings)
}

/// Unscaled width of a line, logging glyphs missing from the registry.
fn measure_line(line: &TokenizedLine, registry: &GlyphRegistry, settings: &LayoutSettings) -> f32 {
    let last = line.tokens.len().saturating_sub(1);
    let mut width = 0.0;
    for (i, token) in line.tokens.iter().enumerate() {
        if let Token::Glyph { key, .. } = token
            && !registry.contains(key.as_str())
        {
            warn!("\"{}\" is missing from the glyph registry", key);
        }
        width += advance(token, i == last, registry, settings);
    }
    width
}

/// Unscaled cursor advance for one token. The last token of a line never
/// adds trailing spacing.
fn advance(
    token: &Token,
    is_last: bool,
    registry: &GlyphRegistry,
    settings: &LayoutSettings,
) -> f32 {
    let spacing = if is_last {
        0.0
    } else {
        settings.character_spacing
    };
    match token {
        Token::Whitespace { .. } if settings.monospaced => settings.monospaced_width,
        Token::Whitespace { .. } => settings.whitespace_width + spacing,
        Token::Glyph { key, .. } => match registry.lookup(key.as_str()) {
            None => 0.0,
            Some(_) if settings.monospaced => settings.monospaced_width,
            Some(record) => record.width() + spacing,
        },
    }
}
