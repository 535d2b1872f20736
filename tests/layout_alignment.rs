use bevy::{asset::Handle, math::Vec3};
use bevy_camera::primitives::Aabb;
use bevy_mesh_text::{
    GlyphRecord, GlyphRegistry, HorizontalAlignment, LayoutSettings, VerticalAlignment, layout_text,
};

fn registry() -> GlyphRegistry {
    let glyph = |key: &str, width: f32| {
        GlyphRecord::new(
            key,
            Handle::default(),
            Aabb::from_min_max(Vec3::ZERO, Vec3::new(width, 0.05, 0.01)),
        )
    };
    GlyphRegistry::build([vec![
        glyph("A", 0.05),
        glyph("W", 0.07),
        glyph("i", 0.02),
    ]])
}

fn settings(horizontal: HorizontalAlignment, vertical: VerticalAlignment) -> LayoutSettings {
    LayoutSettings {
        horizontal_alignment: horizontal,
        vertical_alignment: vertical,
        ..Default::default()
    }
}

/// With trailing alignment the right edge of the last glyph lands on the
/// origin, since the last token of a line adds no spacing.
#[test]
fn trailing_lines_end_at_origin() {
    let registry = registry();
    let settings = settings(HorizontalAlignment::Trailing, VerticalAlignment::Top);
    let result = layout_text("AWi\nWA", &registry, &settings);

    let i = result.position(2).unwrap();
    assert!((i.x + 0.02).abs() < 1e-6, "got {}", i.x);
    let a = result.position(5).unwrap();
    assert!((a.x + 0.05).abs() < 1e-6, "got {}", a.x);
}

#[test]
fn centered_line_is_symmetric() {
    let registry = registry();
    let settings = settings(HorizontalAlignment::Center, VerticalAlignment::Top);
    let result = layout_text("AA", &registry, &settings);

    let left = result.position(0).unwrap().x;
    let right = result.position(1).unwrap().x + 0.05;
    assert!((left + right).abs() < 1e-6, "{left} vs {right}");
}

/// Every line after the first steps down twice: once from the cursor and
/// once from the alignment offset.
#[test]
fn vertical_alignment_stacks_lines_downwards() {
    let registry = registry();
    let text = "A\nA\nA";
    let line_height = LayoutSettings::default().line_height;

    let top = layout_text(
        text,
        &registry,
        &settings(HorizontalAlignment::Leading, VerticalAlignment::Top),
    );
    let ys: Vec<f32> = [0, 2, 4].iter().map(|&s| top.position(s).unwrap().y).collect();
    assert!((ys[0] - 0.0).abs() < 1e-6);
    assert!((ys[1] + 2.0 * line_height).abs() < 1e-6);
    assert!((ys[2] + 4.0 * line_height).abs() < 1e-6);

    let bottom = layout_text(
        text,
        &registry,
        &settings(HorizontalAlignment::Leading, VerticalAlignment::Bottom),
    );
    for slot in [0, 2, 4] {
        let shift = bottom.position(slot).unwrap().y - top.position(slot).unwrap().y;
        assert!((shift - bottom.total_height).abs() < 1e-6);
    }

    let middle = layout_text(
        text,
        &registry,
        &settings(HorizontalAlignment::Leading, VerticalAlignment::Middle),
    );
    let shift = middle.position(0).unwrap().y - top.position(0).unwrap().y;
    assert!((shift - middle.total_height * 0.5).abs() < 1e-6);
}

#[test]
fn bottom_aligned_second_line_sits_on_origin() {
    let registry = registry();
    let settings = settings(HorizontalAlignment::Leading, VerticalAlignment::Bottom);
    let result = layout_text("A\nA", &registry, &settings);

    assert!((result.position(0).unwrap().y - 0.12).abs() < 1e-6);
    assert!(result.position(2).unwrap().y.abs() < 1e-6);
}

/// Monospaced glyphs of any width are centered in equal cells.
#[test]
fn monospaced_glyphs_are_centered_in_cells() {
    let registry = registry();
    let settings = LayoutSettings {
        monospaced: true,
        ..settings(HorizontalAlignment::Leading, VerticalAlignment::Top)
    };
    let cell = settings.monospaced_width;
    let result = layout_text("WiA", &registry, &settings);

    for (slot, width) in [(0, 0.07), (1, 0.02), (2, 0.05)] {
        let center = result.position(slot).unwrap().x + width * 0.5;
        let expected = cell * (slot as f32 + 0.5);
        assert!(
            (center - expected).abs() < 1e-6,
            "slot {slot}: {center} vs {expected}"
        );
    }
    assert_eq!(result.columns, 3);
}

#[test]
fn size_multiplier_scales_advances() {
    let registry = registry();
    let base = settings(HorizontalAlignment::Leading, VerticalAlignment::Top);
    let doubled = LayoutSettings {
        size_multiplier: 2.0,
        ..base.clone()
    };

    let one = layout_text("A W", &registry, &base);
    let two = layout_text("A W", &registry, &doubled);
    assert!((two.line_widths[0] - 2.0 * one.line_widths[0]).abs() < 1e-6);
    let w1 = one.position(2).unwrap().x;
    let w2 = two.position(2).unwrap().x;
    assert!((w2 - 2.0 * w1).abs() < 1e-6);
    assert!((two.total_height - 2.0 * one.total_height).abs() < 1e-6);
}

#[test]
fn missing_glyph_takes_no_space() {
    let registry = registry();
    let settings = settings(HorizontalAlignment::Leading, VerticalAlignment::Top);
    let with_missing = layout_text("A?W", &registry, &settings);
    let without = layout_text("AW", &registry, &settings);

    assert!(with_missing.position(1).is_none());
    let w = with_missing.position(2).unwrap().x;
    assert!((w - without.position(1).unwrap().x).abs() < 1e-6);
}
