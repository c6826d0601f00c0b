// Legend texture synthesis.
//
// A floor's usage legend is painted as equal-width vertical stripes, one per
// color segment, left to right. "Others" stripes get a diagonal hatch on top.
// Every legend produces four textures:
//   base, active: two rasters (light / dark fills)
//   base_mirrored, active_mirrored: same pixels, sampled with U flipped
//
// All textures wrap with repeat addressing on both axes.

use std::sync::Arc;

use glam::Vec2;
use image::{Rgba, RgbaImage};

use super::palette::{Color, ColorSegment};

// ============================================================================
// CONSTANTS
// ============================================================================

pub const STRIPE_WIDTH: u32 = 100;
pub const STRIPE_HEIGHT: u32 = 100;

/// Side length of the square raster used when there are no segments.
pub const NEUTRAL_SIZE: u32 = 100;
const NEUTRAL_LIGHT: Color = Color::from_u32(0xE2E8F0);
const NEUTRAL_DARK: Color = Color::from_u32(0xCBD5E1);

const HATCH_COLOR: Color = Color::from_u32(0xE2E8F0);
const HATCH_SPACING: i32 = 12;
const HATCH_LINE_WIDTH: f32 = 1.5;

// ============================================================================
// UV ADDRESSING
// ============================================================================

/// Affine texture-coordinate transform: `uv * repeat + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub repeat: Vec2,
    pub offset: Vec2,
}

impl UvTransform {
    pub const IDENTITY: UvTransform = UvTransform { repeat: Vec2::ONE, offset: Vec2::ZERO };

    /// Left-right flip: u' = 1 - u.
    pub const MIRROR_U: UvTransform = UvTransform {
        repeat: Vec2::new(-1.0, 1.0),
        offset: Vec2::new(1.0, 0.0),
    };

    pub fn apply(&self, uv: Vec2) -> Vec2 {
        uv * self.repeat + self.offset
    }

    /// Packed as `[repeat.x, repeat.y, offset.x, offset.y]` for shader uniforms.
    pub fn to_array(&self) -> [f32; 4] {
        [self.repeat.x, self.repeat.y, self.offset.x, self.offset.y]
    }
}

/// Repeat wrapping into [0, 1).
fn wrap_repeat(t: f32) -> f32 {
    let w = t - t.floor();
    // tiny negatives can round up to exactly 1.0
    if w >= 1.0 { 0.0 } else { w }
}

// ============================================================================
// FLOOR TEXTURE
// ============================================================================

/// A raster plus the UV transform it is sampled with.
/// Mirrored variants share the pixel buffer of their source.
#[derive(Debug, Clone)]
pub struct FloorTexture {
    pub image: Arc<RgbaImage>,
    pub uv: UvTransform,
}

impl FloorTexture {
    fn new(image: RgbaImage) -> Self {
        Self { image: Arc::new(image), uv: UvTransform::IDENTITY }
    }

    fn mirrored(&self) -> Self {
        Self { image: Arc::clone(&self.image), uv: UvTransform::MIRROR_U }
    }

    pub fn width(&self) -> u32 { self.image.width() }
    pub fn height(&self) -> u32 { self.image.height() }

    pub fn is_mirrored(&self) -> bool {
        self.uv.repeat.x < 0.0
    }

    pub fn shares_pixels_with(&self, other: &FloorTexture) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    /// Nearest-texel lookup with repeat wrapping.
    /// `v = 1` is the top row of the raster, `v = 0` the bottom.
    pub fn sample(&self, u: f32, v: f32) -> Rgba<u8> {
        let uv = self.uv.apply(Vec2::new(u, v));
        let (w, h) = (self.width(), self.height());

        let x = ((wrap_repeat(uv.x) * w as f32).floor() as u32).min(w - 1);
        let y = (((1.0 - wrap_repeat(uv.y)) * h as f32).floor() as u32).min(h - 1);
        *self.image.get_pixel(x, y)
    }
}

/// The four textures derived from one legend.
#[derive(Debug, Clone)]
pub struct TextureSet {
    pub base: FloorTexture,
    pub active: FloorTexture,
    pub base_mirrored: FloorTexture,
    pub active_mirrored: FloorTexture,
}

impl TextureSet {
    fn from_rasters(base: RgbaImage, active: RgbaImage) -> Self {
        let base = FloorTexture::new(base);
        let active = FloorTexture::new(active);
        Self {
            base_mirrored: base.mirrored(),
            active_mirrored: active.mirrored(),
            base,
            active,
        }
    }

    /// (unmirrored, mirrored) pair for the given selection state.
    pub fn pick(&self, selected: bool) -> (&FloorTexture, &FloorTexture) {
        if selected {
            (&self.active, &self.active_mirrored)
        } else {
            (&self.base, &self.base_mirrored)
        }
    }
}

// ============================================================================
// SYNTHESIS
// ============================================================================

/// Paint the legend rasters for a segment list.
/// An empty list yields flat neutral rasters instead of stripes.
pub fn synthesize(segments: &[ColorSegment]) -> TextureSet {
    if segments.is_empty() {
        log::debug!("synthesizing neutral legend texture");
        return TextureSet::from_rasters(
            RgbaImage::from_pixel(NEUTRAL_SIZE, NEUTRAL_SIZE, NEUTRAL_LIGHT.to_rgba()),
            RgbaImage::from_pixel(NEUTRAL_SIZE, NEUTRAL_SIZE, NEUTRAL_DARK.to_rgba()),
        );
    }

    log::debug!("synthesizing legend texture with {} stripes", segments.len());
    TextureSet::from_rasters(paint_stripes(segments, false), paint_stripes(segments, true))
}

fn paint_stripes(segments: &[ColorSegment], active: bool) -> RgbaImage {
    let width = segments.len() as u32 * STRIPE_WIDTH;
    let mut img = RgbaImage::new(width, STRIPE_HEIGHT);

    for (index, seg) in segments.iter().enumerate() {
        let x0 = index as u32 * STRIPE_WIDTH;
        let fill = if active { seg.dark } else { seg.light }.to_rgba();

        for y in 0..STRIPE_HEIGHT {
            for x in x0..x0 + STRIPE_WIDTH {
                img.put_pixel(x, y, fill);
            }
        }

        if seg.is_hatched() {
            draw_hatch(&mut img, x0, STRIPE_WIDTH, STRIPE_HEIGHT);
        }
    }

    img
}

/// Stroke the diagonal hatch over the stripe `[x0, x0 + w) × [0, h)`.
///
/// Line k runs from (x0 + w + k, 0) to (x0 + k, h) for k = -h, -h + 12, ...
/// while k < w + h. Only pixels inside the stripe are touched (clip), and
/// coverage falls off linearly over one pixel at the stroke edge.
fn draw_hatch(img: &mut RgbaImage, x0: u32, w: u32, h: u32) {
    let dir = Vec2::new(-(w as f32), h as f32).normalize();
    let half_width = HATCH_LINE_WIDTH * 0.5;
    let stroke = HATCH_COLOR.to_rgba();

    let line_starts: Vec<Vec2> = (-(h as i32)..(w + h) as i32)
        .step_by(HATCH_SPACING as usize)
        .map(|k| Vec2::new((x0 + w) as f32 + k as f32, 0.0))
        .collect();

    for y in 0..h {
        for x in x0..x0 + w {
            let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let dist = line_starts
                .iter()
                .map(|&p0| (center - p0).perp_dot(dir).abs())
                .fold(f32::INFINITY, f32::min);

            let coverage = (half_width + 0.5 - dist).clamp(0.0, 1.0);
            if coverage > 0.0 {
                let under = *img.get_pixel(x, y);
                img.put_pixel(x, y, blend(under, stroke, coverage));
            }
        }
    }
}

fn blend(under: Rgba<u8>, over: Rgba<u8>, coverage: f32) -> Rgba<u8> {
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * coverage).round() as u8;
    Rgba([mix(under[0], over[0]), mix(under[1], over[1]), mix(under[2], over[2]), 255])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::palette::UsageType;
    use std::collections::HashSet;

    fn legend() -> Vec<ColorSegment> {
        vec![
            ColorSegment::from_usage(UsageType::Office),
            ColorSegment::from_usage(UsageType::Hotel),
            ColorSegment::from_usage(UsageType::Parking),
        ]
    }

    /// Distinct fill runs along the middle row.
    fn runs(tex: &FloorTexture) -> Vec<Rgba<u8>> {
        let y = tex.height() / 2;
        let mut out: Vec<Rgba<u8>> = Vec::new();
        for x in 0..tex.width() {
            let p = *tex.image.get_pixel(x, y);
            if out.last() != Some(&p) {
                out.push(p);
            }
        }
        out
    }

    #[test]
    fn one_stripe_per_segment_in_order() {
        let segs = legend();
        let set = synthesize(&segs);
        assert_eq!(set.base.width(), 3 * STRIPE_WIDTH);
        assert_eq!(set.base.height(), STRIPE_HEIGHT);

        let expected: Vec<_> = segs.iter().map(|s| s.light.to_rgba()).collect();
        assert_eq!(runs(&set.base), expected);
    }

    #[test]
    fn active_swaps_every_stripe_to_dark() {
        let segs = legend();
        let set = synthesize(&segs);
        let expected: Vec<_> = segs.iter().map(|s| s.dark.to_rgba()).collect();
        assert_eq!(runs(&set.active), expected);
        assert_eq!(set.active.width(), set.base.width());
    }

    #[test]
    fn stripe_centers_sample_segment_colors() {
        let segs = legend();
        let set = synthesize(&segs);
        for (i, seg) in segs.iter().enumerate() {
            let u = (i as f32 + 0.5) / segs.len() as f32;
            assert_eq!(set.base.sample(u, 0.5), seg.light.to_rgba());
            assert_eq!(set.active.sample(u, 0.5), seg.dark.to_rgba());
        }
    }

    #[test]
    fn mirrored_samples_reflect_source() {
        let mut segs = legend();
        segs.push(ColorSegment::from_usage(UsageType::Others));
        let set = synthesize(&segs);

        for step in 0..=200 {
            let u = step as f32 / 200.0;
            for v in [0.1, 0.5, 0.93] {
                assert_eq!(set.base_mirrored.sample(u, v), set.base.sample(1.0 - u, v), "u={u} v={v}");
                assert_eq!(set.active_mirrored.sample(u, v), set.active.sample(1.0 - u, v), "u={u} v={v}");
            }
        }
    }

    #[test]
    fn mirrored_variants_share_pixels() {
        let set = synthesize(&legend());
        assert!(set.base_mirrored.shares_pixels_with(&set.base));
        assert!(set.active_mirrored.shares_pixels_with(&set.active));
        assert!(set.base_mirrored.is_mirrored());
        assert!(!set.base.is_mirrored());
        assert_eq!(set.base_mirrored.uv, UvTransform::MIRROR_U);
    }

    #[test]
    fn empty_legend_is_single_neutral_color() {
        let set = synthesize(&[]);
        for (tex, color) in [(&set.base, NEUTRAL_LIGHT), (&set.active, NEUTRAL_DARK)] {
            let colors: HashSet<_> = tex.image.pixels().map(|p| p.0).collect();
            assert_eq!(colors.len(), 1);
            assert!(colors.contains(&color.to_rgba().0));
            assert_eq!((tex.width(), tex.height()), (NEUTRAL_SIZE, NEUTRAL_SIZE));
        }
    }

    #[test]
    fn hatch_stays_inside_others_stripe() {
        let segs = vec![
            ColorSegment::from_usage(UsageType::House),
            ColorSegment::from_usage(UsageType::Others),
            ColorSegment::from_usage(UsageType::Store),
        ];
        let set = synthesize(&segs);
        let img = &set.base.image;

        let stripe_colors = |i: u32| -> HashSet<[u8; 4]> {
            (0..STRIPE_HEIGHT)
                .flat_map(|y| (i * STRIPE_WIDTH..(i + 1) * STRIPE_WIDTH).map(move |x| (x, y)))
                .map(|(x, y)| img.get_pixel(x, y).0)
                .collect()
        };

        assert_eq!(stripe_colors(0), HashSet::from([segs[0].light.to_rgba().0]));
        assert_eq!(stripe_colors(2), HashSet::from([segs[2].light.to_rgba().0]));

        let hatched = stripe_colors(1);
        assert!(hatched.contains(&segs[1].light.to_rgba().0));
        assert!(hatched.contains(&HATCH_COLOR.to_rgba().0));
    }

    #[test]
    fn uv_wraps_with_repeat() {
        let set = synthesize(&legend());
        assert_eq!(set.base.sample(1.1, 0.5), set.base.sample(0.1, 0.5));
        assert_eq!(set.base.sample(-0.2, 0.5), set.base.sample(0.8, 0.5));
        assert_eq!(set.base.sample(0.5, 2.25), set.base.sample(0.5, 0.25));
    }

    #[test]
    fn pick_follows_selection() {
        let set = synthesize(&legend());
        let (tex, flipped) = set.pick(true);
        assert!(tex.shares_pixels_with(&set.active));
        assert!(flipped.is_mirrored());
        let (tex, _) = set.pick(false);
        assert!(tex.shares_pixels_with(&set.base));
    }
}
