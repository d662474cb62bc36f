//! Image template matching.
//!
//! Scores are zero-mean normalised cross-correlation, the same measure as
//! OpenCV's `TM_CCOEFF_NORMED`: 1.0 for an exact copy, independent of
//! brightness offsets, near 0 for unrelated content. Every sum is taken in
//! integers, so an exact copy scores 1.0 however faint its contrast.
//!
//! Large templates whose content is smooth enough are first located on a
//! downsampled screen, then scored at full resolution around each coarse hit.
//! Fine-grained templates are scanned at full resolution.

use crate::capture::ScreenFrame;
use crate::error::{VisionError, VisionResult};
use crate::geometry::{MatchBox, sort_visual};
use crate::settings::MatchSettings;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use screenloop_core::Region;
use std::path::Path;
use tracing::debug;

/// Rounding left over once the integer sums meet `sqrt`.
const SCORE_EPSILON: f64 = 1e-9;

/// Downsampling factors to try, coarsest first.
const COARSE_FACTORS: [u32; 3] = [8, 4, 2];

/// A coarse template must keep at least this many pixels on each side.
const MIN_COARSE_SIDE: u32 = 12;

/// Score a template's downsample must keep against itself shifted by half a
/// coarse pixel before coarse search is used for it.
const MIN_PHASE_AGREEMENT: f64 = 0.6;

/// Slack below the expected worst-phase coarse score.
const COARSE_MARGIN: f64 = 0.1;

type IntegralImage = ImageBuffer<Luma<u64>, Vec<u64>>;

pub fn load_template(path: &Path) -> VisionResult<GrayImage> {
    let image = image::open(path).map_err(|source| VisionError::TemplateUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_luma8())
}

/// Every location in `region` (or the whole frame) scoring at least
/// `confidence`, in full-screen physical pixels and visual order.
///
/// A template that finds nothing and is larger than the small-icon threshold
/// is retried once at `fallback_scale`, for captures taken at twice the
/// resolution the template was cut from.
pub fn find_template(
    frame: &ScreenFrame,
    template: &GrayImage,
    confidence: f32,
    region: Option<Region>,
    settings: &MatchSettings,
) -> VisionResult<Vec<MatchBox>> {
    let area = frame.search_area(region)?;
    let haystack = imageops::grayscale(&area.image);

    let mut hits = match_at_scale(&haystack, template, confidence);

    let (tw, th) = template.dimensions();
    if hits.is_empty() && tw > settings.small_icon_px && th > settings.small_icon_px {
        let w = ((tw as f32 * settings.fallback_scale).round() as u32).max(1);
        let h = ((th as f32 * settings.fallback_scale).round() as u32).max(1);
        debug!(from = ?(tw, th), to = ?(w, h), "Retrying with downscaled template");
        let scaled = imageops::resize(template, w, h, FilterType::Triangle);
        hits = match_at_scale(&haystack, &scaled, confidence);
    }

    let mut hits: Vec<MatchBox> = hits
        .into_iter()
        .map(|m| m.translated(area.origin_x, area.origin_y))
        .collect();
    sort_visual(&mut hits);
    Ok(hits)
}

fn match_at_scale(haystack: &GrayImage, template: &GrayImage, confidence: f32) -> Vec<MatchBox> {
    let (iw, ih) = haystack.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return vec![];
    }

    let threshold = f64::from(confidence) - SCORE_EPSILON;
    let scorer = Scorer::new(haystack, template);
    let candidates = match coarse_plan(template) {
        Some(plan) => {
            debug!(
                factor = plan.factor,
                agreement = plan.agreement,
                "Coarse-to-fine template search"
            );
            let coarse = coarse_hits(haystack, &plan, confidence);
            refine(&scorer, &plan, &coarse, threshold)
        }
        None => scorer.scan(threshold),
    };

    suppress(candidates, tw, th)
}

/// Non-maximum suppression: a peak owns everything within half a template
/// of it.
fn suppress(mut candidates: Vec<(u32, u32, f64)>, tw: u32, th: u32) -> Vec<MatchBox> {
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
    let reach_x = (tw / 2).max(1) as i64;
    let reach_y = (th / 2).max(1) as i64;
    let mut peaks: Vec<(u32, u32)> = Vec::new();
    for (x, y, _) in candidates {
        let overlaps = peaks.iter().any(|&(px, py)| {
            (px as i64 - x as i64).abs() < reach_x && (py as i64 - y as i64).abs() < reach_y
        });
        if !overlaps {
            peaks.push((x, y));
        }
    }

    peaks
        .into_iter()
        .map(|(x, y)| MatchBox::new(x as i32, y as i32, tw, th))
        .collect()
}

// ============================================================================
// Coarse-to-fine search
// ============================================================================

struct CoarsePlan {
    factor: u32,
    /// Inset of the coarse template inside the full one, in full pixels.
    margin: u32,
    /// The template's interior, averaged over `factor`-sized blocks.
    template: GrayImage,
    /// Worst-phase score of an exact copy on the coarse grid.
    agreement: f64,
}

/// Picks the coarsest factor the template survives, if any.
///
/// The coarse template is cut from the interior so that, whatever the copy's
/// alignment with the coarse grid, its blocks never mix in surrounding
/// screen content. An exact copy then scores at least about `agreement` on
/// the coarse grid.
fn coarse_plan(template: &GrayImage) -> Option<CoarsePlan> {
    let (tw, th) = template.dimensions();
    COARSE_FACTORS.iter().find_map(|&factor| {
        let margin = factor;
        let cw = tw.checked_sub(2 * margin)? / factor;
        let ch = th.checked_sub(2 * margin)? / factor;
        if cw < MIN_COARSE_SIDE || ch < MIN_COARSE_SIDE {
            return None;
        }

        let aligned = shrink(template, margin, margin, cw, ch, factor);
        let half = margin + factor / 2;
        let shifted = shrink(template, half, half, cw, ch, factor);
        let check = Scorer::new(&shifted, &aligned);
        if check.template_is_flat() {
            return None;
        }
        let agreement = check.score(0, 0);
        (agreement >= MIN_PHASE_AGREEMENT).then_some(CoarsePlan {
            factor,
            margin,
            template: aligned,
            agreement,
        })
    })
}

fn coarse_hits(haystack: &GrayImage, plan: &CoarsePlan, confidence: f32) -> Vec<(u32, u32, f64)> {
    let (iw, ih) = haystack.dimensions();
    let coarse = shrink(haystack, 0, 0, iw / plan.factor, ih / plan.factor, plan.factor);
    let (cw, ch) = plan.template.dimensions();
    if cw > coarse.width() || ch > coarse.height() {
        return vec![];
    }
    let threshold = f64::from(confidence) * plan.agreement - COARSE_MARGIN;
    Scorer::new(&coarse, &plan.template).scan(threshold)
}

/// Full-resolution scores within one coarse block of every coarse hit.
fn refine(
    scorer: &Scorer,
    plan: &CoarsePlan,
    coarse: &[(u32, u32, f64)],
    threshold: f64,
) -> Vec<(u32, u32, f64)> {
    let (px, py) = scorer.positions();
    let mut seen = vec![false; px as usize * py as usize];
    let reach = plan.factor as i64;
    let mut found = Vec::new();

    for &(cx, cy, _) in coarse {
        let x0 = cx as i64 * plan.factor as i64 - plan.margin as i64;
        let y0 = cy as i64 * plan.factor as i64 - plan.margin as i64;
        for y in (y0 - reach).max(0)..=(y0 + reach).min(py as i64 - 1) {
            for x in (x0 - reach).max(0)..=(x0 + reach).min(px as i64 - 1) {
                let slot = y as usize * px as usize + x as usize;
                if seen[slot] {
                    continue;
                }
                seen[slot] = true;
                let score = scorer.score(x as u32, y as u32);
                if score >= threshold {
                    found.push((x as u32, y as u32, score));
                }
            }
        }
    }
    found
}

/// Block-averages a `width` x `height` grid of `factor`-sized blocks
/// starting at (`x0`, `y0`).
fn shrink(image: &GrayImage, x0: u32, y0: u32, width: u32, height: u32, factor: u32) -> GrayImage {
    let area = factor * factor;
    GrayImage::from_fn(width, height, |cx, cy| {
        let mut sum = 0u32;
        for dy in 0..factor {
            for dx in 0..factor {
                sum += u32::from(
                    image.get_pixel(x0 + cx * factor + dx, y0 + cy * factor + dy)[0],
                );
            }
        }
        Luma([((sum + area / 2) / area) as u8])
    })
}

// ============================================================================
// Scoring
// ============================================================================

/// Zero-mean NCC of one template against any placement in one haystack.
struct Scorer<'a> {
    haystack: &'a GrayImage,
    template: &'a GrayImage,
    sums: IntegralImage,
    squares: IntegralImage,
    n: i128,
    t_sum: i128,
    /// `n * sum(t^2) - sum(t)^2`, zero for a flat template.
    t_var: i128,
}

impl<'a> Scorer<'a> {
    fn new(haystack: &'a GrayImage, template: &'a GrayImage) -> Self {
        let (t_sum, t_sq) = template.pixels().fold((0i128, 0i128), |(s, sq), p| {
            let v = i128::from(p[0]);
            (s + v, sq + v * v)
        });
        let n = i128::from(template.width()) * i128::from(template.height());
        Self {
            haystack,
            template,
            sums: integral_image::<_, u64>(haystack),
            squares: integral_squared_image::<_, u64>(haystack),
            n,
            t_sum,
            t_var: n * t_sq - t_sum * t_sum,
        }
    }

    fn template_is_flat(&self) -> bool {
        self.t_var == 0
    }

    /// Number of placements along each axis.
    fn positions(&self) -> (u32, u32) {
        (
            self.haystack.width() - self.template.width() + 1,
            self.haystack.height() - self.template.height() + 1,
        )
    }

    fn scan(&self, threshold: f64) -> Vec<(u32, u32, f64)> {
        let (px, py) = self.positions();
        let mut found = Vec::new();
        for y in 0..py {
            for x in 0..px {
                let score = self.score(x, y);
                if score >= threshold {
                    found.push((x, y, score));
                }
            }
        }
        found
    }

    fn score(&self, x: u32, y: u32) -> f64 {
        let i_sum = self.window(&self.sums, x, y);
        let i_sq = self.window(&self.squares, x, y);
        let i_var = self.n * i_sq - i_sum * i_sum;

        match (self.t_var == 0, i_var == 0) {
            // Two flat patches match when their levels agree.
            (true, true) => {
                if (i_sum - self.t_sum).abs() < self.n {
                    1.0
                } else {
                    0.0
                }
            }
            (true, false) | (false, true) => 0.0,
            (false, false) => {
                let numerator = self.n * self.cross(x, y) - i_sum * self.t_sum;
                let denominator = (i_var as f64).sqrt() * (self.t_var as f64).sqrt();
                (numerator as f64 / denominator).clamp(-1.0, 1.0)
            }
        }
    }

    fn window(&self, table: &IntegralImage, x: u32, y: u32) -> i128 {
        let (tw, th) = self.template.dimensions();
        let a = table.get_pixel(x, y)[0];
        let b = table.get_pixel(x + tw, y)[0];
        let c = table.get_pixel(x, y + th)[0];
        let d = table.get_pixel(x + tw, y + th)[0];
        i128::from((a + d) - (b + c))
    }

    /// Raw `sum(i * t)` for the placement at (`x`, `y`).
    fn cross(&self, x: u32, y: u32) -> i128 {
        let stride = self.haystack.width() as usize;
        let tw = self.template.width() as usize;
        let hay = self.haystack.as_raw();
        let mut acc = 0u64;
        for (row, t_row) in self.template.as_raw().chunks_exact(tw).enumerate() {
            let start = (y as usize + row) * stride + x as usize;
            // A row of 255 * 255 products fits u32 for any on-screen width.
            let dot: u32 = hay[start..start + tw]
                .iter()
                .zip(t_row)
                .map(|(&i, &t)| u32::from(i) * u32::from(t))
                .sum();
            acc += u64::from(dot);
        }
        i128::from(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::DisplayScale;
    use image::{Rgba, RgbaImage};
    use std::time::{Duration, Instant};

    /// Deterministic texture; no two nearby windows look alike.
    fn noise(x: u32, y: u32, seed: u32) -> u8 {
        let mut h = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263) ^ seed;
        h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
        (h >> 24) as u8
    }

    fn pattern(w: u32, h: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([noise(x, y, seed)]))
    }

    /// Soft gradient background with `template` pasted at each position.
    fn screen_with(template: &GrayImage, at: &[(u32, u32)], w: u32, h: u32) -> ScreenFrame {
        let mut screen = RgbaImage::from_fn(w, h, |x, y| {
            let v = ((x + y) % 64) as u8 + 96;
            Rgba([v, v, v, 255])
        });
        for &(ox, oy) in at {
            for (x, y, p) in template.enumerate_pixels() {
                screen.put_pixel(ox + x, oy + y, Rgba([p[0], p[0], p[0], 255]));
            }
        }
        ScreenFrame::new(screen, DisplayScale::new(1.0))
    }

    #[test]
    fn exact_copy_matches_at_every_confidence() {
        let template = pattern(24, 16, 7);
        let frame = screen_with(&template, &[(70, 33)], 160, 90);

        for confidence in [0.1, 0.5, 0.8, 0.95, 0.99, 1.0] {
            let hits =
                find_template(&frame, &template, confidence, None, &MatchSettings::default())
                    .unwrap();
            assert!(
                hits.contains(&MatchBox::new(70, 33, 24, 16)),
                "confidence {confidence}: {hits:?}"
            );
        }
    }

    #[test]
    fn absent_template_finds_nothing() {
        let frame = screen_with(&pattern(20, 20, 1), &[(10, 10)], 120, 80);
        let other = pattern(20, 20, 99);
        let hits = find_template(&frame, &other, 0.8, None, &MatchSettings::default()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn multiple_copies_come_back_in_visual_order() {
        let template = pattern(12, 12, 3);
        let frame = screen_with(&template, &[(90, 50), (10, 50), (40, 5)], 140, 80);
        let hits = find_template(&frame, &template, 0.9, None, &MatchSettings::default()).unwrap();
        assert_eq!(
            hits,
            vec![
                MatchBox::new(40, 5, 12, 12),
                MatchBox::new(10, 50, 12, 12),
                MatchBox::new(90, 50, 12, 12),
            ]
        );
    }

    #[test]
    fn region_results_are_in_screen_coordinates() {
        let template = pattern(10, 10, 5);
        let frame = screen_with(&template, &[(60, 40), (5, 5)], 120, 80);
        let hits = find_template(
            &frame,
            &template,
            0.9,
            Some(Region::new(50, 30, 40, 40)),
            &MatchSettings::default(),
        )
        .unwrap();
        assert_eq!(hits, vec![MatchBox::new(60, 40, 10, 10)]);
    }

    /// A template cut at double resolution is found through the
    /// downscaled retry.
    #[test]
    fn large_template_falls_back_to_half_scale() {
        let small = pattern(30, 30, 11);
        let frame = screen_with(&small, &[(50, 20)], 160, 100);
        let doubled = imageops::resize(&small, 60, 60, FilterType::Nearest);

        let hits = find_template(&frame, &doubled, 0.8, None, &MatchSettings::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].left, hits[0].top), (50, 20));
        assert_eq!((hits[0].width, hits[0].height), (30, 30));
    }

    #[test]
    fn small_template_skips_fallback() {
        let small = pattern(15, 15, 13);
        let frame = screen_with(&small, &[(50, 20)], 120, 80);
        let doubled = imageops::resize(&small, 30, 30, FilterType::Nearest);

        let hits = find_template(&frame, &doubled, 0.8, None, &MatchSettings::default()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn template_larger_than_area_is_a_miss() {
        let frame = screen_with(&pattern(4, 4, 2), &[], 20, 20);
        let hits =
            find_template(&frame, &pattern(30, 30, 2), 0.5, None, &MatchSettings::default())
                .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn unreadable_template_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_template(&dir.path().join("missing.png")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn loads_template_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.png");
        pattern(8, 6, 4).save(&path).unwrap();
        assert_eq!(load_template(&path).unwrap().dimensions(), (8, 6));
    }

    /// Flat button with faint glyphs: all of its signal sits in a few grey
    /// levels near white.
    fn faint_button(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let border = x == 0 || y == 0 || x == w - 1 || y == h - 1;
            let glyph = (h / 3..2 * h / 3).contains(&y) && (6..w - 6).contains(&x) && x % 12 < 8;
            Luma([if border {
                196
            } else if glyph {
                192
            } else {
                200
            }])
        })
    }

    /// Soft diamond highlight.
    fn smooth(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let d = (x as i32 - w as i32 / 2).abs() + (y as i32 - h as i32 / 2).abs();
            Luma([(230 - 2 * d).clamp(0, 255) as u8])
        })
    }

    #[test]
    fn faint_exact_copy_matches_at_full_confidence() {
        let template = faint_button(60, 30);
        let frame = screen_with(&template, &[(41, 27)], 200, 120);

        for confidence in [0.99, 1.0] {
            let hits =
                find_template(&frame, &template, confidence, None, &MatchSettings::default())
                    .unwrap();
            assert_eq!(
                hits,
                vec![MatchBox::new(41, 27, 60, 30)],
                "confidence {confidence}"
            );
        }
    }

    #[test]
    fn coarse_search_only_for_smooth_templates() {
        let plan = coarse_plan(&smooth(64, 32)).unwrap();
        assert_eq!(plan.factor, 2);
        assert!(plan.agreement > 0.9, "{}", plan.agreement);

        assert!(coarse_plan(&pattern(64, 64, 21)).is_none());
        assert!(coarse_plan(&smooth(20, 20)).is_none());
    }

    #[test]
    fn fine_grained_large_template_is_found_at_any_alignment() {
        let template = pattern(40, 40, 17);
        let frame = screen_with(&template, &[(33, 21)], 160, 100);
        let hits = find_template(&frame, &template, 1.0, None, &MatchSettings::default()).unwrap();
        assert_eq!(hits, vec![MatchBox::new(33, 21, 40, 40)]);
    }

    #[test]
    fn full_hd_screen_is_searched_quickly() {
        let template = smooth(64, 32);
        let frame = screen_with(&template, &[(901, 503)], 1920, 1080);

        let started = Instant::now();
        let hits = find_template(&frame, &template, 0.95, None, &MatchSettings::default()).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(hits, vec![MatchBox::new(901, 503, 64, 32)]);
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    }
}
