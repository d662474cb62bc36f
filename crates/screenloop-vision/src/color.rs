use crate::capture::ScreenFrame;
use crate::error::{VisionError, VisionResult};
use crate::geometry::{MatchBox, sort_visual};
use crate::settings::MatchSettings;
use image::{GrayImage, Luma, Rgba};
use imageproc::region_labelling::{Connectivity, connected_components};
use screenloop_core::Region;

/// Inclusive per-channel RGB range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorBand {
    low: [u8; 3],
    high: [u8; 3],
}

impl ColorBand {
    pub fn new(rgb: [u8; 3], tolerance: u8) -> Self {
        Self {
            low: rgb.map(|c| c.saturating_sub(tolerance)),
            high: rgb.map(|c| c.saturating_add(tolerance)),
        }
    }

    pub fn from_hex(hex: &str, tolerance: u8) -> VisionResult<Self> {
        Ok(Self::new(parse_hex(hex)?, tolerance))
    }

    pub fn contains(&self, pixel: &Rgba<u8>) -> bool {
        (0..3).all(|i| pixel[i] >= self.low[i] && pixel[i] <= self.high[i])
    }
}

/// `#RRGGBB` or `RRGGBB`.
pub fn parse_hex(hex: &str) -> VisionResult<[u8; 3]> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(VisionError::InvalidColor(hex.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| VisionError::InvalidColor(hex.to_string()))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

/// Bounding boxes of the connected areas whose colour falls inside the
/// band, in full-screen physical pixels and visual order. Components smaller
/// than `min_component_px` on either side are dropped.
pub fn find_color(
    frame: &ScreenFrame,
    target: &str,
    tolerance: u8,
    region: Option<Region>,
    settings: &MatchSettings,
) -> VisionResult<Vec<MatchBox>> {
    let band = ColorBand::from_hex(target, tolerance)?;
    let area = frame.search_area(region)?;

    let (w, h) = area.image.dimensions();
    let mask = GrayImage::from_fn(w, h, |x, y| {
        if band.contains(area.image.get_pixel(x, y)) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    // Per label: min x, min y, max x, max y.
    let mut bounds: Vec<Option<(u32, u32, u32, u32)>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if bounds.len() <= label {
            bounds.resize(label + 1, None);
        }
        bounds[label] = Some(match bounds[label] {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    let min = settings.min_component_px;
    let mut boxes: Vec<MatchBox> = bounds
        .into_iter()
        .flatten()
        .map(|(x0, y0, x1, y1)| MatchBox::new(x0 as i32, y0 as i32, x1 - x0 + 1, y1 - y0 + 1))
        .filter(|b| b.width >= min && b.height >= min)
        .map(|b| b.translated(area.origin_x, area.origin_y))
        .collect();
    sort_visual(&mut boxes);
    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::DisplayScale;
    use image::RgbaImage;

    const RED: Rgba<u8> = Rgba([220, 30, 40, 255]);

    fn screen(ratio: f64, paint: &[(u32, u32, u32, u32, Rgba<u8>)]) -> ScreenFrame {
        let mut image = RgbaImage::from_pixel(120, 80, Rgba([250, 250, 250, 255]));
        for &(x, y, w, h, color) in paint {
            for yy in y..y + h {
                for xx in x..x + w {
                    image.put_pixel(xx, yy, color);
                }
            }
        }
        ScreenFrame::new(image, DisplayScale::new(ratio))
    }

    #[test]
    fn parses_hex_with_and_without_hash() {
        assert_eq!(parse_hex("#DC1E28").unwrap(), [220, 30, 40]);
        assert_eq!(parse_hex("dc1e28").unwrap(), [220, 30, 40]);
        assert!(parse_hex("#12345").is_err());
        assert!(parse_hex("#12345g").is_err());
        assert!(parse_hex("#ééé").is_err());
    }

    #[test]
    fn band_saturates_at_channel_limits() {
        let band = ColorBand::new([250, 5, 128], 10);
        assert!(band.contains(&Rgba([255, 0, 120, 255])));
        assert!(!band.contains(&Rgba([239, 0, 128, 255])));
    }

    #[test]
    fn finds_blobs_in_visual_order_and_drops_noise() {
        let frame = screen(
            1.0,
            &[
                (70, 10, 8, 6, RED),
                (5, 40, 10, 10, Rgba([225, 25, 45, 255])),
                (5, 5, 6, 4, RED),
                // One pixel wide: noise.
                (100, 60, 1, 9, RED),
            ],
        );
        let boxes = find_color(&frame, "#DC1E28", 8, None, &MatchSettings::default()).unwrap();
        assert_eq!(
            boxes,
            vec![
                MatchBox::new(5, 5, 6, 4),
                MatchBox::new(70, 10, 8, 6),
                MatchBox::new(5, 40, 10, 10),
            ]
        );
    }

    #[test]
    fn tolerance_zero_requires_exact_colour() {
        let frame = screen(1.0, &[(5, 5, 6, 6, Rgba([221, 30, 40, 255]))]);
        let boxes = find_color(&frame, "#DC1E28", 0, None, &MatchSettings::default()).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn region_offset_is_added_back_in_physical_pixels() {
        let frame = screen(2.0, &[(50, 30, 4, 4, RED), (2, 2, 4, 4, RED)]);
        let boxes = find_color(
            &frame,
            "#DC1E28",
            0,
            Some(Region::new(20, 10, 20, 20)),
            &MatchSettings::default(),
        )
        .unwrap();
        assert_eq!(boxes, vec![MatchBox::new(50, 30, 4, 4)]);
    }

    #[test]
    fn bad_hex_is_a_configuration_error() {
        let frame = screen(1.0, &[]);
        let err = find_color(&frame, "red", 0, None, &MatchSettings::default()).unwrap_err();
        assert!(err.is_configuration());
    }
}
