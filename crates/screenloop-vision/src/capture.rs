use crate::error::{VisionError, VisionResult};
use crate::scaling::DisplayScale;
use image::RgbaImage;
use image::imageops;
use screenloop_core::Region;
use tracing::debug;

/// One full-screen capture in physical pixels, plus the ratio it was taken at.
#[derive(Debug, Clone)]
pub struct ScreenFrame {
    pub image: RgbaImage,
    pub scale: DisplayScale,
}

/// The part of a frame a matcher searches, with its physical offset on screen.
#[derive(Debug)]
pub struct SearchArea {
    pub image: RgbaImage,
    pub origin_x: i32,
    pub origin_y: i32,
}

impl ScreenFrame {
    pub fn new(image: RgbaImage, scale: DisplayScale) -> Self {
        Self { image, scale }
    }

    /// Crops to a logical-point region after scaling it to physical pixels.
    /// A region that only partly overlaps the screen is clipped.
    pub fn search_area(&self, region: Option<Region>) -> VisionResult<SearchArea> {
        let Some(region) = region else {
            return Ok(SearchArea {
                image: self.image.clone(),
                origin_x: 0,
                origin_y: 0,
            });
        };

        let (width, height) = self.image.dimensions();
        let physical = self.scale.region_to_physical(region);
        let x0 = physical.x.max(0) as i64;
        let y0 = physical.y.max(0) as i64;
        let x1 = (physical.x as i64 + physical.width as i64).min(width as i64);
        let y1 = (physical.y as i64 + physical.height as i64).min(height as i64);

        if x1 <= x0 || y1 <= y0 {
            return Err(VisionError::RegionOutOfBounds {
                region,
                width,
                height,
            });
        }

        let image = imageops::crop_imm(
            &self.image,
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        )
        .to_image();
        Ok(SearchArea {
            image,
            origin_x: x0 as i32,
            origin_y: y0 as i32,
        })
    }
}

/// Something that can photograph the screen.
pub trait ScreenSource: Send {
    fn capture(&self) -> VisionResult<ScreenFrame>;
}

/// Primary monitor via `xcap`. The device pixel ratio comes from the
/// monitor unless overridden.
#[derive(Debug, Default, Clone)]
pub struct XcapScreen {
    scale_override: Option<f64>,
}

impl XcapScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale(ratio: f64) -> Self {
        Self {
            scale_override: Some(ratio),
        }
    }
}

impl ScreenSource for XcapScreen {
    fn capture(&self) -> VisionResult<ScreenFrame> {
        let monitors =
            xcap::Monitor::all().map_err(|e| VisionError::Capture(e.to_string()))?;
        let primary = monitors
            .iter()
            .position(|m| m.is_primary().unwrap_or(false))
            .unwrap_or(0);
        let monitor = monitors
            .get(primary)
            .ok_or_else(|| VisionError::Capture("no monitors found".to_string()))?;

        let image = monitor
            .capture_image()
            .map_err(|e| VisionError::Capture(e.to_string()))?;
        let ratio = match self.scale_override {
            Some(ratio) => ratio,
            None => monitor.scale_factor().map(f64::from).unwrap_or(1.0),
        };
        debug!(
            width = image.width(),
            height = image.height(),
            ratio,
            "Captured screen"
        );

        Ok(ScreenFrame::new(image, DisplayScale::new(ratio)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame(ratio: f64) -> ScreenFrame {
        let image = RgbaImage::from_fn(200, 100, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        ScreenFrame::new(image, DisplayScale::new(ratio))
    }

    #[test]
    fn whole_frame_without_region() {
        let area = frame(1.0).search_area(None).unwrap();
        assert_eq!(area.image.dimensions(), (200, 100));
        assert_eq!((area.origin_x, area.origin_y), (0, 0));
    }

    #[test]
    fn region_is_scaled_before_cropping() {
        let area = frame(2.0)
            .search_area(Some(Region::new(10, 5, 20, 10)))
            .unwrap();
        assert_eq!(area.image.dimensions(), (40, 20));
        assert_eq!((area.origin_x, area.origin_y), (20, 10));
        assert_eq!(area.image.get_pixel(0, 0), &Rgba([20, 10, 0, 255]));
    }

    #[test]
    fn region_is_clipped_to_the_screen() {
        let area = frame(1.0)
            .search_area(Some(Region::new(180, 90, 50, 50)))
            .unwrap();
        assert_eq!(area.image.dimensions(), (20, 10));
    }

    #[test]
    fn region_off_screen_is_a_configuration_error() {
        let err = frame(1.0)
            .search_area(Some(Region::new(500, 500, 10, 10)))
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
