// ================================
// src/vision.rs - frame -> line offset
// ================================
use crate::config::{Config, Hsv, ScanBandParams};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_filled_rect_mut},
    map::map_colors,
    rect::Rect,
};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Mono8,
    Bgr8,
    Rgb8,
    Bgra8,
    Rgba8,
}

impl Encoding {
    /// Parses a ROS image encoding name.
    pub fn parse(name: &str) -> Result<Self, FrameError> {
        match name {
            "mono8" => Ok(Self::Mono8),
            "bgr8" => Ok(Self::Bgr8),
            "rgb8" => Ok(Self::Rgb8),
            "bgra8" => Ok(Self::Bgra8),
            "rgba8" => Ok(Self::Rgba8),
            other => Err(FrameError::UnsupportedEncoding(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mono8 => "mono8",
            Self::Bgr8 => "bgr8",
            Self::Rgb8 => "rgb8",
            Self::Bgra8 => "bgra8",
            Self::Rgba8 => "rgba8",
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            Self::Mono8 => 1,
            Self::Bgr8 | Self::Rgb8 => 3,
            Self::Bgra8 | Self::Rgba8 => 4,
        }
    }

    /// Reads one pixel of this encoding as (r, g, b).
    fn to_rgb(&self, px: &[u8]) -> [u8; 3] {
        match self {
            Self::Mono8 => [px[0]; 3],
            Self::Bgr8 | Self::Bgra8 => [px[2], px[1], px[0]],
            Self::Rgb8 | Self::Rgba8 => [px[0], px[1], px[2]],
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("unsupported image encoding {0:?}")]
    UnsupportedEncoding(String),
    #[error("row stride {step} is shorter than {min} bytes")]
    StrideTooShort { step: usize, min: usize },
    #[error("frame data holds {actual} bytes, expected at least {expected}")]
    Truncated { expected: usize, actual: usize },
}

/// One camera image, validated and converted to packed RGB on construction.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Builds a frame from a raw, possibly row-padded buffer.
    pub fn new(
        width: u32,
        height: u32,
        step: usize,
        encoding: Encoding,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let channels = encoding.channels();
        let min_step = width as usize * channels;
        if step < min_step {
            return Err(FrameError::StrideTooShort {
                step,
                min: min_step,
            });
        }
        let expected = step * (height as usize - 1) + min_step;
        if data.len() < expected {
            return Err(FrameError::Truncated {
                expected,
                actual: data.len(),
            });
        }

        let image = RgbImage::from_fn(width, height, |x, y| {
            let i = y as usize * step + x as usize * channels;
            Rgb(encoding.to_rgb(&data[i..i + channels]))
        });
        Ok(Self { image })
    }

    pub fn from_image(image: RgbImage) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        Ok(Self { image })
    }

    /// Frame filled with one color given as (r, g, b).
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb(rgb)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Paints the rectangle `[x0, x1) x [y0, y1)`, clipped to the frame.
    pub fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, rgb: [u8; 3]) {
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let rect = Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0);
        draw_filled_rect_mut(&mut self.image, rect, Rgb(rgb));
    }

    /// Filled disc, clipped to the frame.
    pub fn fill_circle(&mut self, cx: u32, cy: u32, radius: u32, rgb: [u8; 3]) {
        draw_filled_circle_mut(
            &mut self.image,
            (cx as i32, cy as i32),
            radius as i32,
            Rgb(rgb),
        );
    }
}

const HSV_SHIFT: u32 = 12;

// Fixed-point reciprocals of the 8-bit RGB -> HSV conversion.
struct HsvTables {
    sdiv: [i32; 256],
    hdiv: [i32; 256],
}

fn hsv_tables() -> &'static HsvTables {
    static TABLES: OnceLock<HsvTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut sdiv = [0; 256];
        let mut hdiv = [0; 256];
        for i in 1..256 {
            sdiv[i] = ((255 << HSV_SHIFT) as f64 / i as f64).round() as i32;
            hdiv[i] = ((180 << HSV_SHIFT) as f64 / (6 * i) as f64).round() as i32;
        }
        HsvTables { sdiv, hdiv }
    })
}

/// RGB -> HSV on the 8-bit scale: hue in 0..180, saturation and value in 0..=255.
///
/// Uses the same fixed-point arithmetic as OpenCV's `COLOR_RGB2HSV`, so hue
/// bounds tuned against OpenCV select the same pixels.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> Hsv {
    let tables = hsv_tables();
    let half = 1 << (HSV_SHIFT - 1);
    let [r, g, b] = rgb.map(i32::from);
    let v = r.max(g).max(b);
    let diff = v - r.min(g).min(b);

    let s = (diff * tables.sdiv[v as usize] + half) >> HSV_SHIFT;

    let n = if v == r {
        g - b
    } else if v == g {
        b - r + 2 * diff
    } else {
        r - g + 4 * diff
    };
    // arithmetic shift rounds half-up, also for negative hues
    let h = (n * tables.hdiv[diff as usize] + half) >> HSV_SHIFT;
    let h = if h < 0 { h + 180 } else { h };

    Hsv::new(h as u8, s as u8, v as u8)
}

/// Inclusive HSV box.
#[derive(Debug, Clone, Copy)]
pub struct HsvRange {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl HsvRange {
    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&hsv.h)
            && (self.lower.s..=self.upper.s).contains(&hsv.s)
            && (self.lower.v..=self.upper.v).contains(&hsv.v)
    }
}

const ACTIVE: Luma<u8> = Luma([255]);
const INACTIVE: Luma<u8> = Luma([0]);

/// Binary mask with the frame's dimensions, 255 where active.
#[derive(Debug, Clone)]
pub struct ColorMask {
    mask: GrayImage,
}

impl ColorMask {
    pub fn threshold(frame: &Frame, range: &HsvRange) -> Self {
        let mask = map_colors(frame.as_image(), |px: Rgb<u8>| {
            if range.contains(rgb_to_hsv(px.0)) {
                ACTIVE
            } else {
                INACTIVE
            }
        });
        Self { mask }
    }

    /// Forces every row outside `[start, end)` inactive.
    pub fn restrict_rows(&mut self, start: u32, end: u32) {
        for (y, row) in self.mask.rows_mut().enumerate() {
            let y = y as u32;
            if y < start || y >= end {
                row.for_each(|px| *px = INACTIVE);
            }
        }
    }

    pub fn is_active(&self, x: u32, y: u32) -> bool {
        *self.mask.get_pixel(x, y) == ACTIVE
    }

    pub fn moments(&self) -> Moments {
        self.mask
            .enumerate_pixels()
            .filter(|(_, _, px)| **px == ACTIVE)
            .fold(Moments::default(), |m, (x, y, _)| Moments {
                m00: m.m00 + 1,
                m10: m.m10 + x as u64,
                m01: m.m01 + y as u64,
            })
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.mask
    }
}

/// Zeroth and first raw moments of a binary mask, counting active pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Moments {
    pub m00: u64,
    pub m10: u64,
    pub m01: u64,
}

impl Moments {
    /// Truncated centroid, or `None` for an empty mask.
    pub fn centroid(&self) -> Option<(u32, u32)> {
        if self.m00 == 0 {
            return None;
        }
        Some(((self.m10 / self.m00) as u32, (self.m01 / self.m00) as u32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub centroid: (u32, u32),
    /// Centroid x minus half the frame width; positive means right of center.
    pub offset: i32,
    pub area: u64,
}

pub struct FrameProcessor {
    range: HsvRange,
    scan_band: ScanBandParams,
}

impl FrameProcessor {
    pub fn new(config: &Config) -> Self {
        Self {
            range: HsvRange {
                lower: config.detection.hsv_lower,
                upper: config.detection.hsv_upper,
            },
            scan_band: config.scan_band.clone(),
        }
    }

    /// Mask of in-band pixels restricted to the scan band.
    pub fn mask(&self, frame: &Frame) -> ColorMask {
        let mut mask = ColorMask::threshold(frame, &self.range);
        let (start, end) = self.scan_band.rows(frame.height());
        mask.restrict_rows(start, end);
        mask
    }

    /// Returns the line detection for this frame, or `None` when no pixel matched.
    pub fn process(&self, frame: &Frame) -> Option<Detection> {
        let moments = self.mask(frame).moments();
        let (cx, cy) = moments.centroid()?;
        Some(Detection {
            centroid: (cx, cy),
            offset: cx as i32 - (frame.width() / 2) as i32,
            area: moments.m00,
        })
    }
}

const MARKER_COLOR: [u8; 3] = [255, 0, 0];

/// Copy of `frame` with a filled red marker at the detection centroid.
pub fn annotate(frame: &Frame, detection: &Detection, radius: u32) -> Frame {
    let mut annotated = frame.clone();
    let (cx, cy) = detection.centroid;
    annotated.fill_circle(cx, cy, radius, MARKER_COLOR);
    annotated
}

#[cfg(test)]
mod tests {
    use super::*;

    const YELLOW: [u8; 3] = [255, 255, 0];
    const BLACK: [u8; 3] = [0, 0, 0];

    fn processor() -> FrameProcessor {
        FrameProcessor::new(&Config::default())
    }

    /// Raw buffer of `encoding` holding `frame`.
    fn encode(frame: &Frame, encoding: Encoding) -> Vec<u8> {
        let mut data = Vec::new();
        for px in frame.as_image().pixels() {
            let [r, g, b] = px.0;
            match encoding {
                Encoding::Mono8 => data.push(r),
                Encoding::Bgr8 => data.extend([b, g, r]),
                Encoding::Rgb8 => data.extend([r, g, b]),
                Encoding::Bgra8 => data.extend([b, g, r, 255]),
                Encoding::Rgba8 => data.extend([r, g, b, 255]),
            }
        }
        data
    }

    #[test]
    fn hsv_matches_8bit_convention() {
        assert_eq!(rgb_to_hsv([255, 255, 0]), Hsv::new(30, 255, 255));
        assert_eq!(rgb_to_hsv([255, 0, 0]), Hsv::new(0, 255, 255));
        assert_eq!(rgb_to_hsv([0, 255, 0]), Hsv::new(60, 255, 255));
        assert_eq!(rgb_to_hsv([0, 0, 255]), Hsv::new(120, 255, 255));
        assert_eq!(rgb_to_hsv([255, 0, 255]), Hsv::new(150, 255, 255));
        assert_eq!(rgb_to_hsv([0, 0, 0]), Hsv::new(0, 0, 0));
        assert_eq!(rgb_to_hsv([128, 128, 128]), Hsv::new(0, 0, 128));
        // dark orange: hue = 30 * 64 / 200 = 9.6
        assert_eq!(rgb_to_hsv([200, 64, 0]), Hsv::new(10, 255, 200));
    }

    #[test]
    fn negative_hue_wraps() {
        // red with a touch of blue: 30 * -40 / 255 = -4.7
        assert_eq!(rgb_to_hsv([255, 0, 40]).h, 180 - 5);
    }

    #[test]
    fn half_step_negative_hue_rounds_up() {
        // 30 * -1 / 60 = -0.5 rounds up to 0, not down to 179
        assert_eq!(rgb_to_hsv([255, 195, 196]), Hsv::new(0, 60, 255));
        // 30 * -3 / 60 = -1.5 rounds up to -1
        assert_eq!(rgb_to_hsv([255, 195, 198]).h, 179);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = HsvRange {
            lower: Hsv::new(20, 100, 100),
            upper: Hsv::new(40, 255, 255),
        };
        assert!(range.contains(Hsv::new(20, 100, 100)));
        assert!(range.contains(Hsv::new(40, 255, 255)));
        assert!(!range.contains(Hsv::new(19, 200, 200)));
        assert!(!range.contains(Hsv::new(41, 200, 200)));
        assert!(!range.contains(Hsv::new(30, 99, 200)));
        assert!(!range.contains(Hsv::new(30, 200, 99)));
    }

    #[test]
    fn frame_rejects_bad_shapes() {
        assert_eq!(
            Frame::new(0, 10, 0, Encoding::Bgr8, vec![]).unwrap_err(),
            FrameError::Empty {
                width: 0,
                height: 10
            }
        );
        assert_eq!(
            Frame::new(4, 2, 8, Encoding::Bgr8, vec![0; 24]).unwrap_err(),
            FrameError::StrideTooShort { step: 8, min: 12 }
        );
        assert_eq!(
            Frame::new(4, 2, 12, Encoding::Bgr8, vec![0; 20]).unwrap_err(),
            FrameError::Truncated {
                expected: 24,
                actual: 20
            }
        );
        assert_eq!(
            Encoding::parse("mono16").unwrap_err(),
            FrameError::UnsupportedEncoding("mono16".to_string())
        );
        assert_eq!(
            Frame::from_image(RgbImage::new(0, 0)).unwrap_err(),
            FrameError::Empty {
                width: 0,
                height: 0
            }
        );
    }

    #[test]
    fn padded_rows_are_read_with_stride() {
        // 2x2 bgr8 with 2 bytes of row padding
        let data = vec![
            0, 255, 255, 0, 0, 0, 9, 9, //
            0, 0, 0, 0, 255, 255, 9, 9,
        ];
        let frame = Frame::new(2, 2, 8, Encoding::Bgr8, data).unwrap();
        assert_eq!(frame.rgb(0, 0), YELLOW);
        assert_eq!(frame.rgb(1, 0), BLACK);
        assert_eq!(frame.rgb(1, 1), YELLOW);
    }

    #[test]
    fn color_encodings_agree() {
        let mut source = Frame::filled(40, 40, BLACK);
        source.fill_rect(5, 30, 8, 35, YELLOW);

        for encoding in [
            Encoding::Bgr8,
            Encoding::Rgb8,
            Encoding::Bgra8,
            Encoding::Rgba8,
        ] {
            let step = 40 * encoding.channels();
            let frame = Frame::new(40, 40, step, encoding, encode(&source, encoding)).unwrap();
            let detection = processor().process(&frame).unwrap();
            assert_eq!(detection.centroid, (6, 32), "{}", encoding.as_str());
        }
    }

    #[test]
    fn mono_frames_are_gray_and_never_match() {
        let mut source = Frame::filled(16, 16, BLACK);
        source.fill_rect(0, 12, 16, 16, [200, 200, 200]);
        let frame = Frame::new(16, 16, 16, Encoding::Mono8, encode(&source, Encoding::Mono8))
            .unwrap();

        assert_eq!(frame.rgb(3, 13), [200, 200, 200]);
        assert_eq!(processor().process(&frame), None);
    }

    #[test]
    fn mask_is_zero_outside_scan_band() {
        let frame = Frame::filled(16, 16, YELLOW);
        let mask = processor().mask(&frame);
        // 16 rows -> band [12, 16)
        assert!(!mask.is_active(3, 11));
        assert!(mask.is_active(3, 12));
        assert!(mask.is_active(3, 15));
        assert_eq!(mask.moments().m00, 16 * 4);
        assert_eq!(mask.as_image().dimensions(), (16, 16));
    }

    #[test]
    fn centroid_truncates_half_pixels() {
        let mut frame = Frame::filled(320, 240, BLACK);
        // columns 190..210 average to 199.5
        frame.fill_rect(190, 180, 210, 200, YELLOW);
        let detection = processor().process(&frame).unwrap();
        assert_eq!(detection.centroid, (199, 189));
        assert_eq!(detection.offset, 39);
        assert_eq!(detection.area, 400);
    }

    #[test]
    fn left_of_center_is_negative() {
        let mut frame = Frame::filled(320, 240, BLACK);
        frame.fill_rect(49, 185, 52, 190, YELLOW);
        let detection = processor().process(&frame).unwrap();
        assert_eq!(detection.offset, 50 - 160);
    }

    #[test]
    fn nothing_detected_on_black() {
        let frame = Frame::filled(320, 240, BLACK);
        assert_eq!(processor().process(&frame), None);
    }

    #[test]
    fn annotate_draws_marker_on_copy() {
        let frame = Frame::filled(64, 64, BLACK);
        let detection = Detection {
            centroid: (2, 60),
            offset: 2 - 32,
            area: 1,
        };
        let annotated = annotate(&frame, &detection, 5);
        assert_eq!(annotated.rgb(2, 60), MARKER_COLOR);
        assert_eq!(annotated.rgb(5, 60), MARKER_COLOR);
        assert_eq!(annotated.rgb(2, 63), MARKER_COLOR);
        assert_eq!(annotated.rgb(10, 60), BLACK);
        assert_eq!(frame.rgb(2, 60), BLACK);
    }

    #[test]
    fn moments_of_empty_mask_have_no_centroid() {
        assert_eq!(Moments::default().centroid(), None);
        let moments = Moments {
            m00: 3,
            m10: 10,
            m01: 5,
        };
        assert_eq!(moments.centroid(), Some((3, 1)));
    }
}
