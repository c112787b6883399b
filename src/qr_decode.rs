/// Slip image pre-processing and QR decoding via rqrr.
///
/// Bank slips arrive as phone photos or screenshots of wildly varying size
/// and contrast. Everything below works on flat greyscale buffers:
///
/// - **Greyscale + normalize** → stretch luminance to the full [0, 255] range
/// - **Two contrast boosts** (0.5, then 0.7) → low-contrast slips often fail one pass
/// - **Resize variants** → original, 800×600, 1200×900, 600×600 (near-square decodes best)
/// - **Both polarities** → raw and inverted, greyscale and Otsu-binarized
///
/// Variants are produced lazily and tried in order; the first accepted
/// payload wins and the remaining variants are never built.
use std::fmt;

use image::imageops::FilterType;
use image::GrayImage;
use rqrr::PreparedImage;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::pipeline::Checkpoint;

// ── Resize variants ────────────────────────────────────────────────

/// One candidate raster size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum ResizeVariant {
    /// Keep the decoded image dimensions.
    Original,
    Fixed { width: u32, height: u32 },
}

impl ResizeVariant {
    pub fn defaults() -> Vec<ResizeVariant> {
        vec![
            ResizeVariant::Original,
            ResizeVariant::Fixed { width: 800, height: 600 },
            ResizeVariant::Fixed { width: 1200, height: 900 },
            ResizeVariant::Fixed { width: 600, height: 600 },
        ]
    }
}

impl fmt::Display for ResizeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeVariant::Original => write!(f, "original"),
            ResizeVariant::Fixed { width, height } => write!(f, "{}x{}", width, height),
        }
    }
}

impl TryFrom<String> for ResizeVariant {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let s = s.trim().to_ascii_lowercase();
        if s == "original" {
            return Ok(ResizeVariant::Original);
        }
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("resize variant {:?} is not \"original\" or WxH", s))?;
        let width: u32 = w.parse().map_err(|_| format!("bad width in {:?}", s))?;
        let height: u32 = h.parse().map_err(|_| format!("bad height in {:?}", s))?;
        if width == 0 || height == 0 {
            return Err(format!("resize variant {:?} has a zero dimension", s));
        }
        Ok(ResizeVariant::Fixed { width, height })
    }
}

// ── Pre-processing ─────────────────────────────────────────────────

/// A slip image after greyscale, normalization and contrast enhancement.
pub struct PreparedSlip {
    grey: GrayImage,
}

/// One raster handed to the decoder.
pub struct Candidate {
    pub variant: ResizeVariant,
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

/// Decode raw image bytes (PNG/JPEG/GIF) and enhance them for QR detection.
///
/// # Errors
/// `VerifyError::ImageLoad` if the bytes are not a readable image.
pub fn prepare(bytes: &[u8]) -> Result<PreparedSlip> {
    let img = image::load_from_memory(bytes)?;
    let mut grey = img.to_luma8();
    debug!(width = grey.width(), height = grey.height(), "slip image loaded");

    let stretched = contrast_stretch(grey.as_raw());
    let boosted = boost_contrast(&boost_contrast(&stretched, 0.5), 0.7);
    grey.copy_from_slice(&boosted);

    Ok(PreparedSlip { grey })
}

impl PreparedSlip {
    pub fn from_grey(grey: GrayImage) -> Self {
        Self { grey }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.grey.dimensions()
    }

    /// Lazily build one candidate raster per variant, in order.
    pub fn variants<'a>(&'a self, sizes: &'a [ResizeVariant]) -> impl Iterator<Item = Candidate> + 'a {
        sizes.iter().map(move |&variant| self.render(variant))
    }

    fn render(&self, variant: ResizeVariant) -> Candidate {
        let img = match variant {
            ResizeVariant::Original => self.grey.clone(),
            ResizeVariant::Fixed { width, height } => {
                image::imageops::resize(&self.grey, width, height, FilterType::CatmullRom)
            }
        };
        let (w, h) = img.dimensions();
        Candidate {
            variant,
            width: w as usize,
            height: h as usize,
            pixels: img.into_raw(),
        }
    }
}

/// Convert RGBA pixel buffer to greyscale using standard luminance weights.
pub fn rgba_to_greyscale(rgba: &[u8], width: usize, height: usize) -> Vec<u8> {
    let len = width * height;
    let mut grey = Vec::with_capacity(len);
    for i in 0..len {
        let base = i * 4;
        let r = rgba[base] as u32;
        let g = rgba[base + 1] as u32;
        let b = rgba[base + 2] as u32;
        // ITU-R BT.601 luminance: (77R + 150G + 29B) >> 8
        grey.push(((77 * r + 150 * g + 29 * b) >> 8) as u8);
    }
    grey
}

/// Stretch pixel values to fill the full [0, 255] range.
fn contrast_stretch(grey: &[u8]) -> Vec<u8> {
    let (Some(&lo), Some(&hi)) = (grey.iter().min(), grey.iter().max()) else {
        return Vec::new();
    };

    let range = hi - lo;
    if range == 0 {
        return grey.to_vec();
    }

    grey.iter()
        .map(|&p| ((((p - lo) as u32) * 255) / (range as u32)).min(255) as u8)
        .collect()
}

/// Push pixels away from mid-grey. `amount` is in (-1, 1); 0 is a no-op.
///
/// Standard contrast curve: `factor = (1 + c) / (1 - c)`,
/// `p' = factor * (p - 127) + 127`, clamped.
fn boost_contrast(grey: &[u8], amount: f32) -> Vec<u8> {
    let amount = amount.clamp(-0.99, 0.99);
    let factor = (1.0 + amount) / (1.0 - amount);
    grey.iter()
        .map(|&p| (factor * (p as f32 - 127.0) + 127.0).floor().clamp(0.0, 255.0) as u8)
        .collect()
}

fn invert(grey: &[u8]) -> Vec<u8> {
    grey.iter().map(|&p| 255 - p).collect()
}

/// Compute Otsu's threshold: the global binarization threshold that
/// maximizes between-class variance.
fn otsu_threshold(grey: &[u8]) -> u8 {
    let mut hist = [0u32; 256];
    for &p in grey {
        hist[p as usize] += 1;
    }

    let total = grey.len() as f64;
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut best_threshold = 0u8;
    let mut best_variance = 0.0f64;
    let mut weight_bg = 0.0f64;
    let mut sum_bg = 0.0f64;

    for (t, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }

        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;

        let between = weight_bg * weight_fg * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if between > best_variance {
            best_variance = between;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

// ── Decoder adapter ────────────────────────────────────────────────

/// Anything that can turn a greyscale raster into a QR payload.
pub trait QrDecoder {
    fn decode(&self, pixels: &[u8], width: usize, height: usize) -> Option<String>;
}

impl<D: QrDecoder + ?Sized> QrDecoder for &D {
    fn decode(&self, pixels: &[u8], width: usize, height: usize) -> Option<String> {
        (**self).decode(pixels, width, height)
    }
}

/// rqrr-backed decoder. Tries the raster as-is, inverted, and Otsu-binarized
/// in both polarities, since slip photos come in either polarity.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode(&self, pixels: &[u8], width: usize, height: usize) -> Option<String> {
        if width == 0 || height == 0 || pixels.len() < width * height {
            return None;
        }
        if let Some(text) = try_decode_greyscale(pixels, width, height) {
            return Some(text);
        }
        let inverted = invert(pixels);
        if let Some(text) = try_decode_greyscale(&inverted, width, height) {
            return Some(text);
        }
        let threshold = otsu_threshold(pixels);
        try_decode_bitmap(pixels, width, height, threshold, false)
            .or_else(|| try_decode_bitmap(pixels, width, height, threshold, true))
    }
}

fn try_decode_greyscale(grey: &[u8], w: usize, h: usize) -> Option<String> {
    let mut img = PreparedImage::prepare_from_greyscale(w, h, |x, y| grey[y * w + x]);
    let grids = img.detect_grids();
    grids
        .first()
        .and_then(|g| g.decode().ok())
        .map(|(_, content)| content)
}

/// Decode a fixed-threshold bitmap. `inverted` treats light pixels as modules.
fn try_decode_bitmap(grey: &[u8], w: usize, h: usize, threshold: u8, inverted: bool) -> Option<String> {
    let mut img =
        PreparedImage::prepare_from_bitmap(w, h, |x, y| (grey[y * w + x] < threshold) != inverted);
    let grids = img.detect_grids();
    grids
        .first()
        .and_then(|g| g.decode().ok())
        .map(|(_, content)| content)
}

// ── Payload gate ───────────────────────────────────────────────────

/// EMVCo payloads open with tag `00` and a 2-digit length: four ASCII digits.
pub fn is_emvco_shaped(payload: &str) -> bool {
    payload.len() >= 4 && payload.as_bytes()[..4].iter().all(u8::is_ascii_digit)
}

/// Decide whether a decoded string is worth handing to the extractor.
pub fn accept_payload(payload: &str, emvco_only: bool) -> bool {
    if payload.is_empty() {
        return false;
    }
    is_emvco_shaped(payload) || !emvco_only
}

/// A decoded payload and the variant that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHit {
    pub payload: String,
    pub variant: ResizeVariant,
}

/// Try each variant in order and stop at the first accepted payload.
///
/// `Ok(None)` means no variant produced an accepted payload.
///
/// # Errors
/// `TimedOut` / `Cancelled` when the checkpoint trips between variants.
pub fn scan_slip<D: QrDecoder + ?Sized>(
    slip: &PreparedSlip,
    sizes: &[ResizeVariant],
    decoder: &D,
    emvco_only: bool,
    checkpoint: &Checkpoint,
) -> Result<Option<ScanHit>> {
    for candidate in slip.variants(sizes) {
        checkpoint.check()?;
        let Some(payload) = decoder.decode(&candidate.pixels, candidate.width, candidate.height)
        else {
            debug!(variant = %candidate.variant, "no QR code at this size");
            continue;
        };

        if accept_payload(&payload, emvco_only) {
            info!(variant = %candidate.variant, "read QR code");
            debug!(payload = %excerpt(&payload, 100), "QR data");
            if !is_emvco_shaped(&payload) {
                warn!(variant = %candidate.variant, "QR payload is not EMVCo, using fallback formats");
            }
            return Ok(Some(ScanHit { payload, variant: candidate.variant }));
        }
        warn!(variant = %candidate.variant, "rejected non-EMVCo QR payload");
    }

    warn!("no valid QR code found in slip image");
    Ok(None)
}

/// Load, enhance and scan in one call.
pub fn read_qr<D: QrDecoder + ?Sized>(
    bytes: &[u8],
    sizes: &[ResizeVariant],
    decoder: &D,
    emvco_only: bool,
    checkpoint: &Checkpoint,
) -> Result<Option<ScanHit>> {
    let slip = prepare(bytes)?;
    scan_slip(&slip, sizes, decoder, emvco_only, checkpoint)
}

/// First `max` characters of `s`, with `...` appended when cut.
pub fn excerpt(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerifyError;
    use image::{DynamicImage, ImageOutputFormat, Luma};
    use std::cell::{Cell, RefCell};
    use std::io::Cursor;

    fn png_bytes(img: GrayImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    /// Fails until call number `succeed_on` (1-based), then returns `payload`.
    struct CountingDecoder {
        calls: Cell<usize>,
        succeed_on: usize,
        payload: String,
        sizes_seen: RefCell<Vec<(usize, usize)>>,
    }

    impl CountingDecoder {
        fn new(succeed_on: usize, payload: &str) -> Self {
            Self {
                calls: Cell::new(0),
                succeed_on,
                payload: payload.to_string(),
                sizes_seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl QrDecoder for CountingDecoder {
        fn decode(&self, _pixels: &[u8], width: usize, height: usize) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            self.sizes_seen.borrow_mut().push((width, height));
            (self.calls.get() == self.succeed_on).then(|| self.payload.clone())
        }
    }

    // -- resize variants --

    #[test]
    fn variant_parse_forms() {
        assert_eq!(ResizeVariant::try_from("original".to_string()), Ok(ResizeVariant::Original));
        assert_eq!(
            ResizeVariant::try_from(" 800X600 ".to_string()),
            Ok(ResizeVariant::Fixed { width: 800, height: 600 })
        );
        assert!(ResizeVariant::try_from("0x10".to_string()).is_err());
        assert!(ResizeVariant::try_from("wide".to_string()).is_err());
    }

    #[test]
    fn variant_display_round_trips() {
        for v in ResizeVariant::defaults() {
            assert_eq!(ResizeVariant::try_from(v.to_string()), Ok(v));
        }
    }

    // -- enhancement --

    #[test]
    fn contrast_stretch_expands_range() {
        let stretched = contrast_stretch(&[50, 100, 150, 200]);
        assert_eq!(stretched[0], 0);
        assert_eq!(stretched[3], 255);
        assert!(stretched[1] > 0 && stretched[1] < stretched[2]);
    }

    #[test]
    fn contrast_stretch_uniform_noop() {
        assert_eq!(contrast_stretch(&[100, 100, 100]), vec![100, 100, 100]);
        assert!(contrast_stretch(&[]).is_empty());
    }

    #[test]
    fn boost_contrast_pushes_from_midpoint() {
        let out = boost_contrast(&[100, 127, 160], 0.5);
        assert!(out[0] < 100);
        assert_eq!(out[1], 127);
        assert!(out[2] > 160);
    }

    #[test]
    fn boost_contrast_clamps() {
        assert_eq!(boost_contrast(&[0, 255], 0.7), vec![0, 255]);
    }

    #[test]
    fn rgba_to_greyscale_uniform_grey() {
        let grey = rgba_to_greyscale(&[128, 128, 128, 255, 0, 0, 0, 255], 2, 1);
        assert_eq!(grey, vec![128, 0]);
    }

    #[test]
    fn otsu_threshold_bimodal() {
        let mut grey: Vec<u8> = (0..50).collect();
        grey.extend((0..50).map(|i| 200 + (i % 56) as u8));
        let t = otsu_threshold(&grey);
        assert!((49..200).contains(&t), "otsu threshold was {}", t);
    }

    // -- prepare --

    #[test]
    fn prepare_rejects_garbage() {
        let err = prepare(b"definitely not an image").err().unwrap();
        assert!(matches!(err, VerifyError::ImageLoad(_)));
    }

    #[test]
    fn prepare_keeps_dimensions() {
        let img = GrayImage::from_fn(37, 21, |x, _| Luma([(x * 5) as u8]));
        let slip = prepare(&png_bytes(img)).unwrap();
        assert_eq!(slip.dimensions(), (37, 21));
    }

    #[test]
    fn variants_follow_configured_order() {
        let slip = PreparedSlip::from_grey(GrayImage::from_pixel(50, 40, Luma([255])));
        let dims: Vec<(usize, usize)> = slip
            .variants(&ResizeVariant::defaults())
            .map(|c| (c.width, c.height))
            .collect();
        assert_eq!(dims, vec![(50, 40), (800, 600), (1200, 900), (600, 600)]);
    }

    // -- gate --

    #[test]
    fn emvco_shape_requires_four_digits() {
        assert!(is_emvco_shaped("000201010211"));
        assert!(!is_emvco_shaped("000"));
        assert!(!is_emvco_shaped("https://promptpay.io/x"));
        assert!(!is_emvco_shaped("{\"amount\":1}"));
    }

    #[test]
    fn accept_payload_modes() {
        assert!(accept_payload("00020101", true));
        assert!(accept_payload("{\"amount\":250}", false));
        assert!(!accept_payload("{\"amount\":250}", true));
        assert!(!accept_payload("", false));
    }

    // -- scanning --

    #[test]
    fn scan_short_circuits_on_first_success() {
        let slip = PreparedSlip::from_grey(GrayImage::from_pixel(20, 10, Luma([255])));
        let decoder = CountingDecoder::new(2, "0002010102115406100.00");
        let hit = scan_slip(&slip, &ResizeVariant::defaults(), &decoder, false, &Checkpoint::none())
            .unwrap()
            .unwrap();
        assert_eq!(decoder.calls.get(), 2);
        assert_eq!(hit.variant, ResizeVariant::Fixed { width: 800, height: 600 });
        assert_eq!(*decoder.sizes_seen.borrow(), vec![(20, 10), (800, 600)]);
    }

    #[test]
    fn scan_skips_rejected_payloads_in_strict_mode() {
        let slip = PreparedSlip::from_grey(GrayImage::from_pixel(8, 8, Luma([255])));
        let decoder = CountingDecoder::new(1, "https://example.com/promo");
        let hit = scan_slip(&slip, &ResizeVariant::defaults(), &decoder, true, &Checkpoint::none())
            .unwrap();
        assert!(hit.is_none());
        assert_eq!(decoder.calls.get(), 4);
    }

    #[test]
    fn scan_blank_image_finds_nothing() {
        let slip = PreparedSlip::from_grey(GrayImage::from_pixel(64, 64, Luma([255])));
        let sizes = [ResizeVariant::Original, ResizeVariant::Fixed { width: 32, height: 32 }];
        let hit = scan_slip(&slip, &sizes, &RqrrDecoder, false, &Checkpoint::none()).unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn rqrr_decoder_rejects_short_buffer() {
        assert!(RqrrDecoder.decode(&[0; 10], 100, 100).is_none());
        assert!(RqrrDecoder.decode(&[], 0, 0).is_none());
    }

    #[test]
    fn excerpt_cuts_on_char_boundary() {
        assert_eq!(excerpt("สวัสดีครับ", 3), "สวั...");
        assert_eq!(excerpt("short", 10), "short");
    }
}
