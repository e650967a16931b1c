//! Pixel compositing for overlays and transitions

use image::{Rgba, RgbaImage};

fn mul_div255(a: u16, b: u16) -> u16 {
    (a * b + 127) / 255
}

/// Blends a straight-alpha pixel over another, scaling the source alpha by `opacity`
pub fn blend_over(dst: Rgba<u8>, src: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let opacity = opacity.clamp(0.0, 1.0);
    let op = (opacity * 255.0).round() as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let da = mul_div255(u16::from(dst[3]), 255 - sa);
    let out_a = sa + da;
    if out_a == 0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = (u32::from(src[i]) * u32::from(sa) + u32::from(dst[i]) * u32::from(da)) / u32::from(out_a);
        out[i] = c.min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    Rgba(out)
}

/// Overlays one image onto another at the specified position
pub fn overlay_image(base: &mut RgbaImage, overlay: &RgbaImage, x: i32, y: i32) {
    overlay_with_opacity(base, overlay, x, y, 1.0);
}

fn overlay_with_opacity(base: &mut RgbaImage, overlay: &RgbaImage, x: i32, y: i32, opacity: f32) {
    let base_width = base.width() as i32;
    let base_height = base.height() as i32;
    let overlay_width = overlay.width() as i32;
    let overlay_height = overlay.height() as i32;

    // Calculate the region to copy
    let src_x_start = 0.max(-x);
    let src_y_start = 0.max(-y);
    let src_x_end = overlay_width.min(base_width - x);
    let src_y_end = overlay_height.min(base_height - y);

    if src_x_start >= src_x_end || src_y_start >= src_y_end {
        return;
    }

    for src_y in src_y_start..src_y_end {
        for src_x in src_x_start..src_x_end {
            let dest_x = (x + src_x) as u32;
            let dest_y = (y + src_y) as u32;

            let overlay_pixel = *overlay.get_pixel(src_x as u32, src_y as u32);
            let base_pixel = *base.get_pixel(dest_x, dest_y);
            base.put_pixel(dest_x, dest_y, blend_over(base_pixel, overlay_pixel, opacity));
        }
    }
}

/// Draws `to` over `from` at opacity `t`, producing a frame the size of `from`
pub fn crossfade(from: &RgbaImage, to: &RgbaImage, t: f32) -> RgbaImage {
    let mut out = from.clone();
    overlay_with_opacity(&mut out, to, 0, 0, t);
    out
}

/// Draws `to` over `from` shifted horizontally by `offset` pixels at opacity `t`.
///
/// A positive offset places `to` to the right of its final position.
pub fn slide(from: &RgbaImage, to: &RgbaImage, offset: i32, t: f32) -> RgbaImage {
    let mut out = from.clone();
    overlay_with_opacity(&mut out, to, offset, 0, t);
    out
}

/// Composites `overlay` over `base` only where `mask` is set.
///
/// The mask is indexed in `base` coordinates; positions outside it are skipped.
pub fn composite_masked(base: &mut RgbaImage, overlay: &RgbaImage, mask: &[bool]) {
    let width = base.width().min(overlay.width());
    let height = base.height().min(overlay.height());
    let stride = base.width() as usize;

    for y in 0..height {
        for x in 0..width {
            let selected = mask
                .get(y as usize * stride + x as usize)
                .copied()
                .unwrap_or(false);
            if selected {
                let blended = blend_over(*base.get_pixel(x, y), *overlay.get_pixel(x, y), 1.0);
                base.put_pixel(x, y, blended);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    #[test]
    fn test_blend_over_extremes() {
        assert_eq!(blend_over(RED, BLUE, 0.0), RED);
        assert_eq!(blend_over(RED, BLUE, 1.0), BLUE);
        assert_eq!(blend_over(RED, Rgba([0, 0, 255, 0]), 1.0), RED);
    }

    #[test]
    fn test_blend_over_half() {
        let out = blend_over(RED, BLUE, 0.5);
        assert_eq!(out[3], 255);
        assert!(out[0] > 120 && out[0] < 135);
        assert!(out[2] > 120 && out[2] < 135);
    }

    #[test]
    fn test_overlay_clips_to_base() {
        let mut base = RgbaImage::from_pixel(4, 4, RED);
        let overlay = RgbaImage::from_pixel(4, 4, BLUE);
        overlay_image(&mut base, &overlay, 2, -2);

        assert_eq!(*base.get_pixel(3, 0), BLUE);
        assert_eq!(*base.get_pixel(3, 1), BLUE);
        assert_eq!(*base.get_pixel(1, 0), RED);
        assert_eq!(*base.get_pixel(3, 2), RED);
    }

    #[test]
    fn test_crossfade_moves_towards_target() {
        let from = RgbaImage::from_pixel(2, 2, RED);
        let to = RgbaImage::from_pixel(2, 2, BLUE);

        let first = crossfade(&from, &to, 1.0 / 3.0);
        let second = crossfade(&from, &to, 2.0 / 3.0);
        assert!(first.get_pixel(0, 0)[2] < second.get_pixel(0, 0)[2]);
        assert!(first.get_pixel(0, 0)[0] > second.get_pixel(0, 0)[0]);
    }

    #[test]
    fn test_slide_offsets_target() {
        let from = RgbaImage::from_pixel(4, 1, RED);
        let to = RgbaImage::from_pixel(4, 1, BLUE);
        let out = slide(&from, &to, 2, 1.0);

        assert_eq!(*out.get_pixel(1, 0), RED);
        assert_eq!(*out.get_pixel(2, 0), BLUE);
    }

    #[test]
    fn test_masked_composite() {
        let mut base = RgbaImage::from_pixel(2, 1, RED);
        let overlay = RgbaImage::from_pixel(2, 1, BLUE);
        composite_masked(&mut base, &overlay, &[false, true]);

        assert_eq!(*base.get_pixel(0, 0), RED);
        assert_eq!(*base.get_pixel(1, 0), BLUE);
    }
}
