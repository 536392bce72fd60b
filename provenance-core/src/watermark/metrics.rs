//! Image fidelity metrics reported by the embedder.

use image::RgbImage;

use crate::media::luma_plane;

/// Window side used for SSIM.
const SSIM_WINDOW: usize = 8;

/// SSIM stabilizing constants for 8-bit samples: (0.01 L)^2 and (0.03 L)^2.
const SSIM_C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const SSIM_C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Peak signal-to-noise ratio over every RGB sample, in dB.
///
/// Identical images yield `f64::INFINITY`.
pub fn psnr(original: &RgbImage, modified: &RgbImage) -> f64 {
    debug_assert_eq!(original.dimensions(), modified.dimensions());

    let samples = original.as_raw().len();
    if samples == 0 {
        return f64::INFINITY;
    }

    let squared_error: f64 = original
        .as_raw()
        .iter()
        .zip(modified.as_raw())
        .map(|(&a, &b)| {
            let diff = f64::from(a) - f64::from(b);
            diff * diff
        })
        .sum();

    let mse = squared_error / samples as f64;
    if mse == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (255.0 * 255.0 / mse).log10()
}

/// Mean structural similarity over non-overlapping 8×8 luma windows.
///
/// Images smaller than one window are compared as a single window.
pub fn ssim(original: &RgbImage, modified: &RgbImage) -> f64 {
    debug_assert_eq!(original.dimensions(), modified.dimensions());

    let width = original.width() as usize;
    let height = original.height() as usize;
    let x = luma_plane(original);
    let y = luma_plane(modified);

    let win_w = SSIM_WINDOW.min(width);
    let win_h = SSIM_WINDOW.min(height);
    if win_w == 0 || win_h == 0 {
        return 1.0;
    }

    let mut total = 0.0;
    let mut windows = 0usize;
    for top in (0..=height - win_h).step_by(win_h) {
        for left in (0..=width - win_w).step_by(win_w) {
            total += window_ssim(&x, &y, width, left, top, win_w, win_h);
            windows += 1;
        }
    }

    total / windows as f64
}

fn window_ssim(
    x: &[f64],
    y: &[f64],
    stride: usize,
    left: usize,
    top: usize,
    win_w: usize,
    win_h: usize,
) -> f64 {
    let count = (win_w * win_h) as f64;
    let coords = move || {
        (top..top + win_h)
            .flat_map(move |row| (left..left + win_w).map(move |col| row * stride + col))
    };

    let mean_x = coords().map(|i| x[i]).sum::<f64>() / count;
    let mean_y = coords().map(|i| y[i]).sum::<f64>() / count;

    let mut var_x = 0.0;
    let mut var_y = 0.0;
    let mut cov = 0.0;
    for i in coords() {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        var_x += dx * dx;
        var_y += dy * dy;
        cov += dx * dy;
    }
    var_x /= count;
    var_y /= count;
    cov /= count;

    ((2.0 * mean_x * mean_y + SSIM_C1) * (2.0 * cov + SSIM_C2))
        / ((mean_x * mean_x + mean_y * mean_y + SSIM_C1) * (var_x + var_y + SSIM_C2))
}
