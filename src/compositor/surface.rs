//! Output surface
//!
//! A fixed-size RGBA pixel buffer that the compositor draws into and the
//! track adapter samples from. All pixel access goes through one lock so
//! draws and samples never overlap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::policy::CropRegion;
use crate::source::SourceFrame;

pub struct Surface {
    width: u32,
    height: u32,
    pixels: Mutex<Vec<u8>>,
    generation: AtomicU64,
}

impl Surface {
    /// Create a surface sized exactly to the policy's target dimensions
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            pixels: Mutex::new(vec![0u8; (width as usize) * (height as usize) * 4]),
            generation: AtomicU64::new(0),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of draws performed since creation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Draw `src` of the frame onto the whole surface, scaling with
    /// nearest-neighbor sampling. Cropping and rescaling are the same
    /// operation with different source rectangles.
    pub fn draw_frame(&self, frame: &SourceFrame, src: CropRegion) {
        if frame.data.len() != frame.expected_len() {
            tracing::warn!(
                "frame size mismatch: got {} bytes, expected {} ({}x{}x4 RGBA), skipping draw",
                frame.data.len(),
                frame.expected_len(),
                frame.width,
                frame.height
            );
            return;
        }
        if src.width == 0 || src.height == 0 {
            return;
        }

        let mut pixels = self.pixels.lock();

        for dy in 0..self.height {
            // Nearest-neighbor source row
            let sy = src.top + (dy as f64 * src.height as f64 / self.height as f64) as u32;
            let sy = sy.min(frame.height.saturating_sub(1));

            for dx in 0..self.width {
                let sx = src.left + (dx as f64 * src.width as f64 / self.width as f64) as u32;
                let sx = sx.min(frame.width.saturating_sub(1));

                let src_idx = ((sy * frame.width + sx) * 4) as usize;
                let dst_idx = ((dy * self.width + dx) * 4) as usize;

                if src_idx + 4 > frame.data.len() || dst_idx + 4 > pixels.len() {
                    continue;
                }

                pixels[dst_idx..dst_idx + 4].copy_from_slice(&frame.data[src_idx..src_idx + 4]);
            }
        }

        drop(pixels);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Copy of the current pixel buffer
    pub fn snapshot(&self) -> Vec<u8> {
        self.pixels.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a frame whose pixel at (x, y) is [x, y, 0, 255]
    fn coordinate_frame(width: u32, height: u32) -> SourceFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        SourceFrame {
            width,
            height,
            data: Arc::new(data),
            timestamp_ms: 0.0,
        }
    }

    fn pixel(buf: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * width + x) * 4) as usize;
        [buf[idx], buf[idx + 1], buf[idx + 2], buf[idx + 3]]
    }

    #[test]
    fn test_crop_copies_subrectangle() {
        let surface = Surface::new(2, 2);
        let frame = coordinate_frame(8, 8);

        surface.draw_frame(&frame, CropRegion::new(3, 4, 2, 2));

        let buf = surface.snapshot();
        assert_eq!(pixel(&buf, 2, 0, 0), [3, 4, 0, 255]);
        assert_eq!(pixel(&buf, 2, 1, 0), [4, 4, 0, 255]);
        assert_eq!(pixel(&buf, 2, 0, 1), [3, 5, 0, 255]);
        assert_eq!(pixel(&buf, 2, 1, 1), [4, 5, 0, 255]);
    }

    #[test]
    fn test_rescale_nearest_neighbor() {
        // 2x2 source doubled to 4x4: each source pixel becomes a 2x2 block
        let surface = Surface::new(4, 4);
        let frame = coordinate_frame(2, 2);

        surface.draw_frame(&frame, CropRegion::full(2, 2));

        let buf = surface.snapshot();
        assert_eq!(pixel(&buf, 4, 0, 0), [0, 0, 0, 255]);
        assert_eq!(pixel(&buf, 4, 1, 1), [0, 0, 0, 255]);
        assert_eq!(pixel(&buf, 4, 2, 0), [1, 0, 0, 255]);
        assert_eq!(pixel(&buf, 4, 3, 3), [1, 1, 0, 255]);
    }

    #[test]
    fn test_generation_counts_draws() {
        let surface = Surface::new(2, 2);
        let frame = coordinate_frame(4, 4);
        assert_eq!(surface.generation(), 0);

        surface.draw_frame(&frame, CropRegion::full(4, 4));
        surface.draw_frame(&frame, CropRegion::full(4, 4));
        assert_eq!(surface.generation(), 2);
    }

    #[test]
    fn test_undersized_frame_is_skipped() {
        let surface = Surface::new(2, 2);
        let bogus = SourceFrame {
            width: 8,
            height: 8,
            data: Arc::new(vec![0u8; 16]),
            timestamp_ms: 0.0,
        };

        surface.draw_frame(&bogus, CropRegion::full(8, 8));
        assert_eq!(surface.generation(), 0);
    }
}
