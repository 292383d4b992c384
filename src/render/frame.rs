use rayon::prelude::*;

use crate::effect::Transform;
use crate::error::RecorderError;
use crate::media::VideoFrame;

/// Opaque black, shown where the shifted frame leaves the canvas uncovered.
const FILL: [u8; 4] = [0, 0, 0, 255];

/// Draws a video frame onto a fixed-size RGBA canvas under a transform.
pub struct ShakeCompositor {
    width: u32,
    height: u32,
    unpadded_bytes_per_row: usize,
    buffer: Vec<u8>,
}

impl ShakeCompositor {
    pub fn new(width: u32, height: u32) -> Self {
        let unpadded_bytes_per_row = width as usize * 4;
        Self {
            width,
            height,
            unpadded_bytes_per_row,
            buffer: vec![0; VideoFrame::byte_len(width, height)],
        }
    }

    /// Composite `frame` translated by the transform, rounded to whole pixels.
    pub fn compose(&mut self, frame: &VideoFrame, transform: Transform) -> Result<&[u8], RecorderError> {
        let expected = self.buffer.len();
        if frame.pixels.len() != expected || frame.width != self.width {
            return Err(RecorderError::FrameSize {
                expected,
                got: frame.pixels.len(),
            });
        }

        if transform.is_identity() || self.buffer.is_empty() {
            self.buffer.copy_from_slice(&frame.pixels);
            return Ok(&self.buffer);
        }

        let dx = transform.dx.round() as i64;
        let dy = transform.dy.round() as i64;
        let width = self.width as i64;
        let height = self.height as i64;
        let stride = self.unpadded_bytes_per_row;
        let src = &frame.pixels;

        self.buffer
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let src_y = y as i64 - dy;
                if src_y < 0 || src_y >= height {
                    fill(row);
                    return;
                }
                // Destination columns [x0, x1) read from [x0 - dx, x1 - dx).
                let x0 = dx.clamp(0, width);
                let x1 = (width + dx).clamp(0, width);
                if x0 >= x1 {
                    fill(row);
                    return;
                }
                let src_row = &src[src_y as usize * stride..(src_y as usize + 1) * stride];
                let (x0, x1) = (x0 as usize, x1 as usize);
                let sx0 = (x0 as i64 - dx) as usize;
                let span = x1 - x0;

                fill(&mut row[..x0 * 4]);
                row[x0 * 4..x1 * 4].copy_from_slice(&src_row[sx0 * 4..(sx0 + span) * 4]);
                fill(&mut row[x1 * 4..]);
            });

        Ok(&self.buffer)
    }
}

fn fill(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        px.copy_from_slice(&FILL);
    }
}
