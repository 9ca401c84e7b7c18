use std::io::Cursor;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use tracing::{debug, warn};

use crate::error::DecodeError;

/// A decoded, cyclic frame sequence read through a forward-only cursor
pub trait FrameSource: Send {
    /// Number of frames in the sequence, always at least 1
    fn frame_count(&self) -> usize;

    /// Frame under the cursor, then move the cursor one frame forward
    ///
    /// `None` marks a frame that could not be decoded.
    fn next_frame(&mut self) -> Option<&RgbaImage>;

    /// Move the cursor one frame forward without reading
    fn advance(&mut self);

    /// Rewind the cursor to the first frame
    fn reset(&mut self);
}

struct DecodedFrame {
    image: RgbaImage,
    delay: Duration,
}

/// Animated GIF decoded once into memory
///
/// Frames are fully composited (disposal and transparency applied) at
/// decode time, so rewinding never touches the byte source again.
pub struct GifFrameSource {
    frames: Vec<Option<DecodedFrame>>,
    cursor: usize,
}

impl GifFrameSource {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }

        let decoder = GifDecoder::new(Cursor::new(data)).map_err(|e| DecodeError::Malformed {
            reason: e.to_string(),
        })?;

        let mut frames = Vec::new();
        for (index, frame) in decoder.into_frames().enumerate() {
            match frame {
                Ok(frame) => {
                    let delay = Duration::from(frame.delay());
                    frames.push(Some(DecodedFrame {
                        image: frame.into_buffer(),
                        delay,
                    }));
                }
                Err(e) if frames.is_empty() => {
                    return Err(DecodeError::Malformed {
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    // The stream cannot be resynchronised after a bad frame
                    warn!("Frame {} of animated overlay is corrupt: {}", index, e);
                    frames.push(None);
                    break;
                }
            }
        }

        if frames.is_empty() {
            return Err(DecodeError::NoFrames);
        }

        debug!("Decoded animated source: {} frames", frames.len());
        Ok(Self { frames, cursor: 0 })
    }

    /// Intrinsic display delay of a frame, if it decoded
    pub fn frame_delay(&self, index: usize) -> Option<Duration> {
        self.frames.get(index)?.as_ref().map(|f| f.delay)
    }

    /// Total intrinsic duration of one loop
    pub fn loop_duration(&self) -> Duration {
        self.frames
            .iter()
            .flatten()
            .map(|f| f.delay)
            .sum()
    }

    /// Index the next call to `next_frame` will read
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl FrameSource for GifFrameSource {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn next_frame(&mut self) -> Option<&RgbaImage> {
        let index = self.cursor;
        self.advance();
        self.frames[index].as_ref().map(|f| &f.image)
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.frames.len();
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
pub(crate) mod test_gifs {
    use gif::{Encoder, Frame, Repeat};

    /// Solid colors, one per frame
    pub const PALETTE: [[u8; 4]; 4] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 0, 255],
    ];

    /// Encode a `width`x`height` GIF with `count` solid frames, 100 ms each
    pub fn solid_frames(count: usize, width: u16, height: u16) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = Encoder::new(&mut bytes, width, height, &[]).unwrap();
            encoder.set_repeat(Repeat::Infinite).unwrap();

            for color in PALETTE.iter().cycle().take(count) {
                let mut pixels: Vec<u8> = color
                    .iter()
                    .copied()
                    .cycle()
                    .take(width as usize * height as usize * 4)
                    .collect();
                let mut frame = Frame::from_rgba_speed(width, height, &mut pixels, 10);
                frame.delay = 10;
                encoder.write_frame(&frame).unwrap();
            }
        }
        bytes
    }
}
