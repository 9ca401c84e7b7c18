//! Translation of a [`Composition`] into one ffmpeg invocation.
//!
//! Every item becomes an input with its clipping applied as input options.
//! Effects become filter chains, sequences are concatenated, multiple video
//! sequences are stacked on a black canvas, and overlays are rendered to PNG
//! sequences that join the graph as extra inputs.

use std::path::Path;

use image::imageops::FilterType;
use image::RgbaImage;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::debug;

use crate::composition::{Composition, Effect, Layout, MediaKind, Sequence};
use crate::error::{PipelineErrorCode, PipelineFailure};
use crate::overlay::TextureOverlay;
use crate::types::{AudioMimeType, OverlaySettings, Size, VideoMimeType};

/// Overlay frames held in memory before a parallel write
const RENDER_BATCH: usize = 32;

/// Arguments for one ffmpeg run, without the binary and progress flags
#[derive(Debug, Clone)]
pub struct CommandPlan {
    pub args: Vec<String>,
    pub duration_ms: u64,
    pub has_audio: bool,
}

/// Build the ffmpeg arguments for `composition`, rendering its overlays
/// into `frames_dir`
pub fn build(
    composition: &mut Composition,
    output: &Path,
    frames_dir: &Path,
    pool: &ThreadPool,
    crf: u8,
) -> Result<CommandPlan, PipelineFailure> {
    let duration_ms = composition.duration_ms().ok_or_else(|| {
        PipelineFailure::new(
            PipelineErrorCode::InvalidComposition,
            "output duration is unknown: every video source needs an end position",
        )
    })?;
    if duration_ms == 0 {
        return Err(PipelineFailure::new(
            PipelineErrorCode::InvalidComposition,
            "output duration is zero",
        ));
    }

    let mut graph = GraphBuilder {
        input_args: Vec::new(),
        input_count: 0,
        filters: Vec::new(),
        next_label: 0,
        overlays_rendered: 0,
        fps: composition.output_frame_rate(),
        frames_dir,
        pool,
    };

    let video = graph.video(composition, duration_ms)?;
    let audio = graph.audio(composition, duration_ms);

    let mut args = graph.input_args;
    args.push("-filter_complex".to_string());
    args.push(graph.filters.join(";"));
    args.extend(["-map".to_string(), video]);

    let has_audio = audio.is_some();
    match audio {
        Some(stream) => {
            args.extend(["-map".to_string(), stream]);
            args.extend([
                "-c:a".to_string(),
                audio_encoder(composition.encoder.audio_mime_type).to_string(),
            ]);
        }
        None => args.push("-an".to_string()),
    }

    args.extend(video_encoder_args(composition.encoder.video_mime_type, crf));
    args.extend([
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        format_fps(graph.fps),
        "-t".to_string(),
        seconds(duration_ms),
        "-y".to_string(),
        output.display().to_string(),
    ]);

    Ok(CommandPlan {
        args,
        duration_ms,
        has_audio,
    })
}

struct GraphBuilder<'a> {
    input_args: Vec<String>,
    input_count: usize,
    filters: Vec<String>,
    next_label: usize,
    overlays_rendered: usize,
    fps: f32,
    frames_dir: &'a Path,
    pool: &'a ThreadPool,
}

impl GraphBuilder<'_> {
    fn add_input<I: IntoIterator<Item = String>>(&mut self, options: I, path: &Path) -> usize {
        self.input_args.extend(options);
        self.input_args.push("-i".to_string());
        self.input_args.push(path.display().to_string());
        self.input_count += 1;
        self.input_count - 1
    }

    fn label(&mut self, prefix: &str) -> String {
        self.next_label += 1;
        format!("[{}{}]", prefix, self.next_label)
    }

    /// Append `filters` to the stream `current`, returning the new label
    fn chain(&mut self, current: String, filters: Vec<String>) -> String {
        if filters.is_empty() {
            return current;
        }
        let out = self.label("f");
        self.filters.push(format!("{}{}{}", current, filters.join(","), out));
        out
    }

    fn apply_effects(
        &mut self,
        mut current: String,
        effects: &mut [Effect],
        duration_ms: u64,
    ) -> Result<String, PipelineFailure> {
        let mut pending = Vec::new();

        for effect in effects.iter_mut() {
            match effect {
                Effect::Presentation { size, layout } => {
                    pending.push(presentation_filter(*size, *layout));
                }
                Effect::FrameDrop { target_fps } => {
                    pending.push(format!("fps={}", format_fps(*target_fps)));
                }
                Effect::Overlay(effect) => {
                    current = self.chain(current, std::mem::take(&mut pending));
                    for overlay in effect.overlays.iter_mut() {
                        current = self.overlay(current, overlay.as_mut(), duration_ms)?;
                    }
                }
            }
        }

        Ok(self.chain(current, pending))
    }

    fn video(
        &mut self,
        composition: &mut Composition,
        duration_ms: u64,
    ) -> Result<String, PipelineFailure> {
        let canvas = composition.compositor.output_size;
        let mut placed: Vec<(usize, String, Size)> = Vec::new();

        for (index, sequence) in composition.sequences.iter_mut().enumerate() {
            if !sequence.has_video() {
                continue;
            }
            let (label, size) = self.video_sequence(sequence, canvas, duration_ms)?;
            placed.push((index, label, size));
        }

        let base = match placed.len() {
            0 => {
                return Err(PipelineFailure::new(
                    PipelineErrorCode::InvalidComposition,
                    "composition has no video or image source",
                ))
            }
            1 => placed.remove(0).1,
            _ => {
                let mut base = self.label("canvas");
                self.filters.push(format!(
                    "color=c=black:s={}x{}:r={}:d={}{}",
                    canvas.width,
                    canvas.height,
                    format_fps(self.fps),
                    seconds(duration_ms),
                    base
                ));

                // Input 0 is drawn last so it ends up on top
                for (index, label, size) in placed.into_iter().rev() {
                    let (x, y) = composition
                        .compositor
                        .overlay_settings(index)
                        .position(canvas, size);
                    let out = self.label("stack");
                    self.filters.push(format!(
                        "{}{}overlay=x={}:y={}:eof_action=pass{}",
                        base, label, x, y, out
                    ));
                    base = out;
                }
                base
            }
        };

        let composed = self.apply_effects(base, &mut composition.effects, duration_ms)?;
        Ok(self.chain(composed, vec!["format=yuv420p".to_string()]))
    }

    fn video_sequence(
        &mut self,
        sequence: &mut Sequence,
        canvas: Size,
        duration_ms: u64,
    ) -> Result<(String, Size), PipelineFailure> {
        let size = sequence
            .items
            .first()
            .and_then(|item| presented_size(&item.effects))
            .unwrap_or(canvas);

        let repeats = match (sequence.looping, sequence.duration_ms()) {
            (true, Some(length)) if length > 0 => duration_ms.div_ceil(length).max(1),
            _ => 1,
        };

        let mut segments = Vec::new();
        for _ in 0..repeats {
            for item in sequence.items.iter_mut() {
                let kind = item.media_item.kind();
                if kind == MediaKind::Audio {
                    continue;
                }

                let item_ms = item.duration_ms().unwrap_or(duration_ms);
                let input = match kind {
                    MediaKind::Image => {
                        let rate = item.frame_rate.map(|fps| fps as f32).unwrap_or(self.fps);
                        self.add_input(
                            [
                                "-loop".to_string(),
                                "1".to_string(),
                                "-framerate".to_string(),
                                format_fps(rate),
                                "-t".to_string(),
                                seconds(item_ms),
                            ],
                            &item.media_item.path,
                        )
                    }
                    _ => {
                        let clipping = item.media_item.clipping;
                        let mut options = Vec::new();
                        if clipping.start_ms > 0 {
                            options.extend(["-ss".to_string(), seconds(clipping.start_ms)]);
                        }
                        if let Some(length) = clipping.duration_ms() {
                            options.extend(["-t".to_string(), seconds(length)]);
                        }
                        self.add_input(options, &item.media_item.path)
                    }
                };

                let current =
                    self.apply_effects(format!("[{}:v]", input), &mut item.effects, item_ms)?;
                // concat needs identical geometry and timing on every segment
                let normalized = self.chain(
                    current,
                    vec![
                        presentation_filter(size, Layout::ScaleToFit),
                        "setsar=1".to_string(),
                        format!("fps={}", format_fps(self.fps)),
                        "format=yuv420p".to_string(),
                    ],
                );
                segments.push(normalized);
            }
        }

        let joined = if segments.len() == 1 {
            segments.remove(0)
        } else {
            let out = self.label("seq");
            self.filters.push(format!(
                "{}concat=n={}:v=1:a=0{}",
                segments.concat(),
                segments.len(),
                out
            ));
            out
        };

        let trimmed = self.chain(
            joined,
            vec![
                format!("trim=duration={}", seconds(duration_ms)),
                "setpts=PTS-STARTPTS".to_string(),
            ],
        );
        Ok((trimmed, size))
    }

    /// Pick the soundtrack: the first audio-only sequence, else the audio of
    /// a lone video in sequence 0
    fn audio(&mut self, composition: &Composition, duration_ms: u64) -> Option<String> {
        let soundtrack = composition
            .sequences
            .iter()
            .find(|sequence| !sequence.has_video() && !sequence.items.is_empty());

        if let Some(sequence) = soundtrack {
            let mut streams = Vec::new();
            for item in &sequence.items {
                let clipping = item.media_item.clipping;
                let mut options = Vec::new();
                if clipping.start_ms > 0 {
                    options.extend(["-ss".to_string(), seconds(clipping.start_ms)]);
                }
                if let Some(length) = clipping.duration_ms() {
                    options.extend(["-t".to_string(), seconds(length)]);
                }
                let input = self.add_input(options, &item.media_item.path);
                streams.push(format!("[{}:a]", input));
            }

            let joined = if streams.len() == 1 {
                streams.remove(0)
            } else {
                let out = self.label("aseq");
                self.filters.push(format!(
                    "{}concat=n={}:v=0:a=1{}",
                    streams.concat(),
                    streams.len(),
                    out
                ));
                out
            };

            return Some(self.chain(
                joined,
                vec![
                    format!("atrim=duration={}", seconds(duration_ms)),
                    "asetpts=PTS-STARTPTS".to_string(),
                ],
            ));
        }

        // Inputs are numbered in sequence order, so a lone item of
        // sequence 0 is input 0. A looping one must play exactly once.
        let first = composition.sequences.first()?;
        let plays_once = !first.looping || first.duration_ms() >= Some(duration_ms);
        match first.items.as_slice() {
            [item] if item.has_audio() && plays_once => Some("0:a?".to_string()),
            _ => None,
        }
    }

    fn overlay(
        &mut self,
        base: String,
        overlay: &mut dyn TextureOverlay,
        duration_ms: u64,
    ) -> Result<String, PipelineFailure> {
        let settings = overlay.overlay_settings(0);
        let index = self.overlays_rendered;
        self.overlays_rendered += 1;

        let input = if overlay.is_static() {
            let path = self.frames_dir.join(format!("overlay{}_still.png", index));
            let frame = texture(overlay, &settings, 0);
            frame.save(&path).map_err(|e| render_failure(&path, e))?;

            self.add_input(
                [
                    "-loop".to_string(),
                    "1".to_string(),
                    "-framerate".to_string(),
                    format_fps(self.fps),
                    "-t".to_string(),
                    seconds(duration_ms),
                ],
                &path,
            )
        } else {
            let frame_count = (duration_ms as f64 / 1000.0 * self.fps as f64).ceil() as u64;
            self.render_frames(overlay, &settings, index, frame_count)?;

            let pattern = self.frames_dir.join(format!("overlay{}_%06d.png", index));
            self.add_input(
                [
                    "-framerate".to_string(),
                    format_fps(self.fps),
                    "-start_number".to_string(),
                    "0".to_string(),
                ],
                &pattern,
            )
        };

        let (x, y) = position_expr(&settings);
        let out = self.label("ov");
        self.filters.push(format!(
            "{}[{}:v]overlay=x={}:y={}:eof_action=pass{}",
            base, input, x, y, out
        ));
        Ok(out)
    }

    /// Query `overlay` once per output frame and write every answer as PNG
    fn render_frames(
        &self,
        overlay: &mut dyn TextureOverlay,
        settings: &OverlaySettings,
        index: usize,
        frame_count: u64,
    ) -> Result<(), PipelineFailure> {
        debug!(
            "Rendering {} frames of {} overlay {} at {}fps",
            frame_count,
            overlay.name(),
            index,
            self.fps
        );

        let mut batch: Vec<(u64, RgbaImage)> = Vec::with_capacity(RENDER_BATCH);
        for n in 0..frame_count {
            let presentation_time_us = (n as f64 * 1_000_000.0 / self.fps as f64) as i64;
            batch.push((n, texture(overlay, settings, presentation_time_us)));

            if batch.len() == RENDER_BATCH {
                self.write_batch(index, &batch)?;
                batch.clear();
            }
        }

        self.write_batch(index, &batch)
    }

    fn write_batch(&self, index: usize, batch: &[(u64, RgbaImage)]) -> Result<(), PipelineFailure> {
        let dir = self.frames_dir;
        self.pool.install(|| {
            batch.par_iter().try_for_each(|(n, frame)| {
                let path = dir.join(format!("overlay{}_{:06}.png", index, n));
                frame.save(&path).map_err(|e| render_failure(&path, e))
            })
        })
    }
}

/// The overlay's bitmap at `presentation_time_us`, stretched to its texture
/// size with the settings' scale applied
fn texture(
    overlay: &mut dyn TextureOverlay,
    settings: &OverlaySettings,
    presentation_time_us: i64,
) -> RgbaImage {
    let size = settings.scaled_size(overlay.texture_size(presentation_time_us));
    let bitmap = overlay.bitmap(presentation_time_us);

    if bitmap.dimensions() == (size.width, size.height) || size.is_empty() {
        bitmap.clone()
    } else {
        image::imageops::resize(bitmap, size.width, size.height, FilterType::Triangle)
    }
}

fn render_failure(path: &Path, error: image::ImageError) -> PipelineFailure {
    PipelineFailure::new(
        PipelineErrorCode::Io,
        format!("cannot write overlay frame {}: {}", path.display(), error),
    )
}

fn presented_size(effects: &[Effect]) -> Option<Size> {
    effects.iter().rev().find_map(|effect| match effect {
        Effect::Presentation { size, .. } => Some(*size),
        _ => None,
    })
}

fn presentation_filter(size: Size, layout: Layout) -> String {
    let (w, h) = (size.width, size.height);
    match layout {
        Layout::ScaleToFit => format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
        ),
        Layout::ScaleToFitWithCrop => {
            format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}")
        }
        Layout::StretchToFit => format!("scale={w}:{h}"),
    }
}

/// Overlay filter position as expressions of the frame and overlay sizes
pub(crate) fn position_expr(settings: &OverlaySettings) -> (String, String) {
    let (bg_x, bg_y) = settings.background_frame_anchor;
    let (ov_x, ov_y) = settings.overlay_frame_anchor;

    let x = format!(
        "{:.4}*main_w-{:.4}*overlay_w",
        (bg_x.clamp(-1.0, 1.0) + 1.0) / 2.0,
        (ov_x.clamp(-1.0, 1.0) + 1.0) / 2.0
    );
    let y = format!(
        "{:.4}*main_h-{:.4}*overlay_h",
        (1.0 - bg_y.clamp(-1.0, 1.0)) / 2.0,
        (1.0 - ov_y.clamp(-1.0, 1.0)) / 2.0
    );
    (x, y)
}

fn video_encoder_args(mime: VideoMimeType, crf: u8) -> Vec<String> {
    let mut args = vec!["-c:v".to_string()];
    match mime {
        VideoMimeType::H264 => {
            args.extend(["libx264".to_string(), "-crf".to_string(), crf.to_string()])
        }
        VideoMimeType::H265 => {
            args.extend(["libx265".to_string(), "-crf".to_string(), crf.to_string()])
        }
        VideoMimeType::Vp9 => args.extend([
            "libvpx-vp9".to_string(),
            "-crf".to_string(),
            crf.to_string(),
            "-b:v".to_string(),
            "0".to_string(),
        ]),
    }
    args
}

fn audio_encoder(mime: AudioMimeType) -> &'static str {
    match mime {
        AudioMimeType::Aac => "aac",
        AudioMimeType::Opus => "libopus",
    }
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

fn format_fps(fps: f32) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u32)
    } else {
        format!("{:.3}", fps)
    }
}
