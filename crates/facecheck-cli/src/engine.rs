//! Live match loop.
//!
//! One thread reads a frame, runs detection and encoding on every Kth frame,
//! compares the results against the reference, draws feedback and polls for
//! quit. `Scanning` moves to `Matched` at most once; after a match the loop
//! keeps running for a grace period so the result stays on screen.

use crate::config::Config;
use crate::display::DisplayError;
use crate::overlay;
use facecheck_core::{
    BoundingBox, DetectorError, Embedding, FaceComparator, FaceEncoder, FaceLocator,
    RecognizerError, ReferenceEncoding,
};
use facecheck_hw::{Camera, CameraError, Frame};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::borrow::Cow;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Capture(#[from] CameraError),
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("face encoding failed: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("display failed: {0}")]
    Display(#[from] DisplayError),
    #[error("encoder returned {embeddings} embeddings for {faces} faces")]
    EncodingMismatch { faces: usize, embeddings: usize },
}

/// Where frames come from.
pub trait FrameSource {
    fn read(&mut self) -> Result<Frame, CameraError>;

    /// Stop capturing. Called exactly once, on every exit path.
    fn release(&mut self);
}

impl FrameSource for Camera {
    fn read(&mut self) -> Result<Frame, CameraError> {
        self.read_frame()
    }

    fn release(&mut self) {
        Camera::release(self);
    }
}

/// Where annotated frames go, and where quit requests come from.
pub trait DisplaySink {
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;

    /// Wait up to `timeout` for a quit request. Returns `true` if one arrived.
    fn poll_quit(&mut self, timeout: Duration) -> Result<bool, DisplayError>;

    fn close(&mut self);
}

impl<D: DisplaySink + ?Sized> DisplaySink for Box<D> {
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        (**self).present(frame)
    }

    fn poll_quit(&mut self, timeout: Duration) -> Result<bool, DisplayError> {
        (**self).poll_quit(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Tuning for one run of the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub scale: f32,
    pub sample_interval: u64,
    pub grace: Duration,
    pub scan_overlay: bool,
    pub scan_step: u32,
    pub face_poll: Duration,
    pub idle_poll: Duration,
}

impl From<&Config> for LoopConfig {
    fn from(config: &Config) -> Self {
        Self {
            scale: config.scale,
            sample_interval: config.sample_interval,
            grace: config.grace,
            scan_overlay: config.scan_overlay,
            scan_step: config.scan_step,
            face_poll: config.face_poll,
            idle_poll: config.idle_poll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Scanning,
    /// `at` is the loop time of the first match.
    Matched { at: Duration },
}

/// Oscillating scan indicator. `y` stays in `[0, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLine {
    pub y: u32,
    /// `1` moving down, `-1` moving up.
    pub direction: i8,
    pub step: u32,
}

impl ScanLine {
    pub fn new(step: u32) -> Self {
        Self { y: 0, direction: 1, step }
    }

    /// Move one step, reversing when an edge is reached.
    pub fn advance(&mut self, height: u32) {
        let next = self.y as i64 + self.direction as i64 * self.step as i64;
        if next >= height as i64 {
            self.y = height;
            self.direction = -1;
        } else if next <= 0 {
            self.y = 0;
            self.direction = 1;
        } else {
            self.y = next as u32;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopState {
    pub match_state: MatchState,
    pub frame_count: u64,
    /// Time since the loop started, sampled at the top of each iteration.
    pub elapsed: Duration,
    pub scan: ScanLine,
}

impl LoopState {
    pub fn new(scan_step: u32) -> Self {
        Self {
            match_state: MatchState::Scanning,
            frame_count: 0,
            elapsed: Duration::ZERO,
            scan: ScanLine::new(scan_step),
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self.match_state, MatchState::Matched { .. })
    }

    /// First call moves to `Matched`; later calls change nothing.
    pub fn record_match(&mut self) {
        if self.match_state == MatchState::Scanning {
            self.match_state = MatchState::Matched { at: self.elapsed };
        }
    }

    pub fn grace_elapsed(&self, grace: Duration) -> bool {
        match self.match_state {
            MatchState::Scanning => false,
            MatchState::Matched { at } => self.elapsed.saturating_sub(at) >= grace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    MatchGraceElapsed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub exit: LoopExit,
    pub state: LoopState,
}

/// The live loop with its collaborators.
pub struct Engine<L, E, C> {
    locator: L,
    encoder: E,
    comparator: C,
    reference: ReferenceEncoding,
    config: LoopConfig,
}

impl<L, E, C> Engine<L, E, C>
where
    L: FaceLocator,
    E: FaceEncoder,
    C: FaceComparator,
{
    pub fn new(
        locator: L,
        encoder: E,
        comparator: C,
        reference: ReferenceEncoding,
        config: LoopConfig,
    ) -> Self {
        Self {
            locator,
            encoder,
            comparator,
            reference,
            config,
        }
    }

    /// Run until quit or until a match's grace period has passed.
    ///
    /// Does not release `source` or close `display`; see [`run_session`].
    pub fn run<S, D, K>(
        &mut self,
        source: &mut S,
        display: &mut D,
        clock: &K,
    ) -> Result<LoopOutcome, EngineError>
    where
        S: FrameSource + ?Sized,
        D: DisplaySink + ?Sized,
        K: Clock + ?Sized,
    {
        let start = clock.now();
        let mut state = LoopState::new(self.config.scan_step);
        let interval = self.config.sample_interval.max(1);

        loop {
            let captured = source.read()?;
            state.frame_count += 1;
            state.elapsed = clock.now().saturating_duration_since(start);
            tracing::trace!(
                frame = state.frame_count,
                sequence = captured.sequence,
                age_us = captured.timestamp.elapsed().as_micros() as u64,
                "frame read"
            );
            let mut frame = captured.image;

            let detections = if state.frame_count % interval == 0 {
                self.detect(&frame)?
            } else {
                Vec::new()
            };

            let inverse = 1.0 / self.config.scale;
            for (face, embedding) in &detections {
                let matched = self.comparator.matches(self.reference.embedding(), embedding);
                let color = if matched {
                    if !state.is_matched() {
                        tracing::info!(
                            frame = state.frame_count,
                            elapsed_ms = state.elapsed.as_millis() as u64,
                            "face matched"
                        );
                    }
                    state.record_match();
                    overlay::MATCH_COLOR
                } else {
                    tracing::debug!(frame = state.frame_count, "face not matched");
                    overlay::NO_MATCH_COLOR
                };
                overlay::face_box(&mut frame, &face.scaled(inverse), color);
            }

            match state.match_state {
                MatchState::Scanning => {
                    if self.config.scan_overlay {
                        overlay::scan_line(&mut frame, state.scan.y);
                        state.scan.advance(frame.height());
                    }
                    overlay::status_text(
                        &mut frame,
                        overlay::SCANNING_TEXT,
                        overlay::SCANNING_TEXT_COLOR,
                    );
                }
                MatchState::Matched { .. } => {
                    overlay::status_text(&mut frame, overlay::MATCHED_TEXT, overlay::MATCH_COLOR);
                }
            }

            display.present(&frame)?;

            let timeout = if detections.is_empty() {
                self.config.idle_poll
            } else {
                self.config.face_poll
            };
            if display.poll_quit(timeout)? {
                tracing::info!(frames = state.frame_count, "quit requested");
                return Ok(LoopOutcome {
                    exit: LoopExit::Quit,
                    state,
                });
            }
            if state.grace_elapsed(self.config.grace) {
                tracing::info!(frames = state.frame_count, "match grace period elapsed");
                return Ok(LoopOutcome {
                    exit: LoopExit::MatchGraceElapsed,
                    state,
                });
            }
        }
    }

    /// Locate and encode faces on a downscaled copy of `frame`.
    ///
    /// Boxes come back in working-copy coordinates.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<(BoundingBox, Embedding)>, EngineError> {
        let working = working_copy(frame, self.config.scale);
        let faces = self.locator.locate(&working)?;
        tracing::debug!(faces = faces.len(), "detected faces");
        if faces.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.encoder.encode(&working, &faces)?;
        if embeddings.len() != faces.len() {
            return Err(EngineError::EncodingMismatch {
                faces: faces.len(),
                embeddings: embeddings.len(),
            });
        }
        Ok(faces.into_iter().zip(embeddings).collect())
    }
}

fn working_copy(frame: &RgbImage, scale: f32) -> Cow<'_, RgbImage> {
    if scale >= 1.0 {
        return Cow::Borrowed(frame);
    }
    let width = ((frame.width() as f32 * scale).round() as u32).max(1);
    let height = ((frame.height() as f32 * scale).round() as u32).max(1);
    Cow::Owned(imageops::resize(frame, width, height, FilterType::Triangle))
}

/// Run the loop, then release the source and close the display whatever the
/// outcome.
pub fn run_session<L, E, C, S, D, K>(
    engine: &mut Engine<L, E, C>,
    mut source: S,
    mut display: D,
    clock: &K,
) -> Result<LoopOutcome, EngineError>
where
    L: FaceLocator,
    E: FaceEncoder,
    C: FaceComparator,
    S: FrameSource,
    D: DisplaySink,
    K: Clock + ?Sized,
{
    let result = engine.run(&mut source, &mut display, clock);
    source.release();
    display.close();
    result
}
