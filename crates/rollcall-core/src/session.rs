//! Recognition sessions: live frame streams and single images.
//!
//! A session borrows a built [`Gallery`] read-only and drives the external
//! collaborators (analyzer, frame source, renderer, presenter) synchronously,
//! one frame at a time.

use crate::analyzer::{load_image, AnalyzerError, BoxError, FaceAnalyzer};
use crate::descriptor::DescriptorError;
use crate::gallery::Gallery;
use crate::matcher::{LinearScan, Matcher, NearestNeighbor};
use crate::types::{BoundingBox, IdentityRecord, MatchResult};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("frame read failed: {0}")]
    Read(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(#[source] FrameSourceError),
    #[error("could not load image {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error("probe rejected: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("rendering failed: {0}")]
    Render(#[source] BoxError),
}

/// Produces frames for the live loop. A read error ends the stream.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<RgbImage, FrameSourceError>;
}

/// One face to draw on a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub bbox: BoundingBox,
    /// Matched name or `"Unknown"`.
    pub label: String,
    pub matched: bool,
}

/// Drawing surface for annotated frames.
pub trait Renderer {
    fn render(&mut self, frame: &RgbImage, annotations: &[Annotation]) -> Result<(), BoxError>;

    /// Tear down the surface. Called exactly once when a live session ends.
    fn close(&mut self) {}
}

/// Cooperative stop request, polled once per frame.
pub trait StopSignal {
    fn stop_requested(&mut self) -> bool;
}

impl StopSignal for AtomicBool {
    fn stop_requested(&mut self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl StopSignal for Arc<AtomicBool> {
    fn stop_requested(&mut self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl<F: FnMut() -> bool> StopSignal for F {
    fn stop_requested(&mut self) -> bool {
        self()
    }
}

/// Receives per-face outcomes of single-image recognition.
pub trait Presenter {
    fn show_identity(&mut self, record: &IdentityRecord, distance: f32);
    fn not_recognized(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Detecting,
    Matching,
    Rendering,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveSummary {
    pub frames: usize,
    pub faces: usize,
    pub recognized: usize,
}

/// Closes the renderer on every exit path from the live loop.
struct SurfaceGuard<'r, R: Renderer + ?Sized> {
    renderer: &'r mut R,
}

impl<R: Renderer + ?Sized> Drop for SurfaceGuard<'_, R> {
    fn drop(&mut self) {
        self.renderer.close();
        tracing::debug!("rendering surface closed");
    }
}

pub struct RecognitionSession<'g, A, N = LinearScan> {
    gallery: &'g Gallery,
    matcher: Matcher<N>,
    analyzer: A,
    state: SessionState,
}

impl<'g, A: FaceAnalyzer, N: NearestNeighbor> RecognitionSession<'g, A, N> {
    pub fn new(gallery: &'g Gallery, matcher: Matcher<N>, analyzer: A) -> Self {
        Self {
            gallery,
            matcher,
            analyzer,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn gallery(&self) -> &Gallery {
        self.gallery
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::trace!(from = ?self.state, to = ?state, "session state");
        self.state = state;
    }

    /// Run the live loop until the stream ends or a stop is requested.
    ///
    /// `open` acquires the frame source; failure is fatal. The source and
    /// the rendering surface are released on every exit path. A frame in
    /// flight always completes before the stop signal is honoured.
    pub fn run_live<S, O, R, C>(
        &mut self,
        open: O,
        renderer: &mut R,
        stop: &mut C,
    ) -> Result<LiveSummary, SessionError>
    where
        S: FrameSource,
        O: FnOnce() -> Result<S, FrameSourceError>,
        R: Renderer + ?Sized,
        C: StopSignal + ?Sized,
    {
        self.set_state(SessionState::Idle);
        let mut source = match open() {
            Ok(source) => source,
            Err(e) => {
                self.set_state(SessionState::Stopped);
                return Err(SessionError::DeviceUnavailable(e));
            }
        };
        tracing::info!(identities = self.gallery.len(), "live session started");

        let mut surface = SurfaceGuard { renderer };
        let outcome = self.live_loop(&mut source, &mut surface, stop);
        drop(surface);
        drop(source);
        self.set_state(SessionState::Stopped);

        match &outcome {
            Ok(summary) => tracing::info!(
                frames = summary.frames,
                faces = summary.faces,
                recognized = summary.recognized,
                "live session stopped"
            ),
            Err(e) => tracing::error!(error = %e, "live session aborted"),
        }
        outcome
    }

    fn live_loop<S, R, C>(
        &mut self,
        source: &mut S,
        surface: &mut SurfaceGuard<'_, R>,
        stop: &mut C,
    ) -> Result<LiveSummary, SessionError>
    where
        S: FrameSource,
        R: Renderer + ?Sized,
        C: StopSignal + ?Sized,
    {
        let mut summary = LiveSummary::default();

        loop {
            self.set_state(SessionState::Capturing);
            let frame = match source.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "frame read failed; ending stream");
                    break;
                }
            };

            let (boxes, results) = self.analyze(&frame)?;

            self.set_state(SessionState::Rendering);
            let annotations: Vec<Annotation> = boxes
                .into_iter()
                .zip(&results)
                .map(|(bbox, result)| Annotation {
                    bbox,
                    label: result.display_name().to_string(),
                    matched: result.matched,
                })
                .collect();
            surface
                .renderer
                .render(&frame, &annotations)
                .map_err(SessionError::Render)?;

            summary.frames += 1;
            summary.faces += results.len();
            summary.recognized += results.iter().filter(|r| r.matched).count();
            tracing::debug!(frame = summary.frames, faces = results.len(), "frame processed");

            if stop.stop_requested() {
                tracing::info!("stop requested");
                break;
            }
        }

        Ok(summary)
    }

    /// Detect, embed and match every face in `image`.
    fn analyze(&mut self, image: &RgbImage) -> Result<(Vec<BoundingBox>, Vec<MatchResult>), SessionError> {
        self.set_state(SessionState::Detecting);
        let faces = self.analyzer.detect_and_embed(image)?;

        self.set_state(SessionState::Matching);
        let (boxes, probes): (Vec<_>, Vec<_>) = faces.into_iter().map(|f| (f.bbox, f.descriptor)).unzip();
        let results = self.matcher.match_all(&probes, self.gallery)?;
        Ok((boxes, results))
    }

    /// Recognize every face in a decoded image. No faces → empty result.
    pub fn recognize_image(&mut self, image: &RgbImage) -> Result<Vec<MatchResult>, SessionError> {
        let (_, results) = self.analyze(image)?;
        self.set_state(SessionState::Idle);
        Ok(results)
    }

    /// Recognize every face in an image file and hand each outcome to `presenter`.
    ///
    /// A load or decode failure is returned to the caller; nothing is retried.
    pub fn recognize_file<P: Presenter + ?Sized>(
        &mut self,
        path: &Path,
        presenter: &mut P,
    ) -> Result<Vec<MatchResult>, SessionError> {
        let image = load_image(path).map_err(|source| SessionError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let results = self.recognize_image(&image)?;
        tracing::info!(
            path = %path.display(),
            faces = results.len(),
            recognized = results.iter().filter(|r| r.matched).count(),
            "image recognized"
        );

        for result in &results {
            match &result.identity {
                Some(record) => presenter.show_identity(record, result.distance),
                None => presenter.not_recognized(),
            }
        }

        Ok(results)
    }
}
