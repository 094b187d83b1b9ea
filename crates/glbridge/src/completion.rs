//! Image-backed textures that finish after the creating call returns.
//!
//! `jsLoadTextureIMG` / `glLoadTexture` hand the guest a texture handle immediately. Decoding runs
//! behind an [`ImageDecoder`]; [`Bridge::pump_completions`] later applies finished decodes on the
//! bridge thread. A pending load remembers the `(handle, generation)` it was issued for and the
//! guest-memory epoch at submission, so a completion for a released texture is dropped and a
//! completion after guest memory was replaced does not write dimensions into it.

use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glbridge_handles::{Generation, Handle};
use glbridge_mem::{read_str, GuestMemory};
use image::ImageFormat;
use tracing::{debug, warn};

use crate::bridge::{Bridge, BridgeError};
use crate::consts::*;
use crate::host::GlHost;

/// Filtering and wrapping applied once a decoded image is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerParams {
    pub min_filter: u32,
    pub mag_filter: u32,
    pub wrap_s: u32,
    pub wrap_t: u32,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            min_filter: LINEAR,
            mag_filter: LINEAR,
            wrap_s: CLAMP_TO_EDGE,
            wrap_t: CLAMP_TO_EDGE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read asset {url}")]
    Load {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("asset path {0} escapes the asset root")]
    Forbidden(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("decoder worker is gone")]
    WorkerGone,
}

/// Resolves `glLoadTexture` URLs to encoded bytes.
pub trait AssetLoader: Send + Sync {
    fn load(&self, url: &str) -> Result<Vec<u8>, DecodeError>;
}

/// Loads assets from a directory. URLs are relative paths below it.
#[derive(Debug, Clone)]
pub struct FsAssetLoader {
    root: PathBuf,
}

impl FsAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetLoader for FsAssetLoader {
    fn load(&self, url: &str) -> Result<Vec<u8>, DecodeError> {
        let relative = Path::new(url);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(DecodeError::Forbidden(url.to_owned()));
        }
        std::fs::read(self.root.join(relative)).map_err(|source| DecodeError::Load {
            url: url.to_owned(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub enum ImageSource {
    Encoded { bytes: Vec<u8>, mime: String },
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows, top row first.
    pub rgba: Vec<u8>,
}

/// Decode `bytes` to RGBA8. The MIME type picks the format when it names one `image` knows;
/// otherwise the format is sniffed from the data.
pub fn decode_image(bytes: &[u8], mime: Option<&str>) -> Result<DecodedImage, DecodeError> {
    let format = match mime.and_then(ImageFormat::from_mime_type) {
        Some(format) => format,
        None => image::guess_format(bytes)?,
    };
    let rgba = image::load_from_memory_with_format(bytes, format)?.to_rgba8();
    Ok(DecodedImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

#[derive(Debug)]
pub struct DecodeJob {
    pub ticket: u64,
    pub source: ImageSource,
}

impl DecodeJob {
    fn run(self, loader: &dyn AssetLoader) -> DecodeOutcome {
        let result = match self.source {
            ImageSource::Encoded { bytes, mime } => decode_image(&bytes, Some(&mime)),
            ImageSource::Url(url) => loader.load(&url).and_then(|bytes| decode_image(&bytes, None)),
        };
        DecodeOutcome {
            ticket: self.ticket,
            result,
        }
    }
}

#[derive(Debug)]
pub struct DecodeOutcome {
    pub ticket: u64,
    pub result: Result<DecodedImage, DecodeError>,
}

/// Where decode work runs. Outcomes are only ever consumed on the bridge thread.
pub trait ImageDecoder: Send {
    fn submit(&mut self, job: DecodeJob);

    /// Finished jobs, without blocking.
    fn poll(&mut self) -> Vec<DecodeOutcome>;

    /// Finished jobs, blocking up to `timeout` for in-flight work to finish.
    fn wait(&mut self, timeout: Duration) -> Vec<DecodeOutcome>;

    fn in_flight(&self) -> usize;
}

/// Decodes on a dedicated worker thread.
pub struct ThreadedDecoder {
    jobs: Option<mpsc::Sender<DecodeJob>>,
    results: mpsc::Receiver<DecodeOutcome>,
    worker: Option<JoinHandle<()>>,
    /// Tickets handed to the worker and not yet returned.
    in_flight: BTreeSet<u64>,
    failed: Vec<DecodeOutcome>,
}

impl ThreadedDecoder {
    pub fn new(loader: Arc<dyn AssetLoader>) -> io::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<DecodeJob>();
        let (result_tx, result_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("glbridge-decode".into())
            .spawn(move || {
                for job in job_rx {
                    if result_tx.send(job.run(loader.as_ref())).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            worker: Some(worker),
            in_flight: BTreeSet::new(),
            failed: Vec::new(),
        })
    }

    fn collect(&mut self, outcome: DecodeOutcome, out: &mut Vec<DecodeOutcome>) {
        self.in_flight.remove(&outcome.ticket);
        out.push(outcome);
    }

    /// The worker hung up with jobs outstanding; fail them so their loads are not kept forever.
    fn abandon_in_flight(&mut self, out: &mut Vec<DecodeOutcome>) {
        if self.in_flight.is_empty() {
            return;
        }
        warn!(jobs = self.in_flight.len(), "decode worker exited with jobs in flight");
        out.extend(
            std::mem::take(&mut self.in_flight)
                .into_iter()
                .map(|ticket| DecodeOutcome {
                    ticket,
                    result: Err(DecodeError::WorkerGone),
                }),
        );
    }
}

impl ImageDecoder for ThreadedDecoder {
    fn submit(&mut self, job: DecodeJob) {
        let ticket = job.ticket;
        let sent = match &self.jobs {
            Some(jobs) => jobs.send(job).map_err(|mpsc::SendError(job)| job),
            None => Err(job),
        };
        match sent {
            Ok(()) => {
                self.in_flight.insert(ticket);
            }
            Err(job) => {
                warn!(ticket = job.ticket, "decode worker is gone");
                self.failed.push(DecodeOutcome {
                    ticket: job.ticket,
                    result: Err(DecodeError::WorkerGone),
                });
            }
        }
    }

    fn poll(&mut self) -> Vec<DecodeOutcome> {
        let mut out = std::mem::take(&mut self.failed);
        loop {
            match self.results.try_recv() {
                Ok(outcome) => self.collect(outcome, &mut out),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.abandon_in_flight(&mut out);
                    break;
                }
            }
        }
        out
    }

    fn wait(&mut self, timeout: Duration) -> Vec<DecodeOutcome> {
        let deadline = Instant::now() + timeout;
        let mut out = self.poll();
        while !self.in_flight.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(outcome) => self.collect(outcome, &mut out),
                Err(mpsc::RecvTimeoutError::Timeout) => break,
                Err(mpsc::RecvTimeoutError::Disconnected) => self.abandon_in_flight(&mut out),
            }
        }
        out
    }

    fn in_flight(&self) -> usize {
        self.in_flight.len() + self.failed.len()
    }
}

impl Drop for ThreadedDecoder {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("decode worker panicked");
            }
        }
    }
}

/// Decodes inline during the next poll. Completion order matches submission order.
pub struct DeferredDecoder {
    loader: Arc<dyn AssetLoader>,
    queue: VecDeque<DecodeJob>,
}

impl DeferredDecoder {
    pub fn new(loader: Arc<dyn AssetLoader>) -> Self {
        Self {
            loader,
            queue: VecDeque::new(),
        }
    }
}

impl ImageDecoder for DeferredDecoder {
    fn submit(&mut self, job: DecodeJob) {
        self.queue.push_back(job);
    }

    fn poll(&mut self) -> Vec<DecodeOutcome> {
        self.queue
            .drain(..)
            .map(|job| job.run(self.loader.as_ref()))
            .collect()
    }

    fn wait(&mut self, _timeout: Duration) -> Vec<DecodeOutcome> {
        self.poll()
    }

    fn in_flight(&self) -> usize {
        self.queue.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingLoad {
    handle: Handle,
    generation: Generation,
    width_ptr: u32,
    height_ptr: u32,
    sampler: SamplerParams,
    epoch: u64,
}

impl<H: GlHost> Bridge<H> {
    /// `jsLoadTextureIMG`: start decoding `data_len` encoded bytes and return the texture handle.
    ///
    /// Once decoded, the width and height are stored as `u16` at `width_ptr` / `height_ptr`
    /// (either may be null).
    #[allow(clippy::too_many_arguments)]
    pub fn load_texture_image(
        &mut self,
        mem: &GuestMemory<'_>,
        data_ptr: u32,
        data_len: u32,
        mime_ptr: u32,
        mime_len: u32,
        width_ptr: u32,
        height_ptr: u32,
        sampler: SamplerParams,
    ) -> Result<Handle, BridgeError> {
        let bytes = mem.bytes(data_ptr, data_len)?.to_vec();
        let mime = read_str(mem, mime_ptr, mime_len)?.into_owned();
        self.submit_texture_load(ImageSource::Encoded { bytes, mime }, width_ptr, height_ptr, sampler)
    }

    /// `glLoadTexture`: load an image by URL through the asset loader with default sampling.
    pub fn load_texture(
        &mut self,
        mem: &GuestMemory<'_>,
        url_ptr: u32,
        url_len: u32,
    ) -> Result<Handle, BridgeError> {
        let url = read_str(mem, url_ptr, url_len)?.into_owned();
        self.submit_texture_load(ImageSource::Url(url), 0, 0, SamplerParams::default())
    }

    fn submit_texture_load(
        &mut self,
        source: ImageSource,
        width_ptr: u32,
        height_ptr: u32,
        sampler: SamplerParams,
    ) -> Result<Handle, BridgeError> {
        let texture = self.ctx.host_mut().create_texture()?;
        let (handle, generation) = self.textures.allocate_tracked(texture)?;

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending.insert(
            ticket,
            PendingLoad {
                handle,
                generation,
                width_ptr,
                height_ptr,
                sampler,
                epoch: self.memory_epoch,
            },
        );
        debug!(ticket, texture = handle, "texture load submitted");
        self.decoder.submit(DecodeJob { ticket, source });
        Ok(handle)
    }

    /// Number of texture loads that have not completed yet.
    pub fn pending_loads(&self) -> usize {
        self.pending.len()
    }

    /// Apply every decode that has finished. Returns the number of textures populated.
    pub fn pump_completions(&mut self, mem: &mut GuestMemory<'_>) -> usize {
        let outcomes = self.decoder.poll();
        self.apply_outcomes(mem, outcomes)
    }

    /// Like [`Self::pump_completions`], but waits up to `timeout` for in-flight decodes.
    pub fn drain_completions(&mut self, mem: &mut GuestMemory<'_>, timeout: Duration) -> usize {
        let outcomes = self.decoder.wait(timeout);
        self.apply_outcomes(mem, outcomes)
    }

    fn apply_outcomes(&mut self, mem: &mut GuestMemory<'_>, outcomes: Vec<DecodeOutcome>) -> usize {
        let mut applied = 0;
        for outcome in outcomes {
            let Some(pending) = self.pending.remove(&outcome.ticket) else {
                continue;
            };
            if !self.textures.is_live(pending.handle, pending.generation) {
                debug!(ticket = outcome.ticket, texture = pending.handle, "texture released before load finished");
                self.stats.inc_completions_abandoned();
                continue;
            }
            let image = match outcome.result {
                Ok(image) => image,
                Err(err) => {
                    warn!(texture = pending.handle, error = %err, "failed to decode texture image");
                    self.stats.inc_decode_failures();
                    continue;
                }
            };

            self.upload_decoded(&pending, &image);
            self.write_dimensions(mem, &pending, &image);
            self.stats.inc_completions_applied();
            applied += 1;
        }
        applied
    }

    fn upload_decoded(&mut self, pending: &PendingLoad, image: &DecodedImage) {
        let Ok(Some(texture)) = self.textures.resolve(pending.handle) else {
            return;
        };
        let sampler = pending.sampler;
        let host = self.ctx.host_mut();
        host.bind_texture(TEXTURE_2D, Some(texture));
        host.tex_image_2d(
            TEXTURE_2D,
            0,
            RGBA as i32,
            image.width as i32,
            image.height as i32,
            0,
            RGBA,
            UNSIGNED_BYTE,
            Some(image.rgba.as_slice()),
        );
        host.tex_parameter_i32(TEXTURE_2D, TEXTURE_MIN_FILTER, sampler.min_filter as i32);
        host.tex_parameter_i32(TEXTURE_2D, TEXTURE_MAG_FILTER, sampler.mag_filter as i32);
        host.tex_parameter_i32(TEXTURE_2D, TEXTURE_WRAP_S, sampler.wrap_s as i32);
        host.tex_parameter_i32(TEXTURE_2D, TEXTURE_WRAP_T, sampler.wrap_t as i32);
        if is_mipmap_filter(sampler.min_filter) {
            host.generate_mipmap(TEXTURE_2D);
        }
        host.bind_texture(TEXTURE_2D, None);
    }

    fn write_dimensions(&self, mem: &mut GuestMemory<'_>, pending: &PendingLoad, image: &DecodedImage) {
        if pending.width_ptr == 0 && pending.height_ptr == 0 {
            return;
        }
        if pending.epoch != self.memory_epoch {
            debug!(texture = pending.handle, "guest memory replaced; not writing image size");
            self.stats.inc_dimension_writes_skipped();
            return;
        }
        for (ptr, value) in [(pending.width_ptr, image.width), (pending.height_ptr, image.height)] {
            if ptr == 0 {
                continue;
            }
            let value = u16::try_from(value).unwrap_or(u16::MAX);
            if let Err(err) = mem.write_u16(ptr, value) {
                warn!(texture = pending.handle, error = %err, "image size destination out of bounds");
                self.stats.inc_dimension_writes_skipped();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{Rgba, RgbaImage};

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decode_uses_mime_then_sniffs() {
        let png = png_bytes(3, 2);
        let image = decode_image(&png, Some("image/png")).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(image.rgba.len(), 3 * 2 * 4);
        assert_eq!(&image.rgba[..4], &[10, 20, 30, 255]);

        let sniffed = decode_image(&png, Some("application/octet-stream")).unwrap();
        assert_eq!(sniffed, image);
        assert!(decode_image(b"not an image", None).is_err());
    }

    #[test]
    fn fs_loader_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tile.png"), png_bytes(1, 1)).unwrap();
        let loader = FsAssetLoader::new(dir.path());
        assert!(loader.load("tile.png").is_ok());
        assert!(loader.load("./tile.png").is_ok());
        assert!(matches!(loader.load("../tile.png"), Err(DecodeError::Forbidden(_))));
        assert!(matches!(loader.load("/etc/passwd"), Err(DecodeError::Forbidden(_))));
        assert!(matches!(loader.load("missing.png"), Err(DecodeError::Load { .. })));
    }

    #[test]
    fn threaded_decoder_delivers_every_job() {
        let loader: Arc<dyn AssetLoader> = Arc::new(FsAssetLoader::new("."));
        let mut decoder = ThreadedDecoder::new(loader).unwrap();
        for ticket in 0..4 {
            decoder.submit(DecodeJob {
                ticket,
                source: ImageSource::Encoded {
                    bytes: png_bytes(2, 2),
                    mime: "image/png".into(),
                },
            });
        }
        let mut outcomes = decoder.wait(Duration::from_secs(30));
        assert_eq!(decoder.in_flight(), 0);
        outcomes.sort_by_key(|o| o.ticket);
        assert_eq!(outcomes.iter().map(|o| o.ticket).collect::<Vec<_>>(), [0, 1, 2, 3]);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    struct PanickingLoader;

    impl AssetLoader for PanickingLoader {
        fn load(&self, url: &str) -> Result<Vec<u8>, DecodeError> {
            panic!("loader blew up on {url}");
        }
    }

    #[test]
    fn panicked_worker_fails_outstanding_jobs() {
        let mut decoder = ThreadedDecoder::new(Arc::new(PanickingLoader)).unwrap();
        decoder.submit(DecodeJob {
            ticket: 3,
            source: ImageSource::Url("tile.png".into()),
        });
        let outcomes = decoder.wait(Duration::from_secs(30));
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].ticket, 3);
        assert!(matches!(outcomes[0].result, Err(DecodeError::WorkerGone)));
        assert_eq!(decoder.in_flight(), 0);

        // Later submissions fail fast instead of queueing behind a dead worker.
        decoder.submit(DecodeJob {
            ticket: 4,
            source: ImageSource::Url("tile.png".into()),
        });
        let outcomes = decoder.poll();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].result, Err(DecodeError::WorkerGone)));

        // Joining the panicked worker is logged, not propagated.
        drop(decoder);
    }

    #[test]
    fn deferred_decoder_runs_on_poll() {
        let loader: Arc<dyn AssetLoader> = Arc::new(FsAssetLoader::new("."));
        let mut decoder = DeferredDecoder::new(loader);
        decoder.submit(DecodeJob {
            ticket: 7,
            source: ImageSource::Encoded {
                bytes: vec![1, 2, 3],
                mime: "image/png".into(),
            },
        });
        assert_eq!(decoder.in_flight(), 1);
        let outcomes = decoder.poll();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_err());
        assert!(decoder.poll().is_empty());
    }
}
