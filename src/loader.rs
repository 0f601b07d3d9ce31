//! Image sources and the background worker that decodes them off the frame
//! loop.

use std::any::Any;
use std::collections::HashSet;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use image::{ImageReader, Rgba, RgbaImage};
use url::Url;

use crate::helpers::seed_from_str;
use crate::scene::DecodedImage;

pub const PLACEHOLDER_SCHEME: &str = "placeholder";
const PLACEHOLDER_SIZE: (u32, u32) = (300, 400);

/// Resolves an opaque image URL to decoded pixels. Called from worker threads.
pub trait ImageLoader: Send + Sync {
    fn load(&self, url: &str) -> Result<DecodedImage>;
}

/// Loads local files, `file://` URLs and synthesizes `placeholder://<form>`
/// images. Relative paths resolve against `base_dir`.
#[derive(Debug, Clone)]
pub struct FileImageLoader {
    base_dir: PathBuf,
}

impl FileImageLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve_path(&self, url: &str) -> Result<PathBuf> {
        if let Ok(parsed) = Url::parse(url) {
            match parsed.scheme() {
                "file" => {
                    return parsed
                        .to_file_path()
                        .map_err(|_| anyhow!("file URL '{url}' has no local path"));
                }
                // Single letters are Windows drive prefixes, not schemes.
                scheme if scheme.len() > 1 => {
                    bail!("unsupported image URL scheme '{scheme}' in '{url}'");
                }
                _ => {}
            }
        }

        let path = Path::new(url);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        })
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&self, url: &str) -> Result<DecodedImage> {
        if let Some(key) = placeholder_key(url) {
            return Ok(placeholder_image(key));
        }

        let path = self.resolve_path(url)?;
        let image = ImageReader::open(&path)
            .with_context(|| format!("failed opening {}", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("failed sniffing format of {}", path.display()))?
            .decode()
            .with_context(|| format!("failed decoding {}", path.display()))?
            .to_rgba8();
        Ok(DecodedImage::from_rgba(image))
    }
}

/// Fetches `http(s)` URLs, delegating everything else to a [`FileImageLoader`].
#[cfg(feature = "remote")]
pub struct RemoteImageLoader {
    client: reqwest::blocking::Client,
    local: FileImageLoader,
}

#[cfg(feature = "remote")]
impl RemoteImageLoader {
    pub fn new(local: FileImageLoader) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, local })
    }
}

#[cfg(feature = "remote")]
impl ImageLoader for RemoteImageLoader {
    fn load(&self, url: &str) -> Result<DecodedImage> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return self.local.load(url);
        }
        let bytes = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed fetching {url}"))?
            .bytes()
            .with_context(|| format!("failed reading body of {url}"))?;
        let image = image::load_from_memory(&bytes)
            .with_context(|| format!("failed decoding {url}"))?
            .to_rgba8();
        Ok(DecodedImage::from_rgba(image))
    }
}

pub fn placeholder_url(form_key: &str) -> String {
    format!("{PLACEHOLDER_SCHEME}://{form_key}")
}

fn placeholder_key(url: &str) -> Option<&str> {
    url.strip_prefix(PLACEHOLDER_SCHEME)
        .and_then(|rest| rest.strip_prefix("://"))
}

/// Vertical two-tone gradient whose colours derive from the form key, so a
/// placeholder for the same form always looks the same.
pub fn placeholder_image(form_key: &str) -> DecodedImage {
    let seed = seed_from_str(form_key);
    let top = [(seed & 0xff) as u8, ((seed >> 8) & 0xff) as u8, ((seed >> 16) & 0xff) as u8];
    let bottom = [
        ((seed >> 24) & 0xff) as u8,
        ((seed >> 32) & 0xff) as u8,
        ((seed >> 40) & 0xff) as u8,
    ];
    let (width, height) = PLACEHOLDER_SIZE;
    let image = RgbaImage::from_fn(width, height, |_, y| {
        let t = y as f32 / (height - 1) as f32;
        let channel = |a: u8, b: u8| (a as f32 * (1.0 - t) + b as f32 * t).round() as u8;
        Rgba([
            channel(top[0], bottom[0]),
            channel(top[1], bottom[1]),
            channel(top[2], bottom[2]),
            255,
        ])
    });
    DecodedImage::from_rgba(image)
}

/// A finished background job.
#[derive(Debug)]
pub struct JobOutput<K, T> {
    pub key: K,
    pub result: Result<T>,
}

/// Runs one named worker thread per job and hands results back through a
/// channel drained by the frame loop. Keys already in flight are not
/// resubmitted.
pub struct BackgroundJobs<K, T> {
    name: &'static str,
    sender: Sender<JobOutput<K, T>>,
    receiver: Receiver<JobOutput<K, T>>,
    in_flight: HashSet<K>,
}

impl<K, T> BackgroundJobs<K, T>
where
    K: Clone + Eq + Hash + Send + 'static,
    T: Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            name,
            sender,
            receiver,
            in_flight: HashSet::new(),
        }
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.contains(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Spawn `job` unless `key` is already running. Returns whether a job was
    /// started. A thread that fails to spawn reports its error as the result.
    pub fn submit<F>(&mut self, key: K, job: F) -> bool
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if !self.in_flight.insert(key.clone()) {
            return false;
        }

        let sender = self.sender.clone();
        let job_key = key.clone();
        let spawned = thread::Builder::new()
            .name(format!("gallery-{}", self.name))
            .spawn(move || {
                // A panicking job still reports, so waiters and the in-flight
                // set are released.
                let result = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
                    Err(anyhow!("worker panicked: {}", panic_message(payload.as_ref())))
                });
                let _ = sender.send(JobOutput {
                    key: job_key,
                    result,
                });
            });

        if let Err(error) = spawned {
            let _ = self.sender.send(JobOutput {
                key,
                result: Err(anyhow!("failed to spawn {} worker: {error}", self.name)),
            });
        }
        true
    }

    /// Completed jobs, without blocking.
    pub fn drain(&mut self) -> Vec<JobOutput<K, T>> {
        let mut done = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(output) => {
                    self.in_flight.remove(&output.key);
                    done.push(output);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        done
    }

    /// Block until every in-flight job has reported.
    pub fn wait_all(&mut self) -> Vec<JobOutput<K, T>> {
        let mut done = Vec::new();
        while !self.in_flight.is_empty() {
            match self.receiver.recv() {
                Ok(output) => {
                    self.in_flight.remove(&output.key);
                    done.push(output);
                }
                Err(_) => break,
            }
        }
        done
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Shared handle so jobs can call the loader from their own thread.
pub type SharedLoader = Arc<dyn ImageLoader>;
