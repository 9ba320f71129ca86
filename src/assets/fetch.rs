use std::io::Read;
use std::sync::mpsc::{self, Receiver, Sender};

/// Monotonic request counter; only completions carrying the latest one are applied.
pub type Generation = u64;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("failed reading response from {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },
}

/// Blocking byte download; always called from a worker thread.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        log::debug!("GET {}", url);
        let response = ureq::get(url).call().map_err(|err| FetchError::Request {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|source| FetchError::Read {
                url: url.to_string(),
                source,
            })?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }
        log::debug!("GET {} -> {} bytes", url, bytes.len());
        Ok(bytes)
    }
}

/// Where loader jobs run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Background,
    /// Runs the job on the caller's thread; keeps tests deterministic.
    #[cfg(test)]
    Inline,
}

impl Dispatch {
    pub fn run<F>(self, name: &str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Dispatch::Background => {
                if let Err(err) = std::thread::Builder::new()
                    .name(name.to_string())
                    .spawn(job)
                {
                    log::error!("Failed to spawn {} worker: {}", name, err);
                }
            }
            #[cfg(test)]
            Dispatch::Inline => job(),
        }
    }
}

pub struct Completion<T> {
    pub generation: Generation,
    pub value: T,
}

/// Channel of worker results where a newer request supersedes every older one.
pub struct CompletionQueue<T> {
    sender: Sender<Completion<T>>,
    receiver: Receiver<Completion<T>>,
    latest: Generation,
    name: &'static str,
}

impl<T: Send + 'static> CompletionQueue<T> {
    pub fn new(name: &'static str) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            latest: 0,
            name,
        }
    }

    #[cfg(test)]
    pub fn latest(&self) -> Generation {
        self.latest
    }

    /// Starts a new request; returns its generation and a reply handle for the worker.
    pub fn begin(&mut self) -> (Generation, Reply<T>) {
        self.latest += 1;
        (
            self.latest,
            Reply {
                generation: self.latest,
                sender: self.sender.clone(),
            },
        )
    }

    /// Non-blocking; stale completions are dropped here.
    pub fn drain(&mut self) -> Vec<T> {
        self.drain_counting_stale().0
    }

    /// Like `drain`, but also reports how many superseded requests finished.
    pub fn drain_counting_stale(&mut self) -> (Vec<T>, usize) {
        let mut current = Vec::new();
        let mut stale = 0;
        for completion in self.receiver.try_iter() {
            if completion.generation == self.latest {
                current.push(completion.value);
            } else {
                stale += 1;
                log::debug!(
                    "Discarding stale {} completion (generation {}, latest {})",
                    self.name,
                    completion.generation,
                    self.latest
                );
            }
        }
        (current, stale)
    }
}

pub struct Reply<T> {
    generation: Generation,
    sender: Sender<Completion<T>>,
}

impl<T> Reply<T> {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn send(self, value: T) {
        // The receiver only disappears when the session is torn down.
        let _ = self.sender.send(Completion {
            generation: self.generation,
            value,
        });
    }
}
