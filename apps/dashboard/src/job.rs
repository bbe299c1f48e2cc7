//! Background tagging job.
//!
//! Tagging runs on its own thread with its own tokio runtime so the draw
//! loop keeps ticking; progress and the final labels come back over a
//! channel polled by the app.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use jbook_core::pipeline::ProgressReporter;
use jbook_core::{TagStats, TaggingOptions, tag_batch};
use jbook_llm::OpenAiClient;
use jbook_shared::{EnrichedRecord, Relevance};
use jbook_storage::Storage;
use tracing::{info, warn};

/// Messages from the job thread.
pub(crate) enum JobEvent {
    Progress {
        current: usize,
        total: usize,
    },
    Finished {
        indices: Vec<usize>,
        tags: Vec<(Relevance, String)>,
        stats: TagStats,
    },
    Failed(String),
}

/// Everything a tagging run needs, owned so it can cross threads.
pub(crate) struct TagRequest {
    /// Dataset rows the records came from.
    pub indices: Vec<usize>,
    pub records: Vec<EnrichedRecord>,
    pub options: TaggingOptions,
    pub client: Option<OpenAiClient>,
    pub cache_path: Option<PathBuf>,
}

/// Handle to a running job.
pub(crate) struct TagJob {
    rx: Receiver<JobEvent>,
    pub total: usize,
}

impl TagJob {
    pub(crate) fn spawn(request: TagRequest) -> Self {
        let (tx, rx) = mpsc::channel();
        let total = request.records.len();
        std::thread::spawn(move || run(request, tx));
        Self { rx, total }
    }

    /// Next pending event; `Err(Disconnected)` once the thread is gone.
    pub(crate) fn try_next(&self) -> Result<JobEvent, TryRecvError> {
        self.rx.try_recv()
    }
}

struct ChannelProgress {
    tx: Sender<JobEvent>,
}

impl ProgressReporter for ChannelProgress {
    fn phase(&self, _name: &str) {}

    fn item(&self, current: usize, total: usize, _detail: &str) {
        let _ = self.tx.send(JobEvent::Progress { current, total });
    }

    fn done(&self, _summary: &str) {}
}

fn run(request: TagRequest, tx: Sender<JobEvent>) {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = tx.send(JobEvent::Failed(format!("cannot start runtime: {e}")));
            return;
        }
    };

    let TagRequest {
        indices,
        records,
        options,
        client,
        cache_path,
    } = request;
    let progress = ChannelProgress { tx: tx.clone() };

    let (tags, stats) = runtime.block_on(async move {
        let cache = match cache_path {
            Some(path) => Storage::open(&path)
                .await
                .inspect_err(|e| warn!(error = %e, "tag cache unavailable"))
                .ok(),
            None => None,
        };
        tag_batch(&records, &options, client.map(Arc::new), cache.as_ref(), &progress).await
    });

    info!(rows = indices.len(), ?stats, "dashboard tagging finished");
    let _ = tx.send(JobEvent::Finished {
        indices,
        tags,
        stats,
    });
}
