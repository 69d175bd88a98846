//! Engine state shared by the command handlers and the scheduler.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::core::{
    Artifact, CompressionRequest, CompressionResult, EncoderParameters, EngineConfig,
    SessionEvent, SessionId, SessionState,
};
use crate::debouncer::{RecompressionScheduler, SchedulerConfig};
use crate::processing::{ArtifactCache, CacheKey, DependencyReport, EncoderRegistry, TempArtifactManager};
use crate::utils::{
    extract_filename, file_fingerprint, link_or_copy, EncodeError, EngineError, EngineResult, FormatId,
};

/// Receives a [`SessionEvent`] for every accepted result.
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// The compression engine.
///
/// Owns the encoder adapters, the temp artifacts, the bounded cache, every
/// open session and the scheduler task. Consumer operations live in
/// [`crate::commands`].
pub struct Engine {
    pub(crate) core: Arc<EngineCore>,
    pub(crate) scheduler: RecompressionScheduler,
}

pub(crate) struct EngineCore {
    pub(crate) registry: EncoderRegistry,
    pub(crate) temp: Arc<TempArtifactManager>,
    pub(crate) sessions: Mutex<SessionState>,
    cache: Mutex<ArtifactCache>,
    events: mpsc::UnboundedSender<SessionEvent>,
    in_flight: watch::Sender<usize>,
    closed: AtomicBool,
}

impl Engine {
    /// Creates the engine for the encoders the preflight check found.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(config: &EngineConfig, report: &DependencyReport) -> EngineResult<(Self, EventReceiver)> {
        let temp = Arc::new(TempArtifactManager::new(config.temp_dir.clone()));
        temp.prepare().await?;
        let registry = EncoderRegistry::from_config(config, report, temp.clone());
        Ok(Self::with_registry(config, registry, temp))
    }

    /// Creates the engine around an existing set of adapters.
    pub fn with_registry(
        config: &EngineConfig,
        registry: EncoderRegistry,
        temp: Arc<TempArtifactManager>,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (in_flight, _) = watch::channel(0usize);
        let core = Arc::new(EngineCore {
            registry,
            temp,
            sessions: Mutex::new(SessionState::new()),
            cache: Mutex::new(ArtifactCache::new(config.cache_capacity)),
            events,
            in_flight,
            closed: AtomicBool::new(false),
        });

        let dispatch_core = core.clone();
        let scheduler = RecompressionScheduler::start(
            SchedulerConfig { quiescence: config.quiescence() },
            move |request| {
                dispatch_core.in_flight.send_modify(|n| *n += 1);
                let core = dispatch_core.clone();
                tokio::spawn(async move {
                    core.process(request).await;
                    core.in_flight.send_modify(|n| *n = n.saturating_sub(1));
                });
            },
        );

        debug!("Engine ready, formats: {:?}", core.registry.available_formats());
        (Self { core, scheduler }, receiver)
    }

    pub fn available_formats(&self) -> Vec<FormatId> {
        self.core.registry.available_formats()
    }

    pub fn is_available(&self, format: FormatId) -> bool {
        self.core.registry.is_available(format)
    }

    pub fn temp_dir(&self) -> &Path {
        self.core.temp.dir()
    }

    pub(crate) fn ensure_open(&self) -> EngineResult<()> {
        if self.core.closed.load(Ordering::Acquire) {
            Err(EngineError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Waits until no dispatched compression is running.
    ///
    /// Changes still inside their quiet period are not counted.
    pub async fn settled(&self) {
        let mut rx = self.core.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Closes every session, stops the scheduler and deletes all temp artifacts.
    ///
    /// Results still in flight are deleted when they complete.
    pub async fn shutdown(&self) {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.shutdown();

        let results = self.core.sessions.lock().await.drain();
        for result in &results {
            self.core.temp.retire_result(result).await;
        }
        let cached = self.core.cache.lock().await.drain();
        for artifact in &cached {
            self.core.temp.retire(&artifact.path).await;
        }
        self.core.temp.purge().await;
        info!("Engine shut down");
    }
}

impl EngineCore {
    /// Runs one request to completion and offers its result to the session.
    async fn process(&self, request: CompressionRequest) {
        let format = request.format();
        let source = {
            let mut sessions = self.sessions.lock().await;
            if !sessions.mark_issued(request.session, format, request.generation) {
                debug!("Session {} closed before {} {} started", request.session, format, request.generation);
                return;
            }
            sessions
                .get(request.session)
                .map(|s| s.source_path().to_path_buf())
        };
        let Some(source) = source else { return };

        let result = match self.compress(&source, &request.parameters).await {
            Ok(artifact) => CompressionResult::succeeded(request.parameters, request.generation, artifact),
            Err(e) => {
                warn!(
                    "{} {} failed for {}: {}",
                    format,
                    request.generation,
                    extract_filename(&source),
                    e
                );
                CompressionResult::failed(request.parameters, request.generation, e.to_string())
            }
        };

        self.submit(request.session, result).await;
    }

    async fn compress(&self, source: &Path, params: &EncoderParameters) -> Result<Artifact, EncodeError> {
        let format = params.format();
        let adapter = self.registry.get(format).ok_or_else(|| EncodeError::MissingDependency {
            format,
            program: format.default_program().into(),
        })?;

        let key = if self.cache.lock().await.is_enabled() {
            file_fingerprint(source)
                .await
                .ok()
                .and_then(|fingerprint| CacheKey::new(source, fingerprint, params))
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some(artifact) = self.cached_copy(key, format).await {
                debug!("{} cache hit for {}", format, extract_filename(source));
                return Ok(artifact);
            }
        }

        let artifact = adapter.compress(source, params).await?;
        if let Some(key) = key {
            self.remember(key, &artifact, format).await;
        }
        Ok(artifact)
    }

    /// Gives a cached artifact a fresh, independently owned path.
    async fn cached_copy(&self, key: &CacheKey, format: FormatId) -> Option<Artifact> {
        let cached = self.cache.lock().await.get(key)?;
        let path = self.temp.allocate(format).await;
        match link_or_copy(&cached.path, &path).await {
            Ok(()) => Some(Artifact { path, size: cached.size }),
            Err(e) => {
                warn!("Cached artifact {} unusable: {}", cached.path.display(), e);
                self.temp.retire(&path).await;
                let stale = self.cache.lock().await.remove(key);
                if let Some(stale) = stale {
                    self.temp.retire(&stale.path).await;
                }
                None
            }
        }
    }

    async fn remember(&self, key: CacheKey, artifact: &Artifact, format: FormatId) {
        let path = self.temp.allocate(format).await;
        if let Err(e) = link_or_copy(&artifact.path, &path).await {
            warn!("Could not cache {}: {}", artifact.path.display(), e);
            self.temp.retire(&path).await;
            return;
        }
        let evicted = {
            let mut cache = self.cache.lock().await;
            // shutdown sets `closed` before it drains the cache
            if self.closed.load(Ordering::Acquire) {
                vec![Artifact { path, size: artifact.size }]
            } else {
                cache.insert(key, Artifact { path, size: artifact.size })
            }
        };
        for old in evicted {
            self.temp.retire(&old.path).await;
        }
    }

    /// Fences the result, notifies on acceptance and deletes whatever artifact
    /// lost its owner.
    async fn submit(&self, session: SessionId, result: CompressionResult) {
        let (submission, event) = {
            let mut sessions = self.sessions.lock().await;
            let event = sessions
                .get(session)
                .map(|s| SessionEvent::accepted(session, s.original_size(), &result));
            (sessions.submit(session, result), event)
        };

        if submission.is_accepted() {
            if let Some(event) = event {
                info!("Session {}: {}", session, event.summary());
                let _ = self.events.send(event);
            }
        }

        if let Some(orphan) = submission.into_orphan() {
            self.temp.retire_result(&orphan).await;
        }
    }
}
