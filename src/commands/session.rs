//! Session command handlers.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use crate::core::{Engine, EncoderParameters, FormatParameters, SessionId, SessionSnapshot};
use crate::processing::save::{backup_path, save_artifacts, SaveReport};
use crate::utils::{
    get_file_size, validate_format_parameters, validate_input_path, validate_parameters,
    EngineError, EngineResult, FormatId,
};

/// Opens a session for an image and compresses it to every available format.
///
/// The original size is read once here and used for every savings figure of
/// the session. The initial requests fire immediately.
///
/// # Errors
/// * Validation errors for a missing/non-file path or out-of-range parameters
/// * [`EngineError::NoEncodersAvailable`] when no encoder can be used
pub async fn open_image(
    engine: &Engine,
    path: impl AsRef<Path>,
    parameters: FormatParameters,
) -> EngineResult<SessionId> {
    engine.ensure_open()?;
    let path = path.as_ref();
    debug!("Received open_image command for {}", path.display());

    validate_input_path(path)?;
    validate_format_parameters(&parameters)?;

    let formats = engine.available_formats();
    if formats.is_empty() {
        return Err(EngineError::NoEncodersAvailable);
    }

    let original_size = get_file_size(path).await?;
    let id = engine
        .core
        .sessions
        .lock()
        .await
        .open(path.to_path_buf(), original_size);

    for format in formats {
        engine.scheduler.trigger(id, parameters.get(format))?;
    }
    info!("Session {} opened: {} ({} bytes)", id, path.display(), original_size);
    Ok(id)
}

/// Records a parameter change for one format of a session.
///
/// The request is debounced: only the last change of a burst is compressed.
pub async fn update_parameters(
    engine: &Engine,
    session: SessionId,
    parameters: EncoderParameters,
) -> EngineResult<()> {
    engine.ensure_open()?;
    validate_parameters(&parameters)?;

    let format = parameters.format();
    if !engine.is_available(format) {
        return Err(EngineError::FormatUnavailable(format));
    }

    // Sent under the session lock so it is ordered against close_image's Forget
    let sessions = engine.core.sessions.lock().await;
    if sessions.get(session).is_none() {
        return Err(EngineError::UnknownSession(session));
    }
    debug!("Session {} {} parameters changed: {:?}", session, format, parameters);
    engine.scheduler.parameters_changed(session, parameters)
}

/// Current accepted results, savings and pending flags of a session.
///
/// A format is pending while a change waits for its quiet period, and from the
/// moment a request is issued until a result of that generation or a newer
/// one is accepted.
pub async fn session_snapshot(engine: &Engine, session: SessionId) -> EngineResult<SessionSnapshot> {
    // Asked first: a result accepted in between only makes the comparison below stricter
    let scheduled = engine.scheduler.status(session).await.unwrap_or_default();

    let mut snapshot = engine
        .core
        .sessions
        .lock()
        .await
        .snapshot(session)
        .ok_or(EngineError::UnknownSession(session))?;

    for status in scheduled {
        if let Some(entry) = snapshot.formats.iter_mut().find(|f| f.format == status.format) {
            let accepted = entry.result.as_ref().map(|r| r.generation).unwrap_or_default();
            entry.pending |= status.armed || status.generation > accepted;
        }
    }
    Ok(snapshot)
}

/// Writes the accepted artifacts next to the original.
///
/// With `formats` set to `None` every format with a successful accepted
/// result is saved. A format listed explicitly must have one.
///
/// When an output has the original's extension it replaces the original file.
/// The session then reads the backup, so later recompressions still start
/// from the real original.
pub async fn save_image(
    engine: &Engine,
    session: SessionId,
    formats: Option<&[FormatId]>,
) -> EngineResult<SaveReport> {
    engine.ensure_open()?;

    // Hold the session lock while copying so the artifacts cannot be
    // superseded and deleted under us.
    let mut sessions = engine.core.sessions.lock().await;
    let state = sessions.get(session).ok_or(EngineError::UnknownSession(session))?;
    let original = state.original_path().to_path_buf();

    let wanted: Vec<FormatId> = match formats {
        Some(formats) => formats.to_vec(),
        None => FormatId::ALL.to_vec(),
    };

    let mut artifacts: Vec<(FormatId, PathBuf)> = Vec::with_capacity(wanted.len());
    for format in wanted {
        match state.accepted(format).and_then(|r| r.artifact.as_ref()) {
            Some(artifact) => artifacts.push((format, artifact.path.clone())),
            None if formats.is_some() => {
                return Err(EngineError::validation(format!(
                    "No successful {} result to save for session {}", format, session
                )));
            }
            None => {}
        }
    }
    if artifacts.is_empty() {
        return Err(EngineError::validation(format!(
            "Nothing to save for session {}", session
        )));
    }

    let saved = save_artifacts(&engine.core.temp, &original, &artifacts).await;
    let replaced = match &saved {
        Ok(report) => report.original_replaced,
        Err(EngineError::SaveIncomplete { completed, .. }) => completed.contains(&original),
        Err(_) => false,
    };
    if replaced {
        sessions.redirect_source(session, backup_path(&original));
    }

    let report = saved?;
    info!("Session {} saved {} files", session, report.written.len());
    Ok(report)
}

/// Closes a session and deletes its artifacts.
///
/// Requests still in flight for it are dropped when they complete.
pub async fn close_image(engine: &Engine, session: SessionId) -> EngineResult<()> {
    engine.ensure_open()?;

    let results = {
        let mut sessions = engine.core.sessions.lock().await;
        let results = sessions.close(session).ok_or(EngineError::UnknownSession(session))?;
        engine.scheduler.forget(session)?;
        results
    };
    for result in &results {
        engine.core.temp.retire_result(result).await;
    }
    debug!("Session {} closed, {} artifacts deleted", session, results.len());
    Ok(())
}

/// Closes every session and releases all temp artifacts.
pub async fn shutdown(engine: &Engine) {
    engine.shutdown().await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use crate::core::{CjpegParams, CwebpParams, EngineConfig, EventReceiver, Generation, SessionEvent};
    use crate::processing::TempArtifactManager;
    use crate::test_helpers::{shell_registry, write_source};

    struct Fixture {
        tmp: TempDir,
        engine: Engine,
        events: EventReceiver,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig {
            temp_dir: tmp.path().join("artifacts"),
            cache_capacity: 0,
            ..EngineConfig::default()
        };
        std::fs::create_dir_all(&config.temp_dir).unwrap();
        let temp = Arc::new(TempArtifactManager::new(config.temp_dir.clone()));
        let (engine, events) = Engine::with_registry(&config, shell_registry(&temp), temp);
        Fixture { tmp, engine, events }
    }

    async fn next_event(events: &mut EventReceiver) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    async fn initial_events(events: &mut EventReceiver) -> Vec<SessionEvent> {
        let mut all = Vec::new();
        for _ in 0..3 {
            all.push(next_event(events).await);
        }
        all.sort_by_key(|e| e.format);
        all
    }

    #[tokio::test]
    async fn open_compresses_every_format() {
        let mut f = fixture();
        let source = write_source(f.tmp.path(), "photo.jpg", 1000);

        let id = open_image(&f.engine, &source, FormatParameters::default()).await.unwrap();
        let events = initial_events(&mut f.events).await;

        let sizes: Vec<_> = events.iter().map(|e| (e.format, e.artifact_size)).collect();
        assert_eq!(
            sizes,
            vec![
                (FormatId::Png, Some(500)),
                (FormatId::Webp, Some(750)),
                (FormatId::Jpeg, Some(750)),
            ]
        );
        assert!(events.iter().all(|e| e.generation == Generation(1) && e.session_id == id));
        assert_eq!(events[0].savings.unwrap().to_string(), "50.00%");
    }

    #[tokio::test]
    async fn open_rejects_missing_file_and_bad_quality() {
        let f = fixture();
        let err = open_image(&f.engine, f.tmp.path().join("nope.png"), FormatParameters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let source = write_source(f.tmp.path(), "photo.png", 100);
        let mut params = FormatParameters::default();
        params.set(EncoderParameters::Jpeg(CjpegParams { quality: 0 }));
        let err = open_image(&f.engine, &source, params).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn burst_of_changes_compresses_once() {
        let mut f = fixture();
        let source = write_source(f.tmp.path(), "photo.png", 1000);
        let id = open_image(&f.engine, &source, FormatParameters::default()).await.unwrap();
        initial_events(&mut f.events).await;

        for quality in [10u8, 20, 30, 40, 50] {
            update_parameters(&f.engine, id, EncoderParameters::Webp(CwebpParams { quality, ..Default::default() }))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let event = next_event(&mut f.events).await;
        assert_eq!(event.format, FormatId::Webp);
        assert_eq!(event.generation, Generation(2));
        assert_eq!(event.artifact_size, Some(500));

        tokio::time::sleep(Duration::from_millis(200)).await;
        f.engine.settled().await;
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_for_unknown_session_fails() {
        let f = fixture();
        let err = update_parameters(&f.engine, SessionId(42), EncoderParameters::default_for(FormatId::Png))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSession(SessionId(42))));
    }

    #[tokio::test]
    async fn save_writes_backup_and_every_format() {
        let mut f = fixture();
        let source = write_source(f.tmp.path(), "photo.jpg", 1000);
        let id = open_image(&f.engine, &source, FormatParameters::default()).await.unwrap();
        initial_events(&mut f.events).await;

        let report = save_image(&f.engine, id, None).await.unwrap();
        assert!(report.backup_created);

        let dir = f.tmp.path();
        assert_eq!(std::fs::metadata(dir.join("photo.original.jpg")).unwrap().len(), 1000);
        assert_eq!(std::fs::metadata(dir.join("photo.png")).unwrap().len(), 500);
        assert_eq!(std::fs::metadata(dir.join("photo.webp")).unwrap().len(), 750);
        assert_eq!(std::fs::metadata(dir.join("photo.jpg")).unwrap().len(), 750);

        // saving again keeps the first backup of the real original
        let report = save_image(&f.engine, id, Some(&[FormatId::Png])).await.unwrap();
        assert!(!report.backup_created);
        assert_eq!(std::fs::metadata(dir.join("photo.original.jpg")).unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn recompression_after_a_colliding_save_reads_the_backup() {
        let mut f = fixture();
        let source = write_source(f.tmp.path(), "photo.jpg", 1000);
        let id = open_image(&f.engine, &source, FormatParameters::default()).await.unwrap();
        initial_events(&mut f.events).await;

        let report = save_image(&f.engine, id, None).await.unwrap();
        assert!(report.original_replaced);
        assert_eq!(std::fs::metadata(&source).unwrap().len(), 750);

        // quality 100 keeps every byte of whatever the encoder reads
        update_parameters(&f.engine, id, EncoderParameters::Jpeg(CjpegParams { quality: 100 }))
            .await
            .unwrap();
        let event = next_event(&mut f.events).await;
        assert_eq!(event.artifact_size, Some(1000));
        assert_eq!(event.savings.unwrap().to_string(), "100.00%");
        assert!(event.warning);

        let snapshot = session_snapshot(&f.engine, id).await.unwrap();
        assert_eq!(snapshot.original_path, source);
        assert_eq!(snapshot.original_size, 1000);
    }

    #[tokio::test]
    async fn save_without_collision_keeps_reading_the_original() {
        let mut f = fixture();
        let source = write_source(f.tmp.path(), "photo.jpeg", 1000);
        let id = open_image(&f.engine, &source, FormatParameters::default()).await.unwrap();
        initial_events(&mut f.events).await;

        let report = save_image(&f.engine, id, None).await.unwrap();
        assert!(!report.original_replaced);
        assert_eq!(std::fs::metadata(&source).unwrap().len(), 1000);
        assert!(f.tmp.path().join("photo.jpg").exists());
    }

    #[tokio::test]
    async fn snapshot_is_pending_during_the_quiet_period() {
        let mut f = fixture();
        let source = write_source(f.tmp.path(), "photo.png", 1000);
        let id = open_image(&f.engine, &source, FormatParameters::default()).await.unwrap();
        initial_events(&mut f.events).await;

        update_parameters(&f.engine, id, EncoderParameters::Jpeg(CjpegParams { quality: 20 }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = session_snapshot(&f.engine, id).await.unwrap();
        assert!(snapshot.format(FormatId::Jpeg).unwrap().pending);
        assert!(!snapshot.format(FormatId::Png).unwrap().pending);
        // the previous result stays visible until the new one is accepted
        let shown = snapshot.format(FormatId::Jpeg).unwrap().result.as_ref().unwrap();
        assert_eq!(shown.generation, Generation(1));

        let event = next_event(&mut f.events).await;
        assert_eq!(event.generation, Generation(2));
        f.engine.settled().await;
        let snapshot = session_snapshot(&f.engine, id).await.unwrap();
        assert!(!snapshot.format(FormatId::Jpeg).unwrap().pending);
    }

    #[tokio::test]
    async fn close_right_after_a_change_leaves_no_timer() {
        let mut f = fixture();
        let source = write_source(f.tmp.path(), "photo.png", 1000);
        let id = open_image(&f.engine, &source, FormatParameters::default()).await.unwrap();
        initial_events(&mut f.events).await;

        update_parameters(&f.engine, id, EncoderParameters::Jpeg(CjpegParams { quality: 20 }))
            .await
            .unwrap();
        close_image(&f.engine, id).await.unwrap();
        assert!(f.engine.scheduler.status(id).await.unwrap().is_empty());

        let err = update_parameters(&f.engine, id, EncoderParameters::Jpeg(CjpegParams { quality: 30 }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSession(_)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        f.engine.settled().await;
        assert!(f.events.try_recv().is_err());
        assert_eq!(std::fs::read_dir(f.engine.temp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn close_deletes_artifacts_and_forgets_the_session() {
        let mut f = fixture();
        let source = write_source(f.tmp.path(), "photo.png", 1000);
        let id = open_image(&f.engine, &source, FormatParameters::default()).await.unwrap();
        initial_events(&mut f.events).await;

        close_image(&f.engine, id).await.unwrap();
        assert_eq!(std::fs::read_dir(f.engine.temp_dir()).unwrap().count(), 0);
        assert!(matches!(
            session_snapshot(&f.engine, id).await.unwrap_err(),
            EngineError::UnknownSession(_)
        ));
        assert!(source.exists());
    }

    #[tokio::test]
    async fn operations_fail_after_shutdown() {
        let f = fixture();
        let source = write_source(f.tmp.path(), "photo.png", 1000);
        shutdown(&f.engine).await;

        let err = open_image(&f.engine, &source, FormatParameters::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Shutdown));
    }
}
