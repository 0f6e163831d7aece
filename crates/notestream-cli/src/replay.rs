//! Replay of recorded server logs.
//!
//! A log holds one server message per line, as received over the wire.
//! A line may carry an extra `delay_ms` field; it is waited out before the
//! message is delivered. Blank lines and lines starting with `#` are skipped.

use anyhow::{Context, Result};
use notestream_core::{LoggingObserver, LoggingVoiceFactory, PlaybackScheduler};
use notestream_session::{
    Config, ConnectionTracker, JsonDirStore, RecordingTransport, ServerMessage, SessionController,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// One recorded server message.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMessage {
    pub line: usize,
    pub delay: Option<Duration>,
    pub message: ServerMessage,
}

/// Parse a recorded log. Undecodable lines are reported and skipped.
pub fn parse_log(text: &str) -> Vec<RecordedMessage> {
    let mut messages = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("line {}: not JSON ({}), skipped", line, e);
                continue;
            }
        };
        let delay = value
            .get("delay_ms")
            .and_then(serde_json::Value::as_u64)
            .map(Duration::from_millis);
        match serde_json::from_value::<ServerMessage>(value) {
            Ok(message) => messages.push(RecordedMessage {
                line,
                delay,
                message,
            }),
            Err(e) => log::warn!("line {}: not a server message ({}), skipped", line, e),
        }
    }
    messages
}

/// Options of the `replay` subcommand.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub file: PathBuf,
    pub prompt: String,
    pub speed: f64,
    pub interval: Duration,
    pub keep_ids: bool,
    pub save: bool,
    pub disconnect_after: Option<usize>,
}

/// Replay a recorded log through a live controller until playback ends.
pub async fn run(options: ReplayOptions, config: Config) -> Result<()> {
    if !(options.speed.is_finite() && options.speed > 0.0) {
        anyhow::bail!("Speed must be a positive number, got {}", options.speed);
    }
    let text = tokio::fs::read_to_string(&options.file)
        .await
        .with_context(|| format!("Failed to read {}", options.file.display()))?;
    let recorded = parse_log(&text);
    if recorded.is_empty() {
        anyhow::bail!("No server messages in {}", options.file.display());
    }
    log::info!("replaying {} messages from {}", recorded.len(), options.file.display());

    let mut scheduler = PlaybackScheduler::new()
        .with_voice_factory(Box::new(LoggingVoiceFactory::new()))
        .with_observer(Box::new(LoggingObserver::default()));
    scheduler.set_auto_play(config.playback.auto_play);
    scheduler.set_loop(config.playback.loop_playback);

    let mut controller =
        SessionController::new(RecordingTransport::new(), &config).with_scheduler(scheduler);
    if options.save {
        let dir = Config::gallery_dir()?;
        controller = controller.with_store(Box::new(JsonDirStore::new(dir)));
    }

    let mut tracker = ConnectionTracker::new(config.reconnect.policy());
    let start = Instant::now();
    tracker.connected();
    controller.on_connected(start);
    controller
        .compose(&options.prompt, false, start)
        .context("Failed to start the session")?;

    let scale = |d: Duration| d.div_f64(options.speed);
    let mut pending = recorded.into_iter().peekable();
    let mut delivered = 0usize;
    let mut next_message_at = pending
        .peek()
        .map(|m| start + scale(m.delay.unwrap_or(Duration::ZERO)));
    let mut reconnect_at: Option<Instant> = None;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let wake = [controller.next_deadline(), next_message_at, reconnect_at]
            .into_iter()
            .flatten()
            .min();
        let Some(wake) = wake else {
            break;
        };

        tokio::select! {
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(wake)) => {}
            _ = &mut ctrl_c => {
                log::info!("interrupted");
                if let Err(e) = controller.cancel() {
                    log::debug!("cancel not sent: {}", e);
                }
                controller.stop(Instant::now());
                break;
            }
        }
        let now = Instant::now();

        if reconnect_at.is_some_and(|at| at <= now) {
            reconnect_at = None;
            controller.transport_mut().set_connected(true);
            tracker.connected();
            controller.on_connected(now);
        }

        if next_message_at.is_some_and(|at| at <= now) {
            if let Some(mut recorded) = pending.next() {
                if !options.keep_ids {
                    if let Some(active) = controller.active_id().map(str::to_string) {
                        recorded.message.set_request_id(&active);
                    }
                }
                log::trace!("line {}: {}", recorded.line, recorded.message.kind());
                controller.handle_message(recorded.message, now);
                delivered += 1;
            }
            next_message_at = pending
                .peek()
                .map(|m| now + scale(m.delay.unwrap_or(options.interval)));

            if options.disconnect_after == Some(delivered) {
                controller.transport_mut().set_connected(false);
                controller.on_disconnected();
                tracker.disconnected();
                reconnect_at = Some(now + tracker.next_attempt());
            }
        }

        controller.poll(now);
        for message in controller.transport_mut().take_sent() {
            match message.to_json() {
                Ok(json) => log::debug!("-> {}", json),
                Err(e) => log::debug!("-> {:?} ({})", message, e),
            }
        }

        let finished = next_message_at.is_none()
            && reconnect_at.is_none()
            && !controller.observed_state().is_busy()
            && !controller.scheduler().is_playing();
        if finished {
            break;
        }
    }

    let scheduler = controller.scheduler();
    println!(
        "{} notes, {:.1}s, bank {}",
        scheduler.notes().len(),
        scheduler.total_duration_ms() as f64 / 1000.0,
        controller.bank().unwrap_or(notestream_core::DEFAULT_BANK)
    );
    Ok(())
}
