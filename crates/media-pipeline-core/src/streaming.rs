//! Per-connection streaming session and backpressure decisions
//!
//! A [`StreamingSession`] is owned by exactly one connection's receive loop
//! and is dropped when the connection closes; a reconnect starts a new
//! session with fresh counters. The decision functions are pure functions
//! of the session counters and the measured processing time.

use crate::config::{BackpressureConfig, DEFAULT_TARGET_FPS};
use crate::error::{ConfigError, PipelineError};
use crate::executor::DagExecutor;
use crate::plugin::Payload;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Frame interval at the default 30 FPS budget (~33.33 ms)
pub const TARGET_FRAME_INTERVAL_MS: f64 = 1000.0 / DEFAULT_TARGET_FPS;

/// Fraction of received frames that were dropped; 0.0 before any frame
#[must_use]
pub fn drop_rate(dropped_frames: u64, frame_index: u64) -> f64 {
    if frame_index == 0 {
        0.0
    } else {
        dropped_frames as f64 / frame_index as f64
    }
}

/// Drop when the frame blew the 30 FPS budget or the drop rate is already
/// above threshold. Either condition alone is enough.
#[must_use]
pub fn should_drop(processing_time_ms: f64, drop_rate: f64, drop_threshold: f64) -> bool {
    should_drop_with_budget(
        processing_time_ms,
        drop_rate,
        drop_threshold,
        TARGET_FRAME_INTERVAL_MS,
    )
}

/// [`should_drop`] with an explicit frame budget
#[must_use]
pub fn should_drop_with_budget(
    processing_time_ms: f64,
    drop_rate: f64,
    drop_threshold: f64,
    frame_budget_ms: f64,
) -> bool {
    processing_time_ms > frame_budget_ms || drop_rate > drop_threshold
}

/// Signal the client to slow down once the drop rate passes the threshold
#[must_use]
pub fn should_slow_down(drop_rate: f64, slowdown_threshold: f64) -> bool {
    drop_rate > slowdown_threshold
}

/// Informational session health label; never used to gate decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureState {
    Normal,
    Degraded,
}

/// Decision for one received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDecision {
    pub drop: bool,
    pub slow_down: bool,
}

/// What happened to a frame handed to [`StreamingSession::process_frame`]
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    Dropped {
        frame_index: u64,
        slow_down: bool,
    },
    Processed {
        frame_index: u64,
        result: Payload,
        processing_time_ms: f64,
        slow_down: bool,
    },
}

impl FrameOutcome {
    pub fn slow_down(&self) -> bool {
        match self {
            Self::Dropped { slow_down, .. } | Self::Processed { slow_down, .. } => *slow_down,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped { .. })
    }
}

/// Snapshot of a session's counters, suitable for pushing to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub pipeline_id: String,
    pub frame_index: u64,
    pub dropped_frames: u64,
    pub drop_rate: f64,
    pub backpressure_state: BackpressureState,
}

/// Flow-control state for one live connection
#[derive(Debug)]
pub struct StreamingSession {
    session_id: Uuid,
    pipeline_id: String,
    frame_index: u64,
    dropped_frames: u64,
    last_processed_ts: Option<Instant>,
    /// Latency of the most recently processed frame, reset after a drop
    last_processing_ms: f64,
    backpressure_state: BackpressureState,
    config: BackpressureConfig,
}

impl StreamingSession {
    /// Open a session bound to `pipeline_id`
    pub fn new(pipeline_id: impl Into<String>, config: BackpressureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let session = Self {
            session_id: Uuid::new_v4(),
            pipeline_id: pipeline_id.into(),
            frame_index: 0,
            dropped_frames: 0,
            last_processed_ts: None,
            last_processing_ms: 0.0,
            backpressure_state: BackpressureState::Normal,
            config,
        };
        info!(
            "Opened streaming session {} for pipeline '{}'",
            session.session_id, session.pipeline_id
        );
        Ok(session)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn last_processed_ts(&self) -> Option<Instant> {
        self.last_processed_ts
    }

    pub fn backpressure_state(&self) -> BackpressureState {
        self.backpressure_state
    }

    pub fn config(&self) -> &BackpressureConfig {
        &self.config
    }

    pub fn drop_rate(&self) -> f64 {
        drop_rate(self.dropped_frames, self.frame_index)
    }

    /// Count a received frame
    pub fn increment_frame(&mut self) {
        self.frame_index += 1;
    }

    /// Count a dropped frame
    pub fn mark_drop(&mut self) {
        self.dropped_frames += 1;
    }

    /// Evaluate both decisions from the current counters without mutating them
    #[must_use]
    pub fn decide(&self, processing_time_ms: f64) -> FrameDecision {
        let rate = self.drop_rate();
        FrameDecision {
            drop: should_drop_with_budget(
                processing_time_ms,
                rate,
                self.config.drop_threshold,
                self.config.frame_budget_ms(),
            ),
            slow_down: should_slow_down(rate, self.config.slowdown_threshold),
        }
    }

    /// Register a received frame and decide its fate.
    ///
    /// The frame is counted first, then both decisions are computed from the
    /// updated counters. A dropped frame increments `dropped_frames`.
    pub fn on_frame_received(&mut self, processing_time_ms: f64) -> FrameDecision {
        self.increment_frame();
        let decision = self.decide(processing_time_ms);
        if decision.drop {
            self.mark_drop();
        }
        self.backpressure_state = if decision.drop || decision.slow_down {
            BackpressureState::Degraded
        } else {
            BackpressureState::Normal
        };
        decision
    }

    /// Admit a frame through backpressure and, if admitted, run it through
    /// the bound pipeline.
    ///
    /// The decision uses the latency of the previous processed frame. A
    /// dropped frame never reaches the executor and clears that latency so
    /// the next frame is judged on the drop rate alone.
    pub async fn process_frame(
        &mut self,
        executor: &DagExecutor,
        payload: Payload,
    ) -> Result<FrameOutcome, PipelineError> {
        let decision = self.on_frame_received(self.last_processing_ms);
        let frame_index = self.frame_index;

        if decision.drop {
            self.last_processing_ms = 0.0;
            warn!(
                "Session {}: dropped frame {} (drop rate {:.2}, slow down: {})",
                self.session_id,
                frame_index,
                self.drop_rate(),
                decision.slow_down
            );
            return Ok(FrameOutcome::Dropped {
                frame_index,
                slow_down: decision.slow_down,
            });
        }

        if decision.slow_down {
            warn!(
                "Session {}: drop rate {:.2} above slow-down threshold",
                self.session_id,
                self.drop_rate()
            );
        }

        let start = Instant::now();
        let result = executor.run_pipeline(&self.pipeline_id, payload).await?;
        let processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.last_processing_ms = processing_time_ms;
        self.last_processed_ts = Some(Instant::now());
        debug!(
            "Session {}: frame {} processed in {:.1}ms",
            self.session_id, frame_index, processing_time_ms
        );

        Ok(FrameOutcome::Processed {
            frame_index,
            result,
            processing_time_ms,
            slow_down: decision.slow_down,
        })
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id,
            pipeline_id: self.pipeline_id.clone(),
            frame_index: self.frame_index,
            dropped_frames: self.dropped_frames,
            drop_rate: self.drop_rate(),
            backpressure_state: self.backpressure_state,
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        info!(
            "Closed streaming session {} ({} frames, {} dropped)",
            self.session_id, self.frame_index, self.dropped_frames
        );
    }
}
