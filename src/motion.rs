// Closed-loop control of the linear stage behind the PLC.
//
// The ladder program exposes no motion-complete signal. A move stores a
// distance into the target register pair and raises a trigger coil;
// completion is inferred from position feedback converging on the computed
// target, bounded by a deadline derived from the commanded speed.
//
// Physical values are millimeters, mm/s and mm/s2. The PLC stores each as
// a signed 32-bit tick count (0.005 mm per tick) split low word first
// across two sequential registers.

use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::constants::{
    ACCEL_REGISTER, DEFAULT_PC, DEFAULT_STATION, HOME_TRIGGER_COIL, MOVE_DISTANCE_REGISTER,
    MOVE_TRIGGER_COIL, POSITION_REGISTER, SPEED_REGISTER, TICKS_PER_MM,
};
use crate::error::FxError;
use crate::link::FxLink;

/// Upper bound accepted for commanded speed (mm/s) and acceleration
/// (mm/s²); the drive rejects anything past this itself.
const MAX_SETTING: f64 = 1000.0;

/// Motion-layer settings. Defaults describe the stage this controller was
/// written against; tests shrink the intervals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Station number of the PLC on the serial line.
    pub station: u8,
    /// PC (CPU) number; `0xFF` addresses the connected CPU.
    pub pc: u8,
    /// Lower travel limit in mm.
    pub x_min: f64,
    /// Upper travel limit in mm.
    pub x_max: f64,
    /// Position poll cadence during a move, in milliseconds.
    pub poll_interval_ms: u64,
    /// How long feedback must hold the target before a move counts as
    /// settled, in milliseconds.
    pub settle_ms: u64,
    /// Homing deadline, in milliseconds.
    pub reset_timeout_ms: u64,
    /// Hold time after the axis first reads zero during homing, in
    /// milliseconds.
    pub reset_settle_ms: u64,
    /// Position agreement window for convergence and verify checks, in mm.
    pub tolerance: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            station: DEFAULT_STATION,
            pc: DEFAULT_PC,
            x_min: 0.0,
            x_max: 631.0,
            poll_interval_ms: 50,
            settle_ms: 1000,
            reset_timeout_ms: 20_000,
            reset_settle_ms: 2000,
            tolerance: 0.001,
        }
    }
}

/// Round a physical value to the nearest representable tick count.
fn to_ticks(value: f64) -> i32 {
    (value * TICKS_PER_MM).round() as i32
}

/// The physical value of a tick count.
fn from_ticks(ticks: i32) -> f64 {
    f64::from(ticks) / TICKS_PER_MM
}

/// Split a tick count into register words, low word first.
fn split_words(ticks: i32) -> [u16; 2] {
    let raw = ticks as u32;
    [(raw & 0xFFFF) as u16, (raw >> 16) as u16]
}

/// Reassemble a tick count from a register pair, sign extended.
fn join_words(low: u16, high: u16) -> i32 {
    ((u32::from(high) << 16) | u32::from(low)) as i32
}

/// Clamp a relative tick count so the absolute target stays inside the
/// travel envelope.
///
/// The envelope bounds are rounded toward the interior, so a clamped
/// target can never overshoot a limit that does not fall exactly on a
/// tick. A position already outside the envelope clamps back to the
/// nearest limit.
fn clamp_travel_ticks(
    ticks: i32,
    position_ticks: i32,
    x_min: f64,
    x_max: f64,
) -> Result<i32, FxError> {
    let high = (x_max * TICKS_PER_MM).floor() as i32;
    let low = (x_min * TICKS_PER_MM).ceil() as i32;
    if low > high {
        return Err(FxError::OutOfRange {
            name: "travel envelope",
            value: x_min,
            min: x_min,
            max: x_max,
        });
    }
    Ok(ticks.clamp(
        low.saturating_sub(position_ticks),
        high.saturating_sub(position_ticks),
    ))
}

/// Phases of a command-and-poll move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MovePhase {
    /// Planned; nothing sent to the PLC yet.
    Idle,
    /// Distance stored and trigger raised; no feedback sampled yet.
    Triggered,
    /// Sampling position until convergence or the deadline.
    Polling,
    /// Feedback held the target through the settle window.
    Settled,
    /// The deadline passed without convergence.
    TimedOut,
}

/// One in-flight relative move.
///
/// Holds no reference to the controller: the caller passes the controller
/// back in at every [`MotionController::poll_move`], so one thread can
/// interleave moves on several axes. Dropping a sequence abandons the wait
/// without stopping the PLC-side motion; [`MotionController::abort_move`]
/// also drops the trigger.
#[derive(Debug)]
pub struct MoveSequence {
    phase: MovePhase,
    start: f64,
    target: f64,
    distance_ticks: i32,
    travel_budget: Duration,
    triggered_at: Option<Instant>,
    deadline: Option<Instant>,
    converged_at: Option<Instant>,
    last_position: f64,
}

impl MoveSequence {
    /// Current phase of the move.
    pub fn phase(&self) -> MovePhase {
        self.phase
    }

    /// Position when the move was planned, in mm.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Absolute target position, in mm, after quantization and clamping.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Most recent position sample, in mm.
    pub fn last_position(&self) -> f64 {
        self.last_position
    }

    /// Whether the move reached [`MovePhase::Settled`] or
    /// [`MovePhase::TimedOut`].
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, MovePhase::Settled | MovePhase::TimedOut)
    }
}

/// Closed-loop controller for the linear stage behind an [`FxLink`].
///
/// Holds no cached physical state: every query goes to the PLC, so the
/// controller cannot disagree with the hardware after an external move.
pub struct MotionController {
    link: FxLink,
    config: MotionConfig,
}

impl MotionController {
    /// Wrap a connected link with the default stage settings.
    pub fn new(link: FxLink) -> Self {
        Self::with_config(link, MotionConfig::default())
    }

    /// Wrap a connected link with explicit settings.
    pub fn with_config(link: FxLink, config: MotionConfig) -> Self {
        Self { link, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// The underlying link, for raw register access alongside motion.
    pub fn link(&mut self) -> &mut FxLink {
        &mut self.link
    }

    /// Release the underlying link.
    pub fn into_link(self) -> FxLink {
        self.link
    }

    /// Current axis position in mm, read fresh from the PLC.
    pub fn position(&mut self) -> Result<f64, FxError> {
        self.read_pair(POSITION_REGISTER)
    }

    /// Commanded axis speed in mm/s, read fresh from the PLC.
    pub fn speed(&mut self) -> Result<f64, FxError> {
        self.read_pair(SPEED_REGISTER)
    }

    /// Set the axis speed in mm/s and verify the register took it.
    ///
    /// The value is quantized to 0.005 steps before writing; verification
    /// compares the readback against the quantized value.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), FxError> {
        self.write_verified("speed", SPEED_REGISTER, speed)
    }

    /// Set the axis acceleration in mm/s² and verify the register took it.
    pub fn set_accel(&mut self, accel: f64) -> Result<(), FxError> {
        self.write_verified("accel", ACCEL_REGISTER, accel)
    }

    /// Plan a relative move of `distance` mm without touching the trigger.
    ///
    /// Reads the current speed and position, quantizes the distance to
    /// ticks and clamps it so the target stays inside the travel envelope.
    /// The returned sequence is [`MovePhase::Idle`]; the first
    /// [`poll_move`](Self::poll_move) stores the distance and raises the
    /// trigger. The deadline budget is twice the nominal travel time.
    pub fn plan_move(&mut self, distance: f64) -> Result<MoveSequence, FxError> {
        let span = self.config.x_max - self.config.x_min;
        if !distance.is_finite() {
            return Err(FxError::OutOfRange {
                name: "distance",
                value: distance,
                min: -span,
                max: span,
            });
        }
        let speed = self.speed()?;
        if !speed.is_finite() || speed < from_ticks(1) {
            // A zero or negative speed would make the deadline meaningless.
            return Err(FxError::OutOfRange {
                name: "speed",
                value: speed,
                min: from_ticks(1),
                max: MAX_SETTING,
            });
        }
        let start = self.position()?;
        let start_ticks = to_ticks(start);
        let distance_ticks = clamp_travel_ticks(
            to_ticks(distance),
            start_ticks,
            self.config.x_min,
            self.config.x_max,
        )?;
        let target = from_ticks(start_ticks.saturating_add(distance_ticks));
        let travel = from_ticks(distance_ticks);
        let travel_budget = Duration::from_secs_f64(2.0 * (travel / speed).abs());
        debug!(distance = travel, target, budget = ?travel_budget, "move planned");
        Ok(MoveSequence {
            phase: MovePhase::Idle,
            start,
            target,
            distance_ticks,
            travel_budget,
            triggered_at: None,
            deadline: None,
            converged_at: None,
            last_position: start,
        })
    }

    /// Advance a move by one step.
    ///
    /// On an [`MovePhase::Idle`] sequence this stores the distance, raises
    /// the trigger and starts the deadline clock. On a running sequence it
    /// samples position once and updates the phase; terminal sequences are
    /// left untouched. An `Err` leaves the trigger raised, so follow with
    /// [`abort_move`](Self::abort_move) or [`finish_move`](Self::finish_move).
    pub fn poll_move(&mut self, seq: &mut MoveSequence) -> Result<MovePhase, FxError> {
        match seq.phase {
            MovePhase::Idle => {
                self.write_pair(MOVE_DISTANCE_REGISTER, seq.distance_ticks)?;
                self.set_coil(MOVE_TRIGGER_COIL, true)?;
                let now = Instant::now();
                seq.triggered_at = Some(now);
                seq.deadline = Some(now + seq.travel_budget);
                seq.phase = MovePhase::Triggered;
                info!(
                    distance = from_ticks(seq.distance_ticks),
                    target = seq.target,
                    "move triggered"
                );
            }
            MovePhase::Triggered | MovePhase::Polling => {
                seq.phase = MovePhase::Polling;
                let position = self.position()?;
                seq.last_position = position;
                let now = Instant::now();
                if (position - seq.target).abs() < self.config.tolerance {
                    let since = *seq.converged_at.get_or_insert(now);
                    if now.duration_since(since) >= Duration::from_millis(self.config.settle_ms) {
                        seq.phase = MovePhase::Settled;
                        debug!(position, "move settled");
                    }
                } else {
                    seq.converged_at = None;
                    if seq.deadline.is_some_and(|deadline| now >= deadline) {
                        seq.phase = MovePhase::TimedOut;
                        warn!(position, target = seq.target, "move deadline passed");
                    }
                }
            }
            MovePhase::Settled | MovePhase::TimedOut => {}
        }
        Ok(seq.phase)
    }

    /// Close out a move: drop the trigger, then judge the final position.
    ///
    /// A [`MovePhase::TimedOut`] sequence reports [`FxError::Timeout`]; any
    /// other phase is judged by one final position read against the target.
    /// Finishing a sequence early is therefore an abort with verification.
    pub fn finish_move(&mut self, seq: MoveSequence) -> Result<f64, FxError> {
        self.set_coil(MOVE_TRIGGER_COIL, false)?;
        let position = self.position()?;
        let elapsed = seq
            .triggered_at
            .map(|started| started.elapsed())
            .unwrap_or_default();
        if seq.phase == MovePhase::TimedOut {
            return Err(FxError::Timeout { elapsed, position });
        }
        if (position - seq.target).abs() < self.config.tolerance {
            info!(position, elapsed = ?elapsed, "move complete");
            Ok(position)
        } else {
            warn!(position, target = seq.target, "final position check failed");
            Err(FxError::Tolerance {
                wrote: seq.target,
                read: position,
            })
        }
    }

    /// Abandon a move: drop the trigger without judging an outcome.
    ///
    /// The axis decelerates under ladder control; only the wait is
    /// cancelled.
    pub fn abort_move(&mut self, seq: MoveSequence) -> Result<(), FxError> {
        debug!(phase = %seq.phase, position = seq.last_position, "move aborted");
        self.set_coil(MOVE_TRIGGER_COIL, false)
    }

    /// Move the axis by `distance` mm and block until it settles.
    ///
    /// Returns the final position read back from the PLC. The thread
    /// sleeps between polls; use [`plan_move`](Self::plan_move) and
    /// [`poll_move`](Self::poll_move) directly to wait without dedicating
    /// a thread.
    pub fn move_by(&mut self, distance: f64) -> Result<f64, FxError> {
        let mut seq = self.plan_move(distance)?;
        while !seq.is_terminal() {
            if let Err(e) = self.poll_move(&mut seq) {
                // Do not leave the trigger raised behind a failed poll.
                let _ = self.set_coil(MOVE_TRIGGER_COIL, false);
                return Err(e);
            }
            if !seq.is_terminal() {
                thread::sleep(Duration::from_millis(self.config.poll_interval_ms));
            }
        }
        self.finish_move(seq)
    }

    /// Move the axis to the absolute position `target` mm.
    ///
    /// Implemented as a relative move from a fresh position read; returns
    /// the final position, which the envelope clamp may have stopped short
    /// of `target`.
    pub fn move_to(&mut self, target: f64) -> Result<f64, FxError> {
        let current = self.position()?;
        self.move_by(target - current)
    }

    /// Home the axis: raise the homing coil and wait for zero.
    ///
    /// The ladder program clears the coil itself once the cycle runs, so
    /// it is never written low from here. Position must read exactly zero;
    /// homing defines the origin, so there is no tolerance window.
    pub fn reset_position(&mut self) -> Result<(), FxError> {
        info!("homing started");
        self.set_coil(HOME_TRIGGER_COIL, true)?;
        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.config.reset_timeout_ms);
        loop {
            let position = self.position()?;
            // Zero ticks reads back as exactly 0.0.
            if position == 0.0 {
                thread::sleep(Duration::from_millis(self.config.reset_settle_ms));
                break;
            }
            if Instant::now() >= deadline {
                warn!(position, "homing deadline passed");
                break;
            }
            thread::sleep(Duration::from_millis(self.config.poll_interval_ms));
        }
        let position = self.position()?;
        if position == 0.0 {
            info!("axis homed");
            Ok(())
        } else {
            Err(FxError::Timeout {
                elapsed: started.elapsed(),
                position,
            })
        }
    }

    /// Read a 32-bit register pair as a physical value.
    fn read_pair(&mut self, device: &str) -> Result<f64, FxError> {
        let words = self
            .link
            .read(self.config.station, self.config.pc, device, 2, false)?;
        if words.len() < 2 {
            return Err(FxError::Payload(format!(
                "expected 2 words from {device}, got {}",
                words.len()
            )));
        }
        Ok(from_ticks(join_words(words[0], words[1])))
    }

    /// Write a tick count across a 32-bit register pair.
    fn write_pair(&mut self, device: &str, ticks: i32) -> Result<(), FxError> {
        let words = split_words(ticks);
        self.link
            .word_write(self.config.station, self.config.pc, device, &words)
    }

    fn set_coil(&mut self, device: &str, level: bool) -> Result<(), FxError> {
        self.link
            .bit_write(self.config.station, self.config.pc, device, &[level])
    }

    fn write_verified(
        &mut self,
        name: &'static str,
        device: &str,
        value: f64,
    ) -> Result<(), FxError> {
        if !(0.0..=MAX_SETTING).contains(&value) {
            return Err(FxError::OutOfRange {
                name,
                value,
                min: 0.0,
                max: MAX_SETTING,
            });
        }
        let ticks = to_ticks(value);
        self.write_pair(device, ticks)?;
        let wrote = from_ticks(ticks);
        let read = self.read_pair(device)?;
        if (read - wrote).abs() >= self.config.tolerance {
            warn!(name, wrote, read, "register verify failed");
            return Err(FxError::Tolerance { wrote, read });
        }
        debug!(name, value = wrote, "register set");
        Ok(())
    }
}
