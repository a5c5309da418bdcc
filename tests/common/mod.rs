//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use fxlink::codec::{byte_to_ascii_hex, word_to_ascii_hex};
#[allow(unused_imports)]
pub use fxlink::error::FxError;
#[allow(unused_imports)]
pub use fxlink::link::FxLink;
#[allow(unused_imports)]
pub use fxlink::motion::{MotionConfig, MotionController, MovePhase};
#[allow(unused_imports)]
pub use fxlink::transport::Transport;

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Response deadline for test links; long enough for a scripted reply,
/// short enough that silence tests stay quick.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(50);

/// Install a subscriber once so `RUST_LOG=trace cargo test` shows frames.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Motion settings with intervals shrunk to keep tests fast.
#[allow(dead_code)]
pub fn fast_motion_config() -> MotionConfig {
    MotionConfig {
        poll_interval_ms: 1,
        settle_ms: 0,
        reset_timeout_ms: 200,
        reset_settle_ms: 0,
        ..MotionConfig::default()
    }
}

/// Build a framed read response: STX + station + pc + hex words + ETX.
#[allow(dead_code)]
pub fn word_response(station: u8, pc: u8, words: &[u16]) -> Vec<u8> {
    let mut frame = vec![0x02];
    frame.extend_from_slice(&byte_to_ascii_hex(station));
    frame.extend_from_slice(&byte_to_ascii_hex(pc));
    for &word in words {
        frame.extend_from_slice(&word_to_ascii_hex(word));
    }
    frame.push(0x03);
    frame
}

/// Build a framed bit-read response from a pattern such as `"10101100"`.
#[allow(dead_code)]
pub fn bit_response(station: u8, pc: u8, pattern: &str) -> Vec<u8> {
    let mut frame = vec![0x02];
    frame.extend_from_slice(&byte_to_ascii_hex(station));
    frame.extend_from_slice(&byte_to_ascii_hex(pc));
    frame.extend_from_slice(pattern.as_bytes());
    frame.push(0x03);
    frame
}

/// The short unframed echo a PLC answers a write command with.
#[allow(dead_code)]
pub fn ack_bytes(station: u8, pc: u8) -> Vec<u8> {
    let mut reply = vec![0x06];
    reply.extend_from_slice(&byte_to_ascii_hex(station));
    reply.extend_from_slice(&byte_to_ascii_hex(pc));
    reply
}

#[derive(Default)]
struct MockState {
    written: Vec<Vec<u8>>,
    responses: VecDeque<Vec<u8>>,
    reads: usize,
    flushes: usize,
    accept_at_most: Option<usize>,
    closed: bool,
}

/// Scripted transport: records written frames, replays queued response
/// chunks, and injects write/availability failures. Clones share state, so
/// a test can keep one handle while the link owns the other.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one complete reply, delivered in a single read.
    pub fn reply_with(self, bytes: &[u8]) -> Self {
        self.state
            .lock()
            .expect("mock state")
            .responses
            .push_back(bytes.to_vec());
        self
    }

    /// Queue a reply split across several reads.
    pub fn reply_chunks(self, chunks: &[&[u8]]) -> Self {
        {
            let mut state = self.state.lock().expect("mock state");
            for chunk in chunks {
                state.responses.push_back(chunk.to_vec());
            }
        }
        self
    }

    /// Accept at most `bytes` of every written frame.
    pub fn accept_at_most(self, bytes: usize) -> Self {
        self.state.lock().expect("mock state").accept_at_most = Some(bytes);
        self
    }

    /// Report the port as closed.
    pub fn closed(self) -> Self {
        self.state.lock().expect("mock state").closed = true;
        self
    }

    /// A link driving this transport.
    pub fn link(&self) -> FxLink {
        FxLink::with_transport(Box::new(self.clone()), TEST_TIMEOUT)
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().expect("mock state").written.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().expect("mock state").reads
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().expect("mock state").flushes
    }
}

impl Transport for MockTransport {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().expect("mock state");
        state.written.push(frame.to_vec());
        let accepted = state.accept_at_most.unwrap_or(frame.len()).min(frame.len());
        Ok(accepted)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().expect("mock state");
        state.reads += 1;
        match state.responses.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    state.responses.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.state.lock().expect("mock state").flushes += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.state.lock().expect("mock state").closed
    }
}

struct PlcState {
    d: HashMap<u16, u16>,
    m: HashMap<u16, bool>,
    position_ticks: i32,
    goal_ticks: Option<i32>,
    step_ticks: i32,
    stalled: bool,
    drop_writes_to: Option<u16>,
    mute: bool,
    pending: Vec<u8>,
}

impl Default for PlcState {
    fn default() -> Self {
        Self {
            d: HashMap::new(),
            m: HashMap::new(),
            position_ticks: 0,
            goal_ticks: None,
            // Teleport to the goal on the next position sample.
            step_ticks: i32::MAX,
            stalled: false,
            drop_writes_to: None,
            mute: false,
            pending: Vec::new(),
        }
    }
}

/// In-memory PLC: executes request frames against a register map and a toy
/// motion model. Raising M32 moves the axis by the D142/D143 distance,
/// raising M20 homes it; position advances by `step` ticks per position
/// read (teleporting by default). Clones share state.
#[derive(Clone, Default)]
pub struct SimulatedPlc {
    state: Arc<Mutex<PlcState>>,
}

#[allow(dead_code)]
impl SimulatedPlc {
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller driving this PLC through a test link.
    pub fn controller(&self, config: MotionConfig) -> MotionController {
        let link = FxLink::with_transport(Box::new(self.clone()), TEST_TIMEOUT);
        MotionController::with_config(link, config)
    }

    pub fn set_position_mm(&self, mm: f64) {
        let mut state = self.state.lock().expect("plc state");
        state.position_ticks = (mm * 200.0).round() as i32;
    }

    pub fn position_mm(&self) -> f64 {
        f64::from(self.state.lock().expect("plc state").position_ticks) / 200.0
    }

    /// Axis advance per position sample, in mm.
    pub fn set_step_mm(&self, mm: f64) {
        self.state.lock().expect("plc state").step_ticks = (mm * 200.0).round() as i32;
    }

    /// A stalled axis ignores triggers and never moves.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().expect("plc state").stalled = stalled;
    }

    /// A muted PLC accepts frames but never answers.
    pub fn set_mute(&self, mute: bool) {
        self.state.lock().expect("plc state").mute = mute;
    }

    /// Acknowledge but ignore word writes to one register.
    pub fn drop_writes_to(&self, register: u16) {
        self.state.lock().expect("plc state").drop_writes_to = Some(register);
    }

    pub fn word(&self, register: u16) -> u16 {
        self.state
            .lock()
            .expect("plc state")
            .d
            .get(&register)
            .copied()
            .unwrap_or(0)
    }

    pub fn coil(&self, number: u16) -> bool {
        self.state
            .lock()
            .expect("plc state")
            .m
            .get(&number)
            .copied()
            .unwrap_or(false)
    }
}

fn step_motion(state: &mut PlcState) {
    let Some(goal) = state.goal_ticks else {
        return;
    };
    let delta = i64::from(goal) - i64::from(state.position_ticks);
    if state.step_ticks == i32::MAX || delta.abs() <= i64::from(state.step_ticks) {
        state.position_ticks = goal;
    } else if delta > 0 {
        state.position_ticks += state.step_ticks;
    } else {
        state.position_ticks -= state.step_ticks;
    }
}

fn sync_position_registers(state: &mut PlcState) {
    let raw = state.position_ticks as u32;
    state.d.insert(140, (raw & 0xFFFF) as u16);
    state.d.insert(141, (raw >> 16) as u16);
}

fn apply_coil(state: &mut PlcState, coil: u16, level: bool) {
    match (coil, level) {
        (32, true) => {
            if !state.stalled {
                let low = state.d.get(&142).copied().unwrap_or(0);
                let high = state.d.get(&143).copied().unwrap_or(0);
                let distance = ((u32::from(high) << 16) | u32::from(low)) as i32;
                state.goal_ticks = Some(state.position_ticks + distance);
            }
        }
        (32, false) => state.goal_ticks = None,
        (20, true) => {
            if !state.stalled {
                state.goal_ticks = Some(0);
            }
        }
        _ => {}
    }
}

/// Parse and execute one request frame, queueing the reply.
fn execute(state: &mut PlcState, frame: &[u8]) {
    assert!(frame.len() >= 15, "request frame too short: {frame:02X?}");
    assert_eq!(frame[0], 0x05, "request must start with ENQ");
    assert_eq!(frame[7], b'3', "missing wait character");
    let header = frame[1..5].to_vec();
    let code = std::str::from_utf8(&frame[5..7]).expect("command code is ASCII");
    let address = std::str::from_utf8(&frame[8..13]).expect("address is ASCII");
    let count_text = std::str::from_utf8(&frame[13..15]).expect("count is ASCII");
    let count = usize::from_str_radix(count_text, 16).expect("count is hex");
    let kind = address.as_bytes()[0];
    let number: u16 = address[1..].parse().expect("address digits are decimal");
    let payload = &frame[15..];

    let mut reply = vec![];
    match code {
        "WR" => {
            assert_eq!(kind, b'D', "word reads address D registers");
            step_motion(state);
            sync_position_registers(state);
            let mut body = Vec::new();
            for i in 0..count {
                let value = state.d.get(&(number + i as u16)).copied().unwrap_or(0);
                body.extend_from_slice(&word_to_ascii_hex(value));
            }
            reply.push(0x02);
            reply.extend_from_slice(&header);
            reply.extend_from_slice(&body);
            reply.push(0x03);
        }
        "BR" => {
            assert_eq!(kind, b'M', "bit reads address M coils");
            let mut body = Vec::new();
            for i in 0..count {
                let level = state.m.get(&(number + i as u16)).copied().unwrap_or(false);
                body.push(if level { b'1' } else { b'0' });
            }
            reply.push(0x02);
            reply.extend_from_slice(&header);
            reply.extend_from_slice(&body);
            reply.push(0x03);
        }
        "WW" => {
            assert_eq!(kind, b'D', "word writes address D registers");
            assert_eq!(payload.len(), count * 4, "word payload length mismatch");
            if state.drop_writes_to != Some(number) {
                for (i, chunk) in payload.chunks_exact(4).enumerate() {
                    let text = std::str::from_utf8(chunk).expect("word payload is ASCII");
                    let value = u16::from_str_radix(text, 16).expect("word payload is hex");
                    state.d.insert(number + i as u16, value);
                }
            }
            reply.push(0x06);
            reply.extend_from_slice(&header);
        }
        "BW" => {
            assert_eq!(kind, b'M', "bit writes address M coils");
            assert_eq!(payload.len(), count, "bit payload length mismatch");
            for (i, &c) in payload.iter().enumerate() {
                let coil = number + i as u16;
                let level = c == b'1';
                state.m.insert(coil, level);
                apply_coil(state, coil, level);
            }
            reply.push(0x06);
            reply.extend_from_slice(&header);
        }
        other => panic!("unsupported command code {other:?}"),
    }
    state.pending = if state.mute { Vec::new() } else { reply };
}

impl Transport for SimulatedPlc {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().expect("plc state");
        execute(&mut state, frame);
        Ok(frame.len())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().expect("plc state");
        let n = state.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&state.pending[..n]);
        state.pending.drain(..n);
        Ok(n)
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.state.lock().expect("plc state").pending.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}
