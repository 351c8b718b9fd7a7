//! The bridge session: one endpoint, one registry, one tick at a time.
//!
//! `MissionControl` owns the [`Multiplexer`], the [`Registry`] and the log
//! buffer. The application calls [`MissionControl::tick`] from its own loop
//! (or hands the bridge to [`run_loop`]); each tick moves through
//! [`TickPhase`]s in a fixed order:
//!
//! ```text
//! Idle ─► Receiving ─► Dispatching ─► Snapshotting ─► Idle
//!          poll_once    tokenize +      build update
//!          advertise    dispatch        broadcast
//!          to new
//! ```
//!
//! Commands are dispatched before the snapshot is taken, so a `set` shows up
//! in the update frame of the same tick.
//!
//! # Usage
//!
//! ```ignore
//! let mut bridge = MissionControl::bind(&endpoint, BridgeOptions::default())?;
//! bridge.registry_mut().bind_readable("altitude", &altitude);
//! loop {
//!     bridge.tick();
//!     std::thread::sleep(period);
//! }
//! ```

pub mod run;

pub use run::run_loop;

use std::collections::HashMap;

use crate::codec::WireValue;
use crate::config::Config;
use crate::dispatch::{dispatch, Dispatch, UnknownCommandPolicy};
use crate::error::BridgeError;
use crate::logbuf::LogBuffer;
use crate::protocol;
use crate::registry::Registry;
use crate::socket::{ConnectionId, Endpoint, Multiplexer, MuxOptions};
use crate::tokenizer::{CommandCall, CommandStream};

/// Where the session is within a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TickPhase {
    /// Between ticks.
    #[default]
    Idle,
    /// Draining connection events.
    Receiving,
    /// Tokenizing input and running commands.
    Dispatching,
    /// Building and broadcasting the update frame.
    Snapshotting,
}

/// Session settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Transport settings.
    pub mux: MuxOptions,
    /// Handling of unregistered command names.
    pub unknown_commands: UnknownCommandPolicy,
}

/// A running telemetry/command bridge.
pub struct MissionControl {
    mux: Multiplexer,
    registry: Registry,
    log: LogBuffer,
    /// Remaining-message buffer per live connection.
    streams: HashMap<ConnectionId, CommandStream>,
    /// One-shot values for the next update frame.
    changes: Vec<(String, String)>,
    unknown_commands: UnknownCommandPolicy,
    phase: TickPhase,
}

impl std::fmt::Debug for MissionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissionControl")
            .field("mux", &self.mux)
            .field("registry", &self.registry)
            .field("phase", &self.phase)
            .field("pending_changes", &self.changes.len())
            .field("pending_log", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl MissionControl {
    /// Start listening on `endpoint` with an empty registry.
    pub fn bind(endpoint: &Endpoint, options: BridgeOptions) -> Result<Self, BridgeError> {
        let mux = Multiplexer::start_listening(endpoint, options.mux)?;
        Ok(Self {
            mux,
            registry: Registry::new(),
            log: LogBuffer::new(),
            streams: HashMap::new(),
            changes: Vec::new(),
            unknown_commands: options.unknown_commands,
            phase: TickPhase::Idle,
        })
    }

    /// Start listening with the endpoint and options from `config`.
    pub fn from_config(config: &Config) -> Result<Self, BridgeError> {
        Self::bind(&config.endpoint, config.bridge_options())
    }

    /// Run one tick: receive, dispatch, snapshot, broadcast.
    pub fn tick(&mut self) {
        self.enter(TickPhase::Receiving);
        let outcome = self.mux.poll_once();

        if !outcome.accepted.is_empty() {
            let advertise = protocol::advertise_frame(&self.registry);
            for id in &outcome.accepted {
                self.streams.insert(*id, CommandStream::new());
                self.mux.send_to(*id, &advertise);
            }
        }

        self.enter(TickPhase::Dispatching);
        for (id, bytes) in outcome.chunks {
            let calls = self.streams.entry(id).or_default().feed(&bytes);
            for call in &calls {
                self.dispatch_from(id, call);
            }
        }

        for id in &outcome.closed {
            if let Some(stream) = self.streams.remove(id) {
                if stream.has_partial() {
                    log::debug!(
                        "[Bridge] Discarding {} unterminated bytes from {}",
                        stream.remaining().len(),
                        id
                    );
                }
            }
        }

        self.enter(TickPhase::Snapshotting);
        let frame = self.build_update();
        self.mux.broadcast(&frame);

        self.enter(TickPhase::Idle);
    }

    fn enter(&mut self, phase: TickPhase) {
        log::trace!("[Bridge] {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn dispatch_from(&mut self, id: ConnectionId, call: &CommandCall) {
        log::debug!("[Bridge] {} -> {} {:?}", id, call.name, call.args);
        match dispatch(&mut self.registry, call, self.unknown_commands, &mut self.log) {
            Dispatch::Advertise => {
                let frame = protocol::advertise_frame(&self.registry);
                self.mux.send_to(id, &frame);
            }
            Dispatch::Handled | Dispatch::Ignored => {}
        }
    }

    /// Snapshot every binding, overlay one-shot sets and flush the log.
    fn build_update(&mut self) -> Vec<u8> {
        let mut data = self.registry.snapshot();
        for (name, value) in self.changes.drain(..) {
            match data.iter_mut().find(|(existing, _)| *existing == name) {
                Some(slot) => slot.1 = value,
                None => data.push((name, value)),
            }
        }
        let out = self.log.drain();
        protocol::update_frame(&data, &out)
    }

    /// Report `value` under `name` in the next update frame only.
    pub fn change<T: WireValue>(&mut self, name: impl Into<String>, value: &T) {
        self.changes.push((name.into(), value.to_wire()));
    }

    /// Queue an info entry for the next update frame.
    pub fn log_info(&mut self, msg: impl Into<String>) {
        self.log.push_info(msg);
    }

    /// Queue an error entry for the next update frame.
    pub fn log_error(&mut self, msg: impl Into<String>) {
        self.log.push_error(msg);
    }

    /// Send the advertise frame to every live connection.
    pub fn broadcast_advertise(&mut self) -> usize {
        let frame = protocol::advertise_frame(&self.registry);
        self.mux.broadcast(&frame)
    }

    /// Bindings and commands.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Bindings and commands, for registration.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Change how unregistered command names are handled.
    pub fn set_unknown_command_policy(&mut self, policy: UnknownCommandPolicy) {
        self.unknown_commands = policy;
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.mux.connection_count()
    }

    /// Current tick phase. `Idle` whenever called from outside `tick`.
    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    /// The bound address.
    pub fn local_endpoint(&self) -> &Endpoint {
        self.mux.local_endpoint()
    }
}
