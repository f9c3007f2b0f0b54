//! Multiplexer: fans decoded messages out to per-instrument engines and
//! broadcasts session-boundary signals the feed itself cannot provide.

use crate::engine::{Engine, EngineState};
use crate::types::{Exchange, InstrumentKind, Msg, PhaseSignal};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Wall-clock boundaries (as `HHMMSSmmm`) and the signal each one fires.
/// A boundary fires once, the first time the observed clock moves past it.
const SIGNAL_SCHEDULE: [(u64, PhaseSignal); 7] = [
    (91_500_000, PhaseSignal::OpenCallBgn),
    (92_500_000, PhaseSignal::OpenCallEnd),
    (93_000_000, PhaseSignal::AmTradingBgn),
    (113_000_000, PhaseSignal::AmTradingEnd),
    (130_000_000, PhaseSignal::PmTradingBgn),
    (145_700_000, PhaseSignal::PmTradingEnd),
    (150_000_000, PhaseSignal::AllEnd),
];

/// Routes one venue's decoded stream to the subscribed engines.
///
/// Processing is synchronous and in input order: a message is dispatched to
/// exactly the engine owning its `SecurityID`, after any signals its
/// timestamp makes due. Unsubscribed instruments are dropped.
pub struct Mux {
    exchange: Exchange,
    engines: DashMap<u32, Engine>,
    msg_nb: u64,
    /// Latest observed intraday time, `HHMMSSmmm`.
    clock: u64,
    /// How many schedule entries have fired.
    signals_sent: usize,
}

impl Mux {
    /// A multiplexer over `security_ids`, all of the same instrument kind.
    pub fn new(exchange: Exchange, kind: InstrumentKind, security_ids: &[u32]) -> Self {
        let engines = DashMap::new();
        for &id in security_ids {
            engines.insert(id, Engine::new(id, exchange, kind));
        }
        Mux {
            exchange,
            engines,
            msg_nb: 0,
            clock: 0,
            signals_sent: 0,
        }
    }

    /// Add one more instrument mid-stream.
    pub fn subscribe(&self, security_id: u32, kind: InstrumentKind) {
        self.engines
            .entry(security_id)
            .or_insert_with(|| Engine::new(security_id, self.exchange, kind));
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    pub fn msg_nb(&self) -> u64 {
        self.msg_nb
    }

    /// Run `f` against one engine, if subscribed.
    pub fn with_engine<R>(&self, security_id: u32, f: impl FnOnce(&Engine) -> R) -> Option<R> {
        self.engines.get(&security_id).map(|e| f(e.value()))
    }

    /// Feed one decoded message: fire any due signals, then dispatch.
    pub fn on_msg(&mut self, msg: Msg) {
        if let Some(t) = self.intraday_time(&msg) {
            self.advance_clock(t);
        }

        match msg {
            Msg::Signal(sig) => {
                // Externally injected signals are broadcast as-is.
                self.broadcast(sig);
            }
            other => {
                let Some(id) = other.security_id() else { return };
                let Some(mut engine) = self.engines.get_mut(&id) else {
                    trace!(security_id = id, "message for an unsubscribed instrument");
                    return;
                };
                engine.value_mut().on_msg(other);
                self.msg_nb += 1;
            }
        }
    }

    /// Healthy iff every engine has reconciled all exchange snapshots.
    pub fn are_you_ok(&self) -> bool {
        let mut ok = true;
        for entry in self.engines.iter() {
            ok &= entry.value().are_you_ok();
        }
        ok
    }

    /// Intraday `HHMMSSmmm` carried by this message, if any.
    fn intraday_time(&self, msg: &Msg) -> Option<u64> {
        match msg {
            Msg::Snap(s) => Some(s.hhmmss_ms()),
            _ => msg.transact_time().map(|t| match self.exchange {
                Exchange::Szse => t % 1_000_000_000,
                Exchange::Sse => t,
            }),
        }
    }

    /// Move the clock forward and fire every boundary now strictly behind
    /// it, in schedule order. The boundary instant itself belongs to the
    /// closing auction's own executions, so firing waits for the clock to
    /// pass it, not reach it.
    fn advance_clock(&mut self, t: u64) {
        if t > self.clock {
            self.clock = t;
        }
        while self.signals_sent < SIGNAL_SCHEDULE.len() {
            let (boundary, signal) = SIGNAL_SCHEDULE[self.signals_sent];
            if self.clock <= boundary {
                break;
            }
            debug!(?signal, boundary, clock = self.clock, "session boundary passed");
            self.broadcast(signal);
            self.signals_sent += 1;
        }
    }

    fn broadcast(&self, signal: PhaseSignal) {
        for mut entry in self.engines.iter_mut() {
            entry.value_mut().on_msg(Msg::Signal(signal));
        }
    }

    /// Capture the multiplexer and every engine.
    pub fn save(&self) -> MuxState {
        let mut engines: Vec<EngineState> =
            self.engines.iter().map(|e| e.value().save()).collect();
        engines.sort_by_key(|s| s.security_id);
        MuxState {
            exchange: self.exchange,
            engines,
            msg_nb: self.msg_nb,
            clock: self.clock,
            signals_sent: self.signals_sent,
        }
    }

    /// Rebuild a multiplexer from a captured state.
    pub fn restore(state: MuxState) -> Mux {
        let engines = DashMap::new();
        for engine_state in state.engines {
            engines.insert(engine_state.security_id, Engine::restore(engine_state));
        }
        Mux {
            exchange: state.exchange,
            engines,
            msg_nb: state.msg_nb,
            clock: state.clock,
            signals_sent: state.signals_sent,
        }
    }
}

/// Serializable multiplexer state: the engines (ascending by security id)
/// plus the session clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxState {
    pub exchange: Exchange,
    pub engines: Vec<EngineState>,
    pub msg_nb: u64,
    pub clock: u64,
    pub signals_sent: usize,
}
