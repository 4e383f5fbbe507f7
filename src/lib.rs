//! Real-time jitter-minimization core for a network audio renderer.
//!
//! Three concerns live here, in the order data flows through them:
//!
//! - [`ring`] / [`guard`]: the lock-free SPSC byte ring and the
//!   reconfiguration barrier that lets a control thread swap formats under
//!   it safely.
//! - [`convert`] / [`format`] / [`state`]: the DSD/PCM conversion kernels,
//!   the format/track-boundary model, and the prefill/warmup/drain state
//!   calculators built on top of them.
//! - [`sync_core`]: the two hot-path entries (`push_audio`, `fill_buffer`)
//!   that tie the ring, the guard, and the state machine together, plus
//!   [`orchestrator`] and [`control`] above it, which drive format
//!   transitions and expose the control-plane surface.
//!
//! [`config`] centralizes every tunable the above reach for; [`error`] and
//! [`logring`] are the ambient error-handling and logging stack shared by
//! all of them.

pub mod config;
pub mod control;
pub mod convert;
pub mod error;
pub mod format;
pub mod guard;
pub mod logring;
pub mod orchestrator;
pub mod priority;
pub mod ring;
pub mod state;
pub mod sync_core;
pub mod transport;

pub use config::Tunables;
pub use control::{ControlPlaneBridge, TrackInfo, TransportState};
pub use error::{ControlOutcome, CoreError, CoreResult};
pub use format::{ConversionMode, DsdPolarity, Endianness, Format, SinkFormat, TrackBoundary};
pub use logring::{LogDrain, LogLevel, LogRing};
pub use orchestrator::Orchestrator;
pub use state::PlaybackState;
pub use sync_core::{ConsumerHandle, CoreStats, ProducerHandle, SyncCore};
pub use transport::{DiscoveredTarget, Discovery, DownstreamTransport, SinkCapabilities, SinkInquiry};
