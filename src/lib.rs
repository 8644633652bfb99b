//! Discrete-event simulator of an EPC Gen2 (UHF RFID) air-interface link.
//!
//! Models a single reader inventorying a population of tags over a shared,
//! collision-prone radio channel: bit-exact command/reply encoding, the
//! standard's link-timer formulas, a Q-slotted-ALOHA MAC on both ends, and
//! an SNR/BER reception model. Mobility, radiation patterns and real RF
//! waveforms are out of scope (see [`channel::PathLossFn`]) — geometry and
//! propagation are injected as plain closures instead.
//!
//! # Example
//!
//! ```ignore
//! use epc_gen2_sim::channel::Channel;
//! use epc_gen2_sim::reader::{Reader, ReaderConfig};
//! use epc_gen2_sim::simulation::Simulation;
//! use epc_gen2_sim::tag::Tag;
//!
//! let channel = Channel::new(
//!     Box::new(|_tx, _rx, _velocity| -40.0),
//!     epc_gen2_sim::ber::rayleigh_ber,
//!     false,
//!     -90.0,
//!     1.2e6,
//! );
//! let reader = Reader::new(reader_config);
//! let tags = vec![Tag::new(0, epc, tid, user, -60.0)];
//! let mut sim = Simulation::new(reader, tags, channel, 42)?.with_max_rounds(10);
//! sim.run()?;
//! ```

pub mod ber;
pub mod channel;
pub mod codec;
pub mod error;
pub mod event;
pub mod event_queue;
pub mod observer;
pub mod reader;
pub mod scheduler;
pub mod simulation;
pub mod tag;
pub mod timing;
pub mod types;

pub use channel::Channel;
pub use codec::{Command, QueryParams, Reply};
pub use error::{SimError, SimResult};
pub use observer::{LoggingObserver, NullObserver, SimObserver};
pub use reader::{Reader, ReaderConfig};
pub use simulation::Simulation;
pub use tag::{Tag, TagState};
pub use types::{
    Antenna, CommandCode, DivideRatio, InventoryFlag, MemoryBank, SelFlag, Session, TagEncoding,
    TempRange, Vec3,
};
