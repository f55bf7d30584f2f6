//! # electra-core: shared types for the Electra grid service
//!
//! - [`model`]: the JSON wire format exchanged with the grid-analysis engine
//!   ([`GridModel`] and one record type per element family)
//! - [`element`]: [`ElementKind`], the six element families the service persists
//! - [`error`]: [`ElectraError`], the error currency between crates
//!
//! Element records expose their identity and `active` flag through
//! [`WireRecord`], which is what the engine and the store key on.

pub mod element;
pub mod error;
pub mod model;

pub use element::{ElementKind, ElementRef};
pub use error::{ElectraError, ElectraResult};
pub use model::{
    BusRecord, CircuitInfo, GeneratorRecord, GridModel, LineRecord, LoadRecord, ModelData,
    ShuntRecord, Transformer2WRecord, WireRecord, DEFAULT_BASE_MVA,
};
