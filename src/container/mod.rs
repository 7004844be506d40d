//! Native binary container formats: a shared packed-payload/JSON-header
//! envelope (`envelope`), and the four modality-specific files built on
//! top of it.

pub mod cellset;
pub mod envelope;
pub mod events;
pub mod movie;
pub mod vesselset;
