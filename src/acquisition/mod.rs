//! Token Acquisition
//!
//! Buying whole token units with the reserve asset, funding any shortfall
//! through the fiat onramp first.

pub mod machine;
pub mod orchestrator;

pub use machine::{transition, AcquisitionContext, AcquisitionEvent, AcquisitionState};
pub use orchestrator::{AcquisitionConfig, AcquisitionOrchestrator};
