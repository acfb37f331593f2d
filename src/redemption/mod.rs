//! Token Redemption
//!
//! Burning token units for their pro-rata share of the reserve, with a
//! confirmation step when marked units would be burned.

pub mod machine;
pub mod orchestrator;

pub use machine::{transition, RedemptionContext, RedemptionEvent, RedemptionState};
pub use orchestrator::{RedemptionConfig, RedemptionOrchestrator};
