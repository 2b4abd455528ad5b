//! Common data model for the redirect workspace
//!
//! Types shared between `redirect-core`, `redirect-agent` and anything that
//! talks to the agent over its command surface:
//! - Redirect records and the global on/off switch (persisted state)
//! - Captured credential headers (token sets)
//! - Inbound command / response wire types and outbound traffic observations

pub mod command;
pub mod record;
pub mod token;

pub use command::{
    CaptureOutcome, Command, CommandResponse, ObservedRequest, RedirectsSnapshot, ResourceType,
    SyncFailure, SyncReport,
};
pub use record::{GlobalSwitch, HttpMethod, RedirectRecord, RuleId};
pub use token::{Header, TokenSet};
