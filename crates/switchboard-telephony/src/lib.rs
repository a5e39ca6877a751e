//! Telephony platform integration for the Switchboard platform.
//!
//! Two narrow concerns: generating the call-control markup that points a new
//! call at the relay WebSocket, and terminating a live call with a final
//! spoken message through the platform's REST API. The platform itself is an
//! external collaborator that may fail independently of session logic.

mod control;
mod error;
mod twiml;

pub use control::{CallControl, TwilioCallControl, TwilioConfig};
pub use error::TelephonyError;
pub use twiml::{bootstrap_document, hangup_document};
