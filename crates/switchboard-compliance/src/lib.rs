//! Transcript dedup, classification, and enrichment for the observer
//! fan-out.
//!
//! Inbound transcription webhooks pass through three stages. The
//! [`DedupCache`] suppresses the platform's resends of identical finalized
//! text inside a short TTL window. The [`CompliancePipeline`] classifies
//! caller-side snippets against a small sliding window of that call's
//! recent history, hardens the model's verdict against hallucinated
//! phrases, and attaches the outcome to the payload. Fan-out to observers
//! happens in the server layer with the enriched payload this crate
//! returns.
//!
//! Classification failures never block delivery: the event passes through
//! unclassified and the context window is left untouched.

mod context;
mod dedup;
mod pipeline;

pub use context::ContextWindows;
pub use dedup::DedupCache;
pub use pipeline::{harden_verdict, CompliancePipeline};
