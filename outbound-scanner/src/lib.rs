pub mod audit;
pub mod classify;
pub mod crawler;
pub mod error;
pub mod frontier;
pub mod normalize;
pub mod probe;
pub mod renderer;
pub mod result;
pub mod settle;

pub use audit::{AuditTable, DomainEntry, ProvenanceRecord, RequestAuditor};
pub use crawler::{Crawler, ProgressCallback};
pub use error::ScanError;
pub use frontier::{AdmissionPolicy, Frontier};
pub use normalize::NormalizedUrl;
pub use probe::{ElementPredicate, InteractionProber, ProbeConfig};
pub use renderer::chromium::{ChromiumOptions, ChromiumRenderer};
pub use renderer::static_html::StaticRenderer;
pub use renderer::{ElementHandle, PageRenderer, WaitMode};
pub use result::{CrawlOutcome, PageVisit};
pub use settle::SettlePolicy;
