//! Payload sources: the one-shot default asset preloader and the user file
//! selector that sits in front of it.
//!
//! ```text
//! AssetSource (http | file) ──► Preloader (OnceCell, fallback on failure)
//!                                    │
//!                 user file ──► FileSelector::current_payload() ──► Orchestrator
//! ```

pub mod preload;
pub mod selector;
pub mod types;
