//! Core tokenwheel library (stitching, session state machine, speculation,
//! providers, config).

pub mod config;
pub mod generation;
pub mod logging;
pub mod providers;
pub mod runtime;
pub mod session;
pub mod stitch;
