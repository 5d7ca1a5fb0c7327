// Core library: capability probing, parameter model, command generation and job running

pub mod capabilities;
pub mod command;
pub mod config;
pub mod convert;
pub mod duration;
pub mod encoders;
pub mod error;
pub mod jobs;
pub mod params;
pub mod progress;
pub mod runner;
pub mod scan;
pub mod session;

// Re-export commonly used types
pub use capabilities::{CodecInfo, CodecList};
pub use command::generate;
pub use config::VencoderConfig;
pub use error::{PolicyError, ProbeError, SessionError};
pub use params::{FfmpegParams, ParamPatch, Stage};
pub use session::Session;
