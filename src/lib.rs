#[macro_use]
extern crate log;

pub mod config;
pub mod db;
pub mod errors;
pub mod mimic;
pub mod options;
pub mod packet;
pub mod queue;
pub mod quirk;
pub mod tcp;

mod display;
#[cfg(feature = "parse")]
mod parse;

pub use crate::config::Config;
pub use crate::errors::{Error, Layer, Result};
pub use crate::mimic::{Entropy, Mimic, Verdict};
pub use crate::tcp::{IpVersion, PayloadSize, Quirk, Signature, TcpOption, WindowSize};
