use std::sync::Arc;
use std::time::Duration;

pub use relay_core::prelude::*;
pub use relay_core::strng;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub mod config;
pub mod http;
pub mod keys;
pub mod llm;
pub mod parse;
pub mod proxy;
mod serdes;

pub use config::Config;
pub use serdes::serde_dur;
