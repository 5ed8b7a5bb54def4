pub use std::time::Instant;

pub use anyhow::{anyhow, bail, Context};
pub use itertools::Itertools;
pub use tracing::{debug, info, instrument, warn};

pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
