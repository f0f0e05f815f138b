pub use anyhow::{ensure, format_err, Context as _, Result};
pub use bbox::{prelude::*, Transform, HW, TLBR};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
