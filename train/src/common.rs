//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use chrono::{DateTime, Local};
pub use itertools::{izip, Itertools};
pub use log::{debug, info, warn};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng, seq::SliceRandom};
pub use regex::Regex;
pub use serde::{Deserialize, Serialize};
pub use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
pub use structopt::StructOpt;
pub use tch::{
    nn::{self, OptimizerConfig as _},
    Device, Kind, Tensor,
};
pub use tch_modules::{Loss, LossInit};
pub use tma_dl::{
    dataset::{AssemblerInit, Dataset, Target},
    metrics,
    model::{UNet, UNetInit},
    split::{self, Fold, KFold},
};
