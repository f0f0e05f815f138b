pub use anyhow::{ensure, Context as _, Result};
pub use bbox::{Transform, HW};
pub use label::{Core, CoreRecord};
pub use log::info;
pub use noisy_float::prelude::*;
pub use std::{
    fs,
    path::{Path, PathBuf},
};
pub use tch::{nn, Device, Tensor};
pub use tma_dl::{
    dataset::{ImageRaster, Normalization},
    decode::{decode_cores, DecodeInit},
    grid::{dearray, GridInit, GridRecord},
    model::{UNet, UNetInit},
};
pub use train::config::Config;
