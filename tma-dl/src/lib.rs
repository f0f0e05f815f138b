//! Training data, model and post-processing for tissue-microarray core segmentation.

mod common;
pub mod boxes;
pub mod dataset;
pub mod decode;
pub mod grid;
pub mod mask;
pub mod metrics;
pub mod model;
pub mod split;
