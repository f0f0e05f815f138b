//! Loss functions and network building blocks on top of `tch`.

mod common;

pub mod conv_block;
pub mod focal_loss;
pub mod loss;
pub mod smooth_l1_loss;
pub mod weighted_bce_loss;

pub use conv_block::*;
pub use focal_loss::*;
pub use loss::*;
pub use smooth_l1_loss::*;
pub use weighted_bce_loss::*;
