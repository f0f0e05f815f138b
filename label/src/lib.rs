//! Core annotations of tissue-microarray images.
//!
//! An annotation marks one circular tissue core by its center and an optional
//! radius, in pixel units of one explicit image resolution. Moving an
//! annotation to another resolution always goes through [rescale].

mod common;

pub use record::*;
mod record;

pub use policy::*;
mod policy;

pub use rescale::*;
mod rescale;

pub use encode::*;
mod encode;
