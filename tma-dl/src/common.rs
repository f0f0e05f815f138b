pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use bbox::{prelude::*, HW, TLBR};
pub use derivative::Derivative;
pub use itertools::{izip, Itertools as _};
pub use label::{Core, CoreRecord, RadiusPolicy};
pub use log::{debug, info, warn};
pub use noisy_float::prelude::*;
pub use rand::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    collections::{BTreeMap, BTreeSet, VecDeque},
    f64::consts::PI,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
pub use tch::{
    nn::{self, ModuleT as _},
    vision, Device, Kind, Tensor,
};
