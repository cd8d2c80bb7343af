//! skillscore: probabilistic forecast verification over labeled arrays
//!
//! A Rust library for scoring ensemble and Gaussian forecasts against
//! observations. Arrays carry named dimensions and coordinate labels, and may
//! be eager (held in memory) or lazy (a chunked graph evaluated block by block
//! on a Rayon pool). Scores keep the observation's grid and stay lazy when
//! their inputs are lazy.
//!
//! ## Key Features
//!
//! - **Continuous Ranked Probability Score**: for weighted ensembles and for
//!   Gaussian forecasts given by mean and standard deviation
//! - **Threshold Brier Score**: for ensembles against a single threshold
//! - **Chunked Evaluation**: block-wise graphs with rechunking, broadcasting
//!   and parallel materialisation
//! - **Statistics**: NaN-skipping mean, sum, min, max, std over any dimension
//! - **JSON Files**: read and write labeled arrays
//!
//! ## Module Organization
//!
//! - [`probabilistic`]: dimension-aware scoring functions
//! - [`pointwise`]: scoring kernels on plain `ndarray` arrays
//! - [`labeled`]: labeled arrays with named dimensions
//! - [`chunked`]: lazy block-wise array graphs
//! - [`parameters`]: scalar-or-array scoring parameters
//! - [`statistics`]: reductions over named dimensions
//! - [`io`]: JSON labeled-array files
//! - [`parallel`]: parallel processing configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use skillscore::prelude::*;
//! use std::path::Path;
//!
//! let obs = skillscore::io::read_labeled_array(Path::new("obs.json")).unwrap();
//! let fcst = skillscore::io::read_labeled_array(Path::new("fcst.json")).unwrap();
//!
//! let options = EnsembleOptions::new().member_dim("member");
//! let score = crps_ensemble(&obs.chunk(Some(&[2, 2])).unwrap(), &fcst, &options).unwrap();
//! let values = score.evaluate().unwrap();
//! println!("{values:?}");
//! ```

pub mod chunked;
pub mod errors;
pub mod io;
pub mod labeled;
pub mod parallel;
pub mod parameters;
pub mod pointwise;
pub mod probabilistic;
pub mod statistics;

pub use errors::*;
pub use labeled::{ArrayData, CoordLabels, Evaluate, LabeledArray};
pub use parameters::{Param, Threshold};
pub use probabilistic::{
    crps_ensemble, crps_gaussian, threshold_brier_score, EnsembleOptions, MemberDim,
};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::chunked::ChunkedArray;
    pub use crate::errors::{Result, SkillScoreError};
    pub use crate::labeled::{ArrayData, CoordLabels, Evaluate, LabeledArray};
    pub use crate::parallel::ParallelConfig;
    pub use crate::parameters::{Param, Threshold};
    pub use crate::probabilistic::{
        crps_ensemble, crps_gaussian, threshold_brier_score, EnsembleOptions, MemberDim,
    };
    pub use crate::statistics::{StatOperation, StatisticalReduction};
}
