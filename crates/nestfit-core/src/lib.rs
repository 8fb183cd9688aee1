//! # nestfit-core
//!
//! Drives the `nested_fit` nested-sampling executable: builds its YAML input,
//! derives data extents from CSV/TSV files, supervises the process while
//! classifying its output, shows a live terminal dashboard and loads the JSON
//! result.
//!
//! ```no_run
//! use nestfit_core::{Configurator, FitSettings, SampleOptions};
//!
//! # fn main() -> nestfit_core::error::Result<()> {
//! let settings = FitSettings::new(["spectrum.csv"])
//!     .with_expression("GAUSS_IF(x, x0, amp, sigma) + bg")
//!     .with_param("x0", 10.0);
//! let fit = Configurator::new(settings)?;
//! if let Some(result) = fit.sample(&SampleOptions::default())? {
//!     println!("{:?}", result.get("evidence"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dashboard;
pub mod error;
pub mod extents;
pub mod models;
pub mod parser;
pub mod results;
pub mod runner;
pub mod supervisor;

pub use config::{Configurator, FitSettings};
pub use error::{NestfitError, Result};
pub use models::{DataExtents, Features, FitConfiguration};
pub use parser::{parse_line, ParsedLine, ProgressRecord};
pub use results::{load_result, read_result, FitResult};
pub use runner::{ConsoleEcho, RunObserver, RunOutcome, SampleOptions};
pub use supervisor::{RunPhase, RunProcess};
