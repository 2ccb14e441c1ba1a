//! Small, independently testable rendering primitives shared by the full-page
//! views in [`crate::session_view`] and [`crate::table_view`].
//!
//! Each component owns its own formatting rules and theme lookups so that a
//! future view (or an external embedder of this crate) can compose a
//! dashboard out of parts without duplicating the pixel-level layout logic
//! baked into the two main view builders.

pub mod header;
pub mod indicators;
pub mod progress_bar;

pub use header::Header;
pub use indicators::{CostIndicator, VelocityIndicator};
pub use progress_bar::{ModelUsageBar, ProgressBarConfig, TimeProgressBar, TokenProgressBar};
