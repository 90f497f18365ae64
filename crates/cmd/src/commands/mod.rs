pub mod extract;
pub mod series;

pub use extract::{ExtractArgs, extract_command};
pub use series::{SeriesArgs, series_command};
