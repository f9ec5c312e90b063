//! Stateless tone transforms: skin smoothing and colour grading.

pub mod grade;
pub mod smooth;

pub use grade::{grade, ChannelLut, GradeSource};
pub use smooth::{bilateral_filter, smooth, smoothing_diameter, smoothing_sigma};
