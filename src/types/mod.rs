// ABOUTME: Validated domain types used to name containers, releases and images.
// ABOUTME: Construction runs the security validators so values are safe to interpolate.

mod app_name;
mod image_ref;
mod release_tag;

pub use app_name::AppName;
pub use image_ref::{ImageRef, ParseImageRefError};
pub use release_tag::ReleaseTag;
