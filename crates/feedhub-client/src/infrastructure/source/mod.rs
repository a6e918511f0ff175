//! Frame sources.

pub mod image_directory;
pub mod test_pattern;

pub use image_directory::ImageDirectorySource;
pub use test_pattern::TestPatternSource;
