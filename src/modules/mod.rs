pub mod reverse;
pub mod video;
