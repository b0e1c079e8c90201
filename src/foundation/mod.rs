pub(crate) mod color;
pub(crate) mod core;
pub(crate) mod error;
pub(crate) mod geometry;
pub(crate) mod transform;
