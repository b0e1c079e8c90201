pub(crate) mod client;
pub(crate) mod ids;
pub(crate) mod manager;
pub(crate) mod surface;
