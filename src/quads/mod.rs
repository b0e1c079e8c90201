pub(crate) mod builder;
pub(crate) mod draw_quad;
pub(crate) mod filters;
pub(crate) mod frame;
pub(crate) mod render_pass;
pub(crate) mod shared_quad_state;
