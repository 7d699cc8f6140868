pub mod routing;
pub mod topics;
