pub mod principal;
pub mod tenant;
