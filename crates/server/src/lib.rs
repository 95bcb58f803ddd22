pub mod admission;
pub mod backend;
pub mod bootstrap;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod headers;
pub mod health;
pub mod routing;
pub mod verifier;
