pub mod ice_candidate;
pub mod ice_parameters;
pub mod ice_server;
