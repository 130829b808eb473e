pub mod archive;
pub mod batch;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod filter;
pub mod lattice;
pub mod paths;
pub mod persist;
pub mod pipeline;
pub mod record;
pub mod structure;
pub mod symmetry;
pub mod units;
pub mod util;
pub mod warn;
