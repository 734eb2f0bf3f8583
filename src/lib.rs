pub mod application;
pub mod arena;
pub mod dirlist;
pub mod error;
pub mod repo;
pub mod requestloop;
pub mod scope;
pub mod threadpool;
pub mod timer;
pub mod wire;
