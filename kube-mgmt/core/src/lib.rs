#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod sink;
pub mod status;
pub mod tree;

pub use self::{
    sink::{Prefixed, Sink, SinkError},
    status::SyncStatus,
    tree::{join, segments, PathTree, TreeError},
};
