#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Writes documents and policy modules to an Open Policy Agent server over
//! its REST API.

mod client;
mod data;
mod policy;

pub use self::{
    client::{Client, ClientConfig, InvalidUrl},
    data::DataSink,
    policy::PolicySink,
};
