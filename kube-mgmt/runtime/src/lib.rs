#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use kube_mgmt_core as core;
pub use kube_mgmt_k8s_api as k8s;
pub use kube_mgmt_k8s_sync as sync;
pub use kube_mgmt_opa as opa;

mod annotate;
mod args;
mod watcher;

pub use self::{annotate::ApiAnnotator, args::Args, watcher::ApiWatcher};
