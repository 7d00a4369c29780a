#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
mod resource;
mod watch;

pub use self::{
    labels::Label,
    resource::{object_path, ParseError, ResourceType},
    watch::{Event, EventStream, Snapshot, WatchError, Watcher},
};
pub use k8s_openapi::api::{self, core::v1::ConfigMap};
pub use kube::{
    api::{Api, DynamicObject, ObjectMeta, Patch, PatchParams, ResourceExt},
    core::{ApiResource, GroupVersionKind},
    Client, Error, Resource,
};
