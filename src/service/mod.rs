// Node-side clients of the directory service

pub mod announcer;
pub mod discovery_client;

pub use announcer::{Announcer, AnnouncerHandle};
pub use discovery_client::{build_catalog, Catalog, DirectoryClient};
