//! Request/response wire plumbing (T1/T2): parsing the tab-separated,
//! NUL-terminated protocol described in spec.md §6. The serial request
//! loop itself (T3) lives in [`crate::requestloop`], one level up,
//! since it also needs the application state these two modules don't.

pub mod request;
pub mod response;
