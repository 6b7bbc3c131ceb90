//! Minimal HTTP surface
//!
//! Only the request line is interpreted. Responses are fixed HTTP/1.0 header
//! blocks followed by a route-specific body, and the connection always ends
//! when the body does.

pub mod request;
pub mod response;
pub mod viewer;

pub use request::{find_header_end, parse_request, RejectReason, Route, HEADER_TERMINATOR};
pub use response::{frame_boundary, PING_HEADER, PONG, STREAM_HEADER, VIEWER_HEADER};
pub use viewer::{render_viewer, URL_PLACEHOLDER};
