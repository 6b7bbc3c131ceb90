//! Fixed response header blocks
//!
//! All responses are HTTP/1.0; none carries a Content-Length, so the body ends
//! when the connection does.

use crate::frame::ImageFormat;

/// Header for the multipart frame stream
pub const STREAM_HEADER: &[u8] = b"HTTP/1.0 200 OK\r\n\
Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
Cache-Control: no-store, no-cache, must-revalidate, pre-check=0, post-check=0, max-age=0\r\n\
Pragma: no-cache\r\n\
Connection: close\r\n\r\n";

/// Header for the heartbeat route
pub const PING_HEADER: &[u8] = b"HTTP/1.0 200 OK\r\n\
Content-Type: text/html\r\n\
Access-Control-Allow-Origin: *\r\n\
Connection: keep-alive\r\n\r\n";

/// Header for the viewer page
pub const VIEWER_HEADER: &[u8] = b"HTTP/1.0 200 OK\r\n\
Content-Type: text/html\r\n\
Connection: close\r\n\r\n";

/// Heartbeat line
pub const PONG: &[u8] = b"pong\r\n";

/// Boundary marker that opens each multipart part
///
/// Written once after the header, then after every frame, so each frame is
/// immediately followed by the header of the next part.
pub fn frame_boundary(format: ImageFormat) -> Vec<u8> {
    format!(
        "\r\n--frame\r\nContent-Type: {}\r\n\r\n",
        format.content_type()
    )
    .into_bytes()
}
