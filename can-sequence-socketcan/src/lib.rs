#![warn(missing_docs)]

//! Linux SocketCAN endpoint for `can-sequence`.
//!
//! On Linux, [`SocketCanEndpoint`] wraps a [`socketcan`] raw socket and implements the
//! `can-sequence` transport traits. Receiving goes through `recvmsg(2)` so the kernel's socket
//! overflow counter (`SO_RXQ_OVFL`) and receive timestamp (`SO_TIMESTAMP`) arrive with each frame.
//!
//! On non-Linux targets, the type is present but [`SocketCanEndpoint::open`] returns an error
//! wrapping [`UnsupportedPlatformError`].

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::*;

#[cfg(not(target_os = "linux"))]
mod non_linux;

#[cfg(not(target_os = "linux"))]
pub use non_linux::*;
