//! # Strand Core
//!
//! Thread-safe packet plumbing for media playback: a demux thread reads
//! elementary-stream packets out of a container and hands them to a
//! decode/playback thread through a blocking FIFO queue.

// ============================================================================
// Packet Transport
// ============================================================================
pub mod packet;
pub mod packet_queue;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
