//! Taint detection for composed surfaces.

use crate::surface::Surface;
use crate::Error;

/// Report whether reading pixels back from `surface` is blocked by the
/// cross-origin policy.
///
/// Probes a single pixel. Security failures, and failures whose message
/// mentions tainting, count as tainted; any other failure reports clean.
pub fn is_tainted(surface: &Surface) -> bool {
    match surface.read_pixels(0, 0, 1, 1) {
        Ok(_) => false,
        Err(Error::SecurityError(_)) => true,
        Err(e) => {
            let msg = e.to_string().to_ascii_lowercase();
            msg.contains("tainted") || msg.contains("poison")
        }
    }
}
