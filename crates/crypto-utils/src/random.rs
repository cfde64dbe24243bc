use rand::RngCore;
use rand_core::OsRng;

/// Fill a new array with cryptographically secure random bytes.
///
/// This is the only place the engine touches an entropy source; everything
/// else consumes caller-supplied bytes.
pub fn random_bytes_fixed<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}
