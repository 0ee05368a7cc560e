//! Server-side filter/projection hook applied during transactional scans.

/// A coprocessor inspects each visible key-value pair produced by a scan.
/// Returning `None` filters the pair out; returning `Some` replaces the
/// value (projection). Key-only scans bypass the coprocessor entirely.
pub trait Coprocessor: Send + Sync {
    fn process(&self, key: &[u8], value: &[u8]) -> Option<Vec<u8>>;
}

/// Pass every pair through unchanged.
pub struct PassthroughCoprocessor;

impl Coprocessor for PassthroughCoprocessor {
    fn process(&self, _key: &[u8], value: &[u8]) -> Option<Vec<u8>> {
        Some(value.to_vec())
    }
}
