use crate::fingerprint::Fingerprint;
use parking_lot::{Mutex, MutexGuard};

/// A fixed set of mutexes, one of which guards each fingerprint.
///
/// Two fingerprints may share a stripe, which only costs some contention; one fingerprint
/// always maps to the same stripe, which is what serializes its read-modify-write cycles.
pub(crate) struct StripedLocks {
  stripes: Box<[Mutex<()>]>,
}

impl StripedLocks {
  pub(crate) fn new(stripes: usize) -> Self {
    let stripes = stripes.max(1);
    Self {
      stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
    }
  }

  fn index(&self, fingerprint: &Fingerprint) -> usize {
    let bytes = fingerprint.as_bytes();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&bytes[..8]);
    (u64::from_le_bytes(prefix) % self.stripes.len() as u64) as usize
  }

  pub(crate) fn lock(&self, fingerprint: &Fingerprint) -> MutexGuard<'_, ()> {
    self.stripes[self.index(fingerprint)].lock()
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.stripes.len()
  }
}
