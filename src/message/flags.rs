use bitflags::bitflags;

bitflags! {
    /// Flags modifying a single send or receive call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: i32 {
        /// Return `SpError::WouldBlock` instead of waiting.
        const DONTWAIT = 1;
    }
}

impl Flags {
  /// Checks if the `DONTWAIT` flag is set.
  pub fn is_dontwait(&self) -> bool {
    self.contains(Flags::DONTWAIT)
  }
}
