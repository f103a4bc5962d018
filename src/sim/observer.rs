//! Module handles register access observers,
//! which store which accesses occur at a given register file cell.
//!
//! A shell typically uses this to refresh only the registers that changed after a step.
//! The observer lives inside the [`RegisterFile`] and is reached through
//! [`Simulator::observer`] and [`Simulator::take_changes`].
//!
//! [`RegisterFile`]: crate::sim::mem::RegisterFile
//! [`Simulator::observer`]: crate::sim::Simulator::observer
//! [`Simulator::take_changes`]: crate::sim::Simulator::take_changes

use std::collections::BTreeMap;

/// The set of accesses which have occurred at this location.
///
/// ## Example
///
/// ```
/// # use pic16_sim::sim::observer::AccessSet;
///
/// let accesses = AccessSet::WRITTEN;
/// assert!(accesses.accessed());
/// assert!(accesses.written());
/// assert!(!accesses.modified());
/// ```
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct AccessSet(u8);
impl AccessSet {
    /// Set with only the write flag enabled.
    pub const WRITTEN: Self = Self(1 << 0);
    /// Set with only the modify flag enabled.
    pub const MODIFIED: Self = Self(1 << 1);

    /// True if any access has occurred.
    pub fn accessed(&self) -> bool {
        self.0 != 0
    }

    /// True if a write has occurred (does not necessarily have to change data).
    pub fn written(&self) -> bool {
        self.0 & Self::WRITTEN.0 != 0
    }
    /// True if a write has occurred (data must change).
    pub fn modified(&self) -> bool {
        self.0 & Self::MODIFIED.0 != 0
    }
}
impl std::ops::BitOr for AccessSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}
impl std::ops::BitOrAssign for AccessSet {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}
impl std::fmt::Debug for AccessSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSet")
            .field("written", &self.written())
            .field("modified", &self.modified())
            .finish()
    }
}

/// A struct that tracks accesses to physical register file cells.
#[derive(Debug, Clone)]
pub struct AccessObserver {
    cells: BTreeMap<u8, AccessSet>
}
impl AccessObserver {
    /// Creates a new access observer.
    pub fn new() -> Self {
        Self {
            cells: Default::default()
        }
    }

    /// Clears all accesses.
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Gets the access set for the given physical address.
    pub fn get_mem_accesses(&self, addr: u8) -> AccessSet {
        self.cells.get(&addr).copied().unwrap_or_default()
    }

    /// Adds new flags to the access set for the given physical address.
    pub fn update_mem_accesses(&mut self, addr: u8, set: AccessSet) {
        *self.cells.entry(addr).or_default() |= set;
    }

    /// Takes all accesses which have occurred since last clear,
    /// as well as clearing them.
    ///
    /// This iterator is sorted in address order.
    pub fn take_mem_accesses(&mut self) -> impl Iterator<Item=(u8, AccessSet)> {
        std::mem::take(&mut self.cells).into_iter()
    }
}
impl Default for AccessObserver {
    fn default() -> Self {
        Self::new()
    }
}
