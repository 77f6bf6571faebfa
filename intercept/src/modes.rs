//! Mode filters for queries and bulk reverts.

use bitflags::bitflags;
use intercept_core::HookMode;

bitflags! {
    /// A set of hook modes.
    ///
    /// Used to narrow [`is_hooked`](crate::is_hooked) and
    /// [`revert_all_for`](crate::revert_all_for) to particular kinds of
    /// attachment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HookModes: u8 {
        /// Closures running before the original.
        const BEFORE = 0b0001;

        /// Closures running after the original.
        const AFTER = 0b0010;

        /// Closures replacing the original.
        const INSTEAD = 0b0100;

        /// Methods added where none was implemented.
        const ADDED = 0b1000;

        /// Before, after and instead hooks.
        const HOOKS = Self::BEFORE.bits() | Self::AFTER.bits() | Self::INSTEAD.bits();

        /// Every kind of attachment.
        const ALL = Self::HOOKS.bits() | Self::ADDED.bits();
    }
}

impl HookModes {
    /// Whether the set includes `mode`.
    pub fn includes(self, mode: HookMode) -> bool {
        self.contains(HookModes::from(mode))
    }
}

impl From<HookMode> for HookModes {
    fn from(mode: HookMode) -> Self {
        match mode {
            HookMode::Before => HookModes::BEFORE,
            HookMode::After => HookModes::AFTER,
            HookMode::Instead => HookModes::INSTEAD,
        }
    }
}

impl Default for HookModes {
    fn default() -> Self {
        HookModes::ALL
    }
}
