//! The option/capability algebra every filesystem and composition component
//! shares.
//!
//! A [`Capabilities`] bitset is used both as a capability advertisement (what
//! a filesystem can do) and as a decoration mask (what a composition
//! component is permitted to forward to its child). The two algebraic
//! operations on it are literally bitwise: [`Capabilities::union`] is `|`,
//! [`Capabilities::intersect`] is `&`. The `Path` facets (case sensitivity,
//! empty-directory naming, mount-path prefix) don't fit in a boolean bitset
//! and combine by their own small rules, carried in [`PathFacets`].

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Boolean capability facets advertised by a filesystem, or declared as a
    /// decoration mask on a composition component.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Can list directory contents via `browse`.
        const BROWSE = 1 << 0;
        /// Can snapshot a single entry via `getEntry`.
        const GET_ENTRY = 1 << 1;
        /// Can open a byte stream via `open`.
        const OPEN = 1 << 2;
        /// Streams opened may be read.
        const READ = 1 << 3;
        /// Streams opened may be written.
        const WRITE = 1 << 4;
        /// `open` may create a file that does not yet exist.
        const CREATE_FILE = 1 << 5;
        /// Can remove entries via `delete`.
        const DELETE = 1 << 6;
        /// Can relocate entries via `move`.
        const MOVE = 1 << 7;
        /// Can create directories via `createDirectory`.
        const CREATE_DIRECTORY = 1 << 8;
        /// Can subscribe to change events via `observe`.
        const OBSERVE = 1 << 9;
        /// Supports `setEventDispatcher`.
        const SET_EVENT_DISPATCHER = 1 << 10;
    }
}

impl Capabilities {
    /// Union: advertised capabilities of a composition are the union of its
    /// children's. Equivalent to a plain bitwise OR, spelled out for
    /// symmetry with [`Capabilities::intersect`].
    #[must_use]
    pub fn union_with(self, other: Capabilities) -> Capabilities {
        self | other
    }

    /// Intersection: a decoration mask's *effective* capability is the
    /// intersection of the declared mask and the child's advertised set, so
    /// a mask can only ever narrow, never grant, capability.
    #[must_use]
    pub fn intersect(self, other: Capabilities) -> Capabilities {
        self & other
    }
}

/// Case-sensitivity declaration for a filesystem's path matching.
///
/// `Inherited` means "unspecified here, take the other operand's value when
/// combining" — it is the algebra's identity element, not a third real
/// regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaseSensitivity {
    /// Names are matched byte-for-byte.
    CaseSensitive,
    /// Names are matched ASCII-case-insensitively.
    CaseInsensitive,
    /// No preference declared; combines as the identity element.
    #[default]
    Inherited,
}

impl CaseSensitivity {
    /// Both union and intersection combine case sensitivity the same way:
    /// a bitwise OR over `{CaseSensitive, CaseInsensitive}`, because path
    /// matching downstream must accept either regime once either operand
    /// asks for it. `Inherited` contributes nothing to the OR.
    #[must_use]
    pub fn combine(self, other: CaseSensitivity) -> CaseSensitivity {
        use CaseSensitivity::{CaseInsensitive, CaseSensitive, Inherited};
        match (self, other) {
            (Inherited, x) | (x, Inherited) => x,
            (CaseSensitive, CaseSensitive) => CaseSensitive,
            (CaseInsensitive, CaseInsensitive) => CaseInsensitive,
            // Either side insists on case sensitivity being relevant: accept either.
            _ => CaseInsensitive,
        }
    }
}

/// Path-shaped facets that don't fit a boolean bitset: case sensitivity, the
/// empty-directory-name policy, and an optional mount-path prefix used by
/// decoration path translation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathFacets {
    /// Declared case sensitivity of path matching.
    pub case_sensitivity: CaseSensitivity,
    /// Whether an empty string is a legal directory name (relevant only to
    /// adapters with a flat resource namespace; `""` always denotes root
    /// here).
    pub empty_directory_name: bool,
    /// A component's mount-path prefix, if it declares one. `None` means
    /// unspecified (identity element under both combination rules).
    pub mount_path: Option<String>,
}

impl PathFacets {
    /// Union: case sensitivity combines per [`CaseSensitivity::combine`];
    /// `empty_directory_name` is OR'd; `mount_path`, first non-empty wins.
    #[must_use]
    pub fn union(&self, other: &PathFacets) -> PathFacets {
        PathFacets {
            case_sensitivity: self.case_sensitivity.combine(other.case_sensitivity),
            empty_directory_name: self.empty_directory_name || other.empty_directory_name,
            mount_path: self.mount_path.clone().or_else(|| other.mount_path.clone()),
        }
    }

    /// Intersection: case sensitivity still combines by the same (union)
    /// bitwise-OR rule even under intersection, since the resulting path
    /// matcher must accept either regime; the rest follows the same rules
    /// as [`PathFacets::union`].
    #[must_use]
    pub fn intersect(&self, other: &PathFacets) -> PathFacets {
        PathFacets {
            case_sensitivity: self.case_sensitivity.combine(other.case_sensitivity),
            empty_directory_name: self.empty_directory_name && other.empty_directory_name,
            mount_path: self.mount_path.clone().or_else(|| other.mount_path.clone()),
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_bitwise_or() {
        let a = Capabilities::BROWSE | Capabilities::READ;
        let b = Capabilities::WRITE;
        assert_eq!(a.union_with(b), Capabilities::BROWSE | Capabilities::READ | Capabilities::WRITE);
    }

    #[test]
    fn intersect_can_only_narrow() {
        let declared = Capabilities::all();
        let advertised = Capabilities::BROWSE | Capabilities::GET_ENTRY;
        let effective = declared.intersect(advertised);
        assert_eq!(effective, advertised);
        assert!(advertised.contains(effective));
    }

    #[test]
    fn case_sensitivity_inherited_is_identity() {
        use CaseSensitivity::{CaseSensitive, Inherited};
        assert_eq!(Inherited.combine(CaseSensitive), CaseSensitive);
        assert_eq!(CaseSensitive.combine(Inherited), CaseSensitive);
    }

    #[test]
    fn case_sensitivity_mixed_prefers_insensitive_union() {
        use CaseSensitivity::{CaseInsensitive, CaseSensitive};
        assert_eq!(CaseSensitive.combine(CaseInsensitive), CaseInsensitive);
    }

    #[test]
    fn mount_path_first_non_empty_wins() {
        let a = PathFacets { mount_path: None, ..Default::default() };
        let b = PathFacets { mount_path: Some("x".into()), ..Default::default() };
        assert_eq!(a.union(&b).mount_path, Some("x".into()));
        assert_eq!(b.union(&a).mount_path, Some("x".into()));
    }
}
