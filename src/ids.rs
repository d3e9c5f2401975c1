//! Dense integer identifiers into the network's arenas.
//!
//! The network, its DFFs, its faults and its gate-type registry are each a
//! flat `Vec`, and every cross-reference between them is a plain index
//! wrapped in a newtype so the compiler stops us from mixing them up.

use std::fmt;

macro_rules! dense_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Builds an id from its dense index.
            pub fn new(index: usize) -> Self {
                $name(index as u32)
            }

            /// Returns the dense index.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                $name::new(index)
            }
        }
    };
}

dense_id!(NodeId, "Identifier of a node in a `TpgNetwork`.");
dense_id!(DffId, "Identifier of a scan flip-flop.");
dense_id!(FaultId, "Identifier of a fault in the collapsed fault list.");
dense_id!(GateTypeId, "Identifier of an entry in the `GateType` registry.");
dense_id!(FfrId, "Identifier of a fanout-free region.");
dense_id!(MffcId, "Identifier of a maximal fanout-free cone.");
