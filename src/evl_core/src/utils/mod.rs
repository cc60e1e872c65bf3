//! Utility
mod prio_bitmap;
pub(crate) use self::prio_bitmap::*;

/// Define an arena-backed object identifier: a slot index plus the generation
/// of the object that occupied the slot when the identifier was issued.
macro_rules! define_id {
    (
        $( #[$meta:meta] )*
        pub struct $Name:ident;
    ) => {
        $( #[$meta] )*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $Name {
            slot: u32,
            gen: u32,
        }

        impl $Name {
            #[inline]
            pub(crate) const fn new(slot: usize, gen: u32) -> Self {
                Self {
                    slot: slot as u32,
                    gen,
                }
            }

            /// The arena slot of the object.
            #[inline]
            pub(crate) const fn slot(self) -> usize {
                self.slot as usize
            }

            /// The generation of the object.
            #[inline]
            pub(crate) const fn gen(self) -> u32 {
                self.gen
            }
        }

        impl core::fmt::Debug for $Name {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "{}({}#{})", stringify!($Name), self.slot, self.gen)
            }
        }
    };
}
pub(crate) use define_id;
