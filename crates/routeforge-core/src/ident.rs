macro_rules! identifier {
    ($name: ident, $inner: ty) => {
        #[derive(
            Debug,
            Default,
            Copy,
            Clone,
            PartialOrd,
            Ord,
            PartialEq,
            Eq,
            Hash,
            derive_more::Display,
        )]
        pub(crate) struct $name($inner);

        impl $name {
            /// Creates a new ID.
            pub(crate) const fn new(val: $inner) -> Self {
                Self(val)
            }

            /// Returns the inner representation of the ID.
            pub(crate) const fn inner(self) -> $inner {
                self.0
            }
        }
    };
}
