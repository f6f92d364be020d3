/// Declares a `String`-like newtype with an inherent `new` constructor and `Deref` to the inner
/// value.
macro_rules! new_type {
    (
        $(#[$attr:meta])*
        $name:ident($type:ty)
    ) => {
        new_type![
            $(#[$attr])*
            $name($type)
            impl {}
        ];
    };
    (
        $(#[$attr:meta])*
        $name:ident($type:ty)
        impl {
            $($item:tt)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Debug, Eq, Hash, PartialEq)]
        pub struct $name($type);
        impl $name {
            #[doc = concat!("Create a new `", stringify!($name), "` to wrap the given `", stringify!($type), "`.")]
            pub fn new(value: $type) -> Self {
                $name(value)
            }

            $($item)*
        }
        impl std::ops::Deref for $name {
            type Target = $type;
            fn deref(&self) -> &$type {
                &self.0
            }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

/// Declares a newtype holding a secret value. The value is only reachable through `secret()` and
/// is redacted from `Debug` output.
macro_rules! new_secret_type {
    (
        $(#[$attr:meta])*
        $name:ident($type:ty)
        impl {
            $($item:tt)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone)]
        pub struct $name($type);
        impl $name {
            #[doc = concat!("Create a new `", stringify!($name), "` to wrap the given `", stringify!($type), "`.")]
            pub fn new(value: $type) -> Self {
                $name(value)
            }

            #[doc = concat!("Get the secret contained within this `", stringify!($name), "`.")]
            ///
            /// # Security Warning
            ///
            /// Leaking this value may compromise the security of the authentication flow.
            pub fn secret(&self) -> &$type {
                &self.0
            }

            $($item)*
        }
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "([redacted])"))
            }
        }
    };
}
