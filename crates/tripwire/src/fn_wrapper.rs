// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Generates `Fn` like wrapper types used to store user-provided callbacks.
///
/// The generated type wraps the function in an `Arc<dyn Fn...>` so that it is thread-safe and
/// cheap to clone, and provides `new`, `call`, `Clone` and `Debug`.
///
/// ```rust,ignore
/// define_fn_wrapper!(ChangeListener(Fn(&PropertyChange)));
/// define_fn_wrapper!(VetoableListener(Fn(&PropertyChange) -> Result<(), VetoError>));
/// ```
macro_rules! define_fn_wrapper {
    ($name:ident(Fn($($param_name:ident: $param_ty:ty),*) -> $return_ty:ty)) => {
        pub(crate) struct $name(std::sync::Arc<dyn Fn($($param_ty),*) -> $return_ty + Send + Sync>);

        impl $name {
            pub(crate) fn new<F>(callback: F) -> Self
            where
                F: Fn($($param_ty),*) -> $return_ty + Send + Sync + 'static,
            {
                Self(std::sync::Arc::new(callback))
            }

            pub(crate) fn call(&self, $($param_name: $param_ty),*) -> $return_ty {
                (self.0)($($param_name),*)
            }
        }

        impl Clone for $name {
            fn clone(&self) -> Self {
                Self(std::sync::Arc::clone(&self.0))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish()
            }
        }
    };

    ($name:ident(Fn($param1:ty) -> $return_ty:ty)) => {
        $crate::define_fn_wrapper!($name(Fn(arg1: $param1) -> $return_ty));
    };

    ($name:ident(Fn($param1:ty))) => {
        $crate::define_fn_wrapper!($name(Fn(arg1: $param1) -> ()));
    };
}

pub(crate) use define_fn_wrapper;
