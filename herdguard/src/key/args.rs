// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache keys for memoized functions
//!
//! A memoized call is keyed by the function name, an optional namespace and
//! the space-joined rendering of its arguments:
//! `name|namespace|arg1 arg2`. Byte strings render as the text they encode,
//! so `b"abc"` and `"abc"` produce the same key.

use std::borrow::Cow;

/// A value that can appear in a function cache key
pub trait KeyPart {
    fn key_part(&self) -> Cow<'_, str>;
}

impl KeyPart for str {
    fn key_part(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl KeyPart for String {
    fn key_part(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl KeyPart for [u8] {
    fn key_part(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self)
    }
}

impl<const N: usize> KeyPart for [u8; N] {
    fn key_part(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self)
    }
}

impl KeyPart for Vec<u8> {
    fn key_part(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self)
    }
}

impl<T: KeyPart + ?Sized> KeyPart for &T {
    fn key_part(&self) -> Cow<'_, str> {
        (**self).key_part()
    }
}

impl<T: KeyPart> KeyPart for Option<T> {
    fn key_part(&self) -> Cow<'_, str> {
        match self {
            Some(value) => value.key_part(),
            None => Cow::Borrowed("None"),
        }
    }
}

macro_rules! display_key_part {
    ($($ty:ty),* $(,)?) => {
        $(
            impl KeyPart for $ty {
                fn key_part(&self) -> Cow<'_, str> {
                    Cow::Owned(self.to_string())
                }
            }
        )*
    };
}

display_key_part!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
);

/// The positional arguments of a memoized call
pub trait KeyArgs {
    fn key_parts(&self) -> Vec<Cow<'_, str>>;
}

impl KeyArgs for () {
    fn key_parts(&self) -> Vec<Cow<'_, str>> {
        Vec::new()
    }
}

macro_rules! tuple_key_args {
    ($($name:ident),+) => {
        impl<$($name: KeyPart),+> KeyArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn key_parts(&self) -> Vec<Cow<'_, str>> {
                let ($($name,)+) = self;
                vec![$($name.key_part()),+]
            }
        }
    };
}

tuple_key_args!(A);
tuple_key_args!(A, B);
tuple_key_args!(A, B, C);
tuple_key_args!(A, B, C, D);
tuple_key_args!(A, B, C, D, E);
tuple_key_args!(A, B, C, D, E, F);

impl<T: KeyPart> KeyArgs for [T] {
    fn key_parts(&self) -> Vec<Cow<'_, str>> {
        self.iter().map(KeyPart::key_part).collect()
    }
}

impl<T: KeyPart> KeyArgs for Vec<T> {
    fn key_parts(&self) -> Vec<Cow<'_, str>> {
        self.as_slice().key_parts()
    }
}

/// Key prefix for a function: `name` or `name|namespace`
pub fn function_namespace(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(namespace) => format!("{}|{}", name, namespace),
        None => name.to_string(),
    }
}

/// Key for one call: `<namespace>|<arg> <arg> ...`
pub fn function_key<A: KeyArgs + ?Sized>(namespace: &str, args: &A) -> String {
    format!("{}|{}", namespace, args.key_parts().join(" "))
}

/// Keys for a batched call, one per argument
pub fn function_multi_keys<T: KeyPart>(namespace: &str, args: &[T]) -> Vec<String> {
    args.iter()
        .map(|arg| format!("{}|{}", namespace, arg.key_part()))
        .collect()
}
