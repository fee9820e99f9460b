/// Declare an enumeration that can be stored in a mapped column.
///
/// Ordinals are explicit and may repeat; add `: text` after the name to store members by name.
/// The macro derives `Debug, Clone, Copy, PartialEq, Eq, Hash`.
///
/// ```rust
/// use sqlite_mapper::prelude::*;
///
/// sqlite_mapper::stored_enum! {
///     pub enum Shade: text {
///         Red = 1,
///         Crimson = 1,
///         Green = 2,
///     }
/// }
///
/// assert_eq!(Shade::Crimson.ordinal(), 1);
/// assert_eq!(Shade::from_ordinal(1), Some(Shade::Red));
/// assert_eq!(Shade::from_name("Crimson"), Some(Shade::Crimson));
/// ```
#[macro_export]
macro_rules! stored_enum {
    (@define $as_text:expr, $(#[$meta:meta])* $vis:vis enum $name:ident {
        $($variant:ident = $ordinal:expr),+
    }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::conversion::StoredEnum for $name {
            const MEMBERS: &'static [(&'static str, i64)] = &[$((stringify!($variant), $ordinal)),+];
            const STORE_AS_TEXT: bool = $as_text;

            fn ordinal(&self) -> i64 {
                match self {
                    $(Self::$variant => $ordinal),+
                }
            }

            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),+
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                $(
                    if name == stringify!($variant) {
                        return Some(Self::$variant);
                    }
                )+
                None
            }

            fn from_ordinal(ordinal: i64) -> Option<Self> {
                $(
                    if ordinal == $ordinal {
                        return Some(Self::$variant);
                    }
                )+
                None
            }
        }

        impl $crate::conversion::IntoValue for $name {
            fn into_value(self) -> $crate::types::Value {
                $crate::conversion::enum_to_value(self)
            }
        }

        impl $crate::conversion::FromValue for $name {
            fn from_value(
                value: $crate::types::Value,
            ) -> ::std::result::Result<Self, $crate::error::MapperError> {
                $crate::conversion::enum_from_value(value)
            }
        }

        impl $crate::conversion::ColumnType for $name {
            const KIND: $crate::types::ValueKind = $crate::types::ValueKind::Enum {
                members: <$name as $crate::conversion::StoredEnum>::MEMBERS,
                as_text: $as_text,
            };
        }
    };
    ($(#[$meta:meta])* $vis:vis enum $name:ident : text {
        $($variant:ident = $ordinal:expr),+ $(,)?
    }) => {
        $crate::stored_enum!(@define true, $(#[$meta])* $vis enum $name { $($variant = $ordinal),+ });
    };
    ($(#[$meta:meta])* $vis:vis enum $name:ident {
        $($variant:ident = $ordinal:expr),+ $(,)?
    }) => {
        $crate::stored_enum!(@define false, $(#[$meta])* $vis enum $name { $($variant = $ordinal),+ });
    };
}
