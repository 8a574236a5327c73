/// Implement [`Fields`](crate::mapping::Fields) and [`Record`](crate::mapping::Record) for a
/// plain struct.
///
/// Each entry names a field, optionally followed by `: "tag"` (column and options) and
/// `=> NestedType` for fields holding another record. Fields not listed are not mapped.
/// Scalar fields need `Clone`, `Into<Value>` and [`FromValue`](crate::FromValue).
///
/// ```rust
/// # use dbmux::prelude::*;
/// #[derive(Debug, Default, Clone)]
/// struct Address { city: String }
/// dbmux::impl_record!(Address { city });
///
/// #[derive(Debug, Default, Clone)]
/// struct Person { id: i64, name: String, address: Address }
/// dbmux::impl_record!(Person {
///     id: "id,omitempty",
///     name: "full_name",
///     address: ",inline" => Address,
/// });
///
/// assert_eq!(Person::describe().unwrap().columns(), vec!["id", "full_name", "city"]);
/// ```
#[macro_export]
macro_rules! impl_record {
    (@spec $field:ident) => {
        $crate::mapping::FieldSpec::new(stringify!($field))
    };
    (@spec $field:ident : $tag:literal) => {
        $crate::mapping::FieldSpec::new(stringify!($field)).tag($tag)
    };
    (@spec $field:ident => $nested:ty) => {
        $crate::mapping::FieldSpec::nested::<$nested>(stringify!($field))
    };
    (@spec $field:ident : $tag:literal => $nested:ty) => {
        $crate::mapping::FieldSpec::nested::<$nested>(stringify!($field)).tag($tag)
    };

    (@get $place:expr) => {
        Some($crate::Value::from(::std::clone::Clone::clone(&$place)))
    };
    (@get $place:expr => $nested:ty) => {
        $crate::mapping::record_to_value::<$nested>(&$place).ok()
    };

    (@set $place:expr, $value:ident) => {
        $place = $crate::FromValue::from_value($value)?
    };
    (@set $place:expr, $value:ident => $nested:ty) => {
        $place = $crate::mapping::record_from_value::<$nested>($value)?
    };

    (@nested $place:expr, $name:ident, $field:ident) => {};
    (@nested $place:expr, $name:ident, $field:ident => $nested:ty) => {
        if $name == stringify!($field) {
            return Some(&$place as &dyn $crate::mapping::Fields);
        }
    };

    (@nested_mut $place:expr, $name:ident, $field:ident) => {};
    (@nested_mut $place:expr, $name:ident, $field:ident => $nested:ty) => {
        if $name == stringify!($field) {
            return Some(&mut $place as &mut dyn $crate::mapping::Fields);
        }
    };

    ($ty:ident { $($field:ident $(: $tag:literal)? $(=> $nested:ty)?),* $(,)? }) => {
        impl $crate::mapping::Fields for $ty {
            fn get_field(&self, name: &str) -> Option<$crate::Value> {
                $(
                    if name == stringify!($field) {
                        return $crate::impl_record!(@get self.$field $(=> $nested)?);
                    }
                )*
                None
            }

            fn set_field(
                &mut self,
                name: &str,
                value: $crate::Value,
            ) -> Result<(), $crate::DbError> {
                $(
                    if name == stringify!($field) {
                        $crate::impl_record!(@set self.$field, value $(=> $nested)?);
                        return Ok(());
                    }
                )*
                Err($crate::DbError::ValidationError(format!(
                    "{} has no field `{name}`",
                    stringify!($ty)
                )))
            }

            #[allow(unused_variables)]
            fn nested(&self, name: &str) -> Option<&dyn $crate::mapping::Fields> {
                $( $crate::impl_record!(@nested self.$field, name, $field $(=> $nested)?); )*
                None
            }

            #[allow(unused_variables)]
            fn nested_mut(&mut self, name: &str) -> Option<&mut dyn $crate::mapping::Fields> {
                $( $crate::impl_record!(@nested_mut self.$field, name, $field $(=> $nested)?); )*
                None
            }
        }

        impl $crate::mapping::Record for $ty {
            fn fields() -> Vec<$crate::mapping::FieldSpec> {
                vec![$($crate::impl_record!(@spec $field $(: $tag)? $(=> $nested)?)),*]
            }
        }
    };
}
