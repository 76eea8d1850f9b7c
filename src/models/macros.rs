//! Macros for reducing boilerplate when declaring models

/// Declare a model struct and its [`Model`](crate::core::schema::Model) impl
///
/// Field types map to schema types through
/// [`FieldKind`](crate::core::schema::FieldKind); `Option<T>` fields are
/// optional. Methods listed under `computed` must take `&self` and no
/// arguments; their results are serialized into responses.
///
/// # Example
/// ```rust,ignore
/// impl_model!(Car, "car", {
///     brand: String,
///     year: i64,
///     miles: f64,
///     owner: String,
/// }, computed [description]);
///
/// impl Car {
///     pub fn description(&self) -> String {
///         format!("{} from {}", self.brand, self.year)
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_model {
    (
        $(#[$meta:meta])*
        $type:ident, $name:literal, {
            $( $(#[$field_meta:meta])* $field:ident : $ftype:ty ),* $(,)?
        } $(, computed [ $($method:ident),* $(,)? ])? $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $type {
            $(
                $(#[$field_meta])*
                pub $field: $ftype,
            )*
        }

        impl $crate::core::schema::Model for $type {
            fn model_name() -> &'static str {
                $name
            }

            fn describe(schema: &mut $crate::core::schema::SchemaBuilder<Self>) {
                $(
                    schema.field_of::<$ftype>(stringify!($field));
                )*
                $($(
                    schema.computed(stringify!($method), |model: &Self| model.$method());
                )*)?
            }
        }
    };
}
