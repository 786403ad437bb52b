use anyhow::{anyhow, Result};
use serde_json::{json, Value};

/// A Rust type a tool parameter can be extracted into.
pub trait ParamType: Sized {
    const EXPECTED: &'static str;

    fn schema(description: &str) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

impl ParamType for String {
    const EXPECTED: &'static str = "a string";

    fn schema(description: &str) -> Value {
        json!({"type": "string", "description": description})
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl ParamType for bool {
    const EXPECTED: &'static str = "a boolean";

    fn schema(description: &str) -> Value {
        json!({"type": "boolean", "description": description})
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().to_lowercase().parse().ok(),
            _ => None,
        }
    }
}

impl ParamType for i64 {
    const EXPECTED: &'static str = "an integer";

    fn schema(description: &str) -> Value {
        json!({"type": "integer", "description": description})
    }

    fn from_value(value: &Value) -> Option<Self> {
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
    }
}

impl ParamType for Vec<String> {
    const EXPECTED: &'static str = "an array of strings";

    fn schema(description: &str) -> Value {
        json!({"type": "array", "items": {"type": "string"}, "description": description})
    }

    fn from_value(value: &Value) -> Option<Self> {
        array_items(value)?
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect()
    }
}

impl ParamType for Vec<Value> {
    const EXPECTED: &'static str = "an array of objects";

    fn schema(description: &str) -> Value {
        json!({"type": "array", "items": {"type": "object"}, "description": description})
    }

    fn from_value(value: &Value) -> Option<Self> {
        let items = array_items(value)?;
        items.iter().all(Value::is_object).then_some(items)
    }
}

// Agents regularly send arrays wrapped in a JSON string; accept both.
fn array_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => match serde_json::from_str(s) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

pub fn optional<T: ParamType>(arguments: &Value, name: &str) -> Result<Option<T>> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::from_value(value)
            .map(Some)
            .ok_or_else(|| anyhow!("Invalid parameter {name}: expected {}", T::EXPECTED)),
    }
}

pub fn required<T: ParamType>(arguments: &Value, name: &str) -> Result<T> {
    optional(arguments, name)?.ok_or_else(|| anyhow!("Missing required parameter: {name}"))
}

/// Generates a parameter struct together with its JSON schema and extraction.
///
/// Each field is `required(name: Type, "description")` or
/// `optional(name: Type, "description")`; `name as "wireName"` sets the JSON
/// key when it differs from the Rust field name.
#[macro_export]
macro_rules! tool_params {
    (
        $struct_name:ident {
            $( $kind:ident ( $name:ident $(as $key:literal)? : $type:ty, $desc:expr ) ),* $(,)?
        }
    ) => {
        pub struct $struct_name {
            $( pub $name: $crate::tool_params!(@field_type $kind $type), )*
        }

        impl $crate::mcp::ToolParams for $struct_name {
            fn input_schema() -> serde_json::Value {
                #[allow(unused_mut)]
                let mut properties = serde_json::Map::new();
                #[allow(unused_mut)]
                let mut required: Vec<&str> = Vec::new();
                $(
                    let key = $crate::tool_params!(@key $name $($key)?);
                    properties.insert(
                        key.to_owned(),
                        <$type as $crate::mcp::params::ParamType>::schema($desc),
                    );
                    if $crate::tool_params!(@is_required $kind) {
                        required.push(key);
                    }
                )*
                serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": required
                })
            }

            #[allow(unused_variables)]
            fn extract_params(arguments: &serde_json::Value) -> anyhow::Result<Self> {
                Ok(Self {
                    $(
                        $name: $crate::tool_params!(
                            @extract $kind $type,
                            arguments,
                            $crate::tool_params!(@key $name $($key)?)
                        ),
                    )*
                })
            }
        }
    };

    (@key $name:ident) => { stringify!($name) };
    (@key $name:ident $key:literal) => { $key };

    (@is_required required) => { true };
    (@is_required optional) => { false };

    (@field_type required $type:ty) => { $type };
    (@field_type optional $type:ty) => { Option<$type> };

    (@extract required $type:ty, $args:expr, $key:expr) => {
        $crate::mcp::params::required::<$type>($args, $key)?
    };
    (@extract optional $type:ty, $args:expr, $key:expr) => {
        $crate::mcp::params::optional::<$type>($args, $key)?
    };
}
