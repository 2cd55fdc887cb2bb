//! Image operations
//!
//! Operations are stored and exchanged as `name → arguments` pairs (see
//! [`Operations`](crate::Operations)). [`Operation`] is the closed set of operations
//! the image processor knows how to apply; parsing a pair either yields one of the
//! variants or fails with [`Error::UnsupportedOperation`] naming the operation.
//! Anything not covered by the built-in set goes through [`Operation::Callback`], which
//! dispatches to a callback registered under a name on the processor.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Flip direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlipDirection {
    #[serde(rename = "h")]
    Horizontal,
    #[serde(rename = "v")]
    Vertical,
}

impl FlipDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            FlipDirection::Horizontal => "h",
            FlipDirection::Vertical => "v",
        }
    }
}

/// Anchor used by `fit` to pick the part of the image that is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    TopLeft,
    Top,
    TopRight,
    Left,
    #[default]
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Resize into a `width` x `height` box. Keeps the aspect ratio unless told otherwise.
    Resize {
        width: u32,
        height: u32,
        aspect_ratio: bool,
        prevent_upscale: bool,
    },
    /// Resize to `width`, height follows the aspect ratio
    Widen { width: u32, prevent_upscale: bool },
    /// Resize to `height`, width follows the aspect ratio
    Heighten { height: u32, prevent_upscale: bool },
    /// Crop to the target aspect ratio at `position`, then resize to the target size
    Fit {
        width: u32,
        height: Option<u32>,
        position: Position,
        prevent_upscale: bool,
    },
    /// Cut out a `width` x `height` region; centered when no offset is given
    Crop {
        width: u32,
        height: u32,
        x: Option<u32>,
        y: Option<u32>,
    },
    /// Rotate counter-clockwise by `angle` degrees
    Rotate { angle: i32 },
    Flip(FlipDirection),
    /// Unsharp mask, `amount` between 0 and 100
    Sharpen { amount: u32 },
    /// Registered callback, looked up by name at processing time
    Callback { name: String, arguments: Value },
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResizeArgs {
    width: u32,
    height: u32,
    #[serde(default = "default_true")]
    aspect_ratio: bool,
    #[serde(default)]
    prevent_upscale: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WidenArgs {
    width: u32,
    #[serde(default)]
    prevent_upscale: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeightenArgs {
    height: u32,
    #[serde(default)]
    prevent_upscale: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FitArgs {
    width: u32,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    prevent_upscale: bool,
}

#[derive(Deserialize)]
struct CropArgs {
    width: u32,
    height: u32,
    #[serde(default)]
    x: Option<u32>,
    #[serde(default)]
    y: Option<u32>,
}

#[derive(Deserialize)]
struct RotateArgs {
    angle: i32,
}

#[derive(Deserialize)]
struct FlipArgs {
    direction: FlipDirection,
}

#[derive(Deserialize)]
struct SharpenArgs {
    amount: u32,
}

#[derive(Deserialize)]
struct CallbackArgs {
    callback: String,
}

fn parse_args<T: DeserializeOwned>(operation: &str, arguments: &Value) -> Result<T> {
    // `null` / `[]` stand for "no arguments" in configs written by hand
    let arguments = match arguments {
        Value::Null => json!({}),
        Value::Array(items) if items.is_empty() => json!({}),
        other => other.clone(),
    };
    serde_json::from_value(arguments).map_err(|e| Error::InvalidOperationArguments {
        operation: operation.to_string(),
        message: e.to_string(),
    })
}

impl Operation {
    /// Parse a `name → arguments` pair into a known operation
    pub fn parse(name: &str, arguments: &Value) -> Result<Self> {
        let operation = match name {
            "resize" => {
                let a: ResizeArgs = parse_args(name, arguments)?;
                Operation::Resize {
                    width: a.width,
                    height: a.height,
                    aspect_ratio: a.aspect_ratio,
                    prevent_upscale: a.prevent_upscale,
                }
            }
            "widen" => {
                let a: WidenArgs = parse_args(name, arguments)?;
                Operation::Widen {
                    width: a.width,
                    prevent_upscale: a.prevent_upscale,
                }
            }
            "heighten" => {
                let a: HeightenArgs = parse_args(name, arguments)?;
                Operation::Heighten {
                    height: a.height,
                    prevent_upscale: a.prevent_upscale,
                }
            }
            "fit" => {
                let a: FitArgs = parse_args(name, arguments)?;
                Operation::Fit {
                    width: a.width,
                    height: a.height,
                    position: a.position,
                    prevent_upscale: a.prevent_upscale,
                }
            }
            "crop" => {
                let a: CropArgs = parse_args(name, arguments)?;
                Operation::Crop {
                    width: a.width,
                    height: a.height,
                    x: a.x,
                    y: a.y,
                }
            }
            "rotate" => {
                let a: RotateArgs = parse_args(name, arguments)?;
                Operation::Rotate { angle: a.angle }
            }
            "flip" => {
                let a: FlipArgs = parse_args(name, arguments)?;
                Operation::Flip(a.direction)
            }
            "flipHorizontal" => Operation::Flip(FlipDirection::Horizontal),
            "flipVertical" => Operation::Flip(FlipDirection::Vertical),
            "sharpen" => {
                let a: SharpenArgs = parse_args(name, arguments)?;
                if a.amount > 100 {
                    return Err(Error::InvalidOperationArguments {
                        operation: name.to_string(),
                        message: format!("amount must be between 0 and 100, got {}", a.amount),
                    });
                }
                Operation::Sharpen { amount: a.amount }
            }
            "callback" => {
                let a: CallbackArgs = parse_args(name, arguments)?;
                Operation::Callback {
                    name: a.callback,
                    arguments: arguments.clone(),
                }
            }
            other => return Err(Error::UnsupportedOperation(other.to_string())),
        };
        Ok(operation)
    }

    /// Name under which this operation is stored in an operation map
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Resize { .. } => "resize",
            Operation::Widen { .. } => "widen",
            Operation::Heighten { .. } => "heighten",
            Operation::Fit { .. } => "fit",
            Operation::Crop { .. } => "crop",
            Operation::Rotate { .. } => "rotate",
            Operation::Flip(_) => "flip",
            Operation::Sharpen { .. } => "sharpen",
            Operation::Callback { .. } => "callback",
        }
    }

    /// Arguments in their stored (camelCase) form
    pub fn arguments(&self) -> Value {
        match self {
            Operation::Resize {
                width,
                height,
                aspect_ratio,
                prevent_upscale,
            } => json!({
                "width": width,
                "height": height,
                "aspectRatio": aspect_ratio,
                "preventUpscale": prevent_upscale,
            }),
            Operation::Widen {
                width,
                prevent_upscale,
            } => json!({ "width": width, "preventUpscale": prevent_upscale }),
            Operation::Heighten {
                height,
                prevent_upscale,
            } => json!({ "height": height, "preventUpscale": prevent_upscale }),
            Operation::Fit {
                width,
                height,
                position,
                prevent_upscale,
            } => json!({
                "width": width,
                "height": height,
                "position": position,
                "preventUpscale": prevent_upscale,
            }),
            Operation::Crop {
                width,
                height,
                x,
                y,
            } => json!({ "width": width, "height": height, "x": x, "y": y }),
            Operation::Rotate { angle } => json!({ "angle": angle }),
            Operation::Flip(direction) => json!({ "direction": direction.as_str() }),
            Operation::Sharpen { amount } => json!({ "amount": amount }),
            Operation::Callback { name, arguments } => {
                let mut arguments = match arguments {
                    Value::Object(map) => map.clone(),
                    _ => serde_json::Map::new(),
                };
                arguments.insert("callback".to_string(), Value::String(name.clone()));
                Value::Object(arguments)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resize_defaults() {
        let op = Operation::parse("resize", &json!({"width": 50, "height": 40})).unwrap();
        assert_eq!(
            op,
            Operation::Resize {
                width: 50,
                height: 40,
                aspect_ratio: true,
                prevent_upscale: false,
            }
        );
    }

    #[test]
    fn test_parse_unknown_operation() {
        let err = Operation::parse("pixelate", &json!({})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(ref name) if name == "pixelate"));
    }

    #[test]
    fn test_parse_missing_argument() {
        let err = Operation::parse("widen", &json!({})).unwrap_err();
        assert!(
            matches!(err, Error::InvalidOperationArguments { ref operation, .. } if operation == "widen")
        );
    }

    #[test]
    fn test_flip_aliases_and_direction() {
        assert_eq!(
            Operation::parse("flipHorizontal", &Value::Null).unwrap(),
            Operation::Flip(FlipDirection::Horizontal)
        );
        assert_eq!(
            Operation::parse("flip", &json!({"direction": "v"})).unwrap(),
            Operation::Flip(FlipDirection::Vertical)
        );
        assert!(Operation::parse("flip", &json!({"direction": "x"})).is_err());
    }

    #[test]
    fn test_sharpen_amount_bounds() {
        assert!(Operation::parse("sharpen", &json!({"amount": 101})).is_err());
        assert!(Operation::parse("sharpen", &json!({"amount": 10})).is_ok());
    }

    #[test]
    fn test_arguments_parse_back() {
        let ops = vec![
            Operation::Fit {
                width: 100,
                height: None,
                position: Position::TopRight,
                prevent_upscale: true,
            },
            Operation::Crop {
                width: 10,
                height: 20,
                x: Some(1),
                y: None,
            },
            Operation::Rotate { angle: -90 },
            Operation::Callback {
                name: "grayscale".to_string(),
                arguments: json!({"level": 3}),
            },
        ];
        for op in ops {
            let parsed = Operation::parse(op.name(), &op.arguments()).unwrap();
            assert_eq!(parsed.name(), op.name());
            assert_eq!(parsed.arguments(), op.arguments());
        }
    }
}
