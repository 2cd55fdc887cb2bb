//! Variant definitions
//!
//! A variant is a derived artifact (thumbnail, cropped copy, …) produced from a stored
//! original by applying a list of operations. [`VariantDefinition`] is the declarative,
//! fluent description used in configuration; [`VariantRecord`] is what a
//! [`File`](crate::File) carries for each declared variant once it is attached
//! (operations plus the path/url filled in by processing).

use crate::error::{Error, Result};
use crate::operation::{FlipDirection, Operation, Position};
use crate::ordered::OrderedMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Operation name → arguments, in declaration order
pub type Operations = OrderedMap<Value>;

/// Length of the `{hashedVariant}` path token
pub const VARIANT_HASH_LENGTH: usize = 8;

/// Per-file state of one declared variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    #[serde(default)]
    pub operations: Operations,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub optimize: bool,
    /// Set when processing this variant failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VariantRecord {
    pub fn new(operations: Operations, optimize: bool) -> Self {
        Self {
            operations,
            optimize,
            ..Default::default()
        }
    }

    /// A variant is completed once it has been written somewhere
    pub fn is_completed(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn hash(&self) -> String {
        hash_operations(&self.operations)
    }
}

/// Short deterministic hash of an operation list.
///
/// Operations are applied in order, so their order is part of the hash. Argument keys
/// are sorted: `{"width": 1, "height": 2}` and `{"height": 2, "width": 1}` hash alike,
/// while a change to any single argument yields a different hash.
pub fn hash_operations(operations: &Operations) -> String {
    let mut canonical = String::from("[");
    for (i, (name, arguments)) in operations.iter().enumerate() {
        if i > 0 {
            canonical.push(',');
        }
        canonical.push_str(&Value::String(name.to_string()).to_string());
        canonical.push(':');
        write_canonical(arguments, &mut canonical);
    }
    canonical.push(']');

    let digest = Sha256::digest(canonical.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(VARIANT_HASH_LENGTH);
    hash
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Fluent, consuming builder describing one variant
#[derive(Debug, Clone, PartialEq)]
pub struct VariantDefinition {
    name: String,
    operations: Operations,
    optimize: bool,
}

impl VariantDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Operations::new(),
            optimize: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operations(&self) -> &Operations {
        &self.operations
    }

    pub fn is_optimized(&self) -> bool {
        self.optimize
    }

    /// Add (or replace) an operation
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations
            .insert(operation.name(), operation.arguments());
        self
    }

    pub fn optimize(mut self) -> Self {
        self.optimize = true;
        self
    }

    pub fn resize(self, width: u32, height: u32) -> Self {
        self.resize_with(width, height, true, false)
    }

    pub fn resize_with(
        self,
        width: u32,
        height: u32,
        aspect_ratio: bool,
        prevent_upscale: bool,
    ) -> Self {
        self.operation(Operation::Resize {
            width,
            height,
            aspect_ratio,
            prevent_upscale,
        })
    }

    pub fn widen(self, width: u32, prevent_upscale: bool) -> Self {
        self.operation(Operation::Widen {
            width,
            prevent_upscale,
        })
    }

    pub fn heighten(self, height: u32, prevent_upscale: bool) -> Self {
        self.operation(Operation::Heighten {
            height,
            prevent_upscale,
        })
    }

    pub fn fit(self, width: u32, height: Option<u32>) -> Self {
        self.fit_with(width, height, Position::Center, false)
    }

    pub fn fit_with(
        self,
        width: u32,
        height: Option<u32>,
        position: Position,
        prevent_upscale: bool,
    ) -> Self {
        self.operation(Operation::Fit {
            width,
            height,
            position,
            prevent_upscale,
        })
    }

    pub fn crop(self, width: u32, height: u32, x: Option<u32>, y: Option<u32>) -> Self {
        self.operation(Operation::Crop {
            width,
            height,
            x,
            y,
        })
    }

    pub fn rotate(self, angle: i32) -> Self {
        self.operation(Operation::Rotate { angle })
    }

    pub fn flip(self, direction: FlipDirection) -> Self {
        self.operation(Operation::Flip(direction))
    }

    pub fn flip_horizontal(self) -> Self {
        self.flip(FlipDirection::Horizontal)
    }

    pub fn flip_vertical(self) -> Self {
        self.flip(FlipDirection::Vertical)
    }

    pub fn sharpen(self, amount: u32) -> Self {
        self.operation(Operation::Sharpen { amount })
    }

    /// Apply the callback registered under `name` on the image processor
    pub fn callback(self, name: impl Into<String>) -> Self {
        self.operation(Operation::Callback {
            name: name.into(),
            arguments: Value::Object(serde_json::Map::new()),
        })
    }

    /// The record a file carries for this variant before processing
    pub fn to_record(&self) -> VariantRecord {
        VariantRecord::new(self.operations.clone(), self.optimize)
    }

    /// Rebuild a definition from its stored form, validating every operation name
    pub fn from_record(name: impl Into<String>, record: &VariantRecord) -> Result<Self> {
        let mut definition = VariantDefinition::new(name);
        for (operation, arguments) in record.operations.iter() {
            definition = definition.operation(Operation::parse(operation, arguments)?);
        }
        definition.optimize = record.optimize;
        Ok(definition)
    }
}

/// Ordered, name-unique set of variant definitions.
///
/// Serializes to the plain nested map used in configuration:
/// `{ "thumb": { "operations": { "resize": { … } }, "optimize": true } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OrderedMap<VariantRecord>", into = "OrderedMap<VariantRecord>")]
pub struct VariantCollection {
    variants: OrderedMap<VariantDefinition>,
}

impl VariantCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition; names must be unique within the collection
    pub fn add(&mut self, variant: VariantDefinition) -> Result<()> {
        if self.has(variant.name()) {
            return Err(Error::VariantExists(variant.name().to_string()));
        }
        self.variants.insert(variant.name().to_string(), variant);
        Ok(())
    }

    /// Declare a new variant and configure it in place
    pub fn add_new(
        &mut self,
        name: impl Into<String>,
        configure: impl FnOnce(VariantDefinition) -> VariantDefinition,
    ) -> Result<()> {
        self.add(configure(VariantDefinition::new(name)))
    }

    /// Chaining form of [`add`](Self::add)
    pub fn with(mut self, variant: VariantDefinition) -> Result<Self> {
        self.add(variant)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&VariantDefinition> {
        self.variants.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.variants.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<VariantDefinition> {
        self.variants.remove(name)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantDefinition> {
        self.variants.values()
    }

    /// Records to attach to a file, in declaration order
    pub fn to_map(&self) -> OrderedMap<VariantRecord> {
        self.variants
            .iter()
            .map(|(name, definition)| (name.to_string(), definition.to_record()))
            .collect()
    }

    pub fn from_map(map: &OrderedMap<VariantRecord>) -> Result<Self> {
        let mut collection = VariantCollection::new();
        for (name, record) in map.iter() {
            collection.add(VariantDefinition::from_record(name, record)?)?;
        }
        Ok(collection)
    }
}

impl TryFrom<OrderedMap<VariantRecord>> for VariantCollection {
    type Error = Error;

    fn try_from(map: OrderedMap<VariantRecord>) -> Result<Self> {
        VariantCollection::from_map(&map)
    }
}

impl From<VariantCollection> for OrderedMap<VariantRecord> {
    fn from(collection: VariantCollection) -> Self {
        collection.to_map()
    }
}
